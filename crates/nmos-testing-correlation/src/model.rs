// crates/nmos-testing-correlation/src/model.rs
// ============================================================================
// Module: Correlation Model
// Description: Id-keyed record collections with foreign-key traversal.
// Purpose: Join resources fetched from independently versioned APIs.
// Dependencies: serde_json, thiserror
// ============================================================================

//! ## Overview
//! Collections are indexed by record `id` and, on request, by the value of a
//! foreign-key field. Joins resolve a record's field against another
//! collection at query time and return `None` when either the field or the
//! target is missing. Nothing here treats a dangling reference as an error;
//! referential integrity is what the checks test.
//!
//! Invariants:
//! - Each collection keeps its records in first-indexed order.
//! - Re-indexing an id replaces the record in place.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Records
// ============================================================================

/// A required field was absent from a record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{record} does not contain expected key: {key}")]
pub struct MissingField {
    /// Id of the record that lacks the field.
    pub record: String,
    /// Dotted path of the missing field.
    pub key: String,
}

/// One fetched JSON object tagged with its owning API.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    /// Primary key.
    id: String,
    /// API the record was fetched from.
    api: String,
    /// Remaining object fields, `id` included when present.
    fields: Map<String, Value>,
}

impl ResourceRecord {
    /// Builds a record with an explicit id.
    #[must_use]
    pub fn new(id: impl Into<String>, api: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            api: api.into(),
            fields,
        }
    }

    /// Builds a record from an object carrying a string `id`.
    ///
    /// Returns `None` for non-objects and objects without a string `id`.
    #[must_use]
    pub fn from_value(api: impl Into<String>, value: Value) -> Option<Self> {
        let Value::Object(fields) = value else {
            return None;
        };
        let id = fields.get("id").and_then(Value::as_str)?.to_string();
        Some(Self::new(id, api, fields))
    }

    /// Returns the primary key.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the owning API key.
    #[must_use]
    pub fn api(&self) -> &str {
        &self.api
    }

    /// Returns all fields.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Returns a top-level field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns a top-level string field.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Follows a path of object keys from the top level.
    #[must_use]
    pub fn lookup(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter().try_fold(self.fields.get(*first)?, |value, key| value.get(*key))
    }

    /// Returns a top-level field or names it as missing.
    ///
    /// # Errors
    ///
    /// Returns [`MissingField`] when the field is absent.
    pub fn require(&self, key: &str) -> Result<&Value, MissingField> {
        self.get(key).ok_or_else(|| self.missing(key))
    }

    /// Returns a top-level string field or names it as missing.
    ///
    /// # Errors
    ///
    /// Returns [`MissingField`] when the field is absent or not a string.
    pub fn require_str(&self, key: &str) -> Result<&str, MissingField> {
        self.get_str(key).ok_or_else(|| self.missing(key))
    }

    /// Follows a key path or names it as missing.
    ///
    /// # Errors
    ///
    /// Returns [`MissingField`] when any segment is absent.
    pub fn require_path(&self, path: &[&str]) -> Result<&Value, MissingField> {
        self.lookup(path).ok_or_else(|| self.missing(&path.join(".")))
    }

    /// Builds the error for a missing key on this record.
    fn missing(&self, key: &str) -> MissingField {
        MissingField {
            record: self.id.clone(),
            key: key.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Model
// ============================================================================

/// Per-collection record store.
#[derive(Debug, Clone, Default)]
struct Collection {
    /// Ids in first-indexed order.
    order: Vec<String>,
    /// Records by id.
    records: BTreeMap<String, ResourceRecord>,
    /// Foreign-key indices: field name to field value to record ids.
    foreign: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl Collection {
    /// Inserts or replaces a record and refreshes foreign indices.
    fn insert(&mut self, record: ResourceRecord) {
        let id = record.id.clone();
        if let Some(previous) = self.records.remove(&id) {
            for (field, index) in &mut self.foreign {
                if let Some(value) = previous.get_str(field)
                    && let Some(ids) = index.get_mut(value)
                {
                    ids.retain(|known| known != &id);
                }
            }
        } else {
            self.order.push(id.clone());
        }
        for (field, index) in &mut self.foreign {
            if let Some(value) = record.get_str(field) {
                index.entry(value.to_string()).or_default().push(id.clone());
            }
        }
        self.records.insert(id, record);
    }

    /// Builds the index for `field` over current records.
    fn build_foreign(&mut self, field: &str) {
        let mut index: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for id in &self.order {
            if let Some(value) = self.records.get(id).and_then(|record| record.get_str(field)) {
                index.entry(value.to_string()).or_default().push(id.clone());
            }
        }
        self.foreign.insert(field.to_string(), index);
    }
}

/// In-memory join layer over named record collections.
#[derive(Debug, Clone, Default)]
pub struct CorrelationModel {
    /// Collections by name.
    collections: BTreeMap<String, Collection>,
}

impl CorrelationModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores records in `collection`, keyed by id.
    pub fn index(&mut self, collection: &str, records: impl IntoIterator<Item = ResourceRecord>) {
        let entry = self.collections.entry(collection.to_string()).or_default();
        for record in records {
            entry.insert(record);
        }
    }

    /// Maintains an index of `collection` by the string value of `field`.
    pub fn index_foreign_key(&mut self, collection: &str, field: &str) {
        self.collections.entry(collection.to_string()).or_default().build_foreign(field);
    }

    /// Returns the record with `id` in `collection`.
    #[must_use]
    pub fn record(&self, collection: &str, id: &str) -> Option<&ResourceRecord> {
        self.collections.get(collection)?.records.get(id)
    }

    /// Returns true when `collection` holds `id`.
    #[must_use]
    pub fn contains(&self, collection: &str, id: &str) -> bool {
        self.record(collection, id).is_some()
    }

    /// Iterates `collection` in first-indexed order.
    pub fn records<'a>(
        &'a self,
        collection: &str,
    ) -> impl Iterator<Item = &'a ResourceRecord> + use<'a> {
        self.collections
            .get(collection)
            .into_iter()
            .flat_map(|entry| entry.order.iter().filter_map(|id| entry.records.get(id)))
    }

    /// Returns the number of records in `collection`.
    #[must_use]
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |entry| entry.records.len())
    }

    /// Returns true when `collection` is empty or unknown.
    #[must_use]
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Follows `through_field` of record `id` in `collection` into `target`.
    #[must_use]
    pub fn join(
        &self,
        collection: &str,
        id: &str,
        through_field: &str,
        target: &str,
    ) -> Option<&ResourceRecord> {
        self.join_record(self.record(collection, id)?, through_field, target)
    }

    /// Follows `through_field` of `record` into `target`.
    #[must_use]
    pub fn join_record(
        &self,
        record: &ResourceRecord,
        through_field: &str,
        target: &str,
    ) -> Option<&ResourceRecord> {
        self.record(target, record.get_str(through_field)?)
    }

    /// Returns records of `collection` whose `field` equals `value`.
    #[must_use]
    pub fn referencing(&self, collection: &str, field: &str, value: &str) -> Vec<&ResourceRecord> {
        let Some(entry) = self.collections.get(collection) else {
            return Vec::new();
        };
        if let Some(index) = entry.foreign.get(field) {
            return index
                .get(value)
                .into_iter()
                .flatten()
                .filter_map(|id| entry.records.get(id))
                .collect();
        }
        entry
            .order
            .iter()
            .filter_map(|id| entry.records.get(id))
            .filter(|record| record.get_str(field) == Some(value))
            .collect()
    }
}

// ============================================================================
// SECTION: Grouping
// ============================================================================

/// Groups records by the string value of `field`, keeping input order within
/// each group.
///
/// # Errors
///
/// Returns [`MissingField`] for the first record lacking `field`.
pub fn group_by<'a>(
    records: impl IntoIterator<Item = &'a ResourceRecord>,
    field: &str,
) -> Result<BTreeMap<String, Vec<&'a ResourceRecord>>, MissingField> {
    let mut groups: BTreeMap<String, Vec<&'a ResourceRecord>> = BTreeMap::new();
    for record in records {
        let key = record.require_str(field)?;
        groups.entry(key.to_string()).or_default().push(record);
    }
    Ok(groups)
}
