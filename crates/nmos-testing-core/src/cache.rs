// crates/nmos-testing-core/src/cache.rs
// ============================================================================
// Module: Identifier Cache
// Description: Run-scoped store of identifiers harvested from list responses.
// Purpose: Feed parameterized paths with ids the implementation exposed.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! The cache maps a collection path to the identifiers harvested from
//! responses to that path, in the order they were seen. Entries only grow:
//! later discoveries are appended and never overwrite earlier ones, and no
//! deduplication happens inside a run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Value;

// ============================================================================
// SECTION: Cache
// ============================================================================

/// Collection path to harvested identifiers.
///
/// # Invariants
/// - Keys are normalized with [`normalize_collection_key`].
/// - No key maps to an empty sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierCache {
    /// Harvested identifiers per collection path.
    entries: BTreeMap<String, Vec<String>>,
}

impl IdentifierCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends identifiers for a collection path and returns how many were
    /// added. Nothing is recorded when `ids` is empty.
    pub fn append(&mut self, collection: &str, ids: impl IntoIterator<Item = String>) -> usize {
        let ids: Vec<String> = ids.into_iter().collect();
        let added = ids.len();
        if added > 0 {
            self.entries.entry(normalize_collection_key(collection)).or_default().extend(ids);
        }
        added
    }

    /// Returns the identifiers harvested for a collection path.
    #[must_use]
    pub fn get(&self, collection: &str) -> Option<&[String]> {
        self.entries.get(&normalize_collection_key(collection)).map(Vec::as_slice)
    }

    /// Returns the first identifier harvested for a collection path.
    #[must_use]
    pub fn first(&self, collection: &str) -> Option<&str> {
        self.get(collection).and_then(<[String]>::first).map(String::as_str)
    }

    /// Returns true when the identifier was harvested for the collection.
    #[must_use]
    pub fn contains(&self, collection: &str, id: &str) -> bool {
        self.get(collection).is_some_and(|ids| ids.iter().any(|known| known == id))
    }

    /// Returns the number of collection paths with harvested identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing has been harvested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over collection paths and their identifiers.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(path, ids)| (path.as_str(), ids.as_slice()))
    }
}

// ============================================================================
// SECTION: Harvesting
// ============================================================================

/// Normalizes a collection path key by dropping trailing separators.
#[must_use]
pub fn normalize_collection_key(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() }
}

/// Extracts sub-resource identifiers from a list response body.
///
/// Object entries contribute their string `id`; string entries ending in `/`
/// contribute the string without its trailing separators. Anything else,
/// including non-array bodies, contributes nothing.
#[must_use]
pub fn harvest_identifiers(body: &Value) -> Vec<String> {
    let Value::Array(entries) = body else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::Object(map) => map.get("id").and_then(Value::as_str).map(str::to_string),
            Value::String(path) if path.ends_with('/') => {
                let id = path.trim_end_matches('/');
                (!id.is_empty()).then(|| id.to_string())
            }
            _ => None,
        })
        .collect()
}
