// crates/nmos-testing-core/src/timing.rs
// ============================================================================
// Module: TAI Timestamps
// Description: `<secs>:<nanos>` TAI timestamps and the clock seam.
// Purpose: Stamp health commands and order health replies.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Health commands carry a TAI timestamp and replies echo it back alongside
//! their own creation time. [`TaiTimestamp`] orders by seconds then
//! nanoseconds. [`SystemClock`] derives TAI from the system UTC clock using
//! the current fixed TAI-UTC offset; leap-second history is not modelled.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// TAI minus UTC in seconds, in force since 2017-01-01.
pub const TAI_UTC_OFFSET_SECS: u64 = 37;

/// Nanoseconds per second.
const NANOS_PER_SEC: u32 = 1_000_000_000;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// TAI timestamp rendered as `<secs>:<nanos>`.
///
/// # Invariants
/// - `nanos < 1_000_000_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaiTimestamp {
    /// Whole seconds since the TAI epoch.
    secs: u64,
    /// Sub-second nanoseconds.
    nanos: u32,
}

impl TaiTimestamp {
    /// Builds a timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::NanosOutOfRange`] when `nanos` is not below
    /// one second.
    pub const fn new(secs: u64, nanos: u32) -> Result<Self, TimestampError> {
        if nanos >= NANOS_PER_SEC {
            return Err(TimestampError::NanosOutOfRange(nanos));
        }
        Ok(Self {
            secs,
            nanos,
        })
    }

    /// Returns the seconds component.
    #[must_use]
    pub const fn secs(self) -> u64 {
        self.secs
    }

    /// Returns the nanoseconds component.
    #[must_use]
    pub const fn nanos(self) -> u32 {
        self.nanos
    }
}

impl fmt::Display for TaiTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.secs, self.nanos)
    }
}

impl FromStr for TaiTimestamp {
    type Err = TimestampError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (secs, nanos) = value
            .trim()
            .split_once(':')
            .ok_or_else(|| TimestampError::Malformed(value.to_string()))?;
        let secs = secs.parse::<u64>().map_err(|_| TimestampError::Malformed(value.to_string()))?;
        let nanos =
            nanos.parse::<u32>().map_err(|_| TimestampError::Malformed(value.to_string()))?;
        Self::new(secs, nanos)
    }
}

/// Timestamp parse failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimestampError {
    /// Not in `<secs>:<nanos>` form.
    #[error("malformed TAI timestamp: {0}")]
    Malformed(String),
    /// Nanoseconds component not below one second.
    #[error("nanoseconds out of range: {0}")]
    NanosOutOfRange(u32),
}

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Source of the current TAI time.
pub trait Clock: Send + Sync {
    /// Returns the current TAI time.
    fn tai_now(&self) -> TaiTimestamp;
}

/// Clock backed by the system UTC clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn tai_now(&self) -> TaiTimestamp {
        let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        TaiTimestamp {
            secs: since_epoch.as_secs().saturating_add(TAI_UTC_OFFSET_SECS),
            nanos: since_epoch.subsec_nanos(),
        }
    }
}
