//! Cursor data model for the ingestion pipeline.
//!
//! A [`Cursor`] is one ingestion position for one synchronizer shard within
//! one migration epoch. Backfill walks historical ledger data backward in
//! time: `last_before` starts at the newest timestamp of the range and
//! decreases toward the oldest. Cursors are immutable value snapshots; only
//! the id identifies continuity across observations.
//!
//! # Redesigned optionality
//!
//! The upstream status endpoint delivers cursors with several independently
//! optional fields. Rather than chaining `Option` fallbacks at every call
//! site, the wire form ([`CursorRecord`]) is converted once into a domain
//! form with two tagged variants:
//!
//! - [`TimeRange`]: either all three range timestamps are present
//!   (`Known`) or the cursor carries no progress information (`Unknown`).
//! - [`MigrationEpoch`]: a missing `migration_id` is an explicit
//!   `Unspecified` state, never conflated with a real epoch 0.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// MigrationEpoch
// =============================================================================

/// Migration epoch identifier for a cursor.
///
/// Epochs are numbered ledger-protocol version boundaries; ingestion is
/// partitioned by them. A cursor observed without a `migration_id` is
/// `Unspecified`, which sorts after every numbered epoch and is never
/// eligible to be the active migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<u32>", into = "Option<u32>")]
pub enum MigrationEpoch {
    /// A numbered epoch. Zero is a legitimate epoch, not a sentinel.
    Epoch(u32),
    /// The cursor was observed without a migration id.
    Unspecified,
}

impl MigrationEpoch {
    /// Numeric epoch, if one was specified.
    #[must_use]
    pub fn number(self) -> Option<u32> {
        match self {
            Self::Epoch(n) => Some(n),
            Self::Unspecified => None,
        }
    }

    /// Whether a numeric epoch was specified.
    #[must_use]
    pub fn is_specified(self) -> bool {
        matches!(self, Self::Epoch(_))
    }
}

impl From<Option<u32>> for MigrationEpoch {
    fn from(value: Option<u32>) -> Self {
        value.map_or(Self::Unspecified, Self::Epoch)
    }
}

impl From<MigrationEpoch> for Option<u32> {
    fn from(value: MigrationEpoch) -> Self {
        value.number()
    }
}

impl PartialOrd for MigrationEpoch {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MigrationEpoch {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering;
        match (self, other) {
            (Self::Epoch(a), Self::Epoch(b)) => a.cmp(b),
            (Self::Epoch(_), Self::Unspecified) => Ordering::Less,
            (Self::Unspecified, Self::Epoch(_)) => Ordering::Greater,
            (Self::Unspecified, Self::Unspecified) => Ordering::Equal,
        }
    }
}

impl std::fmt::Display for MigrationEpoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Epoch(n) => write!(f, "migration {n}"),
            Self::Unspecified => write!(f, "migration (unspecified)"),
        }
    }
}

// =============================================================================
// TimeRange
// =============================================================================

/// The backfill time-range position of a cursor.
///
/// `Known` requires all three timestamps; a cursor missing any of them
/// yields `Unknown` ("no progress information", not an error) and is
/// excluded from aggregate denominators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeRange {
    /// Full range with the current backward position.
    Known {
        /// Oldest timestamp backfill must reach.
        min: DateTime<Utc>,
        /// Newest timestamp backfill started from.
        max: DateTime<Utc>,
        /// Current backward position; starts at `max`, decreases toward `min`.
        last_before: DateTime<Utc>,
    },
    /// One or more of the range timestamps is missing.
    Unknown,
}

impl TimeRange {
    /// Build a range from independently optional wire fields.
    #[must_use]
    pub fn from_parts(
        min: Option<DateTime<Utc>>,
        max: Option<DateTime<Utc>>,
        last_before: Option<DateTime<Utc>>,
    ) -> Self {
        match (min, max, last_before) {
            (Some(min), Some(max), Some(last_before)) => Self::Known {
                min,
                max,
                last_before,
            },
            _ => Self::Unknown,
        }
    }

    /// Whether the full range is known.
    #[must_use]
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known { .. })
    }

    /// Total span (`max - min`), if known.
    #[must_use]
    pub fn span(&self) -> Option<TimeDelta> {
        match self {
            Self::Known { min, max, .. } => Some(*max - *min),
            Self::Unknown => None,
        }
    }

    /// Time-range already walked (`max - last_before`), if known.
    #[must_use]
    pub fn processed(&self) -> Option<TimeDelta> {
        match self {
            Self::Known {
                max, last_before, ..
            } => Some(*max - *last_before),
            Self::Unknown => None,
        }
    }

    /// Time-range still to walk (`last_before - min`), if known.
    #[must_use]
    pub fn remaining(&self) -> Option<TimeDelta> {
        match self {
            Self::Known {
                min, last_before, ..
            } => Some(*last_before - *min),
            Self::Unknown => None,
        }
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// One ingestion position for one shard within one migration epoch.
///
/// Invariants observed upstream (checked by [`Cursor::range_invariant_holds`]
/// in tests, tolerated defensively elsewhere):
///
/// - While `complete` is false and the range is known,
///   `min <= last_before <= max`.
/// - `total_updates` / `total_events` never decrease across observations of
///   the same id.
/// - `complete` with outstanding `pending_writes` is the *finalizing* state,
///   not a contradiction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    /// Stable unique identifier; the only continuity key across snapshots.
    pub id: String,
    /// Human label for the shard/synchronizer.
    pub name: String,
    /// Epoch this cursor belongs to.
    pub epoch: MigrationEpoch,
    /// Backfill time-range position.
    pub range: TimeRange,
    /// True once the range is fully walked and the worker has finalized.
    pub complete: bool,
    /// Monotonically non-decreasing count of ingested updates.
    pub total_updates: u64,
    /// Monotonically non-decreasing count of ingested events.
    pub total_events: u64,
    /// Writes staged but not yet durably flushed.
    pub pending_writes: u64,
    /// Records buffered ahead of the write path.
    pub buffered_records: u64,
    /// When the worker started on this cursor.
    pub started_at: Option<DateTime<Utc>>,
    /// When this snapshot was produced.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Cursor {
    /// Whether any staged-but-unflushed work is outstanding.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        self.pending_writes > 0 || self.buffered_records > 0
    }

    /// Whether this cursor is in the finalizing state: range fully walked
    /// and marked complete, but buffered writes not yet flushed.
    #[must_use]
    pub fn is_finalizing(&self) -> bool {
        self.complete && self.has_pending_work()
    }

    /// `min <= last_before <= max` whenever the range is known and the
    /// cursor is not complete.
    #[must_use]
    pub fn range_invariant_holds(&self) -> bool {
        match self.range {
            TimeRange::Known {
                min,
                max,
                last_before,
            } if !self.complete => min <= last_before && last_before <= max,
            _ => true,
        }
    }
}

// =============================================================================
// CursorRecord (wire form)
// =============================================================================

/// Cursor as delivered by the status endpoint, with every underlying field
/// independently optional. Converted losslessly into [`Cursor`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorRecord {
    pub id: String,
    pub cursor_name: Option<String>,
    pub migration_id: Option<u32>,
    pub min_time: Option<DateTime<Utc>>,
    pub max_time: Option<DateTime<Utc>>,
    pub last_before: Option<DateTime<Utc>>,
    pub complete: bool,
    pub total_updates: u64,
    pub total_events: u64,
    pub pending_writes: u64,
    pub buffered_records: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<CursorRecord> for Cursor {
    fn from(record: CursorRecord) -> Self {
        Self {
            name: record.cursor_name.unwrap_or_else(|| record.id.clone()),
            id: record.id,
            epoch: MigrationEpoch::from(record.migration_id),
            range: TimeRange::from_parts(record.min_time, record.max_time, record.last_before),
            complete: record.complete,
            total_updates: record.total_updates,
            total_events: record.total_events,
            pending_writes: record.pending_writes,
            buffered_records: record.buffered_records,
            started_at: record.started_at,
            updated_at: record.updated_at,
        }
    }
}

// =============================================================================
// LiveCursor
// =============================================================================

/// The single forward-tailing ingestion position once backfill has caught
/// up. At most one exists per process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveCursor {
    /// Epoch the live process is currently ingesting.
    pub migration_id: u32,
    /// Current forward position.
    pub record_time: DateTime<Utc>,
    /// Ingestion mode reported by the live process.
    pub mode: String,
    /// When the live cursor last advanced.
    pub updated_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Tests
// =============================================================================
