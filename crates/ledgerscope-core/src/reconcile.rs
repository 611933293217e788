//! Live/backfill reconciliation.
//!
//! The live-tailing process is expected to continue forward from wherever
//! the most advanced backfill cursor stopped. If backfill has since closed
//! a newer migration, or advanced past the live position within the same
//! migration, the live process has silently fallen behind. The reconciler
//! only computes that verdict and the migration to resume from; the
//! corrective action (purging the live cursor so the process restarts from
//! the right position) is a request to the data source, surfaced in the UI.

use serde::{Deserialize, Serialize};

use crate::cursor::{Cursor, LiveCursor, TimeRange};

/// Verdict of comparing the live cursor against backfill progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Reconciliation {
    /// No live cursor or no backfill cursor to compare against.
    #[default]
    NoData,
    /// The live cursor is at or ahead of the latest backfill position.
    InSync,
    /// The live cursor has fallen behind; purge it so the live process
    /// restarts from `resume_migration`.
    LiveBehind { resume_migration: u32 },
}

impl Reconciliation {
    /// Whether the live process needs correction.
    #[must_use]
    pub fn is_behind(&self) -> bool {
        matches!(self, Self::LiveBehind { .. })
    }
}

/// The most advanced backfill cursor: highest numbered epoch, ties broken
/// by the most recent `max_time`. Cursors without a numbered epoch are
/// ineligible.
#[must_use]
pub fn latest_backfill(cursors: &[Cursor]) -> Option<&Cursor> {
    cursors
        .iter()
        .filter(|c| c.epoch.is_specified())
        .max_by_key(|c| {
            let max_time = match c.range {
                TimeRange::Known { max, .. } => Some(max),
                TimeRange::Unknown => None,
            };
            (c.epoch.number(), max_time)
        })
}

/// Compare the live cursor against the latest backfill cursor.
#[must_use]
pub fn reconcile(live: Option<&LiveCursor>, cursors: &[Cursor]) -> Reconciliation {
    let Some(live) = live else {
        return Reconciliation::NoData;
    };
    let Some(latest) = latest_backfill(cursors) else {
        return Reconciliation::NoData;
    };
    // Eligibility filter guarantees a numbered epoch here.
    let Some(latest_epoch) = latest.epoch.number() else {
        return Reconciliation::NoData;
    };

    if latest_epoch > live.migration_id {
        return Reconciliation::LiveBehind {
            resume_migration: latest_epoch,
        };
    }
    if latest_epoch == live.migration_id {
        if let TimeRange::Known { max, .. } = latest.range {
            if max > live.record_time {
                return Reconciliation::LiveBehind {
                    resume_migration: latest_epoch,
                };
            }
        }
    }
    Reconciliation::InSync
}
