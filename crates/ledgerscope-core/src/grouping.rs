//! Migration grouping and rollup status derivation.
//!
//! Cursors are partitioned by migration epoch and each group is rolled up
//! into one of four statuses, forming a monotonic per-migration state
//! machine (`Waiting → Active → Finalizing → Complete`, no back-transitions
//! under normal operation):
//!
//! - `Complete`: every cursor complete, no outstanding buffered work;
//! - `Finalizing`: every cursor complete but buffered writes not yet
//!   flushed — a migration is never reported complete ahead of its buffers;
//! - `Active`: the group currently being worked;
//! - `Waiting`: scheduled behind the active group.
//!
//! The *current* migration is the lowest-numbered epoch with a non-complete
//! cursor; when every group is complete but the activity detector still
//! sees writes, it is the highest-numbered epoch (the finalizing tail after
//! the last range closes). Cursors with an unspecified epoch group
//! separately, sort last, and are never selected as current.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cursor::{Cursor, MigrationEpoch};
use crate::progress::aggregate_progress;

/// Rollup status of one migration epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Waiting,
    Active,
    Finalizing,
    Complete,
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Finalizing => "finalizing",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// One migration epoch's cursors with derived rollups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationGroup {
    pub epoch: MigrationEpoch,
    pub cursors: Vec<Cursor>,
    /// Every cursor in the group is complete.
    pub all_complete: bool,
    /// Any cursor has pending writes or buffered records.
    pub has_pending_work: bool,
    pub status: MigrationStatus,
    /// Mean progress over the group's contributing cursors.
    pub progress: Option<f64>,
}

/// The migration currently being worked, per the selection rule above.
#[must_use]
pub fn current_migration(cursors: &[Cursor], writing: bool) -> Option<MigrationEpoch> {
    let mut lowest_incomplete: Option<u32> = None;
    let mut highest: Option<u32> = None;
    for cursor in cursors {
        let Some(n) = cursor.epoch.number() else {
            continue;
        };
        highest = Some(highest.map_or(n, |h| h.max(n)));
        if !cursor.complete {
            lowest_incomplete = Some(lowest_incomplete.map_or(n, |l| l.min(n)));
        }
    }
    if let Some(n) = lowest_incomplete {
        return Some(MigrationEpoch::Epoch(n));
    }
    // All numbered epochs complete: while writes are still observed, the
    // highest epoch is the finalizing tail.
    if writing {
        return highest.map(MigrationEpoch::Epoch);
    }
    None
}

/// Partition cursors by epoch and derive rollup statuses.
///
/// Groups are returned in ascending epoch order, unspecified last. `writing`
/// is the global activity verdict, used only for current-migration
/// selection.
#[must_use]
pub fn group_cursors(cursors: &[Cursor], writing: bool) -> Vec<MigrationGroup> {
    let current = current_migration(cursors, writing);

    let mut by_epoch: BTreeMap<MigrationEpoch, Vec<Cursor>> = BTreeMap::new();
    for cursor in cursors {
        by_epoch.entry(cursor.epoch).or_default().push(cursor.clone());
    }

    by_epoch
        .into_iter()
        .map(|(epoch, cursors)| {
            let all_complete = cursors.iter().all(|c| c.complete);
            let has_pending_work = cursors.iter().any(Cursor::has_pending_work);
            let status = if all_complete && !has_pending_work {
                MigrationStatus::Complete
            } else if all_complete {
                MigrationStatus::Finalizing
            } else if epoch.is_specified() && Some(epoch) == current {
                MigrationStatus::Active
            } else {
                MigrationStatus::Waiting
            };
            let progress = aggregate_progress(&cursors, false);
            MigrationGroup {
                epoch,
                cursors,
                all_complete,
                has_pending_work,
                status,
                progress,
            }
        })
        .collect()
}
