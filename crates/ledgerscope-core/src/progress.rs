//! Progress calculation for backward-walking backfill cursors.
//!
//! Backfill progresses from `max_time` toward `min_time`, so the walked
//! fraction is `(max - last_before) / (max - min)`. Two clamps keep the
//! display honest:
//!
//! - a cursor never reports 100% before `complete` is explicitly set, since
//!   `last_before` can reach `min_time` before the worker finalizes;
//! - a complete cursor with outstanding buffered writes reports 99.9%
//!   (the finalizing state), never 100%.

use crate::cursor::{Cursor, TimeRange};

/// Displayed ceiling while work is still outstanding.
pub const FINALIZING_PROGRESS: f64 = 99.9;

/// Percentage in `[0, 100]` for one cursor, or `None` when the cursor
/// carries no progress information (neither `complete` nor a known range).
///
/// `None` cursors are excluded from aggregate denominators rather than
/// counted as zero.
#[must_use]
pub fn cursor_progress(cursor: &Cursor) -> Option<f64> {
    if cursor.complete {
        return Some(if cursor.has_pending_work() {
            FINALIZING_PROGRESS
        } else {
            100.0
        });
    }
    match cursor.range {
        TimeRange::Known {
            min,
            max,
            last_before,
        } => {
            let total_ms = (max - min).num_milliseconds();
            if total_ms > 0 {
                let walked_ms = (max - last_before).num_milliseconds();
                let pct = (walked_ms as f64 / total_ms as f64 * 100.0).clamp(0.0, 100.0);
                // last_before reaching min does not mean finalized.
                Some(pct.min(FINALIZING_PROGRESS))
            } else {
                // Zero-width range with no completion flag: no rate
                // information to claim anything more than 0.
                Some(0.0)
            }
        }
        TimeRange::Unknown => None,
    }
}

/// Arithmetic mean of per-cursor percentages across all cursors that
/// contribute progress information.
///
/// While `writing` is true (the activity detector still sees outstanding
/// work), the displayed aggregate is clamped to 99.9 even if the computed
/// mean rounds to 100, to avoid a flickering false-completion signal during
/// the final write-flush window.
#[must_use]
pub fn aggregate_progress(cursors: &[Cursor], writing: bool) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0u32;
    for cursor in cursors {
        if let Some(pct) = cursor_progress(cursor) {
            sum += pct;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    let mean = sum / f64::from(count);
    Some(if writing {
        mean.min(FINALIZING_PROGRESS)
    } else {
        mean
    })
}
