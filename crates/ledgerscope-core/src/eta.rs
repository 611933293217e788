//! Remaining-time estimation for backfill cursors.
//!
//! The estimator extrapolates wall-clock time to completion from how much
//! data-time the cursor has walked so far: `elapsed / processed_range`
//! gives wall-milliseconds per unit of data-time, multiplied by the range
//! still to walk. Throughput (records per second) is reported alongside.
//!
//! Edge cases are explicit: no elapsed time or no processed range means no
//! estimate at all; a non-positive remainder reports "almost done"; an
//! extrapolation past one year reports an unbounded sentinel instead of a
//! meaningless precise duration.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;

/// Extrapolations beyond this horizon are reported as [`Eta::MoreThanYear`].
const ONE_YEAR_MS: i64 = 365 * 24 * 60 * 60 * 1000;

/// Estimated remaining wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "remaining_ms", rename_all = "snake_case")]
pub enum Eta {
    /// The remaining range is zero or negative.
    AlmostDone,
    /// Extrapolation exceeds one year; treat as unbounded.
    MoreThanYear,
    /// A concrete remaining duration.
    Remaining(i64),
}

impl Eta {
    /// Remaining duration, when concrete.
    #[must_use]
    pub fn remaining(&self) -> Option<TimeDelta> {
        match self {
            Self::Remaining(ms) => Some(TimeDelta::milliseconds(*ms)),
            _ => None,
        }
    }
}

impl std::fmt::Display for Eta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlmostDone => f.write_str("almost done"),
            Self::MoreThanYear => f.write_str("more than a year"),
            Self::Remaining(ms) => f.write_str(&format_coarse(TimeDelta::milliseconds(*ms))),
        }
    }
}

/// ETA plus the observed ingestion rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtaEstimate {
    pub eta: Eta,
    /// Records ingested per wall-clock second, rounded.
    pub throughput_per_sec: u64,
}

/// Estimate remaining wall-clock time for a non-complete cursor.
///
/// Returns `None` when there is nothing to extrapolate from: a complete
/// cursor, no start time, no known range, non-positive elapsed time, or a
/// processed range of zero (no rate information yet).
#[must_use]
pub fn estimate(cursor: &Cursor, now: DateTime<Utc>) -> Option<EtaEstimate> {
    if cursor.complete {
        return None;
    }
    let started_at = cursor.started_at?;
    let elapsed = now - started_at;
    let elapsed_ms = elapsed.num_milliseconds();
    if elapsed_ms <= 0 {
        return None;
    }
    let processed_ms = cursor.range.processed()?.num_milliseconds();
    if processed_ms <= 0 {
        return None;
    }
    let remaining_ms = cursor.range.remaining()?.num_milliseconds();

    let ms_per_data_ms = elapsed_ms as f64 / processed_ms as f64;
    let estimated_ms = remaining_ms as f64 * ms_per_data_ms;

    let eta = if estimated_ms <= 0.0 {
        Eta::AlmostDone
    } else if estimated_ms > ONE_YEAR_MS as f64 {
        Eta::MoreThanYear
    } else {
        Eta::Remaining(estimated_ms as i64)
    };

    let elapsed_secs = elapsed_ms as f64 / 1000.0;
    let throughput_per_sec = (cursor.total_updates as f64 / elapsed_secs).round() as u64;

    Some(EtaEstimate {
        eta,
        throughput_per_sec,
    })
}

/// Coarse day/hour/minute rendering, omitting zero components.
///
/// Sub-minute durations render as `"under 1m"`.
#[must_use]
pub fn format_coarse(delta: TimeDelta) -> String {
    let total_minutes = delta.num_minutes().max(0);
    if total_minutes == 0 {
        return "under 1m".to_string();
    }
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes % (24 * 60)) / 60;
    let minutes = total_minutes % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::CursorRecord;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn backfilling(
        started_at: i64,
        min: i64,
        max: i64,
        last_before: i64,
        total_updates: u64,
    ) -> Cursor {
        Cursor::from(CursorRecord {
            id: "c".into(),
            started_at: Some(ts(started_at)),
            min_time: Some(ts(min)),
            max_time: Some(ts(max)),
            last_before: Some(ts(last_before)),
            total_updates,
            ..CursorRecord::default()
        })
    }

    // ── No-estimate cases ──────────────────────────────────────────

    #[test]
    fn no_estimate_for_complete_cursor() {
        let cursor = Cursor::from(CursorRecord {
            id: "c".into(),
            complete: true,
            started_at: Some(ts(0)),
            ..CursorRecord::default()
        });
        assert!(estimate(&cursor, ts(100)).is_none());
    }

    #[test]
    fn no_estimate_without_start_time() {
        let cursor = Cursor::from(CursorRecord {
            id: "c".into(),
            min_time: Some(ts(0)),
            max_time: Some(ts(100)),
            last_before: Some(ts(50)),
            ..CursorRecord::default()
        });
        assert!(estimate(&cursor, ts(100)).is_none());
    }

    #[test]
    fn no_estimate_for_non_positive_elapsed() {
        // started_at in the future (clock skew) yields nothing.
        let cursor = backfilling(1000, 0, 100, 50, 10);
        assert!(estimate(&cursor, ts(1000)).is_none());
        assert!(estimate(&cursor, ts(500)).is_none());
    }

    #[test]
    fn no_estimate_without_processed_range() {
        // last_before still at max_time: no rate information yet.
        let cursor = backfilling(0, 0, 100, 100, 10);
        assert!(estimate(&cursor, ts(60)).is_none());
    }

    #[test]
    fn no_estimate_for_unknown_range() {
        let cursor = Cursor::from(CursorRecord {
            id: "c".into(),
            started_at: Some(ts(0)),
            ..CursorRecord::default()
        });
        assert!(estimate(&cursor, ts(60)).is_none());
    }

    // ── Extrapolation ──────────────────────────────────────────────

    #[test]
    fn extrapolates_from_observed_rate() {
        // 1h elapsed walked 1h of data-time; 2h of data-time remain,
        // so 2h of wall-clock remain.
        let hour = 3600;
        let cursor = backfilling(0, 0, 3 * hour, 2 * hour, 0);
        let est = estimate(&cursor, ts(hour)).unwrap();
        assert_eq!(est.eta.remaining(), Some(TimeDelta::hours(2)));
    }

    #[test]
    fn slow_walker_scales_up() {
        // 2h elapsed walked only 1h of data-time: the remaining 1h of
        // data-time costs 2h of wall-clock.
        let hour = 3600;
        let cursor = backfilling(0, 0, 2 * hour, hour, 0);
        let est = estimate(&cursor, ts(2 * hour)).unwrap();
        assert_eq!(est.eta.remaining(), Some(TimeDelta::hours(2)));
    }

    #[test]
    fn almost_done_when_position_at_min() {
        let cursor = backfilling(0, 0, 100, 0, 10);
        let est = estimate(&cursor, ts(60)).unwrap();
        assert_eq!(est.eta, Eta::AlmostDone);
    }

    #[test]
    fn almost_done_when_position_overshoots_min() {
        let cursor = backfilling(0, 50, 100, 40, 10);
        let est = estimate(&cursor, ts(60)).unwrap();
        assert_eq!(est.eta, Eta::AlmostDone);
    }

    #[test]
    fn over_a_year_reports_sentinel() {
        // 1h elapsed walked one second of data-time; two years of
        // data-time remain.
        let two_years = 2 * 365 * 24 * 3600;
        let cursor = backfilling(0, 0, two_years, two_years - 1, 10);
        let est = estimate(&cursor, ts(3600)).unwrap();
        assert_eq!(est.eta, Eta::MoreThanYear);
    }

    // ── Throughput ─────────────────────────────────────────────────

    #[test]
    fn throughput_is_records_per_elapsed_second() {
        let cursor = backfilling(0, 0, 100, 50, 600);
        let est = estimate(&cursor, ts(60)).unwrap();
        assert_eq!(est.throughput_per_sec, 10);
    }

    #[test]
    fn throughput_rounds() {
        let cursor = backfilling(0, 0, 100, 50, 25);
        // 25 records over 10s -> 2.5 -> rounds to 3 (round half up).
        let est = estimate(&cursor, ts(10)).unwrap();
        assert_eq!(est.throughput_per_sec, 3);
    }

    // ── Formatting ─────────────────────────────────────────────────

    #[test]
    fn format_omits_zero_components() {
        assert_eq!(format_coarse(TimeDelta::minutes(5)), "5m");
        assert_eq!(format_coarse(TimeDelta::hours(2)), "2h");
        assert_eq!(
            format_coarse(TimeDelta::days(1) + TimeDelta::minutes(30)),
            "1d 30m"
        );
        assert_eq!(
            format_coarse(TimeDelta::days(2) + TimeDelta::hours(5) + TimeDelta::minutes(30)),
            "2d 5h 30m"
        );
    }

    #[test]
    fn format_sub_minute() {
        assert_eq!(format_coarse(TimeDelta::seconds(40)), "under 1m");
        assert_eq!(format_coarse(TimeDelta::zero()), "under 1m");
    }

    #[test]
    fn eta_display() {
        assert_eq!(Eta::AlmostDone.to_string(), "almost done");
        assert_eq!(Eta::MoreThanYear.to_string(), "more than a year");
        assert_eq!(
            Eta::Remaining(TimeDelta::hours(3).num_milliseconds()).to_string(),
            "3h"
        );
    }
}
