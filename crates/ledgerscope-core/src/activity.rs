//! Write-activity detection across independent signals.
//!
//! No single signal reliably answers "is the ingestion pipeline actively
//! writing right now": aggregate counters can plateau between polls while
//! buffers are non-empty, and buffers can be empty between bursts while a
//! worker is still running. The detector is therefore a logical OR over
//! complementary heuristics, deliberately weighted toward false positives
//! (showing "still writing" a little longer beats falsely declaring
//! completion):
//!
//! 1. any cursor has staged-but-unflushed work;
//! 2. the aggregate counters advanced between the two most recent polls;
//! 3. the external write-activity probe reports true;
//! 4. a non-complete cursor was updated within the recency window.
//!
//! Signal 2 is edge-triggered: it latches when a stats poll shows an
//! increase over the previous poll, is consumed by the next assessment, and
//! must be re-armed by a subsequent poll pair.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;
use crate::source::{AggregateStats, WriteActivity};

/// One contributing reason the pipeline is considered active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySignal {
    /// A cursor has pending writes or buffered records.
    PendingBuffers,
    /// Aggregate counters increased between consecutive polls.
    CounterAdvance,
    /// The external write-activity probe reports writing.
    WriteProbe,
    /// A non-complete cursor was updated within the recency window.
    RecentUpdate,
}

impl std::fmt::Display for ActivitySignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PendingBuffers => "pending buffers",
            Self::CounterAdvance => "counter advance",
            Self::WriteProbe => "write probe",
            Self::RecentUpdate => "recent update",
        };
        f.write_str(name)
    }
}

/// Verdict of one assessment pass, with the signals that fired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityReport {
    /// True if any signal fired.
    pub active: bool,
    /// The signals that fired, in fixed order.
    pub signals: Vec<ActivitySignal>,
}

/// Stateful detector. The only state it carries is what signal 2 needs:
/// the previous poll's counter totals and the latched advance flag.
#[derive(Debug, Clone)]
pub struct ActivityDetector {
    recency_window: TimeDelta,
    previous_totals: Option<(u64, u64)>,
    counter_advanced: bool,
}

impl ActivityDetector {
    /// Create a detector with the given update-recency window.
    #[must_use]
    pub fn new(recency_window: TimeDelta) -> Self {
        Self {
            recency_window,
            previous_totals: None,
            counter_advanced: false,
        }
    }

    /// Feed one aggregate-stats poll. Latches the counter-advance signal
    /// when totals increased since the previous poll; the first poll only
    /// establishes the baseline.
    pub fn observe_stats(&mut self, stats: &AggregateStats) {
        let totals = (stats.total_updates, stats.total_events);
        if let Some((prev_updates, prev_events)) = self.previous_totals {
            if totals.0 > prev_updates || totals.1 > prev_events {
                self.counter_advanced = true;
            }
        }
        self.previous_totals = Some(totals);
    }

    /// Assess activity for the current merged cursor view.
    ///
    /// Consumes the latched counter-advance signal: after this call the
    /// signal is false until the next poll pair shows an increase.
    pub fn assess(
        &mut self,
        cursors: &[Cursor],
        probe: Option<&WriteActivity>,
        now: DateTime<Utc>,
    ) -> ActivityReport {
        let mut signals = Vec::new();

        if cursors.iter().any(Cursor::has_pending_work) {
            signals.push(ActivitySignal::PendingBuffers);
        }
        if std::mem::take(&mut self.counter_advanced) {
            signals.push(ActivitySignal::CounterAdvance);
        }
        if probe.is_some_and(|p| p.is_writing) {
            signals.push(ActivitySignal::WriteProbe);
        }
        if cursors.iter().any(|c| self.recently_updated(c, now)) {
            signals.push(ActivitySignal::RecentUpdate);
        }

        ActivityReport {
            active: !signals.is_empty(),
            signals,
        }
    }

    fn recently_updated(&self, cursor: &Cursor, now: DateTime<Utc>) -> bool {
        if cursor.complete {
            return false;
        }
        cursor
            .updated_at
            .is_some_and(|updated| now - updated <= self.recency_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::CursorRecord;
    use chrono::TimeZone;

    fn detector() -> ActivityDetector {
        ActivityDetector::new(TimeDelta::minutes(5))
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn stats(updates: u64, events: u64) -> AggregateStats {
        AggregateStats {
            total_updates: updates,
            total_events: events,
            ..AggregateStats::default()
        }
    }

    fn idle_cursor(id: &str) -> Cursor {
        Cursor::from(CursorRecord {
            id: id.into(),
            ..CursorRecord::default()
        })
    }

    // ── Signal 1: pending buffers ──────────────────────────────────

    #[test]
    fn pending_writes_mark_active() {
        let cursor = Cursor::from(CursorRecord {
            id: "c".into(),
            pending_writes: 2,
            ..CursorRecord::default()
        });
        let report = detector().assess(&[cursor], None, ts(0));
        assert!(report.active);
        assert_eq!(report.signals, vec![ActivitySignal::PendingBuffers]);
    }

    #[test]
    fn buffered_records_mark_active() {
        let cursor = Cursor::from(CursorRecord {
            id: "c".into(),
            buffered_records: 1,
            ..CursorRecord::default()
        });
        assert!(detector().assess(&[cursor], None, ts(0)).active);
    }

    // ── Signal 2: counter advance ──────────────────────────────────

    #[test]
    fn first_stats_poll_only_arms_baseline() {
        let mut d = detector();
        d.observe_stats(&stats(100, 50));
        let report = d.assess(&[], None, ts(0));
        assert!(!report.active);
    }

    #[test]
    fn counter_increase_between_polls_fires_once() {
        let mut d = detector();
        d.observe_stats(&stats(100, 50));
        d.observe_stats(&stats(120, 50));
        let report = d.assess(&[], None, ts(0));
        assert_eq!(report.signals, vec![ActivitySignal::CounterAdvance]);

        // Consumed: silent until re-armed by another increasing pair.
        assert!(!d.assess(&[], None, ts(0)).active);
    }

    #[test]
    fn event_counter_alone_triggers_advance() {
        let mut d = detector();
        d.observe_stats(&stats(100, 50));
        d.observe_stats(&stats(100, 51));
        assert!(d.assess(&[], None, ts(0)).active);
    }

    #[test]
    fn plateaued_counters_do_not_fire() {
        let mut d = detector();
        d.observe_stats(&stats(100, 50));
        d.observe_stats(&stats(100, 50));
        assert!(!d.assess(&[], None, ts(0)).active);
    }

    #[test]
    fn advance_rearmed_by_next_increasing_pair() {
        let mut d = detector();
        d.observe_stats(&stats(100, 50));
        d.observe_stats(&stats(110, 50));
        assert!(d.assess(&[], None, ts(0)).active);
        assert!(!d.assess(&[], None, ts(0)).active);
        d.observe_stats(&stats(115, 50));
        assert!(d.assess(&[], None, ts(0)).active);
    }

    #[test]
    fn latched_advance_survives_until_assessed() {
        // An increase followed by a plateau still reports once.
        let mut d = detector();
        d.observe_stats(&stats(100, 50));
        d.observe_stats(&stats(110, 50));
        d.observe_stats(&stats(110, 50));
        assert!(d.assess(&[], None, ts(0)).active);
    }

    // ── Signal 3: write probe ──────────────────────────────────────

    #[test]
    fn probe_writing_marks_active() {
        let probe = WriteActivity {
            is_writing: true,
            ..WriteActivity::default()
        };
        let report = detector().assess(&[], Some(&probe), ts(0));
        assert_eq!(report.signals, vec![ActivitySignal::WriteProbe]);
    }

    #[test]
    fn probe_idle_or_absent_is_silent() {
        let probe = WriteActivity::default();
        assert!(!detector().assess(&[], Some(&probe), ts(0)).active);
        assert!(!detector().assess(&[], None, ts(0)).active);
    }

    // ── Signal 4: recent update ────────────────────────────────────

    #[test]
    fn recent_update_within_window_marks_active() {
        let cursor = Cursor::from(CursorRecord {
            id: "c".into(),
            updated_at: Some(ts(900)),
            ..CursorRecord::default()
        });
        let report = detector().assess(&[cursor], None, ts(1000));
        assert_eq!(report.signals, vec![ActivitySignal::RecentUpdate]);
    }

    #[test]
    fn stale_update_outside_window_is_silent() {
        let cursor = Cursor::from(CursorRecord {
            id: "c".into(),
            updated_at: Some(ts(0)),
            ..CursorRecord::default()
        });
        assert!(!detector().assess(&[cursor], None, ts(1000)).active);
    }

    #[test]
    fn complete_cursor_recency_ignored() {
        let cursor = Cursor::from(CursorRecord {
            id: "c".into(),
            complete: true,
            updated_at: Some(ts(999)),
            ..CursorRecord::default()
        });
        assert!(!detector().assess(&[cursor], None, ts(1000)).active);
    }

    #[test]
    fn window_is_configurable() {
        let cursor = Cursor::from(CursorRecord {
            id: "c".into(),
            updated_at: Some(ts(0)),
            ..CursorRecord::default()
        });
        let mut wide = ActivityDetector::new(TimeDelta::hours(1));
        assert!(wide.assess(std::slice::from_ref(&cursor), None, ts(1000)).active);
        let mut narrow = ActivityDetector::new(TimeDelta::seconds(10));
        assert!(!narrow.assess(&[cursor], None, ts(1000)).active);
    }

    // ── Combination ────────────────────────────────────────────────

    #[test]
    fn multiple_signals_reported_together() {
        let mut d = detector();
        d.observe_stats(&stats(1, 1));
        d.observe_stats(&stats(2, 1));
        let cursor = Cursor::from(CursorRecord {
            id: "c".into(),
            pending_writes: 1,
            updated_at: Some(ts(995)),
            ..CursorRecord::default()
        });
        let probe = WriteActivity {
            is_writing: true,
            ..WriteActivity::default()
        };
        let report = d.assess(&[cursor], Some(&probe), ts(1000));
        assert!(report.active);
        assert_eq!(
            report.signals,
            vec![
                ActivitySignal::PendingBuffers,
                ActivitySignal::CounterAdvance,
                ActivitySignal::WriteProbe,
                ActivitySignal::RecentUpdate,
            ]
        );
    }

    #[test]
    fn idle_everything_is_inactive() {
        let report = detector().assess(&[idle_cursor("a"), idle_cursor("b")], None, ts(0));
        assert!(!report.active);
        assert!(report.signals.is_empty());
    }
}
