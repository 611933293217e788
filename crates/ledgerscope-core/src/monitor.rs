//! The monitoring engine: polls, push subscription, and recomputation.
//!
//! All calculators are pure functions over the merged cursor state; the
//! monitor owns that state behind a single async mutex and recomputes a
//! full [`MonitorSnapshot`] whenever any input changes (a poll lands, a
//! pushed change arrives), publishing it through a `watch` channel. There
//! is exactly one writer of derived state per recomputation pass and no
//! further locking.
//!
//! Failure handling follows the dashboard's degradation rule: a failed
//! poll keeps the last good value, marks the feed stale in
//! [`SourceHealth`], and lets the scheduler back off — nothing here is
//! fatal. The two purge operations are user-initiated, fire-and-forget
//! requests with their own success/failure handling; they do not serialize
//! against the poll loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::activity::{ActivityDetector, ActivityReport};
use crate::config::MonitorConfig;
use crate::cursor::{Cursor, MigrationEpoch};
use crate::error::{Error, Result, SourceError};
use crate::eta::{EtaEstimate, estimate};
use crate::grouping::{MigrationGroup, current_migration, group_cursors};
use crate::merge::MergeEngine;
use crate::progress::aggregate_progress;
use crate::reconcile::{Reconciliation, reconcile};
use crate::scheduler::{PollCadence, PollScheduler};
use crate::source::{
    AggregateStats, IngestSource, LiveStatus, PurgeLiveOutcome, PurgeSummary, WriteActivity,
};

// =============================================================================
// Feed health
// =============================================================================

/// Fetch state of one polled feed. A failure retains the previous value
/// and is shown as a stale indicator, never an error page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedHealth {
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl FeedHealth {
    fn record_success(&mut self, now: DateTime<Utc>) {
        self.last_success = Some(now);
        self.last_error = None;
    }

    fn record_failure(&mut self, error: &Error) {
        self.last_error = Some(error.to_string());
    }

    /// Whether the feed has never succeeded, or failed since it last did.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.last_error.is_some() || self.last_success.is_none()
    }
}

/// Health of every polled feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceHealth {
    pub cursor_list: FeedHealth,
    pub aggregate_stats: FeedHealth,
    pub write_activity: FeedHealth,
    pub live_status: FeedHealth,
}

// =============================================================================
// Snapshot
// =============================================================================

/// ETA for one in-flight cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorEta {
    pub cursor_id: String,
    pub estimate: EtaEstimate,
}

/// One fully derived view of the ingestion pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub generated_at: Option<DateTime<Utc>>,
    /// Merged cursor list (overlay over poll, one entry per id).
    pub cursors: Vec<Cursor>,
    /// Per-migration rollups, ascending epoch order.
    pub groups: Vec<MigrationGroup>,
    /// Displayed aggregate progress (already activity-clamped).
    pub overall_progress: Option<f64>,
    pub activity: ActivityReport,
    pub current_migration: Option<MigrationEpoch>,
    pub reconciliation: Reconciliation,
    pub etas: Vec<CursorEta>,
    pub stats: Option<AggregateStats>,
    pub write_activity: Option<WriteActivity>,
    pub live: Option<LiveStatus>,
    pub health: SourceHealth,
}

// =============================================================================
// Internal state
// =============================================================================

#[derive(Debug)]
struct MonitorState {
    merge: MergeEngine,
    detector: ActivityDetector,
    stats: Option<AggregateStats>,
    probe: Option<WriteActivity>,
    live: Option<LiveStatus>,
    health: SourceHealth,
}

impl MonitorState {
    fn new(config: &MonitorConfig) -> Self {
        Self {
            merge: MergeEngine::new(),
            detector: ActivityDetector::new(config.update_recency_window()),
            stats: None,
            probe: None,
            live: None,
            health: SourceHealth::default(),
        }
    }

    /// One pure recomputation pass over the current inputs.
    fn recompute(&mut self, now: DateTime<Utc>) -> MonitorSnapshot {
        let cursors = self.merge.merged();
        let activity = self.detector.assess(&cursors, self.probe.as_ref(), now);
        let writing = activity.active;

        let overall_progress = aggregate_progress(&cursors, writing);
        let groups = group_cursors(&cursors, writing);
        let current = current_migration(&cursors, writing);

        let live_cursor = self.live.as_ref().and_then(|l| l.live_cursor.as_ref());
        let reconciliation = reconcile(live_cursor, &cursors);

        let etas = cursors
            .iter()
            .filter_map(|c| {
                estimate(c, now).map(|e| CursorEta {
                    cursor_id: c.id.clone(),
                    estimate: e,
                })
            })
            .collect();

        MonitorSnapshot {
            generated_at: Some(now),
            cursors,
            groups,
            overall_progress,
            activity,
            current_migration: current,
            reconciliation,
            etas,
            stats: self.stats.clone(),
            write_activity: self.probe.clone(),
            live: self.live.clone(),
            health: self.health.clone(),
        }
    }
}

// =============================================================================
// Purge batch
// =============================================================================

/// Outcome of one step of a purge batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeStepOutcome {
    pub step: String,
    pub success: bool,
    pub detail: String,
}

/// Report of independently attempted purge steps. Failures are collected
/// per step rather than aborting the batch on the first one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurgeBatchReport {
    pub steps: Vec<PurgeStepOutcome>,
}

impl PurgeBatchReport {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.steps.iter().filter(|s| s.success).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.steps.len() - self.succeeded()
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// Owns the poll tasks, the change subscription, and the derived state for
/// one monitoring view.
pub struct Monitor {
    source: Arc<dyn IngestSource>,
    state: Arc<AsyncMutex<MonitorState>>,
    snapshot_tx: watch::Sender<MonitorSnapshot>,
    snapshot_rx: watch::Receiver<MonitorSnapshot>,
    scheduler: PollScheduler,
    subscription: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    /// Start polling and subscribing. Returns once the tasks are spawned;
    /// the first snapshot arrives when the first input lands.
    pub async fn spawn(source: Arc<dyn IngestSource>, config: &MonitorConfig) -> Result<Self> {
        let state = Arc::new(AsyncMutex::new(MonitorState::new(config)));
        let (snapshot_tx, snapshot_rx) = watch::channel(MonitorSnapshot::default());
        let scheduler = PollScheduler::new();

        // Push subscription: every change goes straight into the merge
        // overlay and triggers a recompute.
        let mut changes = source.subscribe_changes().await?;
        let sub_state = Arc::clone(&state);
        let sub_tx = snapshot_tx.clone();
        let subscription = tokio::spawn(async move {
            while let Some(change) = changes.recv().await {
                let mut state = sub_state.lock().await;
                debug!(cursor_id = %change.cursor().id, "applying pushed cursor change");
                state.merge.apply(change);
                let snapshot = state.recompute(Utc::now());
                let _ = sub_tx.send(snapshot);
            }
            // Channel closed: polls carry on, so this only degrades
            // freshness between poll ticks.
            warn!(
                error = %Error::from(SourceError::SubscriptionClosed),
                "cursor change subscription ended"
            );
        });

        let monitor = Self {
            source,
            state,
            snapshot_tx,
            snapshot_rx,
            scheduler,
            subscription: std::sync::Mutex::new(Some(subscription)),
        };

        monitor.spawn_cursor_poll(config.cursor_poll_interval());
        monitor.spawn_stats_poll(config.stats_poll_interval());
        monitor.spawn_activity_poll(config.activity_poll_interval());
        monitor.spawn_live_poll(config.live_poll_interval());

        Ok(monitor)
    }

    fn spawn_cursor_poll(&self, interval: std::time::Duration) {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let tx = self.snapshot_tx.clone();
        self.scheduler
            .spawn("cursor-list", PollCadence::every(interval), move || {
                let source = Arc::clone(&source);
                let state = Arc::clone(&state);
                let tx = tx.clone();
                async move {
                    let result = source.list_cursors().await;
                    let mut state = state.lock().await;
                    let outcome = match result {
                        Ok(cursors) => {
                            state.merge.set_snapshot(cursors);
                            state.health.cursor_list.record_success(Utc::now());
                            Ok(())
                        }
                        Err(error) => {
                            state.health.cursor_list.record_failure(&error);
                            Err(error)
                        }
                    };
                    let snapshot = state.recompute(Utc::now());
                    let _ = tx.send(snapshot);
                    outcome
                }
            });
    }

    fn spawn_stats_poll(&self, interval: std::time::Duration) {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let tx = self.snapshot_tx.clone();
        self.scheduler
            .spawn("aggregate-stats", PollCadence::every(interval), move || {
                let source = Arc::clone(&source);
                let state = Arc::clone(&state);
                let tx = tx.clone();
                async move {
                    let result = source.aggregate_stats().await;
                    let mut state = state.lock().await;
                    let outcome = match result {
                        Ok(stats) => {
                            state.detector.observe_stats(&stats);
                            state.stats = Some(stats);
                            state.health.aggregate_stats.record_success(Utc::now());
                            Ok(())
                        }
                        Err(error) => {
                            state.health.aggregate_stats.record_failure(&error);
                            Err(error)
                        }
                    };
                    let snapshot = state.recompute(Utc::now());
                    let _ = tx.send(snapshot);
                    outcome
                }
            });
    }

    fn spawn_activity_poll(&self, interval: std::time::Duration) {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let tx = self.snapshot_tx.clone();
        self.scheduler
            .spawn("write-activity", PollCadence::every(interval), move || {
                let source = Arc::clone(&source);
                let state = Arc::clone(&state);
                let tx = tx.clone();
                async move {
                    let result = source.write_activity().await;
                    let mut state = state.lock().await;
                    let outcome = match result {
                        Ok(probe) => {
                            state.probe = Some(probe);
                            state.health.write_activity.record_success(Utc::now());
                            Ok(())
                        }
                        Err(error) => {
                            state.health.write_activity.record_failure(&error);
                            Err(error)
                        }
                    };
                    let snapshot = state.recompute(Utc::now());
                    let _ = tx.send(snapshot);
                    outcome
                }
            });
    }

    fn spawn_live_poll(&self, interval: std::time::Duration) {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let tx = self.snapshot_tx.clone();
        self.scheduler
            .spawn("live-status", PollCadence::every(interval), move || {
                let source = Arc::clone(&source);
                let state = Arc::clone(&state);
                let tx = tx.clone();
                async move {
                    let result = source.live_status().await;
                    let mut state = state.lock().await;
                    let outcome = match result {
                        Ok(live) => {
                            state.live = Some(live);
                            state.health.live_status.record_success(Utc::now());
                            Ok(())
                        }
                        Err(error) => {
                            state.health.live_status.record_failure(&error);
                            Err(error)
                        }
                    };
                    let snapshot = state.recompute(Utc::now());
                    let _ = tx.send(snapshot);
                    outcome
                }
            });
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Subscribe to snapshot updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Destructive: purge all cursor state. On success the dashboard's
    /// view is cleared atomically; the next polls rebuild it from scratch.
    ///
    /// A server-side failure is surfaced verbatim and never retried here.
    pub async fn purge_all(&self) -> Result<PurgeSummary> {
        let summary = self.source.purge_all_cursors().await?;
        info!(
            deleted_cursors = summary.deleted_cursors,
            "purged all cursors"
        );
        let mut state = self.state.lock().await;
        state.merge.clear();
        state.stats = None;
        let snapshot = state.recompute(Utc::now());
        let _ = self.snapshot_tx.send(snapshot);
        Ok(summary)
    }

    /// Corrective: purge the live cursor (the reconciler's suggested
    /// action when the live process has fallen behind).
    pub async fn purge_live(&self) -> Result<PurgeLiveOutcome> {
        let outcome = self.source.purge_live_cursor().await?;
        info!(success = outcome.success, message = %outcome.message, "purged live cursor");
        Ok(outcome)
    }

    /// Run both purge operations as a batch. Each step is attempted
    /// independently; per-step failures are collected, not short-circuited.
    pub async fn purge_everything(&self) -> PurgeBatchReport {
        let mut report = PurgeBatchReport::default();

        match self.purge_all().await {
            Ok(summary) => report.steps.push(PurgeStepOutcome {
                step: "purge-cursors".into(),
                success: true,
                detail: format!("deleted {} cursors", summary.deleted_cursors),
            }),
            Err(error) => report.steps.push(PurgeStepOutcome {
                step: "purge-cursors".into(),
                success: false,
                detail: error.to_string(),
            }),
        }

        match self.purge_live().await {
            Ok(outcome) => report.steps.push(PurgeStepOutcome {
                step: "purge-live".into(),
                success: outcome.success,
                detail: outcome.message,
            }),
            Err(error) => report.steps.push(PurgeStepOutcome {
                step: "purge-live".into(),
                success: false,
                detail: error.to_string(),
            }),
        }

        report
    }

    /// Tear down polls and the change subscription together. Idempotent.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        let handle = match self.subscription.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
