//! Ingestion data-source abstraction and its HTTP implementation.
//!
//! The monitor consumes five read-mostly feeds (cursor list, aggregate
//! stats, write-activity probe, live status, and a push subscription of
//! cursor changes) plus two explicitly user-initiated purge operations.
//! [`IngestSource`] is the seam; [`HttpIngestSource`] implements it against
//! the pipeline's JSON status service.
//!
//! Both purges are idempotent server-side: purging an already-empty state
//! is a no-op success, not an error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cursor::{Cursor, CursorRecord, LiveCursor};
use crate::error::{Result, SourceError};
use crate::merge::CursorChange;

// =============================================================================
// Wire types
// =============================================================================

/// Aggregate counters across all cursors, polled on a fixed interval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateStats {
    pub total_updates: u64,
    pub total_events: u64,
    pub active_migrations: u64,
    pub raw_file_counts: Option<RawFileCounts>,
}

/// Raw staging-file counts, when the endpoint exposes them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFileCounts {
    pub update_files: u64,
    pub event_files: u64,
}

/// External write-activity probe (file/storage write recency). Treated as
/// an opaque boolean plus timestamp; the detector does not interpret the
/// file counts beyond display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteActivity {
    pub is_writing: bool,
    pub event_files: u64,
    pub update_files: u64,
    pub observed_at: Option<DateTime<Utc>>,
}

/// Live-tailing process status, polled on a fixed interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveStatus {
    pub status: String,
    pub mode: Option<String>,
    pub live_cursor: Option<LiveCursor>,
    pub backfill_cursors: Vec<CursorRecord>,
    pub current_record_time: Option<DateTime<Utc>>,
    pub latest_file_write: Option<DateTime<Utc>>,
    pub all_backfill_complete: bool,
    pub suggestion: Option<String>,
}

/// Result of purging all cursor and derived-aggregate state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurgeSummary {
    pub deleted_cursors: u64,
    pub deleted_updates: Option<u64>,
    pub deleted_events: Option<u64>,
}

/// Result of purging the live cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurgeLiveOutcome {
    pub success: bool,
    pub message: String,
}

/// One page of the change feed, keyed by a monotonic sequence number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeBatch {
    pub next_seq: u64,
    pub changes: Vec<ChangeRecord>,
}

/// A single pushed change on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChangeRecord {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub cursor: CursorRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
}

impl From<ChangeRecord> for CursorChange {
    fn from(record: ChangeRecord) -> Self {
        let cursor = Cursor::from(record.cursor);
        match record.kind {
            ChangeKind::Insert => Self::Insert(cursor),
            ChangeKind::Update => Self::Update(cursor),
        }
    }
}

// =============================================================================
// IngestSource
// =============================================================================

/// Abstract view of the ingestion pipeline's status service.
///
/// All methods are read-only except the two purges, which are explicit,
/// user-initiated, and idempotent.
#[async_trait]
pub trait IngestSource: Send + Sync {
    /// Full cursor snapshot.
    async fn list_cursors(&self) -> Result<Vec<Cursor>>;

    /// Aggregate counters.
    async fn aggregate_stats(&self) -> Result<AggregateStats>;

    /// External write-activity probe.
    async fn write_activity(&self) -> Result<WriteActivity>;

    /// Live-tailing process status.
    async fn live_status(&self) -> Result<LiveStatus>;

    /// Subscribe to pushed cursor changes. The returned receiver yields
    /// changes until the source is torn down or the subscription fails.
    async fn subscribe_changes(&self) -> Result<mpsc::Receiver<CursorChange>>;

    /// Destructive: clear all cursor and derived-aggregate state.
    async fn purge_all_cursors(&self) -> Result<PurgeSummary>;

    /// Corrective: clear the live cursor so the live process restarts from
    /// the correct position on its next run.
    async fn purge_live_cursor(&self) -> Result<PurgeLiveOutcome>;
}

// =============================================================================
// HttpIngestSource
// =============================================================================

/// Capacity of the change-subscription channel.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Delay before re-polling the change feed after a transport failure.
const CHANGE_FEED_RETRY_DELAY: Duration = Duration::from_secs(5);

/// [`IngestSource`] over the pipeline's JSON HTTP status service.
///
/// The change subscription is implemented as a long-poll of the
/// `cursor-events` endpoint with a monotonic sequence cursor; duplicates
/// across reconnects are harmless because the merge engine is idempotent.
#[derive(Debug, Clone)]
pub struct HttpIngestSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIngestSource {
    /// Create a source for the given base URL (e.g. `http://host:8080`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| SourceError::Unreachable(e.to_string()))?;
        decode_response(response).await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .post(self.url(path))
            .send()
            .await
            .map_err(|e| SourceError::Unreachable(e.to_string()))?;
        decode_response(response).await
    }
}

async fn decode_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Status {
            status: status.as_u16(),
            body,
        }
        .into());
    }
    response
        .json::<T>()
        .await
        .map_err(|e| SourceError::Decode(e.to_string()).into())
}

#[async_trait]
impl IngestSource for HttpIngestSource {
    async fn list_cursors(&self) -> Result<Vec<Cursor>> {
        let records: Vec<CursorRecord> = self.get_json("/api/ingest/cursors").await?;
        Ok(records.into_iter().map(Cursor::from).collect())
    }

    async fn aggregate_stats(&self) -> Result<AggregateStats> {
        self.get_json("/api/ingest/stats").await
    }

    async fn write_activity(&self) -> Result<WriteActivity> {
        self.get_json("/api/ingest/write-activity").await
    }

    async fn live_status(&self) -> Result<LiveStatus> {
        self.get_json("/api/ingest/live-status").await
    }

    async fn subscribe_changes(&self) -> Result<mpsc::Receiver<CursorChange>> {
        let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
        let source = self.clone();
        tokio::spawn(async move {
            let mut after_seq = 0u64;
            loop {
                let path = format!("/api/ingest/cursor-events?after={after_seq}");
                match source.get_json::<ChangeBatch>(&path).await {
                    Ok(batch) => {
                        after_seq = after_seq.max(batch.next_seq);
                        for record in batch.changes {
                            if tx.send(CursorChange::from(record)).await.is_err() {
                                debug!("change subscriber dropped, stopping feed");
                                return;
                            }
                        }
                    }
                    Err(error) => {
                        if tx.is_closed() {
                            return;
                        }
                        warn!(error = %error, after_seq, "change feed poll failed, backing off");
                        tokio::time::sleep(CHANGE_FEED_RETRY_DELAY).await;
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn purge_all_cursors(&self) -> Result<PurgeSummary> {
        self.post_json("/api/ingest/purge-cursors")
            .await
            .map_err(|e| SourceError::Purge(e.to_string()).into())
    }

    async fn purge_live_cursor(&self) -> Result<PurgeLiveOutcome> {
        self.post_json("/api/ingest/purge-live")
            .await
            .map_err(|e| SourceError::Purge(e.to_string()).into())
    }
}
