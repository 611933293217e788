//! ledgerscope-core: Core library for LedgerScope
//!
//! This crate provides the core functionality for `lscope`, a monitoring
//! dashboard for distributed-ledger ingestion backfills.
//!
//! # Architecture
//!
//! ```text
//! Ingest Service (HTTP) → IngestSource → Merge Engine
//!            ↓ push feed                      ↓
//!       Poll Scheduler  →  Monitor  →  Calculators → Snapshot (watch)
//! ```
//!
//! # Modules
//!
//! - `cursor`: Backfill cursor domain model and wire records
//! - `merge`: Overlay-over-poll merge engine for cursor state
//! - `progress`: Per-cursor and aggregate progress calculation
//! - `activity`: Four-signal write-activity detector
//! - `grouping`: Per-migration grouping and lifecycle status
//! - `eta`: Completion-time extrapolation
//! - `reconcile`: Live-vs-backfill cursor reconciliation
//! - `source`: Ingest service client trait and HTTP implementation
//! - `scheduler`: Backoff-aware poll task scheduler
//! - `monitor`: The engine tying polls, pushes, and calculators together
//! - `config`: Configuration loading and validation
//! - `logging`: Tracing subscriber setup
//! - `error`: Error types shared across the crate
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod activity;
pub mod config;
pub mod cursor;
pub mod error;
pub mod eta;
pub mod grouping;
pub mod logging;
pub mod merge;
pub mod monitor;
pub mod progress;
pub mod reconcile;
pub mod scheduler;
pub mod source;

pub use config::MonitorConfig;
pub use cursor::{Cursor, LiveCursor, MigrationEpoch, TimeRange};
pub use error::{ConfigError, Error, Result, SourceError};
pub use monitor::{Monitor, MonitorSnapshot};
pub use source::{HttpIngestSource, IngestSource};
