#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Task Status Core
//!
//! Status aggregation engine for distributed-computing tasks: given a task
//! name, it reconciles the live status of the task and its constituent jobs
//! from several independently-updated, partially-stale data sources into one
//! consistent answer.
//!
//! ## Data Sources
//!
//! - the task metadata database (last-known task state, [`models`]/[`store`])
//! - the scheduler-side node-state snapshot ([`snapshots::node_state`])
//! - the stage-out transfer status snapshot ([`snapshots::transfers`])
//! - the per-job error report ([`snapshots::error_report`])
//!
//! ## Module Organization
//!
//! - [`aggregator`] - the request phase machine and the result document
//! - [`snapshots`] - snapshot decoding and pure reconciliation passes
//! - [`fetch`] - bounded-timeout retrieval of remote snapshot files
//! - [`publication`] - per-file publication state summary
//! - [`models`] / [`store`] - data layer over the task metadata database
//! - [`throttle`] - per-identity concurrency cap for the entry point
//! - [`config`] / [`error`] / [`logging`] - ambient concerns
//!
//! ## Failure Policy
//!
//! The caller always receives a well-formed [`aggregator::StatusResult`]
//! except for an unknown task name, the single hard error. Mandatory-path
//! retrieval failures fold into an `UNKNOWN` result carrying the failure
//! message; optional-path failures degrade silently and are logged.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use taskstatus_core::aggregator::StatusAggregator;
//! use taskstatus_core::config::StatusConfig;
//! use taskstatus_core::fetch::WebdirFetcher;
//! use taskstatus_core::store::PgTaskStore;
//! use sqlx::PgPool;
//!
//! # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! let config = StatusConfig::from_env()?;
//! let aggregator = StatusAggregator::new(
//!     PgTaskStore::new(pool),
//!     WebdirFetcher::new(&config),
//!     config,
//! );
//! let result = aggregator.status("240101_120000:user_analysis").await?;
//! println!("task is {}", result.status);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod config;
pub mod constants;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod models;
pub mod publication;
pub mod snapshots;
pub mod store;
pub mod throttle;

pub use aggregator::{StatusAggregator, StatusResult, TaskReport};
pub use config::StatusConfig;
pub use error::{Result, StatusError};
pub use fetch::{FetchError, SnapshotTransport, WebdirFetcher};
pub use models::{FileMetadataRecord, FileReportRecord, TaskRecord};
pub use publication::PublicationSummary;
pub use snapshots::{JobId, JobState, NodeStateSnapshot};
pub use store::{PgTaskStore, TaskMetadataStore};
pub use throttle::UserThrottle;
