//! Scheduler-side snapshot decoding and reconciliation.
//!
//! The three snapshot files a task's remote working directory carries are
//! modeled as a pipeline of pure transformations over owned snapshot
//! values: decode the node state, fold in transfer-status upgrades, attach
//! error detail to failed jobs. Nothing here performs I/O.

pub mod error_report;
pub mod node_state;
pub mod transfers;

pub use error_report::{attach_errors, parse_error_snapshot, ErrorSnapshot};
pub use node_state::{
    fill_missing_jobs, parse_node_state, DagStatus, DagSummary, JobId, JobInfo, JobState,
    NodeStateSnapshot, SnapshotError,
};
pub use transfers::{
    parse_transfer_snapshot, reconcile_transfers, TransferReconciliation, TransferSnapshot,
};
