//! # Status Aggregator
//!
//! Orchestrates task status aggregation: database lookup, remote snapshot
//! retrieval, reconciliation, staleness policy and final result assembly.
//!
//! ## Overview
//!
//! One status request walks an explicit phase machine:
//!
//! ```text
//! LOOKUP -> TERMINAL_SHORT_CIRCUIT -> FETCH_NODE_STATE -> RECONCILE -> BUILD_RESULT
//! ```
//!
//! Every exit path is visible in the phase loop. The mandatory node-state
//! fetch fails the request into a graceful `UNKNOWN` result; the two
//! optional snapshot fetches (transfer status, error report) run
//! concurrently and degrade gracefully on failure. The only hard error a
//! caller can see is an unknown task name (or a database failure looking
//! it up).
//!
//! Requests are stateless and independent; the aggregator holds no mutable
//! state across requests and performs no internal retries.

pub mod result;

pub use result::{StatusResult, TaskDbInfo, TaskReport};

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::StatusConfig;
use crate::constants::{db_status, snapshot_files, status_groups, MISSING_WEBDIR_MSG};
use crate::error::{Result, StatusError};
use crate::fetch::SnapshotTransport;
use crate::models::{FileMetadataRecord, FileReportRecord, TaskRecord};
use crate::publication::{publication_status, PublicationSummary};
use crate::snapshots::{
    attach_errors, fill_missing_jobs, parse_error_snapshot, parse_node_state,
    parse_transfer_snapshot, reconcile_transfers, ErrorSnapshot, JobId, JobState,
    NodeStateSnapshot, TransferSnapshot,
};
use crate::store::TaskMetadataStore;

/// Output file types aggregated for `task_files`.
const OUTPUT_FILE_TYPES: &[&str] = &["EDM", "TFILE", "FAKE"];
/// File type holding job logs.
const LOG_FILE_TYPES: &[&str] = &["LOG"];

/// Explicit request phases. Each phase owns the data the next one needs,
/// so the control flow is exhaustive and auditable.
enum AggregationPhase {
    Lookup,
    TerminalShortCircuit {
        record: TaskRecord,
        result: StatusResult,
    },
    FetchNodeState {
        record: TaskRecord,
        result: StatusResult,
    },
    Reconcile {
        record: TaskRecord,
        result: StatusResult,
        snapshot: NodeStateSnapshot,
    },
    BuildResult {
        record: TaskRecord,
        result: StatusResult,
        snapshot: NodeStateSnapshot,
    },
}

/// Task status aggregation engine over a metadata store and a snapshot
/// transport.
#[derive(Debug, Clone)]
pub struct StatusAggregator<S, T> {
    store: S,
    transport: T,
    config: StatusConfig,
}

impl<S, T> StatusAggregator<S, T>
where
    S: TaskMetadataStore,
    T: SnapshotTransport,
{
    pub fn new(store: S, transport: T, config: StatusConfig) -> Self {
        Self {
            store,
            transport,
            config,
        }
    }

    /// Aggregate the status of the named task.
    ///
    /// Returns `StatusError::TaskNotFound` for an unknown task; every other
    /// failure mode yields a well-formed [`StatusResult`].
    pub async fn status(&self, task_name: &str) -> Result<StatusResult> {
        let mut phase = AggregationPhase::Lookup;
        loop {
            phase = match phase {
                AggregationPhase::Lookup => {
                    info!(task = task_name, "got status request");
                    let record = self.require_task(task_name).await?;
                    debug!(task = task_name, status = %record.task_status, "task record loaded");
                    let result = StatusResult::from_record(&record);
                    AggregationPhase::TerminalShortCircuit { record, result }
                }

                AggregationPhase::TerminalShortCircuit { record, mut result } => {
                    if status_groups::is_db_only(&record.task_status) {
                        result.apply_db_status(&record);
                        if !record.has_pending_command() {
                            debug!(
                                task = %record.task_name,
                                status = %record.task_status,
                                "no job-level state for this status, returning database answer"
                            );
                            return Ok(result);
                        }
                        // A pending KILL/RESUBMIT means the scheduler side
                        // may already disagree with the database.
                    }
                    AggregationPhase::FetchNodeState { record, result }
                }

                AggregationPhase::FetchNodeState { record, mut result } => {
                    let Some(webdir) = record.user_webdir.clone() else {
                        error!(
                            task = %record.task_name,
                            "webdir not found in DB, impossible to retrieve task status"
                        );
                        result.mark_unretrievable(MISSING_WEBDIR_MSG);
                        return Ok(result);
                    };

                    match self.fetch_node_state(&webdir).await {
                        Ok(snapshot) => {
                            let now = Utc::now().timestamp();
                            if snapshot.summary.is_stale(now, self.config.stale_after_secs) {
                                warn!(
                                    task = %record.task_name,
                                    timestamp = snapshot.summary.timestamp,
                                    "node state snapshot is stale, showing it anyway"
                                );
                                result.stale = true;
                                result.task_warning_msg.insert(
                                    0,
                                    format!(
                                        "Node state file is older than {}s; \
                                         status information may be out of date.",
                                        self.config.stale_after_secs
                                    ),
                                );
                            }

                            result.status = self.derive_task_status(&record, &snapshot);
                            let fill = missing_job_fill(&result.status);
                            let snapshot = fill_missing_jobs(snapshot, fill);
                            AggregationPhase::Reconcile {
                                record,
                                result,
                                snapshot,
                            }
                        }
                        Err(failure) => {
                            warn!(
                                task = %record.task_name,
                                failure = %failure,
                                "node state retrieval failed"
                            );
                            result.mark_unretrievable(&failure);
                            return Ok(result);
                        }
                    }
                }

                AggregationPhase::Reconcile {
                    record,
                    mut result,
                    snapshot,
                } => {
                    // Checked in FETCH_NODE_STATE.
                    let webdir = record.user_webdir.clone().unwrap_or_default();

                    // The two optional snapshots are independent of each
                    // other; fetch them concurrently.
                    let (transfers, errors) = tokio::join!(
                        self.fetch_transfer_snapshot(&webdir),
                        self.fetch_error_snapshot(&webdir),
                    );

                    let snapshot = match transfers {
                        Some(transfers) => {
                            let reconciled = reconcile_transfers(snapshot, &transfers);
                            for warning in reconciled.warnings.into_iter().rev() {
                                result.task_warning_msg.insert(0, warning);
                            }
                            reconciled.snapshot
                        }
                        None => snapshot,
                    };

                    let snapshot = match errors {
                        Some(errors) => attach_errors(snapshot, &errors),
                        None => snapshot,
                    };

                    AggregationPhase::BuildResult {
                        record,
                        result,
                        snapshot,
                    }
                }

                AggregationPhase::BuildResult {
                    record,
                    mut result,
                    snapshot,
                } => {
                    for (job_id, info) in &snapshot.jobs {
                        let state = info.state.to_string();
                        *result.jobs_per_status.entry(state.clone()).or_insert(0) += 1;
                        result.job_list.push((state, *job_id));
                    }
                    result.jobs = snapshot.jobs;

                    result.publication = self
                        .publication_summary(&record, &result.jobs_per_status)
                        .await;
                    result.output_datasets = record.output_dataset_list();

                    debug!(
                        task = %record.task_name,
                        status = %result.status,
                        jobs = result.jobs.len(),
                        "status aggregation complete"
                    );
                    return Ok(result);
                }
            };
        }
    }

    /// Output file metadata for a task (stage-out results), limited to
    /// `limit` rows when given.
    pub async fn task_files(
        &self,
        task_name: &str,
        limit: Option<i64>,
    ) -> Result<Vec<FileMetadataRecord>> {
        self.require_task(task_name).await?;
        self.store
            .file_metadata(task_name, OUTPUT_FILE_TYPES, limit)
            .await
    }

    /// Log file metadata for a task.
    pub async fn task_logs(
        &self,
        task_name: &str,
        limit: Option<i64>,
    ) -> Result<Vec<FileMetadataRecord>> {
        self.require_task(task_name).await?;
        self.store
            .file_metadata(task_name, LOG_FILE_TYPES, limit)
            .await
    }

    /// Per-job processing report: run/lumi ranges, parentage and event
    /// counts per file, grouped by job id, plus the task-level report
    /// fields. Rows with an out-of-range job id are dropped with a warning.
    pub async fn task_report(&self, task_name: &str) -> Result<TaskReport> {
        let record = self.require_task(task_name).await?;
        let rows = self.store.file_report(task_name).await?;

        let mut runs_and_lumis: BTreeMap<JobId, Vec<FileReportRecord>> = BTreeMap::new();
        for row in rows {
            match u32::try_from(row.job_id) {
                Ok(id) if id > 0 => runs_and_lumis.entry(JobId(id)).or_default().push(row),
                _ => {
                    warn!(
                        task = task_name,
                        job_id = row.job_id,
                        lfn = %row.lfn,
                        "report row has an invalid job id, dropping it"
                    );
                }
            }
        }

        Ok(TaskReport {
            task_db_info: TaskDbInfo::from_record(&record),
            runs_and_lumis,
        })
    }

    async fn require_task(&self, task_name: &str) -> Result<TaskRecord> {
        self.store
            .find_task(task_name)
            .await?
            .ok_or_else(|| StatusError::TaskNotFound {
                task: task_name.to_string(),
            })
    }

    /// Overall task status: the database value wins for post-terminal
    /// statuses, otherwise the DAG code mapping applies, falling back to
    /// the database value for unknown codes.
    fn derive_task_status(&self, record: &TaskRecord, snapshot: &NodeStateSnapshot) -> String {
        if status_groups::is_db_preferred(&record.task_status) {
            return record.task_status.clone();
        }
        snapshot
            .summary
            .dag_status
            .map(|dag| dag.task_vocabulary().to_string())
            .unwrap_or_else(|| record.task_status.clone())
    }

    /// Mandatory fetch: any failure is terminal for the request and folds
    /// into an `UNKNOWN` result at the call site.
    async fn fetch_node_state(
        &self,
        webdir: &str,
    ) -> std::result::Result<NodeStateSnapshot, String> {
        let bytes = self
            .transport
            .fetch(webdir, snapshot_files::NODE_STATE)
            .await
            .map_err(|e| e.to_string())?;
        parse_node_state(&bytes).map_err(|e| e.to_string())
    }

    /// Optional fetch: failures degrade to `None` and are only logged.
    async fn fetch_transfer_snapshot(&self, webdir: &str) -> Option<TransferSnapshot> {
        match self
            .transport
            .fetch(webdir, snapshot_files::TRANSFER_STATUS)
            .await
        {
            Ok(bytes) => match parse_transfer_snapshot(&bytes) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!(error = %e, "transfer status snapshot unreadable, skipping");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "transfer status unavailable, skipping");
                None
            }
        }
    }

    /// Optional fetch: failures degrade to `None` and are only logged.
    async fn fetch_error_snapshot(&self, webdir: &str) -> Option<ErrorSnapshot> {
        match self
            .transport
            .fetch(webdir, snapshot_files::ERROR_REPORT)
            .await
        {
            Ok(bytes) => match parse_error_snapshot(&bytes) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!(error = %e, "error report snapshot unreadable, skipping");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "error report unavailable, skipping");
                None
            }
        }
    }

    async fn publication_summary(
        &self,
        record: &TaskRecord,
        jobs_per_status: &BTreeMap<String, u32>,
    ) -> PublicationSummary {
        if !record.publication_enabled() {
            return PublicationSummary::Disabled;
        }
        if !jobs_per_status.contains_key(&JobState::Finished.to_string()) {
            debug!(
                task = %record.task_name,
                "no finished jobs yet, nothing to publish"
            );
            return PublicationSummary::NotAvailable;
        }

        let username = record.username.as_deref().unwrap_or_default();
        match publication_status(&self.store, &record.task_name, username).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(task = %record.task_name, error = %e, "publication summary unavailable");
                PublicationSummary::NotAvailable
            }
        }
    }
}

/// Synthesized state for in-range job ids missing from the node-state
/// snapshot: `killed` when the task itself was killed, `unsubmitted`
/// otherwise (including FAILED tasks, whose snapshot still carries real
/// per-node states).
fn missing_job_fill(task_status: &str) -> JobState {
    if task_status == db_status::KILLED || task_status == db_status::KILLFAILED {
        JobState::Killed
    } else {
        JobState::Unsubmitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_jobs_are_killed_only_for_killed_tasks() {
        assert_eq!(missing_job_fill("KILLED"), JobState::Killed);
        assert_eq!(missing_job_fill("KILLFAILED"), JobState::Killed);
        assert_eq!(missing_job_fill("FAILED"), JobState::Unsubmitted);
        assert_eq!(missing_job_fill("SUBMITTED"), JobState::Unsubmitted);
    }
}
