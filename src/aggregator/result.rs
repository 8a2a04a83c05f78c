//! The documents returned to API callers: the aggregated status and the
//! per-job processing report.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::constants::db_status;
use crate::models::{FileReportRecord, TaskRecord};
use crate::publication::PublicationSummary;
use crate::snapshots::{JobId, JobInfo};

/// Aggregated status of a task and its jobs.
///
/// Always well-formed: mandatory-path retrieval failures surface in
/// `status_failure_msg` (with `status` falling back to the database value,
/// or `UNKNOWN` when there is none), never as an error. A task-execution
/// failure lives in `task_failure_msg` and is a different thing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResult {
    /// Task-level status, from the database or derived from the DAG code.
    pub status: String,
    /// Client command last queued against the task, if any.
    pub command: String,
    /// Failure message of the task itself, as recorded in the database.
    pub task_failure_msg: String,
    /// Task-level warnings: backend-recorded plus aggregation anomalies.
    pub task_warning_msg: Vec<String>,
    /// Submission time, epoch seconds.
    pub submission_time: i64,
    /// Whether the node-state snapshot was older than the staleness window.
    /// The snapshot is still used; a warning is appended alongside.
    pub stale: bool,
    /// Failure of the status retrieval itself, not of the task.
    pub status_failure_msg: String,
    /// Ordered `(state, job id)` pairs covering every job of the task.
    pub job_list: Vec<(String, JobId)>,
    /// Per-state job counts.
    pub jobs_per_status: BTreeMap<String, u32>,
    /// Full per-job detail, including attached failure information.
    pub jobs: BTreeMap<JobId, JobInfo>,
    pub publication: PublicationSummary,
    /// Per-file publication failure reasons (reserved, currently empty).
    pub publication_failures: BTreeMap<String, serde_json::Value>,
    pub output_datasets: Vec<String>,
    pub schedd: String,
    pub username: String,
    pub task_worker: String,
    pub splitting: String,
    pub webdir_path: String,
}

impl StatusResult {
    /// Seed a result document with the database passthrough fields.
    pub fn from_record(record: &TaskRecord) -> Self {
        Self {
            status: String::new(),
            command: record.task_command.clone().unwrap_or_default(),
            task_failure_msg: String::new(),
            task_warning_msg: record.warning_list(),
            submission_time: record.submission_epoch(),
            stale: false,
            status_failure_msg: String::new(),
            job_list: Vec::new(),
            jobs_per_status: BTreeMap::new(),
            jobs: BTreeMap::new(),
            publication: PublicationSummary::NotAvailable,
            publication_failures: BTreeMap::new(),
            output_datasets: Vec::new(),
            schedd: record.schedd.clone().unwrap_or_default(),
            username: record.username.clone().unwrap_or_default(),
            task_worker: record.task_worker.clone().unwrap_or_default(),
            splitting: record.split_algo.clone().unwrap_or_default(),
            webdir_path: record.webdir_path().unwrap_or_default(),
        }
    }

    /// Copy the database-recorded status and task failure into the result.
    pub fn apply_db_status(&mut self, record: &TaskRecord) {
        self.status = record.task_status.clone();
        if let Some(failure) = &record.task_failure {
            self.task_failure_msg = failure.clone();
        }
    }

    /// Record a retrieval failure. The task status falls back to `UNKNOWN`
    /// only when no status was established from the database.
    pub fn mark_unretrievable(&mut self, failure: &str) {
        if self.status.is_empty() {
            self.status = db_status::UNKNOWN.to_string();
        }
        self.status_failure_msg = failure.to_string();
    }
}

/// Per-job processing report for a task: run/lumi ranges, parentage and
/// event counts per file, keyed by job id, plus the task-level fields the
/// client needs to assemble a framework job report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    pub task_db_info: TaskDbInfo,
    pub runs_and_lumis: BTreeMap<JobId, Vec<FileReportRecord>>,
}

/// Task-level report fields taken straight from the database record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDbInfo {
    pub user_web_dir_url: String,
    pub input_dataset: String,
    pub output_datasets: Vec<String>,
    pub publication: bool,
}

impl TaskDbInfo {
    pub fn from_record(record: &TaskRecord) -> Self {
        Self {
            user_web_dir_url: record.user_webdir.clone().unwrap_or_default(),
            input_dataset: record.input_dataset.clone().unwrap_or_default(),
            output_datasets: record.output_dataset_list(),
            publication: record.publication_enabled(),
        }
    }
}
