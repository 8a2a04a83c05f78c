//! # Node State Snapshot
//!
//! Decodes the job orchestrator's periodic state file into per-job states
//! plus a task-level DAG summary.
//!
//! ## Format
//!
//! A JSON object keyed by job-id strings, each value holding at least a
//! `"State"` field, with the reserved key `"DagStatus"` carrying the
//! task-level summary:
//!
//! ```json
//! {
//!   "DagStatus": {"Timestamp": 1700000000, "DagStatus": 3, "NodesTotal": 3},
//!   "1": {"State": "finished"},
//!   "2": {"State": "transferring"},
//!   "3": {"State": "failed"}
//! }
//! ```
//!
//! The file is rewritten in place by the orchestrator roughly every 30
//! seconds, so a fetch may observe a mid-write torn file. That is a
//! [`SnapshotError::Parse`], which the aggregator treats exactly like a
//! failed fetch, never as a crash.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::db_status;

/// Strongly typed job identifier. Job ids are positive integers forming the
/// contiguous range `1..=nodes_total`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(pub u32);

impl JobId {
    /// Parse a snapshot key into a job id. Zero and non-numeric keys are
    /// rejected.
    pub fn parse(key: &str) -> Option<JobId> {
        match key.parse::<u32>() {
            Ok(id) if id > 0 => Some(JobId(id)),
            _ => None,
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-job state vocabulary written by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Unsubmitted,
    Idle,
    Running,
    Transferring,
    Transferred,
    Finished,
    Failed,
    Killed,
    Held,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unsubmitted => "unsubmitted",
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Transferring => "transferring",
            Self::Transferred => "transferred",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Killed => "killed",
            Self::Held => "held",
        };
        write!(f, "{s}")
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unsubmitted" => Ok(Self::Unsubmitted),
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "transferring" => Ok(Self::Transferring),
            "transferred" => Ok(Self::Transferred),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            "killed" => Ok(Self::Killed),
            "held" => Ok(Self::Held),
            _ => Err(format!("Invalid job state: {s}")),
        }
    }
}

/// DAG progress codes written by the orchestrator (1 ready, 2 pre-run,
/// 3 submitted, 4 post-run, 5 done, 6 error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DagStatus {
    Ready,
    PreRun,
    Submitted,
    PostRun,
    Done,
    Error,
}

impl DagStatus {
    pub fn from_code(code: i64) -> Option<DagStatus> {
        match code {
            1 => Some(Self::Ready),
            2 => Some(Self::PreRun),
            3 => Some(Self::Submitted),
            4 => Some(Self::PostRun),
            5 => Some(Self::Done),
            6 => Some(Self::Error),
            _ => None,
        }
    }

    /// Final codes mean the snapshot will never be rewritten again.
    pub fn is_final(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Reduced task-level vocabulary the DAG code maps to.
    pub fn task_vocabulary(self) -> &'static str {
        match self {
            Self::Ready | Self::PreRun | Self::Submitted | Self::PostRun => db_status::SUBMITTED,
            Self::Done => db_status::COMPLETED,
            Self::Error => db_status::FAILED,
        }
    }
}

/// Task-level summary carried under the reserved `"DagStatus"` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagSummary {
    /// Epoch seconds of the last snapshot write.
    pub timestamp: i64,
    /// Parsed DAG code; `None` when the file carries an unknown code.
    pub dag_status: Option<DagStatus>,
    /// Total number of jobs in the task's DAG.
    pub nodes_total: u32,
}

impl DagSummary {
    /// Staleness rule: a non-final snapshot older than `stale_after` seconds
    /// is stale. Stale snapshots are still used; the result is only flagged.
    pub fn is_stale(&self, now_epoch: i64, stale_after: i64) -> bool {
        if self.dag_status.is_some_and(DagStatus::is_final) {
            return false;
        }
        now_epoch - self.timestamp > stale_after
    }
}

/// Per-job entry of the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub state: JobState,
    /// Failure detail attached by the error-report reconciler.
    pub error: Option<serde_json::Value>,
}

impl JobInfo {
    pub fn new(state: JobState) -> Self {
        Self { state, error: None }
    }
}

/// Decoded node-state snapshot: per-job states plus the task summary.
/// Created per request, discarded after the response is built.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStateSnapshot {
    pub jobs: BTreeMap<JobId, JobInfo>,
    pub summary: DagSummary,
}

#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    /// The file content could not be decoded. A mid-write snapshot lands
    /// here; the caller treats it as a failed (stale) fetch, not as fatal.
    #[error("malformed snapshot: {0}")]
    Parse(String),
}

/// Reserved snapshot key holding the task-level summary.
const SUMMARY_KEY: &str = "DagStatus";

/// Decode raw node-state bytes.
pub fn parse_node_state(bytes: &[u8]) -> Result<NodeStateSnapshot, SnapshotError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| SnapshotError::Parse(format!("invalid JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| SnapshotError::Parse("top level is not an object".to_string()))?;

    let summary_value = object
        .get(SUMMARY_KEY)
        .ok_or_else(|| SnapshotError::Parse(format!("missing {SUMMARY_KEY} entry")))?;
    let summary = parse_summary(summary_value)?;

    let mut jobs = BTreeMap::new();
    for (key, entry) in object {
        if key == SUMMARY_KEY {
            continue;
        }
        let job_id = JobId::parse(key)
            .ok_or_else(|| SnapshotError::Parse(format!("invalid job id key: {key}")))?;
        let state_str = entry
            .get("State")
            .and_then(|s| s.as_str())
            .ok_or_else(|| SnapshotError::Parse(format!("job {key} has no State")))?;
        let state = state_str.parse::<JobState>().map_err(SnapshotError::Parse)?;
        let mut info = JobInfo::new(state);
        info.error = entry.get("Error").cloned();
        jobs.insert(job_id, info);
    }

    Ok(NodeStateSnapshot { jobs, summary })
}

fn parse_summary(value: &serde_json::Value) -> Result<DagSummary, SnapshotError> {
    let timestamp = integer_field(value, "Timestamp")?;
    let code = integer_field(value, "DagStatus")?;
    let nodes_total = integer_field(value, "NodesTotal")?;
    let nodes_total = u32::try_from(nodes_total)
        .map_err(|_| SnapshotError::Parse(format!("NodesTotal out of range: {nodes_total}")))?;

    Ok(DagSummary {
        timestamp,
        dag_status: DagStatus::from_code(code),
        nodes_total,
    })
}

/// The orchestrator writes summary integers either as numbers or as
/// decimal strings, depending on its version.
fn integer_field(value: &serde_json::Value, field: &str) -> Result<i64, SnapshotError> {
    let raw = value
        .get(field)
        .ok_or_else(|| SnapshotError::Parse(format!("summary missing {field}")))?;
    if let Some(n) = raw.as_i64() {
        return Ok(n);
    }
    if let Some(s) = raw.as_str() {
        if let Ok(n) = s.trim().parse::<i64>() {
            return Ok(n);
        }
    }
    Err(SnapshotError::Parse(format!(
        "summary field {field} is not an integer: {raw}"
    )))
}

/// Synthesize entries for every in-range job id missing from the snapshot.
/// Pure transformation: consumes the snapshot, returns the filled one.
pub fn fill_missing_jobs(mut snapshot: NodeStateSnapshot, fill: JobState) -> NodeStateSnapshot {
    for id in 1..=snapshot.summary.nodes_total {
        snapshot
            .jobs
            .entry(JobId(id))
            .or_insert_with(|| JobInfo::new(fill));
    }
    snapshot
}
