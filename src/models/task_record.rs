//! # Task Record Model
//!
//! Read-only, per-request snapshot of a task row from the metadata store.
//!
//! ## Overview
//!
//! The `TaskRecord` carries the last-known task state the backend wrote to
//! the database: status code, queued command, submission time, the remote
//! working-directory URL the scheduler publishes its snapshot files under,
//! plus the passthrough fields the status document echoes back (scheduler
//! name, split algorithm, owning user, task-worker name).
//!
//! ## Database Schema
//!
//! Maps to the `tasks` table:
//! - `task_name`: unique task identifier (VARCHAR, primary key)
//! - `task_status`: last recorded status code (VARCHAR)
//! - `task_command`: queued client command, if any (VARCHAR)
//! - `start_time`: submission time (TIMESTAMP)
//! - `user_webdir`: remote working-directory URL (VARCHAR)
//! - `input_dataset`: dataset the task reads (VARCHAR)
//! - `task_warnings`: JSONB list of warning strings
//! - `output_datasets`: JSONB list of output dataset names

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::constants::status_groups;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaskRecord {
    pub task_name: String,
    pub task_status: String,
    pub task_command: Option<String>,
    pub start_time: NaiveDateTime,
    pub user_webdir: Option<String>,
    pub schedd: Option<String>,
    pub username: Option<String>,
    pub task_worker: Option<String>,
    pub split_algo: Option<String>,
    /// Publication flag as stored: `"T"` enabled, `"F"` disabled.
    pub publication: String,
    pub input_dataset: Option<String>,
    pub task_failure: Option<String>,
    pub task_warnings: Option<serde_json::Value>,
    pub output_datasets: Option<serde_json::Value>,
}

impl TaskRecord {
    /// Look up a task by its unique name. Returns `None` on zero rows; the
    /// caller decides whether that is a hard failure.
    pub async fn find_by_name(
        pool: &PgPool,
        task_name: &str,
    ) -> Result<Option<TaskRecord>, sqlx::Error> {
        let sql = r"
            SELECT task_name, task_status, task_command, start_time, user_webdir,
                   schedd, username, task_worker, split_algo, publication,
                   input_dataset, task_failure, task_warnings, output_datasets
            FROM tasks
            WHERE task_name = $1
        ";
        sqlx::query_as::<_, TaskRecord>(sql)
            .bind(task_name)
            .fetch_optional(pool)
            .await
    }

    pub fn publication_enabled(&self) -> bool {
        self.publication == "T"
    }

    /// Whether a client command is queued that forces job-level retrieval
    /// even when the recorded status would otherwise be answered DB-only.
    pub fn has_pending_command(&self) -> bool {
        self.task_command
            .as_deref()
            .is_some_and(status_groups::is_pending_command)
    }

    /// Submission time as epoch seconds, the unit the status document uses.
    pub fn submission_epoch(&self) -> i64 {
        self.start_time.and_utc().timestamp()
    }

    /// Warning strings recorded by the backend, tolerating a missing or
    /// malformed column value.
    pub fn warning_list(&self) -> Vec<String> {
        json_string_list(self.task_warnings.as_ref())
    }

    /// Output dataset names written by the post-job, if any.
    pub fn output_dataset_list(&self) -> Vec<String> {
        json_string_list(self.output_datasets.as_ref())
    }

    /// Scheduler-local path of the working directory, rebased under the
    /// grid home prefix (the last two URL segments identify user and task).
    pub fn webdir_path(&self) -> Option<String> {
        self.user_webdir.as_deref().map(|webdir| {
            let segments: Vec<&str> = webdir.split('/').collect();
            let tail_start = segments.len().saturating_sub(2);
            let mut parts = vec!["/home/grid"];
            parts.extend_from_slice(&segments[tail_start..]);
            parts.join("/")
        })
    }
}

fn json_string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    match value.and_then(|v| v.as_array()) {
        Some(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> TaskRecord {
        TaskRecord {
            task_name: "240101_120000:user_analysis".to_string(),
            task_status: "SUBMITTED".to_string(),
            task_command: None,
            start_time: chrono::DateTime::from_timestamp(1_700_000_000, 0)
                .unwrap()
                .naive_utc(),
            user_webdir: Some("https://schedd.example.org/cms/user/task123".to_string()),
            schedd: Some("schedd01".to_string()),
            username: Some("user".to_string()),
            task_worker: Some("prod-tw01".to_string()),
            split_algo: Some("FileBased".to_string()),
            publication: "T".to_string(),
            input_dataset: Some("/Primary/Processed/TIER".to_string()),
            task_failure: None,
            task_warnings: Some(json!(["quota nearly exceeded"])),
            output_datasets: Some(json!(["/store/user/out1", "/store/user/out2"])),
        }
    }

    #[test]
    fn webdir_path_keeps_last_two_segments() {
        assert_eq!(
            record().webdir_path().unwrap(),
            "/home/grid/user/task123".to_string()
        );
    }

    #[test]
    fn warning_and_dataset_lists_tolerate_missing_values() {
        let mut rec = record();
        assert_eq!(rec.warning_list(), vec!["quota nearly exceeded"]);
        assert_eq!(rec.output_dataset_list().len(), 2);

        rec.task_warnings = None;
        rec.output_datasets = Some(json!("not a list"));
        assert!(rec.warning_list().is_empty());
        assert!(rec.output_dataset_list().is_empty());
    }

    #[test]
    fn pending_command_detection() {
        let mut rec = record();
        assert!(!rec.has_pending_command());
        rec.task_command = Some("KILL".to_string());
        assert!(rec.has_pending_command());
        rec.task_command = Some("SUBMIT".to_string());
        assert!(!rec.has_pending_command());
    }

    #[test]
    fn submission_epoch_matches_start_time() {
        assert_eq!(record().submission_epoch(), 1_700_000_000);
    }
}
