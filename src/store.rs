//! # Task Metadata Store
//!
//! The database seam of the aggregation core. The aggregator talks to the
//! store only through [`TaskMetadataStore`], so tests can substitute an
//! in-memory implementation; production code uses [`PgTaskStore`], which
//! delegates to the model query methods.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::StatusError;
use crate::models::{FileMetadataRecord, FileReportRecord, TaskRecord};

/// Query interface over the persistent task/job metadata store.
#[async_trait]
pub trait TaskMetadataStore: Send + Sync {
    /// Look up a task record by name. `None` means no such task.
    async fn find_task(&self, task_name: &str) -> Result<Option<TaskRecord>, StatusError>;

    /// File-level metadata rows for a task, restricted by file type, with
    /// an optional row limit.
    async fn file_metadata(
        &self,
        task_name: &str,
        file_types: &[&str],
        limit: Option<i64>,
    ) -> Result<Vec<FileMetadataRecord>, StatusError>;

    /// Processing report rows for a task: per-file run/lumi ranges and
    /// event counts, over output and input file types.
    async fn file_report(&self, task_name: &str) -> Result<Vec<FileReportRecord>, StatusError>;

    /// Per-file publication state distribution for a task as
    /// `(numeric state code, row count)` pairs.
    async fn publication_state_counts(
        &self,
        task_name: &str,
        username: &str,
    ) -> Result<Vec<(i16, i64)>, StatusError>;
}

/// Postgres-backed store used in production.
#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskMetadataStore for PgTaskStore {
    async fn find_task(&self, task_name: &str) -> Result<Option<TaskRecord>, StatusError> {
        Ok(TaskRecord::find_by_name(&self.pool, task_name).await?)
    }

    async fn file_metadata(
        &self,
        task_name: &str,
        file_types: &[&str],
        limit: Option<i64>,
    ) -> Result<Vec<FileMetadataRecord>, StatusError> {
        Ok(
            FileMetadataRecord::for_task_and_types(&self.pool, task_name, file_types, limit)
                .await?,
        )
    }

    async fn file_report(&self, task_name: &str) -> Result<Vec<FileReportRecord>, StatusError> {
        Ok(FileReportRecord::for_task(&self.pool, task_name).await?)
    }

    async fn publication_state_counts(
        &self,
        task_name: &str,
        username: &str,
    ) -> Result<Vec<(i16, i64)>, StatusError> {
        let sql = r"
            SELECT publication_state, COUNT(*)
            FROM transfer_files
            WHERE task_name = $1 AND username = $2
            GROUP BY publication_state
        ";
        let rows = sqlx::query_as::<_, (i16, i64)>(sql)
            .bind(task_name)
            .bind(username)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
