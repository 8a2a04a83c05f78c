//! # File Metadata Model
//!
//! Per-file metadata rows uploaded by the post-job after stage-out. The
//! status API exposes these for log and output retrieval, filtered by file
//! type with an optional row limit.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FileMetadataRecord {
    pub job_id: i32,
    pub file_type: String,
    pub lfn: String,
    pub location: Option<String>,
    pub tmp_lfn: Option<String>,
    pub tmp_location: Option<String>,
    pub direct_stageout: bool,
    pub size_bytes: i64,
    pub cksum: Option<String>,
    pub adler32: Option<String>,
}

/// File types that enter the per-job processing report: job outputs plus
/// the input files the job read.
pub const REPORT_FILE_TYPES: &[&str] = &["EDM", "TFILE", "FAKE", "POOLIN"];

/// Per-file processing report row: what a job read or produced, with the
/// run/lumi ranges and event counts the post-job uploaded. Clients combine
/// these into the task report without further server-side processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FileReportRecord {
    pub job_id: i32,
    pub file_type: String,
    pub lfn: String,
    pub parents: Option<serde_json::Value>,
    pub run_lumi: Option<serde_json::Value>,
    pub events: i64,
}

impl FileReportRecord {
    /// Fetch every report row for a task, covering output and input file
    /// types.
    pub async fn for_task(
        pool: &PgPool,
        task_name: &str,
    ) -> Result<Vec<FileReportRecord>, sqlx::Error> {
        let sql = r"
            SELECT job_id, file_type, lfn, parents, run_lumi, events
            FROM file_metadata
            WHERE task_name = $1 AND file_type = ANY($2)
            ORDER BY job_id
        ";
        let types: Vec<String> = REPORT_FILE_TYPES.iter().map(|t| t.to_string()).collect();
        sqlx::query_as::<_, FileReportRecord>(sql)
            .bind(task_name)
            .bind(&types)
            .fetch_all(pool)
            .await
    }
}

impl FileMetadataRecord {
    /// Fetch the file metadata rows for a task, restricted to the given
    /// file types. `limit` of `None` returns all matching rows.
    pub async fn for_task_and_types(
        pool: &PgPool,
        task_name: &str,
        file_types: &[&str],
        limit: Option<i64>,
    ) -> Result<Vec<FileMetadataRecord>, sqlx::Error> {
        let sql = r"
            SELECT job_id, file_type, lfn, location, tmp_lfn, tmp_location,
                   direct_stageout, size_bytes, cksum, adler32
            FROM file_metadata
            WHERE task_name = $1 AND file_type = ANY($2)
            ORDER BY job_id
            LIMIT $3
        ";
        let types: Vec<String> = file_types.iter().map(|t| t.to_string()).collect();
        sqlx::query_as::<_, FileMetadataRecord>(sql)
            .bind(task_name)
            .bind(&types)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
