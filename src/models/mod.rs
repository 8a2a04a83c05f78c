//! Data layer: read-only row types loaded from the task metadata store.

pub mod file_metadata;
pub mod task_record;

pub use file_metadata::{FileMetadataRecord, FileReportRecord};
pub use task_record::TaskRecord;
