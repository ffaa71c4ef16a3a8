//! Database models for ingested files.

use crate::types::{FileId, UserId};
use chrono::{DateTime, Utc};

/// Database request for recording an ingested file.
///
/// Only built once both the blob object and the provider file exist.
#[derive(Debug, Clone)]
pub struct StoredFileCreateDBRequest {
    pub user_id: UserId,
    /// Original filename as uploaded
    pub name: String,
    pub blob_url: String,
    pub provider_file_id: String,
}

/// Database response for an ingested file
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredFileDBResponse {
    pub id: FileId,
    pub user_id: UserId,
    pub name: String,
    pub blob_url: String,
    pub provider_file_id: String,
    pub created_at: DateTime<Utc>,
}
