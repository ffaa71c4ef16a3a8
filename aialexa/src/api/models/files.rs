use crate::db::models::files::StoredFileDBResponse;
use crate::types::FileId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Body of a successful upload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    /// Public URL of the stored blob
    pub url: String,
}

/// Query parameters for listing files
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListFilesQuery {
    /// Maximum number of files to return (1-1000, default 100)
    #[param(default = 100, minimum = 1, maximum = 1000)]
    pub limit: Option<i64>,
}

/// An ingested file
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileResponse {
    #[schema(value_type = String, format = Uuid)]
    pub id: FileId,
    /// Original filename
    pub name: String,
    /// Public blob URL
    pub url: String,
    /// Id of the file at the LLM provider
    pub provider_file_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<StoredFileDBResponse> for FileResponse {
    fn from(file: StoredFileDBResponse) -> Self {
        Self {
            id: file.id,
            name: file.name,
            url: file.blob_url,
            provider_file_id: file.provider_file_id,
            created_at: file.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileListResponse {
    pub data: Vec<FileResponse>,
}
