//! Database models for upload intents (the upload outbox).

use crate::types::{UploadIntentId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `error` of an intent a sweeper has claimed but not finished
pub const SWEEP_CLAIM_ERROR: &str = "claimed by sweeper";

/// Lifecycle of an upload intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UploadIntentStatus {
    /// Side effects may be in flight
    Pending,
    /// The file row exists; nothing left to do
    Completed,
    /// Every recorded side effect was undone
    Compensated,
    /// Undoing failed; the sweeper retries
    Failed,
}

impl UploadIntentStatus {
    /// Whether the sweeper should still look at intents in this state
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

/// Database request for recording an upload before any side effect happens
#[derive(Debug, Clone)]
pub struct UploadIntentCreateDBRequest {
    pub user_id: UserId,
    pub filename: String,
}

/// Partial update. `None` fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct UploadIntentUpdateDBRequest {
    pub status: Option<UploadIntentStatus>,
    pub blob_key: Option<String>,
    pub blob_url: Option<String>,
    pub provider_file_id: Option<String>,
    pub error: Option<String>,
}

impl UploadIntentUpdateDBRequest {
    pub fn status(status: UploadIntentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn blob(key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            blob_key: Some(key.into()),
            blob_url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn provider_file(id: impl Into<String>) -> Self {
        Self {
            provider_file_id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Database response for an upload intent
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UploadIntentDBResponse {
    pub id: UploadIntentId,
    pub user_id: UserId,
    pub filename: String,
    pub status: UploadIntentStatus,
    pub blob_key: Option<String>,
    pub blob_url: Option<String>,
    pub provider_file_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
