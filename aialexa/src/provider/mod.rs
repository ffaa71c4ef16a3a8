//! The external LLM provider's files API.
//!
//! Uploaded files are registered with the provider so its retrieval and code interpreter tools
//! can use them. Calls are made with the uploading user's own API key.

pub mod openai;

pub use openai::OpenAiProvider;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;

/// Purpose sent with every file registration
pub const ASSISTANTS_PURPOSE: &str = "assistants";

#[derive(Debug, Clone)]
pub struct ProviderFileRequest {
    pub filename: String,
    pub content: Bytes,
    pub content_type: String,
}

/// A file resource held by the provider
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderFile {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub bytes: Option<u64>,
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid provider URL: {0}")]
    InvalidUrl(String),
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Register a file with `purpose = assistants`
    async fn create_file(&self, api_key: &str, request: ProviderFileRequest) -> Result<ProviderFile, ProviderError>;

    /// Remove a previously registered file. A file the provider no longer knows counts as deleted.
    async fn delete_file(&self, api_key: &str, file_id: &str) -> Result<(), ProviderError>;
}
