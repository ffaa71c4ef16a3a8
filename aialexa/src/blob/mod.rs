//! Public blob storage for uploaded file bytes.
//!
//! Every object is written under a fresh key of the form `{uuid}/{filename}` so two uploads of
//! the same name never collide, and is publicly readable at the URL the backend returns.
//!
//! - [`LocalBlobStore`]: a directory on disk, served by this service under `/blobs/`
//! - [`S3BlobStore`]: an S3-compatible bucket with `public-read` objects

pub mod local;
pub mod s3;

pub use local::LocalBlobStore;
pub use s3::S3BlobStore;

use crate::config::BlobStorageConfig;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Path under which the local backend's objects are served
pub const LOCAL_BLOB_ROUTE: &str = "/blobs";

#[derive(Debug, Clone)]
pub struct BlobPutRequest {
    /// Original filename; becomes the last key segment
    pub name: String,
    pub content: Bytes,
    pub content_type: String,
}

/// A stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobObject {
    pub key: String,
    /// Public URL of the object
    pub url: String,
}

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("invalid blob key: {0}")]
    InvalidKey(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("blob backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store the bytes under a new unique key and return the object's public URL
    async fn put(&self, request: BlobPutRequest) -> Result<BlobObject, BlobError>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<(), BlobError>;
}

/// Build the configured backend
pub async fn from_config(config: &BlobStorageConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
    Ok(match config {
        BlobStorageConfig::Local { path, public_base_url } => {
            tokio::fs::create_dir_all(path).await?;
            Arc::new(LocalBlobStore::new(path.clone(), public_base_url.clone()))
        }
        BlobStorageConfig::S3 { .. } => Arc::new(S3BlobStore::from_config(config).await?),
    })
}

/// Make a filename safe to use as one key segment
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "file".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// A fresh object key for `name`
pub fn object_key(name: &str) -> String {
    format!("{}/{}", uuid::Uuid::new_v4().simple(), sanitize_name(name))
}

/// Reject keys that could escape their prefix
fn validate_key(key: &str) -> Result<(), BlobError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad {
        Err(BlobError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

/// Append `prefix` and the key's segments to `base`, percent-encoding each segment
fn public_url(base: &Url, prefix: &[&str], key: &str) -> Result<String, BlobError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| BlobError::Backend(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(prefix)
        .extend(key.split('/'));
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_keeps_original_name() {
        let key = object_key("notes.pdf");
        let (prefix, name) = key.split_once('/').unwrap();
        assert_eq!(prefix.len(), 32);
        assert_eq!(name, "notes.pdf");
        assert_ne!(object_key("notes.pdf"), key);
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_name(".."), "file");
        assert_eq!(sanitize_name("a\\b.txt"), "a_b.txt");
        assert_eq!(sanitize_name("  spaced name.md "), "spaced name.md");
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("abc/notes.pdf").is_ok());
        for key in ["", "/abs", "a/../b", "a//b", "a\\b", ".."] {
            assert!(validate_key(key).is_err(), "{key} should be rejected");
        }
    }

    #[test]
    fn test_public_url_encodes_segments() {
        let base = Url::parse("https://cdn.example.com/assets/").unwrap();
        let url = public_url(&base, &[], "abc/my notes.pdf").unwrap();
        assert_eq!(url, "https://cdn.example.com/assets/abc/my%20notes.pdf");

        let base = Url::parse("http://localhost:3001").unwrap();
        let url = public_url(&base, &["blobs"], "abc/a.txt").unwrap();
        assert_eq!(url, "http://localhost:3001/blobs/abc/a.txt");
    }
}
