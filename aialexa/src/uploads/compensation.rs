//! Undoing the external side effects of an upload.

use crate::{blob::BlobStore, provider::LlmProvider};
use tracing::{info, warn};

/// Side effects known to have completed for one upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideEffects {
    pub blob_key: Option<String>,
    pub provider_file_id: Option<String>,
}

/// Delete the provider file, then the blob. Returns a description of every step that failed.
///
/// Without an API key the provider file cannot be removed. That counts as a failure, so the
/// intent stays open and is retried once the owner configures a key.
pub async fn undo_side_effects(
    blobs: &dyn BlobStore,
    provider: &dyn LlmProvider,
    api_key: Option<&str>,
    done: &SideEffects,
) -> Vec<String> {
    let mut failures = Vec::new();

    if let Some(file_id) = &done.provider_file_id {
        match api_key {
            Some(key) => match provider.delete_file(key, file_id).await {
                Ok(()) => info!(%file_id, "Deleted provider file"),
                Err(e) => failures.push(format!("delete provider file {file_id}: {e}")),
            },
            None => {
                warn!(%file_id, "No API key available, leaving provider file in place");
                failures.push(format!("delete provider file {file_id}: no API key configured"));
            }
        }
    }

    if let Some(key) = &done.blob_key {
        match blobs.delete(key).await {
            Ok(()) => info!(%key, "Deleted blob"),
            Err(e) => failures.push(format!("delete blob {key}: {e}")),
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingBlobStore, RecordingProvider};

    fn done() -> SideEffects {
        SideEffects {
            blob_key: Some("abc/notes.md".to_string()),
            provider_file_id: Some("file-1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_undo_deletes_both() {
        let blobs = RecordingBlobStore::default();
        let provider = RecordingProvider::default();

        let failures = undo_side_effects(&blobs, &provider, Some("sk"), &done()).await;
        assert!(failures.is_empty());
        assert_eq!(provider.deleted(), vec![("sk".to_string(), "file-1".to_string())]);
        assert_eq!(blobs.deleted(), vec!["abc/notes.md".to_string()]);
    }

    #[tokio::test]
    async fn test_undo_reports_every_failure() {
        let blobs = RecordingBlobStore::default();
        let provider = RecordingProvider::default();
        blobs.fail_delete(true);
        provider.fail_delete(true);

        let failures = undo_side_effects(&blobs, &provider, Some("sk"), &done()).await;
        assert_eq!(failures.len(), 2);
        assert!(failures[0].starts_with("delete provider file file-1"));
        assert!(failures[1].starts_with("delete blob abc/notes.md"));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_a_failure() {
        let blobs = RecordingBlobStore::default();
        let provider = RecordingProvider::default();

        let failures = undo_side_effects(&blobs, &provider, None, &done()).await;
        assert_eq!(failures, vec!["delete provider file file-1: no API key configured".to_string()]);
        assert!(provider.deleted().is_empty());
        // The blob is still removed
        assert_eq!(blobs.deleted(), vec!["abc/notes.md".to_string()]);
    }

    #[tokio::test]
    async fn test_nothing_to_undo() {
        let blobs = RecordingBlobStore::default();
        let provider = RecordingProvider::default();

        assert!(undo_side_effects(&blobs, &provider, None, &SideEffects::default()).await.is_empty());
        assert!(blobs.deleted().is_empty());
    }
}
