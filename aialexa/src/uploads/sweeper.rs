//! Background cleanup of abandoned uploads.
//!
//! ```text
//! sweeper.tick()
//!   ├─ DB: stale_uploads()              // pending/failed, untouched for `stale_after`
//!   └─ for each intent:
//!        ├─ DB: claim_stale_upload()    // pending/failed -> failed, skip if someone else moved it
//!        ├─ DB: provider_api_key()      // the owner's key, needed to delete the provider file
//!        ├─ provider.delete_file()      // when a provider file id was recorded
//!        ├─ blobs.delete()              // when a blob key was recorded
//!        └─ DB: update_upload()         // compensated, or failed + error for the next pass
//! ```
//!
//! The claim is a conditional update. Once it succeeds the upload that wrote the intent can no
//! longer complete it, and other replicas skip it until it goes stale again. Deletes are
//! idempotent, so a retry after a partial failure is harmless.

use super::compensation::{SideEffects, undo_side_effects};
use crate::{
    blob::BlobStore,
    config::SweeperConfig,
    db::{
        Store,
        models::upload_intents::{UploadIntentDBResponse, UploadIntentStatus, UploadIntentUpdateDBRequest},
    },
    provider::LlmProvider,
    types::abbrev_uuid,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub compensated: usize,
    pub failed: usize,
    /// Intents completed or claimed elsewhere between listing and claiming
    pub skipped: usize,
}

enum SweepOutcome {
    Compensated,
    Failed,
    Skipped,
}

pub struct UploadSweeper {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    provider: Arc<dyn LlmProvider>,
    config: SweeperConfig,
}

impl UploadSweeper {
    pub fn new(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>, provider: Arc<dyn LlmProvider>, config: SweeperConfig) -> Self {
        Self {
            store,
            blobs,
            provider,
            config,
        }
    }

    /// Sweep every `interval` until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval = ?self.config.interval,
            stale_after = ?self.config.stale_after,
            "Upload sweeper started"
        );
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Upload sweeper shutting down");
                    return;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// Run one sweep.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> SweepReport {
        let stale_after = chrono::Duration::from_std(self.config.stale_after).unwrap_or_else(|_| chrono::Duration::minutes(15));
        let cutoff = Utc::now() - stale_after;

        let intents = match self.store.stale_uploads(cutoff, self.config.batch_size).await {
            Ok(intents) => intents,
            Err(e) => {
                warn!(error = %e, "Failed to load stale upload intents");
                return SweepReport::default();
            }
        };

        if intents.is_empty() {
            debug!("No stale upload intents");
            return SweepReport::default();
        }

        let mut report = SweepReport::default();
        for intent in intents {
            match self.sweep_one(&intent, cutoff).await {
                SweepOutcome::Compensated => report.compensated += 1,
                SweepOutcome::Failed => report.failed += 1,
                SweepOutcome::Skipped => report.skipped += 1,
            }
        }

        counter!("aialexa_upload_intents_swept_total", "outcome" => "compensated").increment(report.compensated as u64);
        counter!("aialexa_upload_intents_swept_total", "outcome" => "failed").increment(report.failed as u64);
        info!(
            compensated = report.compensated,
            failed = report.failed,
            skipped = report.skipped,
            "Swept stale upload intents"
        );
        report
    }

    async fn sweep_one(&self, listed: &UploadIntentDBResponse, cutoff: DateTime<Utc>) -> SweepOutcome {
        let intent_id = abbrev_uuid(&listed.id);

        let intent = match self.store.claim_stale_upload(listed.id, cutoff).await {
            Ok(Some(intent)) => intent,
            Ok(None) => {
                debug!(%intent_id, "Upload intent moved on before it was claimed");
                return SweepOutcome::Skipped;
            }
            Err(e) => {
                warn!(%intent_id, error = %e, "Failed to claim upload intent");
                return SweepOutcome::Failed;
            }
        };

        let api_key = if intent.provider_file_id.is_some() {
            match self.store.provider_api_key(intent.user_id).await {
                Ok(key) => key,
                Err(e) => {
                    warn!(%intent_id, error = %e, "Failed to load API key for sweep, retrying later");
                    return SweepOutcome::Failed;
                }
            }
        } else {
            None
        };

        let done = SideEffects {
            blob_key: intent.blob_key.clone(),
            provider_file_id: intent.provider_file_id.clone(),
        };
        let failures = undo_side_effects(self.blobs.as_ref(), self.provider.as_ref(), api_key.as_deref(), &done).await;

        let (update, outcome) = if failures.is_empty() {
            (
                UploadIntentUpdateDBRequest::status(UploadIntentStatus::Compensated),
                SweepOutcome::Compensated,
            )
        } else {
            warn!(%intent_id, ?failures, "Sweep could not fully compensate upload");
            (
                UploadIntentUpdateDBRequest::status(UploadIntentStatus::Failed).with_error(failures.join("; ")),
                SweepOutcome::Failed,
            )
        };

        // The claim left the intent `failed`, so a failed write here still gets retried
        match self.store.update_upload(intent.id, &update).await {
            Ok(_) => outcome,
            Err(e) => {
                warn!(%intent_id, error = %e, "Failed to record sweep result");
                SweepOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{
            InMemoryStore,
            errors::DbError,
            models::{
                files::StoredFileCreateDBRequest,
                upload_intents::{UploadIntentCreateDBRequest, UploadIntentDBResponse},
            },
        },
        test_utils::{RecordingBlobStore, RecordingProvider, TEST_API_KEY},
    };
    use std::time::Duration;
    use uuid::Uuid;

    struct Harness {
        store: Arc<InMemoryStore>,
        blobs: Arc<RecordingBlobStore>,
        provider: Arc<RecordingProvider>,
        sweeper: UploadSweeper,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let blobs = Arc::new(RecordingBlobStore::default());
        let provider = Arc::new(RecordingProvider::default());
        let sweeper = UploadSweeper::new(
            store.clone(),
            blobs.clone(),
            provider.clone(),
            SweeperConfig {
                enabled: true,
                interval: Duration::from_millis(10),
                stale_after: Duration::from_secs(15 * 60),
                batch_size: 10,
            },
        );
        Harness {
            store,
            blobs,
            provider,
            sweeper,
        }
    }

    /// An intent that got as far as the provider registration
    async fn abandoned(h: &Harness, user_id: Uuid, age: chrono::Duration) -> UploadIntentDBResponse {
        let intent = h
            .store
            .begin_upload(&UploadIntentCreateDBRequest {
                user_id,
                filename: "notes.md".to_string(),
            })
            .await
            .unwrap();
        let key = format!("{}/notes.md", Uuid::new_v4().simple());
        h.blobs.insert(&key, b"# notes");
        h.store
            .update_upload(intent.id, &UploadIntentUpdateDBRequest::blob(&key, &format!("https://blobs.test/{key}")))
            .await
            .unwrap();
        h.store
            .update_upload(intent.id, &UploadIntentUpdateDBRequest::provider_file("file-abandoned"))
            .await
            .unwrap();
        h.store.backdate_intent(intent.id, age);
        intent
    }

    #[test_log::test(tokio::test)]
    async fn test_compensates_stale_and_leaves_fresh() {
        let h = harness();
        let user = Uuid::new_v4();
        h.store.set_api_key(user, TEST_API_KEY);

        let stale = abandoned(&h, user, chrono::Duration::hours(1)).await;
        let fresh = abandoned(&h, user, chrono::Duration::zero()).await;

        let report = h.sweeper.tick().await;
        assert_eq!(
            report,
            SweepReport {
                compensated: 1,
                ..Default::default()
            }
        );

        let intents = h.store.intents();
        let status = |id: Uuid| intents.iter().find(|i| i.id == id).unwrap().status;
        assert_eq!(status(stale.id), UploadIntentStatus::Compensated);
        assert_eq!(status(fresh.id), UploadIntentStatus::Pending);

        assert_eq!(h.provider.deleted(), vec![(TEST_API_KEY.to_string(), "file-abandoned".to_string())]);
        assert_eq!(h.blobs.deleted().len(), 1);
        assert_eq!(h.blobs.objects().len(), 1);

        // Nothing left to do
        assert_eq!(h.sweeper.tick().await, SweepReport::default());
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_sweep_is_retried() {
        let h = harness();
        let user = Uuid::new_v4();
        h.store.set_api_key(user, TEST_API_KEY);
        let intent = abandoned(&h, user, chrono::Duration::hours(1)).await;

        h.blobs.fail_delete(true);
        assert_eq!(
            h.sweeper.tick().await,
            SweepReport {
                failed: 1,
                ..Default::default()
            }
        );
        let swept = h.store.intents().into_iter().find(|i| i.id == intent.id).unwrap();
        assert_eq!(swept.status, UploadIntentStatus::Failed);
        assert!(swept.error.is_some());

        // The failure touched updated_at; age it again for the next pass
        h.store.backdate_intent(intent.id, chrono::Duration::hours(1));
        h.blobs.fail_delete(false);
        assert_eq!(
            h.sweeper.tick().await,
            SweepReport {
                compensated: 1,
                ..Default::default()
            }
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_without_api_key_intent_stays_failed() {
        let h = harness();
        let user = Uuid::new_v4();
        let intent = abandoned(&h, user, chrono::Duration::hours(1)).await;

        assert_eq!(
            h.sweeper.tick().await,
            SweepReport {
                failed: 1,
                ..Default::default()
            }
        );
        assert!(h.provider.deleted().is_empty());
        assert_eq!(h.blobs.deleted().len(), 1);
        let swept = h.store.intents().into_iter().find(|i| i.id == intent.id).unwrap();
        assert_eq!(swept.status, UploadIntentStatus::Failed);
        assert!(swept.error.unwrap().contains("no API key configured"));

        // Once the owner configures a key the provider file is cleaned up
        h.store.set_api_key(user, TEST_API_KEY);
        h.store.backdate_intent(intent.id, chrono::Duration::hours(1));
        assert_eq!(h.sweeper.tick().await.compensated, 1);
        assert_eq!(h.provider.deleted(), vec![(TEST_API_KEY.to_string(), "file-abandoned".to_string())]);
    }

    #[test_log::test(tokio::test)]
    async fn test_swept_intent_cannot_complete() {
        let h = harness();
        let user = Uuid::new_v4();
        h.store.set_api_key(user, TEST_API_KEY);
        let intent = abandoned(&h, user, chrono::Duration::hours(1)).await;

        assert_eq!(h.sweeper.tick().await.compensated, 1);

        // The upload that wrote the intent finishes after the sweep
        let request = StoredFileCreateDBRequest {
            user_id: user,
            name: "notes.md".to_string(),
            blob_url: "https://blobs.test/notes.md".to_string(),
            provider_file_id: "file-abandoned".to_string(),
        };
        let err = h.store.complete_upload(intent.id, &request, 5).await.unwrap_err();
        assert!(matches!(err, DbError::StateConflict { .. }));
        assert!(h.store.files().is_empty());
        assert_eq!(h.store.intents()[0].status, UploadIntentStatus::Compensated);
    }

    #[test_log::test(tokio::test)]
    async fn test_completed_intent_is_skipped() {
        let h = harness();
        let user = Uuid::new_v4();
        let intent = abandoned(&h, user, chrono::Duration::hours(1)).await;
        let listed = h
            .store
            .stale_uploads(Utc::now() - chrono::Duration::minutes(15), 10)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        // Completed between the listing and the claim
        let request = StoredFileCreateDBRequest {
            user_id: user,
            name: "notes.md".to_string(),
            blob_url: "https://blobs.test/notes.md".to_string(),
            provider_file_id: "file-abandoned".to_string(),
        };
        h.store.complete_upload(intent.id, &request, 5).await.unwrap().unwrap();

        let cutoff = Utc::now() - chrono::Duration::minutes(15);
        assert!(matches!(h.sweeper.sweep_one(&listed[0], cutoff).await, SweepOutcome::Skipped));
        assert!(h.blobs.deleted().is_empty());
        assert!(h.provider.deleted().is_empty());
        assert_eq!(h.store.files().len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_run_stops_on_shutdown() {
        let h = harness();
        let user = Uuid::new_v4();
        h.store.set_api_key(user, TEST_API_KEY);
        abandoned(&h, user, chrono::Duration::hours(1)).await;
        let store = h.store.clone();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(h.sweeper.run(shutdown.clone()));

        // The first tick fires immediately
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.intents()[0].status != UploadIntentStatus::Compensated {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
