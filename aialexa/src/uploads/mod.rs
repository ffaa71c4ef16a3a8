//! Asset ingestion: validation and the blob / provider / database side effects.
//!
//! The upload handler runs the checks in a fixed order and only then calls [`ingest`]:
//!
//! 1. session (the [`Session`] extractor)
//! 2. quota, [`check_quota`]
//! 3. a `file` part, its filename and extension, and a request body, [`validate_file`]
//! 4. the user's provider API key, [`require_api_key`]
//!
//! [`ingest`] records an upload intent before touching anything external, then writes the blob,
//! registers the file with the provider and inserts the file row. A failure after any side
//! effect undoes the completed ones in reverse order. Intents that never reach a final state
//! (crash, compensation failure) are picked up by the [`sweeper`].

pub mod compensation;
pub mod extensions;
pub mod sweeper;

use crate::{
    AppState,
    auth::session::Session,
    blob::{BlobObject, BlobPutRequest},
    db::models::{
        files::{StoredFileCreateDBRequest, StoredFileDBResponse},
        upload_intents::{UploadIntentCreateDBRequest, UploadIntentStatus, UploadIntentUpdateDBRequest},
    },
    errors::{Error, Result},
    provider::{ProviderFile, ProviderFileRequest},
    subscription::{SubscriptionPlan, resolve_plan},
    types::{UploadIntentId, abbrev_uuid},
};
use bytes::Bytes;
use chrono::Utc;
use compensation::{SideEffects, undo_side_effects};
use extensions::AllowedExtensions;
use metrics::counter;
use tracing::{debug, error, info, instrument, warn};

pub const MISSING_FILENAME: &str = "Missing filename";
pub const INVALID_EXTENSION: &str = "Invalid file extension, check the documentation for more information.";
pub const MISSING_BODY: &str = "Missing body";
pub const MISSING_API_KEY: &str = "Missing OpenAI API key. Add your API key in the Settings tab.";

/// The `file` part of an upload request, as received
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub content: Bytes,
}

/// A file that passed every content check
#[derive(Debug, Clone)]
pub struct ValidatedFile {
    pub filename: String,
    pub content_type: String,
    pub content: Bytes,
}

fn record_outcome(outcome: &'static str) {
    counter!("aialexa_uploads_total", "outcome" => outcome).increment(1);
}

/// Resolve the caller's plan and make sure it allows one more file
#[instrument(skip_all, fields(user_id = %abbrev_uuid(&session.user_id)), err)]
pub async fn check_quota(state: &AppState, session: &Session) -> Result<SubscriptionPlan> {
    let record = state.store.subscription(session.user_id).await?;
    let plan = resolve_plan(&state.config.subscriptions, record.as_ref(), Utc::now());
    let count = state.store.count_files(session.user_id).await?;

    if count >= plan.max_files {
        info!(plan = %plan.id, paid = plan.is_paid, count, max_files = plan.max_files, "File quota reached");
        record_outcome("quota_exceeded");
        return Err(Error::QuotaExceeded);
    }
    debug!(plan = %plan.id, paid = plan.is_paid, count, max_files = plan.max_files, "Quota allows upload");
    Ok(plan)
}

/// Check presence, filename and extension of the uploaded file, then that the request had a
/// body, in that order. An empty `file` part is a valid upload.
pub fn validate_file(allowed: &AllowedExtensions, file: Option<UploadedFile>, request_has_body: bool) -> Result<ValidatedFile> {
    let bad_request = |message: &str| {
        record_outcome("rejected");
        Error::BadRequest {
            message: message.to_string(),
        }
    };

    let Some(file) = file else {
        record_outcome("rejected");
        return Err(Error::NoFile);
    };

    let filename = match file.filename {
        Some(name) if !name.is_empty() => name,
        _ => return Err(bad_request(MISSING_FILENAME)),
    };

    if !allowed.allows(&filename) {
        return Err(bad_request(INVALID_EXTENSION));
    }

    if !request_has_body {
        return Err(bad_request(MISSING_BODY));
    }

    let content_type = file
        .content_type
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream")
        .unwrap_or_else(|| mime_guess::from_path(&filename).first_or_octet_stream().to_string());

    Ok(ValidatedFile {
        filename,
        content_type,
        content: file.content,
    })
}

/// The caller's provider API key, or the 400 telling them to configure one
pub async fn require_api_key(state: &AppState, session: &Session) -> Result<String> {
    match state.store.provider_api_key(session.user_id).await? {
        Some(key) => Ok(key),
        None => {
            record_outcome("rejected");
            Err(Error::BadRequest {
                message: MISSING_API_KEY.to_string(),
            })
        }
    }
}

/// Perform the side effects for a validated upload and return the stored file
#[instrument(
    skip_all,
    fields(user_id = %abbrev_uuid(&session.user_id), filename = %file.filename, size = file.content.len(), intent_id = tracing::field::Empty),
    err
)]
pub async fn ingest(
    state: &AppState,
    session: &Session,
    plan: &SubscriptionPlan,
    file: ValidatedFile,
    api_key: &str,
) -> Result<StoredFileDBResponse> {
    let intent = state
        .store
        .begin_upload(&UploadIntentCreateDBRequest {
            user_id: session.user_id,
            filename: file.filename.clone(),
        })
        .await?;
    tracing::Span::current().record("intent_id", abbrev_uuid(&intent.id).as_str());

    let mut done = SideEffects::default();
    match perform_side_effects(state, session, plan, intent.id, file, api_key, &mut done).await {
        Ok(stored) => {
            info!(file_id = %abbrev_uuid(&stored.id), "Upload ingested");
            record_outcome("success");
            Ok(stored)
        }
        Err(e) => {
            warn!("Upload failed after intent was recorded, compensating: {}", e);
            finish_failed_upload(state, intent.id, Some(api_key), &done, &e).await;
            record_outcome(if matches!(e, Error::QuotaExceeded) {
                "quota_exceeded"
            } else {
                "failed"
            });
            Err(e)
        }
    }
}

async fn perform_side_effects(
    state: &AppState,
    session: &Session,
    plan: &SubscriptionPlan,
    intent_id: UploadIntentId,
    file: ValidatedFile,
    api_key: &str,
    done: &mut SideEffects,
) -> Result<StoredFileDBResponse> {
    let BlobObject { key, url } = state
        .blobs
        .put(BlobPutRequest {
            name: file.filename.clone(),
            content: file.content.clone(),
            content_type: file.content_type.clone(),
        })
        .await
        .map_err(|e| Error::Upstream {
            operation: "store blob".to_string(),
            message: e.to_string(),
        })?;
    done.blob_key = Some(key.clone());
    state
        .store
        .update_upload(intent_id, &UploadIntentUpdateDBRequest::blob(&key, &url))
        .await?;

    let ProviderFile { id: provider_file_id, .. } = state
        .provider
        .create_file(
            api_key,
            ProviderFileRequest {
                filename: file.filename.clone(),
                content: file.content,
                content_type: file.content_type,
            },
        )
        .await
        .map_err(|e| Error::Upstream {
            operation: "register file with provider".to_string(),
            message: e.to_string(),
        })?;
    done.provider_file_id = Some(provider_file_id.clone());
    state
        .store
        .update_upload(intent_id, &UploadIntentUpdateDBRequest::provider_file(&provider_file_id))
        .await?;

    let request = StoredFileCreateDBRequest {
        user_id: session.user_id,
        name: file.filename,
        blob_url: url,
        provider_file_id,
    };
    state
        .store
        .complete_upload(intent_id, &request, plan.max_files)
        .await?
        .ok_or(Error::QuotaExceeded)
}

/// Undo what was done and leave the intent in its final (or retryable) state
async fn finish_failed_upload(state: &AppState, intent_id: UploadIntentId, api_key: Option<&str>, done: &SideEffects, cause: &Error) {
    let failures = undo_side_effects(state.blobs.as_ref(), state.provider.as_ref(), api_key, done).await;

    let update = if failures.is_empty() {
        UploadIntentUpdateDBRequest::status(UploadIntentStatus::Compensated).with_error(cause.to_string())
    } else {
        error!(?failures, "Compensation incomplete, leaving intent for the sweeper");
        UploadIntentUpdateDBRequest::status(UploadIntentStatus::Failed)
            .with_error(format!("{cause}; compensation: {}", failures.join("; ")))
    };

    if let Err(e) = state.store.update_upload(intent_id, &update).await {
        error!(intent_id = %abbrev_uuid(&intent_id), "Failed to record upload compensation: {:#}", e);
    }
}
