//! The relational store as seen by the rest of the service.

use crate::db::{
    errors::Result,
    models::{
        chatbots::ChatbotDBResponse,
        files::{StoredFileCreateDBRequest, StoredFileDBResponse},
        upload_intents::{UploadIntentCreateDBRequest, UploadIntentDBResponse, UploadIntentUpdateDBRequest},
        users::SubscriptionRecord,
    },
};
use crate::types::{ChatbotId, UploadIntentId, UserId};
use chrono::{DateTime, Utc};

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Billing fields of a user. `None` for users the store does not know.
    async fn subscription(&self, user_id: UserId) -> Result<Option<SubscriptionRecord>>;

    async fn count_files(&self, user_id: UserId) -> Result<i64>;

    /// The user's provider API key, `None` when unset or blank
    async fn provider_api_key(&self, user_id: UserId) -> Result<Option<String>>;

    /// Files owned by `user_id`, newest first
    async fn list_files(&self, user_id: UserId, limit: i64) -> Result<Vec<StoredFileDBResponse>>;

    /// Record a new upload in the `pending` state
    async fn begin_upload(&self, request: &UploadIntentCreateDBRequest) -> Result<UploadIntentDBResponse>;

    async fn update_upload(&self, id: UploadIntentId, request: &UploadIntentUpdateDBRequest) -> Result<UploadIntentDBResponse>;

    /// Insert the file row and mark the intent completed, atomically.
    ///
    /// Returns `None` without writing anything when the user already holds `max_files` files,
    /// and [`DbError::StateConflict`](crate::db::errors::DbError::StateConflict) when the intent
    /// is no longer pending (a sweeper claimed it).
    async fn complete_upload(
        &self,
        intent_id: UploadIntentId,
        request: &StoredFileCreateDBRequest,
        max_files: i64,
    ) -> Result<Option<StoredFileDBResponse>>;

    /// Pending or failed intents untouched since `older_than`, oldest first
    async fn stale_uploads(&self, older_than: DateTime<Utc>, limit: i64) -> Result<Vec<UploadIntentDBResponse>>;

    /// Claim a stale open intent for compensation, see
    /// [`UploadIntents::claim_stale`](crate::db::handlers::UploadIntents::claim_stale).
    async fn claim_stale_upload(&self, id: UploadIntentId, older_than: DateTime<Utc>) -> Result<Option<UploadIntentDBResponse>>;

    async fn get_chatbot(&self, id: ChatbotId) -> Result<Option<ChatbotDBResponse>>;
}
