//! [`Store`] backed by PostgreSQL.

use crate::db::{
    errors::{DbError, Result},
    handlers::{Chatbots, Files, ProviderConfigs, Repository, UploadIntents, Users, files::FileFilter},
    models::{
        chatbots::ChatbotDBResponse,
        files::{StoredFileCreateDBRequest, StoredFileDBResponse},
        upload_intents::{UploadIntentCreateDBRequest, UploadIntentDBResponse, UploadIntentUpdateDBRequest},
        users::SubscriptionRecord,
    },
    store::Store,
};
use crate::types::{ChatbotId, UploadIntentId, UserId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

/// Key for the per-user transaction-scoped advisory lock guarding file inserts
fn quota_lock_key(user_id: UserId) -> i64 {
    user_id.as_u64_pair().0 as i64
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn subscription(&self, user_id: UserId) -> Result<Option<SubscriptionRecord>> {
        let mut conn = self.pool.acquire().await?;
        Users::new(&mut conn).get_subscription(user_id).await
    }

    async fn count_files(&self, user_id: UserId) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        Files::new(&mut conn).count_for_user(user_id).await
    }

    async fn provider_api_key(&self, user_id: UserId) -> Result<Option<String>> {
        let mut conn = self.pool.acquire().await?;
        ProviderConfigs::new(&mut conn).get_api_key(user_id).await
    }

    async fn list_files(&self, user_id: UserId, limit: i64) -> Result<Vec<StoredFileDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Files::new(&mut conn).list(&FileFilter::new().user_id(user_id).limit(limit)).await
    }

    async fn begin_upload(&self, request: &UploadIntentCreateDBRequest) -> Result<UploadIntentDBResponse> {
        let mut conn = self.pool.acquire().await?;
        UploadIntents::new(&mut conn).create(request).await
    }

    async fn update_upload(&self, id: UploadIntentId, request: &UploadIntentUpdateDBRequest) -> Result<UploadIntentDBResponse> {
        let mut conn = self.pool.acquire().await?;
        UploadIntents::new(&mut conn).update(id, request).await
    }

    #[instrument(skip(self, request), fields(intent_id = %abbrev_uuid(&intent_id), user_id = %abbrev_uuid(&request.user_id)), err)]
    async fn complete_upload(
        &self,
        intent_id: UploadIntentId,
        request: &StoredFileCreateDBRequest,
        max_files: i64,
    ) -> Result<Option<StoredFileDBResponse>> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent uploads of the same user until commit
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(quota_lock_key(request.user_id))
            .execute(&mut *tx)
            .await?;

        // Locks the intent row; a sweeper claim waits for this transaction
        if UploadIntents::new(&mut tx).complete(intent_id).await?.is_none() {
            debug!("Upload intent no longer pending");
            tx.rollback().await?;
            return Err(DbError::StateConflict {
                entity: "Upload intent",
                expected: "pending",
            });
        }

        let count = Files::new(&mut tx).count_for_user(request.user_id).await?;
        if count >= max_files {
            debug!(count, max_files, "Quota exhausted at insert time");
            tx.rollback().await?;
            return Ok(None);
        }

        let file = Files::new(&mut tx).create(request).await?;
        tx.commit().await?;
        Ok(Some(file))
    }

    async fn stale_uploads(&self, older_than: DateTime<Utc>, limit: i64) -> Result<Vec<UploadIntentDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        UploadIntents::new(&mut conn).list_stale(older_than, limit).await
    }

    #[instrument(skip(self), fields(intent_id = %abbrev_uuid(&id)), err)]
    async fn claim_stale_upload(&self, id: UploadIntentId, older_than: DateTime<Utc>) -> Result<Option<UploadIntentDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        UploadIntents::new(&mut conn).claim_stale(id, older_than).await
    }

    async fn get_chatbot(&self, id: ChatbotId) -> Result<Option<ChatbotDBResponse>> {
        let mut conn = self.pool.acquire().await?;
        Chatbots::new(&mut conn).get_by_id(id).await
    }
}
