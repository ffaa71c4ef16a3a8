use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::upload_intents::{
        SWEEP_CLAIM_ERROR, UploadIntentCreateDBRequest, UploadIntentDBResponse, UploadIntentStatus,
        UploadIntentUpdateDBRequest,
    },
};
use crate::types::{UploadIntentId, UserId};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;

/// Filter for listing upload intents
#[derive(Debug, Clone, Default)]
pub struct UploadIntentFilter {
    pub user_id: Option<UserId>,
    pub status: Option<UploadIntentStatus>,
}

pub struct UploadIntents<'c> {
    db: &'c mut PgConnection,
}

impl<'c> UploadIntents<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Apply a partial update and bump `updated_at`.
    pub async fn update(&mut self, id: UploadIntentId, request: &UploadIntentUpdateDBRequest) -> Result<UploadIntentDBResponse> {
        let intent = sqlx::query_as::<_, UploadIntentDBResponse>(
            r#"
            UPDATE upload_intents SET
                status = COALESCE($2, status),
                blob_key = COALESCE($3, blob_key),
                blob_url = COALESCE($4, blob_url),
                provider_file_id = COALESCE($5, provider_file_id),
                error = COALESCE($6, error),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.status)
        .bind(&request.blob_key)
        .bind(&request.blob_url)
        .bind(&request.provider_file_id)
        .bind(&request.error)
        .fetch_optional(&mut *self.db)
        .await?;

        intent.ok_or(DbError::NotFound)
    }

    /// Move a pending intent to `completed`. `None` when it is not pending anymore.
    pub async fn complete(&mut self, id: UploadIntentId) -> Result<Option<UploadIntentDBResponse>> {
        let intent = sqlx::query_as::<_, UploadIntentDBResponse>(
            r#"
            UPDATE upload_intents SET status = 'completed', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(intent)
    }

    /// Take a stale open intent for compensation.
    ///
    /// The intent becomes `failed` with a fresh `updated_at`, so a racing upload can no longer
    /// complete it and other sweepers skip it until it goes stale again. `None` when the intent
    /// was completed, compensated or touched since `older_than`.
    pub async fn claim_stale(&mut self, id: UploadIntentId, older_than: DateTime<Utc>) -> Result<Option<UploadIntentDBResponse>> {
        let intent = sqlx::query_as::<_, UploadIntentDBResponse>(
            r#"
            UPDATE upload_intents SET status = 'failed', error = $3, updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'failed') AND updated_at < $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(older_than)
        .bind(SWEEP_CLAIM_ERROR)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(intent)
    }

    /// Open intents (pending or failed) not touched since `older_than`, oldest first
    pub async fn list_stale(&mut self, older_than: DateTime<Utc>, limit: i64) -> Result<Vec<UploadIntentDBResponse>> {
        let intents = sqlx::query_as::<_, UploadIntentDBResponse>(
            r#"
            SELECT * FROM upload_intents
            WHERE status IN ('pending', 'failed') AND updated_at < $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(intents)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for UploadIntents<'c> {
    type CreateRequest = UploadIntentCreateDBRequest;
    type Response = UploadIntentDBResponse;
    type Id = UploadIntentId;
    type Filter = UploadIntentFilter;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let intent = sqlx::query_as::<_, UploadIntentDBResponse>(
            "INSERT INTO upload_intents (user_id, filename, status) VALUES ($1, $2, 'pending') RETURNING *",
        )
        .bind(request.user_id)
        .bind(&request.filename)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(intent)
    }

    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let intent = sqlx::query_as::<_, UploadIntentDBResponse>("SELECT * FROM upload_intents WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(intent)
    }

    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = sqlx::QueryBuilder::new("SELECT * FROM upload_intents WHERE 1=1");
        if let Some(user_id) = filter.user_id {
            query.push(" AND user_id = ");
            query.push_bind(user_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ");
            query.push_bind(status);
        }
        query.push(" ORDER BY created_at DESC");

        let intents = query.build_query_as::<UploadIntentDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(intents)
    }
}
