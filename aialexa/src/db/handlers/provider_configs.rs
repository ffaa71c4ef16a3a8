use crate::db::{errors::Result, models::provider_configs::ProviderConfigDBResponse};
use crate::types::UserId;
use sqlx::PgConnection;

pub struct ProviderConfigs<'c> {
    db: &'c mut PgConnection,
}

impl<'c> ProviderConfigs<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    pub async fn get(&mut self, user_id: UserId) -> Result<Option<ProviderConfigDBResponse>> {
        let config = sqlx::query_as::<_, ProviderConfigDBResponse>("SELECT * FROM provider_configs WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(config)
    }

    /// The user's provider API key. Blank keys count as missing.
    pub async fn get_api_key(&mut self, user_id: UserId) -> Result<Option<String>> {
        Ok(self
            .get(user_id)
            .await?
            .and_then(|config| config.global_api_key)
            .filter(|key| !key.trim().is_empty()))
    }

    pub async fn upsert_api_key(&mut self, user_id: UserId, api_key: Option<&str>) -> Result<ProviderConfigDBResponse> {
        let config = sqlx::query_as::<_, ProviderConfigDBResponse>(
            r#"
            INSERT INTO provider_configs (user_id, global_api_key)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET global_api_key = EXCLUDED.global_api_key, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(api_key)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(config)
    }
}
