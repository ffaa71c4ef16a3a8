use crate::types::UserId;
use chrono::{DateTime, Utc};

/// Per-user LLM provider settings
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProviderConfigDBResponse {
    pub user_id: UserId,
    pub global_api_key: Option<String>,
    pub updated_at: DateTime<Utc>,
}
