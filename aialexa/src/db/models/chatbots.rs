use crate::types::{ChatbotId, UserId};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct ChatbotCreateDBRequest {
    pub user_id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ChatbotDBResponse {
    pub id: ChatbotId,
    pub user_id: UserId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
