use crate::db::{
    errors::Result,
    handlers::repository::Repository,
    models::chatbots::{ChatbotCreateDBRequest, ChatbotDBResponse},
};
use crate::types::{ChatbotId, UserId};
use sqlx::PgConnection;

#[derive(Debug, Clone, Default)]
pub struct ChatbotFilter {
    pub user_id: Option<UserId>,
}

pub struct Chatbots<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Chatbots<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Chatbots<'c> {
    type CreateRequest = ChatbotCreateDBRequest;
    type Response = ChatbotDBResponse;
    type Id = ChatbotId;
    type Filter = ChatbotFilter;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let chatbot = sqlx::query_as::<_, ChatbotDBResponse>(
            "INSERT INTO chatbots (user_id, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(request.user_id)
        .bind(&request.name)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(chatbot)
    }

    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let chatbot = sqlx::query_as::<_, ChatbotDBResponse>("SELECT * FROM chatbots WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(chatbot)
    }

    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let chatbots = sqlx::query_as::<_, ChatbotDBResponse>(
            "SELECT * FROM chatbots WHERE ($1::uuid IS NULL OR user_id = $1) ORDER BY created_at DESC",
        )
        .bind(filter.user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(chatbots)
    }
}
