use crate::db::{
    errors::Result,
    handlers::repository::Repository,
    models::users::{SubscriptionRecord, UserCreateDBRequest, UserDBResponse},
};
use crate::types::UserId;
use sqlx::PgConnection;

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub email: Option<String>,
    pub limit: Option<i64>,
}

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// The billing fields of a user, or `None` when the user is unknown
    pub async fn get_subscription(&mut self, id: UserId) -> Result<Option<SubscriptionRecord>> {
        let record = sqlx::query_as::<_, SubscriptionRecord>(
            "SELECT stripe_price_id, stripe_current_period_end FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(record)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            INSERT INTO users (
                email, stripe_customer_id, stripe_subscription_id, stripe_price_id, stripe_current_period_end
            )
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&request.email)
        .bind(&request.stripe_customer_id)
        .bind(&request.stripe_subscription_id)
        .bind(&request.stripe_price_id)
        .bind(request.stripe_current_period_end)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user)
    }

    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = sqlx::QueryBuilder::new("SELECT * FROM users WHERE 1=1");
        if let Some(email) = &filter.email {
            query.push(" AND email = ");
            query.push_bind(email);
        }
        query.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ");
            query.push_bind(limit);
        }

        let users = query.build_query_as::<UserDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(users)
    }
}
