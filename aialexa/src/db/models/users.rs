//! Database models for users.

use crate::types::UserId;
use chrono::{DateTime, Utc};

/// Database request for creating a new user
#[derive(Debug, Clone, Default)]
pub struct UserCreateDBRequest {
    pub email: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_current_period_end: Option<DateTime<Utc>>,
}

/// Database response for a user
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub email: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The billing fields a subscription plan is resolved from.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct SubscriptionRecord {
    pub stripe_price_id: Option<String>,
    pub stripe_current_period_end: Option<DateTime<Utc>>,
}
