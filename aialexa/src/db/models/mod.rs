//! Database record models matching table schemas.
//!
//! Each table has a `*CreateDBRequest` used for inserts and a `*DBResponse` deriving
//! `sqlx::FromRow` for query results. API representations live in [`crate::api::models`]
//! and convert from these with `From`.
//!
//! - [`users`]: account email and the subscription fields plans are resolved from
//! - [`provider_configs`]: per-user LLM provider API key
//! - [`files`]: ingested files (blob + provider file)
//! - [`upload_intents`]: outbox records for in-flight uploads
//! - [`chatbots`]: chatbots the embed page is rendered for

pub mod chatbots;
pub mod files;
pub mod provider_configs;
pub mod upload_intents;
pub mod users;
