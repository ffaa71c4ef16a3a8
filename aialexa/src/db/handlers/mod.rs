//! Repository implementations for database access.
//!
//! Each repository wraps a `&mut PgConnection` (a pooled connection or an open transaction)
//! and returns models from [`crate::db::models`]:
//!
//! ```ignore
//! use aialexa::db::handlers::{Files, Repository};
//!
//! let mut tx = pool.begin().await?;
//! let count = Files::new(&mut tx).count_for_user(user_id).await?;
//! tx.commit().await?;
//! ```

pub mod chatbots;
pub mod files;
pub mod provider_configs;
pub mod repository;
pub mod upload_intents;
pub mod users;

pub use chatbots::Chatbots;
pub use files::Files;
pub use provider_configs::ProviderConfigs;
pub use repository::Repository;
pub use upload_intents::UploadIntents;
pub use users::Users;
