//! Persistence for files, upload intents, users and chatbots.
//!
//! ```text
//! ┌──────────────────┐
//! │  Store (trait)   │  what the upload pipeline and handlers call
//! └───┬──────────┬───┘
//!     │          │
//!     ↓          ↓
//! ┌────────┐ ┌───────────────┐
//! │PgStore │ │ InMemoryStore │  (tests and the `test-utils` feature)
//! └───┬────┘ └───────────────┘
//!     ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers, one per table)
//! └──────┬──────┘
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! Migrations live in `migrations/` and are embedded with [`crate::migrator`].

pub mod errors;
pub mod handlers;
#[cfg(any(test, feature = "test-utils"))]
pub mod in_memory;
pub mod models;
pub mod postgres;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub use in_memory::InMemoryStore;
pub use postgres::PgStore;
pub use store::Store;
