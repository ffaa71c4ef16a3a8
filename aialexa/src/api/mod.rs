//! HTTP surface.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: request and response bodies
//!
//! Routes:
//!
//! - `GET /api`: greeting, readable from any origin
//! - `POST /api/upload`: asset ingestion
//! - `GET /api/files`: the caller's ingested files
//! - `GET /chatbot/{chatbot_id}/chat`: full-page chat embed
//!
//! OpenAPI documentation is served at `/docs`.

pub mod handlers;
pub mod models;
