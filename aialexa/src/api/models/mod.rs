//! API request and response data models.
//!
//! Kept separate from [`crate::db::models`] so storage and wire formats can change
//! independently. All models carry `utoipa` annotations for the OpenAPI document.

pub mod files;
