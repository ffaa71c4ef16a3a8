//! HTTP request handlers.
//!
//! - [`hello`]: the `GET /api` greeting
//! - [`upload`]: asset ingestion
//! - [`files`]: listing ingested files
//! - [`embed`]: the chat embed page
//!
//! Handlers that need a user take [`crate::auth::session::Session`] as an argument and return
//! [`crate::errors::Error`], which renders the status codes and bodies clients rely on.

pub mod embed;
pub mod files;
pub mod hello;
pub mod upload;
