//! Session authentication.
//!
//! Sessions are issued by the external auth service as HS256 JWTs signed with the shared
//! `secret_key`. This service never creates users or logs anyone in; it only verifies the
//! token and turns it into a [`session::Session`] handlers receive as an explicit extractor:
//!
//! ```ignore
//! use aialexa::auth::session::Session;
//!
//! async fn handler(session: Session) -> String {
//!     format!("hello {}", session.email)
//! }
//! ```
//!
//! The token is read from the configured session cookie, or from `Authorization: Bearer`
//! when `auth.session.allow_bearer` is set. Anything else is rejected with
//! [`crate::errors::Error::Unauthorized`].

pub mod current_user;
pub mod session;
