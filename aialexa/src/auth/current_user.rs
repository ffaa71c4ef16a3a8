//! Request extractor for the authenticated [`Session`].

use crate::{
    AppState,
    auth::session::{self, Session},
    config::Config,
    errors::{Error, Result},
};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use tracing::{debug, instrument, trace};

/// Find the session cookie among the request's `Cookie` headers.
fn session_cookie<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Resolve the caller from a session cookie, falling back to a bearer token.
///
/// A present but invalid cookie does not hide a valid bearer token.
pub fn authenticate(headers: &HeaderMap, config: &Config) -> Result<Session> {
    let cookie = session_cookie(headers, &config.auth.session.cookie_name);
    let bearer = config.auth.session.allow_bearer.then(|| bearer_token(headers)).flatten();

    let mut last_error = None;
    for (source, token) in [("cookie", cookie), ("bearer", bearer)] {
        let Some(token) = token else { continue };
        match session::verify_session_token(token, config) {
            Ok(session) => {
                debug!(user_id = %session.user_id, source, "Authenticated session");
                return Ok(session);
            }
            Err(e) => {
                trace!(source, "Session token rejected: {:?}", e);
                last_error = Some(e);
            }
        }
    }

    // Configuration problems surface as 500s; everything else is a plain 403
    match last_error {
        Some(e @ Error::Internal { .. }) => Err(e),
        _ => Err(Error::Unauthorized),
    }
}

impl FromRequestParts<AppState> for Session {
    type Rejection = Error;

    #[instrument(skip_all)]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        authenticate(&parts.headers, &state.config)
    }
}
