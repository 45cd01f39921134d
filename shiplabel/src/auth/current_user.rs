use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use serde::Serialize;
use tracing::{instrument, trace};

use crate::{
    AppState,
    auth::session,
    config::Config,
    errors::{Error, Result},
};

/// The logged-in user behind a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub username: String,
}

/// Extract user from the session cookie if present and valid
/// Returns:
/// - None: No usable session cookie present
/// - Some(Ok(user)): Valid token found and verified
/// - Some(Err(error)): Cookie header present but unreadable, or token verification hit a server fault
fn try_session_auth(parts: &Parts, config: &Config) -> Option<Result<CurrentUser>> {
    let cookie_header = parts.headers.get(header::COOKIE)?;

    let cookie_str = match cookie_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::Unauthenticated {
                message: Some(format!("Invalid cookie header: {e}")),
            }));
        }
    };
    let cookie_name = &config.auth.session.cookie_name;

    for cookie in cookie_str.split(';') {
        let Some((name, value)) = cookie.trim().split_once('=') else {
            continue;
        };
        if name != cookie_name {
            continue;
        }
        match session::verify_session_token(value, config) {
            Ok(user) => return Some(Ok(user)),
            // Expired or forged tokens are routine; keep looking
            Err(Error::Unauthenticated { .. }) => continue,
            Err(e) => return Some(Err(e)),
        }
    }
    None
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match try_session_auth(parts, &state.config) {
            Some(result) => result,
            None => {
                trace!("No session cookie presented");
                Err(Error::Unauthenticated { message: None })
            }
        }
    }
}

impl OptionalFromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Option<Self>> {
        match try_session_auth(parts, &state.config) {
            Some(Ok(user)) => Ok(Some(user)),
            Some(Err(Error::Unauthenticated { .. })) | None => Ok(None),
            Some(Err(e)) => Err(e),
        }
    }
}
