use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::api::extract::PayloadKind;

/// Credentials submitted to `POST /login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSuccess {
    pub username: String,
    pub message: String,
}

/// Successful login. Browsers posting the form are sent to the label form; JSON clients get a
/// JSON body. Both receive the session cookie.
pub struct LoginResponse {
    pub kind: PayloadKind,
    pub body: LoginSuccess,
    pub cookie: String,
}

impl IntoResponse for LoginResponse {
    fn into_response(self) -> Response {
        match self.kind {
            PayloadKind::Json => (StatusCode::OK, [(header::SET_COOKIE, self.cookie)], Json(self.body)).into_response(),
            PayloadKind::Form => (
                StatusCode::SEE_OTHER,
                [(header::SET_COOKIE, self.cookie), (header::LOCATION, "/".to_string())],
            )
                .into_response(),
        }
    }
}

/// Clears the session cookie and sends the browser back to the login page.
pub struct LogoutResponse {
    pub cookie: String,
}

impl IntoResponse for LogoutResponse {
    fn into_response(self) -> Response {
        (
            StatusCode::SEE_OTHER,
            [(header::SET_COOKIE, self.cookie), (header::LOCATION, "/login".to_string())],
        )
            .into_response()
    }
}
