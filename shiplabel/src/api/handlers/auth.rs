use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use minijinja::context;

use crate::{
    AppState,
    api::{
        extract::JsonOrForm,
        models::auth::{LoginRequest, LoginResponse, LoginSuccess, LogoutResponse},
    },
    auth::{current_user::CurrentUser, password, session},
    errors::Error,
    templates,
};

const INVALID_CREDENTIALS: &str = "Invalid username or password";

fn invalid_credentials() -> Error {
    Error::Unauthenticated {
        message: Some(INVALID_CREDENTIALS.to_string()),
    }
}

/// Show the login form, or skip straight to the label form when already signed in.
#[tracing::instrument(skip_all)]
pub async fn login_page(State(state): State<AppState>, user: Option<CurrentUser>) -> Result<Response, Error> {
    if user.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    let page = templates::render(&state.templates, templates::LOGIN_PAGE, context! { title => &state.config.labels.title })?;
    Ok(page.into_response())
}

/// Check credentials and start a session
#[tracing::instrument(skip_all, fields(username = %request.payload.username))]
pub async fn login(State(state): State<AppState>, request: JsonOrForm<LoginRequest>) -> Result<LoginResponse, Error> {
    let JsonOrForm { payload: request, kind } = request;

    // Unknown users and wrong passwords are indistinguishable to the caller
    let record = state.users.find_by_username(&request.username).await.ok_or_else(invalid_credentials)?;

    if !password::verify_in_background(request.password, record.password_hash).await? {
        return Err(invalid_credentials());
    }

    let user = CurrentUser {
        username: record.username,
    };
    let token = session::create_session_token(&user, &state.config)?;
    let cookie = session::session_cookie(&token, &state.config);
    tracing::info!("User signed in");

    Ok(LoginResponse {
        kind,
        body: LoginSuccess {
            username: user.username,
            message: "Login successful".to_string(),
        },
        cookie,
    })
}

/// End the session
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> LogoutResponse {
    LogoutResponse {
        cookie: session::expired_session_cookie(&state.config),
    }
}
