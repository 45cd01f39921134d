use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use minijinja::context;

use crate::{
    AppState,
    api::extract::JsonOrForm,
    auth::current_user::CurrentUser,
    errors::Error,
    labels::{self, LabelDownload, request::LabelRequest},
    templates,
};

/// The label form for signed-in users; everyone else is sent to the login page.
#[tracing::instrument(skip_all)]
pub async fn label_form(State(state): State<AppState>, user: Option<CurrentUser>) -> Result<Response, Error> {
    let Some(user) = user else {
        return Ok(Redirect::to("/login").into_response());
    };

    let page = templates::render(
        &state.templates,
        templates::LABEL_FORM_PAGE,
        context! { title => &state.config.labels.title, username => user.username },
    )?;
    Ok(page.into_response())
}

/// Generate a delivery label and stream it back as a PDF attachment
#[tracing::instrument(skip_all, fields(username = %user.username))]
pub async fn generate_label(
    State(state): State<AppState>,
    user: CurrentUser,
    request: JsonOrForm<LabelRequest>,
) -> Result<LabelDownload, Error> {
    let label = request.payload.validate().inspect_err(|e| {
        tracing::info!(stage = "validate", error = %e, "Rejected label request");
    })?;

    labels::generate_label(&state, label).await
}
