//! HTTP layer.
//!
//! - **[`handlers`]**: axum route handlers for the login pages and label generation
//! - **[`models`]**: request and response types
//! - **[`extract`]**: body extraction shared by the handlers
//!
//! # Routes
//!
//! - `GET /login`, `POST /login`, `POST /logout`: session management
//! - `GET /`: the label form (redirects anonymous visitors to `/login`)
//! - `POST /generate-label`: streams a PDF delivery label; requires a session
//! - `GET /healthz`: liveness

pub mod extract;
pub mod handlers;
pub mod models;
