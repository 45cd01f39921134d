//! # shiplabel: delivery labels on demand
//!
//! `shiplabel` is a small authenticated web service. A signed-in user fills in sender and
//! receiver details and receives a printable PDF delivery label carrying a freshly minted
//! delivery identifier, both as text and as a Code-128 barcode.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum). Every request to
//! `POST /generate-label` runs through the [`labels`] pipeline: the identifier is drawn as a
//! barcode on the blocking pool, parked in a scratch store, and a background task streams the
//! PDF into the response body one object at a time. The barcode image is deleted once the
//! document has been streamed, whether or not the client stayed to receive it.
//!
//! Collaborators are injected through [`AppState`] rather than reached for globally: the user
//! directory ([`auth::users::UserLookup`]), the scratch store
//! ([`labels::artifacts::ArtifactStore`]) and the barcode renderer
//! ([`labels::barcode::BarcodeRenderer`]). Tests swap in in-memory and failing doubles.
//!
//! Sessions are stateless JWT cookies (see [`auth`]); there is no database.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use shiplabel::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = shiplabel::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     shiplabel::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod labels;
pub mod telemetry;
pub mod templates;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use bon::Builder;
use minijinja::Environment;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};

use crate::{
    auth::users::{InMemoryUsers, UserLookup},
    labels::{
        artifacts::{ArtifactStore, FsArtifactStore},
        barcode::{BarcodeRenderer, Code128Renderer},
    },
};

pub use config::Config;

/// Shared state handed to every handler.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserLookup>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub renderer: Arc<dyn BarcodeRenderer>,
    pub templates: Arc<Environment<'static>>,
}

/// Assemble the routes, trace layer and state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/", get(api::handlers::labels::label_form))
        .route("/login", get(api::handlers::auth::login_page).post(api::handlers::auth::login))
        .route("/logout", post(api::handlers::auth::logout))
        .route("/generate-label", post(api::handlers::labels::generate_label))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// A fully wired service, ready to serve.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting shiplabel with configuration: {:#?}", config);

        let users = InMemoryUsers::from_config(&config).await?;

        // Anything left in the scratch directory was orphaned by a previous run
        let artifacts = FsArtifactStore::new(&config.labels.scratch_dir);
        let removed = artifacts.clear_all().await?;
        if removed > 0 {
            info!("Removed {} orphaned barcode artifact(s) from {}", removed, artifacts.dir().display());
        }

        let state = AppState::builder()
            .users(Arc::new(users))
            .artifacts(Arc::new(artifacts))
            .renderer(Arc::new(Code128Renderer::from(&config.labels.barcode)))
            .templates(Arc::new(templates::environment()?))
            .config(config.clone())
            .build();

        Ok(Self {
            router: build_router(state),
            config,
        })
    }

    /// Convert to a test server for integration testing
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "shiplabel listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
