//! Delivery label generation.
//!
//! A request flows through these stages, each of which tags its log lines with the delivery
//! identifier and a `stage` field:
//!
//! - **render**: the identifier is drawn as a Code-128 barcode on the blocking pool. A failed
//!   render does not fail the request; the label carries a placeholder instead.
//! - **store**: the barcode image is written to the scratch store under the identifier.
//! - **compose**: response headers go out immediately and a background task streams the PDF
//!   into a bounded channel that backs the response body.
//! - **cleanup**: the artifact is deleted once the composer is done, whatever the outcome, and
//!   before the body is closed.
//!
//! The whole run is bounded by `labels.generation_timeout`. Expiry before the response is
//! returned is a 500; expiry while streaming terminates the body with an error.

pub mod artifacts;
pub mod barcode;
pub mod document;
pub mod fonts;
pub mod identifier;
pub mod request;

use std::{io, sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use tokio::{sync::mpsc, time::Instant};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, Span, debug, error, info, instrument, warn};

use crate::{
    AppState,
    errors::{Error, Result},
};
use artifacts::{ArtifactGuard, ArtifactStore};
use barcode::BarcodeRenderer;
use document::{
    BarcodeImage, BarcodeSlot, BodySender, LabelSheet, MISSING_BARCODE_PLACEHOLDER, Party, RENDER_FAILED_PLACEHOLDER,
    StreamError,
};
use request::ValidatedLabel;

/// How long a timed-out composer waits to hand the terminating error to the body.
const TIMEOUT_NOTICE_GRACE: Duration = Duration::from_secs(1);

/// A label whose document is still being streamed.
pub struct LabelDownload {
    identifier: String,
    body: Body,
}

impl LabelDownload {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn filename(&self) -> String {
        format!("delivery-label-{}.pdf", self.identifier)
    }
}

impl IntoResponse for LabelDownload {
    fn into_response(self) -> Response {
        let disposition = format!("attachment; filename=\"{}\"", self.filename());
        (
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (header::CONTENT_DISPOSITION, disposition),
                (header::CACHE_CONTROL, "no-store".to_string()),
            ],
            self.body,
        )
            .into_response()
    }
}

/// Run the pipeline for a validated label.
///
/// Returns once the barcode is stored and the composer task is running; the returned body
/// yields the document as it is produced.
#[instrument(skip_all, fields(identifier = tracing::field::Empty))]
pub async fn generate_label(state: &AppState, label: ValidatedLabel) -> Result<LabelDownload> {
    let identifier = identifier::new_delivery_id();
    Span::current().record("identifier", identifier.as_str());

    let settings = &state.config.labels;
    let deadline = Instant::now() + settings.generation_timeout;

    let guard = match render_barcode(state.renderer.clone(), &identifier, deadline).await? {
        Some(png) => Some(store_barcode(state.artifacts.clone(), &identifier, png, deadline).await?),
        None => None,
    };

    let composer = Composer {
        title: settings.title.clone(),
        label,
        identifier: identifier.clone(),
        store: state.artifacts.clone(),
        guard,
        deadline,
    };

    let (tx, rx) = mpsc::channel(settings.stream_buffer);
    tokio::spawn(composer.run(tx).instrument(Span::current()));

    Ok(LabelDownload {
        identifier,
        body: Body::from_stream(ReceiverStream::new(rx)),
    })
}

/// Render the barcode, or `None` if the renderer failed.
async fn render_barcode(renderer: Arc<dyn BarcodeRenderer>, identifier: &str, deadline: Instant) -> Result<Option<Vec<u8>>> {
    let text = identifier.to_string();
    let task = tokio::task::spawn_blocking(move || renderer.render(&text));

    match tokio::time::timeout_at(deadline, task).await {
        Ok(Ok(Ok(png))) => {
            debug!(stage = "render", size = png.len(), "Rendered barcode");
            Ok(Some(png))
        }
        Ok(Ok(Err(e))) => {
            warn!(stage = "render", error = %e, "Barcode rendering failed, label will carry a placeholder");
            Ok(None)
        }
        Ok(Err(e)) => {
            error!(stage = "render", error = %e, "Barcode rendering task failed, label will carry a placeholder");
            Ok(None)
        }
        Err(_) => {
            error!(stage = "render", "Barcode rendering did not finish before the generation deadline");
            Err(Error::Internal {
                operation: "render barcode before the generation deadline".to_string(),
            })
        }
    }
}

/// Write the barcode to the scratch store, handing back the guard that will delete it.
///
/// The write runs as its own task and owns the guard until it finishes. Giving up on it at the
/// deadline leaves the task running; the artifact is deleted once the write is actually done,
/// so a late write can never outlive its cleanup.
async fn store_barcode(store: Arc<dyn ArtifactStore>, identifier: &str, png: Vec<u8>, deadline: Instant) -> Result<ArtifactGuard> {
    let id = identifier.to_string();
    let mut write = tokio::spawn(
        async move {
            // Armed before writing so a partial write is removed too
            let guard = ArtifactGuard::new(store.clone(), id.clone());
            match store.write_artifact(&id, &png).await {
                Ok(()) => Ok(guard),
                Err(e) => {
                    guard.release().await;
                    Err(e)
                }
            }
        }
        .in_current_span(),
    );

    let outcome = tokio::time::timeout_at(deadline, &mut write).await;
    match outcome {
        Ok(Ok(Ok(guard))) => Ok(guard),
        Ok(Ok(Err(e))) => {
            error!(stage = "store", error = %e, "Failed to store barcode artifact");
            Err(e.into())
        }
        Ok(Err(e)) => {
            error!(stage = "store", error = %e, "Barcode storage task failed");
            Err(Error::Internal {
                operation: "store barcode artifact".to_string(),
            })
        }
        Err(_) => {
            error!(stage = "store", "Storing the barcode did not finish before the generation deadline");
            tokio::spawn(
                async move {
                    if let Ok(Ok(guard)) = write.await {
                        guard.release().await;
                    }
                }
                .in_current_span(),
            );
            Err(Error::Internal {
                operation: "store barcode artifact before the generation deadline".to_string(),
            })
        }
    }
}

/// Background task that streams one label and cleans up after it.
struct Composer {
    title: String,
    label: ValidatedLabel,
    identifier: String,
    store: Arc<dyn ArtifactStore>,
    /// `None` when rendering failed and nothing was stored
    guard: Option<ArtifactGuard>,
    deadline: Instant,
}

impl Composer {
    async fn run(mut self, tx: BodySender) {
        let guard = self.guard.take();
        let rendered = guard.is_some();

        let outcome = tokio::time::timeout_at(self.deadline, self.compose(rendered, &tx))
            .await
            .unwrap_or(Err(StreamError::TimedOut));

        // Delete before the body closes so a client that saw the end never races the cleanup
        if let Some(guard) = guard {
            guard.release().await;
        }

        match outcome {
            Ok(bytes) => info!(stage = "compose", bytes, "Delivery label streamed"),
            Err(StreamError::ClientGone { sent }) => {
                warn!(stage = "compose", sent, "Client disconnected before the label was complete")
            }
            Err(StreamError::TimedOut) => {
                error!(stage = "compose", "Label generation exceeded its deadline, terminating the stream");
                let notice = io::Error::new(io::ErrorKind::TimedOut, "label generation timed out");
                if tx.send_timeout(Err(notice), TIMEOUT_NOTICE_GRACE).await.is_err() {
                    debug!(stage = "compose", "Body already closed, timeout notice dropped");
                }
            }
        }
    }

    async fn compose(&self, rendered: bool, tx: &BodySender) -> std::result::Result<usize, StreamError> {
        let barcode = if rendered {
            self.load_barcode().await
        } else {
            BarcodeSlot::Placeholder(RENDER_FAILED_PLACEHOLDER)
        };

        let sheet = LabelSheet {
            title: self.title.clone(),
            sender: Party {
                name: self.label.sender_name.clone(),
                address: self.label.sender_address.clone(),
            },
            receiver: Party {
                name: self.label.receiver_name.clone(),
                address: self.label.receiver_address.clone(),
            },
            identifier: self.identifier.clone(),
            barcode,
        };

        document::stream_label(&sheet, tx).await
    }

    async fn load_barcode(&self) -> BarcodeSlot {
        let bytes = match self.store.read_artifact(&self.identifier).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(stage = "compose", error = %e, "Barcode artifact unavailable, label will carry a placeholder");
                return BarcodeSlot::Placeholder(MISSING_BARCODE_PLACEHOLDER);
            }
        };

        match BarcodeImage::from_png(&bytes) {
            Ok(image) => BarcodeSlot::Image(image),
            Err(e) => {
                warn!(stage = "compose", error = %e, "Barcode artifact unreadable, label will carry a placeholder");
                BarcodeSlot::Placeholder(MISSING_BARCODE_PLACEHOLDER)
            }
        }
    }
}
