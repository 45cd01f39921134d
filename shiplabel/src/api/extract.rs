use axum::{
    Form, Json,
    extract::{FromRequest, Request},
    http::header,
};
use serde::de::DeserializeOwned;

use crate::errors::Error;

/// How a request body was encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Json,
    Form,
}

/// Body extractor accepting either `application/json` or `application/x-www-form-urlencoded`.
///
/// Anything that is not declared as JSON is parsed as a form. Bodies that cannot be parsed are
/// rejected as validation errors (400).
#[derive(Debug)]
pub struct JsonOrForm<T> {
    pub payload: T,
    pub kind: PayloadKind,
}

fn is_json(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_json(&req) {
            let Json(payload) = Json::<T>::from_request(req, state).await.map_err(|e| Error::Validation {
                message: e.body_text(),
            })?;
            Ok(Self {
                payload,
                kind: PayloadKind::Json,
            })
        } else {
            let Form(payload) = Form::<T>::from_request(req, state).await.map_err(|e| Error::Validation {
                message: e.body_text(),
            })?;
            Ok(Self {
                payload,
                kind: PayloadKind::Form,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Probe {
        name: String,
        note: Option<String>,
    }

    async fn extract(content_type: &str, body: &'static str) -> Result<JsonOrForm<Probe>, Error> {
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        JsonOrForm::<Probe>::from_request(req, &()).await
    }

    #[tokio::test]
    async fn test_json_body() {
        let extracted = extract("application/json; charset=utf-8", r#"{"name":"a","note":"b"}"#)
            .await
            .unwrap();
        assert_eq!(extracted.kind, PayloadKind::Json);
        assert_eq!(extracted.payload.name, "a");
        assert_eq!(extracted.payload.note.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_form_body() {
        let extracted = extract("application/x-www-form-urlencoded", "name=Jane+Doe&note=")
            .await
            .unwrap();
        assert_eq!(extracted.kind, PayloadKind::Form);
        assert_eq!(extracted.payload.name, "Jane Doe");
        assert_eq!(extracted.payload.note.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_unparseable_bodies_are_validation_errors() {
        let err = extract("application/json", "{not json").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let err = extract("text/plain", "whatever").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
