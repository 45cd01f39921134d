//! Test utilities shared by unit and HTTP tests.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum_test::{TestResponse, TestServer};
use bytes::Bytes;

use crate::{
    AppState,
    auth::{
        current_user::CurrentUser,
        password::{self, fast_params},
        session,
        users::InMemoryUsers,
    },
    build_router,
    config::{Config, UserAccount},
    labels::{
        artifacts::{ArtifactError, ArtifactStore, FsArtifactStore, InMemoryArtifactStore},
        barcode::{BarcodeRenderer, Code128Renderer, RenderError},
    },
    templates,
};

pub const TEST_USERNAME: &str = "dispatch";
pub const TEST_PASSWORD: &str = "correct horse battery staple";

pub fn create_test_config() -> Config {
    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        secret_key: Some("test-secret-key-for-sessions".to_string()),
        users: vec![UserAccount {
            username: TEST_USERNAME.to_string(),
            password_hash: password::hash_string_with_params(TEST_PASSWORD, fast_params()).expect("Failed to hash test password"),
        }],
        ..Default::default()
    };

    let params = fast_params();
    config.auth.password.argon2_memory_kib = params.memory_kib;
    config.auth.password.argon2_iterations = params.iterations;
    config.auth.password.argon2_parallelism = params.parallelism;
    config.auth.session.cookie_secure = false;
    config
}

pub async fn create_test_state_with(config: Config, artifacts: Arc<dyn ArtifactStore>, renderer: Arc<dyn BarcodeRenderer>) -> AppState {
    let users = InMemoryUsers::from_config(&config).await.expect("Failed to seed test users");

    AppState::builder()
        .config(config)
        .users(Arc::new(users))
        .artifacts(artifacts)
        .renderer(renderer)
        .templates(Arc::new(templates::environment().expect("Failed to build templates")))
        .build()
}

pub fn create_test_server_from(state: AppState) -> TestServer {
    TestServer::new(build_router(state)).expect("Failed to create test server")
}

/// Test server backed by an in-memory scratch store and the real renderer.
pub async fn create_test_server() -> (TestServer, AppState) {
    let state = create_test_state_with(
        create_test_config(),
        Arc::new(InMemoryArtifactStore::new()),
        Arc::new(Code128Renderer::default()),
    )
    .await;
    (create_test_server_from(state.clone()), state)
}

/// `name=token` pair for a `Cookie` header carrying a valid session.
pub fn session_cookie_for(username: &str, config: &Config) -> String {
    let user = CurrentUser {
        username: username.to_string(),
    };
    let token = session::create_session_token(&user, config).expect("Failed to create session token");
    format!("{}={}", config.auth.session.cookie_name, token)
}

/// Poll `condition` for up to two seconds.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}

/// Check the overall structure of a streamed label: header, trailer, and that every
/// cross-reference entry points at the object it names. Returns the object count.
pub fn assert_valid_pdf(pdf: &[u8]) -> usize {
    assert!(pdf.starts_with(b"%PDF-1.7\n"), "missing PDF header");
    assert!(pdf.ends_with(b"%%EOF\n"), "missing EOF marker");

    let marker = b"startxref\n";
    let marker_at = pdf
        .windows(marker.len())
        .rposition(|window| window == marker)
        .expect("missing startxref");
    let tail = std::str::from_utf8(&pdf[marker_at + marker.len()..]).expect("non-UTF-8 trailer");
    let xref_offset: usize = tail.lines().next().unwrap().parse().expect("bad startxref offset");

    let xref = std::str::from_utf8(&pdf[xref_offset..]).expect("non-UTF-8 xref table");
    let mut lines = xref.split('\n');
    assert_eq!(lines.next(), Some("xref"));
    let subsection = lines.next().unwrap();
    let size: usize = subsection.strip_prefix("0 ").expect("bad xref subsection").parse().unwrap();
    assert_eq!(lines.next(), Some("0000000000 65535 f\r"));

    for id in 1..size {
        let entry = lines.next().expect("truncated xref table");
        assert_eq!(entry.len(), 19, "xref entry {id} must be 20 bytes");
        assert!(entry.ends_with(" 00000 n\r"));
        let offset: usize = entry[..10].parse().unwrap();
        let expected = format!("{id} 0 obj");
        assert!(
            pdf[offset..].starts_with(expected.as_bytes()),
            "xref entry {id} points at the wrong bytes"
        );
    }

    assert_eq!(lines.next(), Some("trailer"));
    assert!(xref.contains(&format!("/Size {size}")));
    assert!(xref.contains("/Root 1 0 R"));

    size - 1
}

/// Delivery identifier named in a label response's `Content-Disposition`.
pub fn disposition_identifier(response: &TestResponse) -> String {
    let disposition = response
        .headers()
        .get(axum::http::header::CONTENT_DISPOSITION)
        .expect("missing Content-Disposition")
        .to_str()
        .unwrap();
    disposition
        .strip_prefix("attachment; filename=\"delivery-label-")
        .and_then(|rest| rest.strip_suffix(".pdf\""))
        .expect("unexpected Content-Disposition")
        .to_string()
}

/// Renderer that always fails.
pub struct FailingRenderer;

impl BarcodeRenderer for FailingRenderer {
    fn render(&self, _text: &str) -> Result<Vec<u8>, RenderError> {
        Err(RenderError::Encode("injected failure".to_string()))
    }
}

/// Real renderer that takes its time and counts invocations.
pub struct SlowRenderer {
    delay: Duration,
    calls: AtomicUsize,
    inner: Code128Renderer,
}

impl SlowRenderer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
            inner: Code128Renderer::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BarcodeRenderer for SlowRenderer {
    fn render(&self, text: &str) -> Result<Vec<u8>, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.inner.render(text)
    }
}

/// Store that accepts writes but never has anything to read back.
#[derive(Default)]
pub struct ForgetfulStore {
    writes: AtomicUsize,
    deletes: AtomicUsize,
}

impl ForgetfulStore {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for ForgetfulStore {
    async fn write_artifact(&self, _id: &str, _bytes: &[u8]) -> Result<(), ArtifactError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read_artifact(&self, id: &str) -> Result<Bytes, ArtifactError> {
        Err(ArtifactError::NotFound { id: id.to_string() })
    }

    async fn delete_artifact(&self, _id: &str) -> Result<(), ArtifactError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear_all(&self) -> Result<usize, ArtifactError> {
        Ok(0)
    }
}

/// In-memory store whose reads stall.
pub struct SlowReadStore {
    inner: InMemoryArtifactStore,
    delay: Duration,
}

impl SlowReadStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryArtifactStore::new(),
            delay,
        }
    }

    pub fn inner(&self) -> &InMemoryArtifactStore {
        &self.inner
    }
}

#[async_trait]
impl ArtifactStore for SlowReadStore {
    async fn write_artifact(&self, id: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
        self.inner.write_artifact(id, bytes).await
    }

    async fn read_artifact(&self, id: &str) -> Result<Bytes, ArtifactError> {
        tokio::time::sleep(self.delay).await;
        self.inner.read_artifact(id).await
    }

    async fn delete_artifact(&self, id: &str) -> Result<(), ArtifactError> {
        self.inner.delete_artifact(id).await
    }

    async fn clear_all(&self) -> Result<usize, ArtifactError> {
        self.inner.clear_all().await
    }
}

/// Filesystem store whose writes land on disk only after a delay, on the blocking pool.
///
/// Like `tokio::fs::write`, a write that has started keeps going even if its future is dropped.
pub struct SlowWriteStore {
    inner: FsArtifactStore,
    delay: Duration,
    writes: Arc<AtomicUsize>,
}

impl SlowWriteStore {
    pub fn new(dir: impl Into<std::path::PathBuf>, delay: Duration) -> Self {
        Self {
            inner: FsArtifactStore::new(dir),
            delay,
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Writes that have reached the disk.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for SlowWriteStore {
    async fn write_artifact(&self, id: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
        let path = self.inner.dir().join(format!("{id}.png"));
        let bytes = bytes.to_vec();
        let delay = self.delay;
        let writes = self.writes.clone();

        let written = tokio::task::spawn_blocking(move || -> Result<(), ArtifactError> {
            std::thread::sleep(delay);
            std::fs::write(&path, bytes).map_err(|source| ArtifactError::Io {
                path: path.display().to_string(),
                source,
            })?;
            writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        written.map_err(|e| ArtifactError::Io {
            path: self.inner.dir().display().to_string(),
            source: std::io::Error::other(e),
        })?
    }

    async fn read_artifact(&self, id: &str) -> Result<Bytes, ArtifactError> {
        self.inner.read_artifact(id).await
    }

    async fn delete_artifact(&self, id: &str) -> Result<(), ArtifactError> {
        self.inner.delete_artifact(id).await
    }

    async fn clear_all(&self) -> Result<usize, ArtifactError> {
        self.inner.clear_all().await
    }
}
