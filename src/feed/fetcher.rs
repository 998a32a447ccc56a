use crate::feed::source::{Source, SourceKind};
use crate::util::{validate_feed_url, UrlValidationError};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Default cap on a single feed document.
pub const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Stand-in expiry for deadlines too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Errors that can occur while retrieving one source.
///
/// Every variant is local to its source: the batch carries on and the
/// aggregator reports it as a diagnostic.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Source path is not a usable HTTP(S) URL
    #[error("{0}")]
    InvalidUrl(#[from] UrlValidationError),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// File source could not be read (missing, permissions, ...)
    #[error("Failed to read {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The retrieval task ended without reporting a result
    #[error("Retrieval task ended without a result")]
    Aborted,
}

/// What one source produced within the batch deadline.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Raw document bytes.
    Bytes(Vec<u8>),
    /// No bytes before the shared deadline.
    TimedOut,
    /// Retrieval failed.
    Failed(FetchError),
}

/// Abstraction over retrieving a source's raw bytes, enabling testability.
#[async_trait]
pub trait Retrieve: Send + Sync {
    async fn retrieve(&self, source: &Source) -> Result<Vec<u8>, FetchError>;
}

/// Production [`Retrieve`]: HTTP GET for URLs, file reads under a storage root.
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
    storage_root: PathBuf,
    max_feed_bytes: usize,
}

impl Transport {
    pub fn new(storage_root: impl Into<PathBuf>, max_feed_bytes: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::with_client(client, storage_root, max_feed_bytes))
    }

    pub fn with_client(
        client: reqwest::Client,
        storage_root: impl Into<PathBuf>,
        max_feed_bytes: usize,
    ) -> Self {
        Self {
            client,
            storage_root: storage_root.into(),
            max_feed_bytes,
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn set_storage_root(&mut self, path: impl Into<PathBuf>) {
        self.storage_root = path.into();
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let url = validate_feed_url(path)?;
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, self.max_feed_bytes).await
    }

    async fn read_file(&self, relative: &str) -> Result<Vec<u8>, FetchError> {
        let path = resolve_under(&self.storage_root, relative);
        let file_error = |source| FetchError::File {
            path: path.clone(),
            source,
        };

        let meta = tokio::fs::metadata(&path).await.map_err(file_error)?;
        if meta.len() > self.max_feed_bytes as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
        tokio::fs::read(&path).await.map_err(file_error)
    }
}

#[async_trait]
impl Retrieve for Transport {
    async fn retrieve(&self, source: &Source) -> Result<Vec<u8>, FetchError> {
        match source.kind {
            SourceKind::Http => self.get(&source.path).await,
            SourceKind::File => self.read_file(&source.path).await,
        }
    }
}

/// Retrieves every source concurrently under one shared deadline.
///
/// One task is spawned per source and reports `(index, outcome)` on a
/// completion channel. The returned outcomes are index-aligned with
/// `sources`, whatever order the tasks finished in.
///
/// # Behavior
///
/// - Returns as soon as every source has settled, or when `deadline` has
///   elapsed, whichever comes first
/// - Sources still pending at the deadline yield [`FetchOutcome::TimedOut`]
///   and their tasks are cancelled
/// - Failures are per source and never abort the batch
/// - No retries
pub async fn fetch(
    retriever: Arc<dyn Retrieve>,
    sources: &[Arc<Source>],
    deadline: Duration,
) -> Vec<FetchOutcome> {
    let total = sources.len();
    if total == 0 {
        return Vec::new();
    }

    let now = tokio::time::Instant::now();
    let expires = now
        .checked_add(deadline)
        .unwrap_or_else(|| now + FAR_FUTURE);
    let (tx, mut rx) = mpsc::channel::<(usize, FetchOutcome)>(total);
    let mut tasks = JoinSet::new();

    for (index, source) in sources.iter().enumerate() {
        let tx = tx.clone();
        let retriever = Arc::clone(&retriever);
        let source = Arc::clone(source);

        tasks.spawn(async move {
            let outcome = match retriever.retrieve(&source).await {
                Ok(bytes) => {
                    tracing::debug!(source = %source.path, bytes = bytes.len(), "Retrieved feed");
                    FetchOutcome::Bytes(bytes)
                }
                Err(e) => {
                    tracing::warn!(source = %source.path, error = %e, "Feed retrieval failed");
                    FetchOutcome::Failed(e)
                }
            };
            // Receiver is dropped once the coordinator has moved on.
            let _ = tx.send((index, outcome)).await;
        });
    }
    drop(tx);

    let mut slots: Vec<Option<FetchOutcome>> = (0..total).map(|_| None).collect();
    let mut settled = 0;
    let mut deadline_hit = false;

    while settled < total {
        match tokio::time::timeout_at(expires, rx.recv()).await {
            Ok(Some((index, outcome))) => {
                slots[index] = Some(outcome);
                settled += 1;
            }
            // Every sender is gone: remaining tasks panicked or were cancelled.
            Ok(None) => break,
            Err(_) => {
                deadline_hit = true;
                break;
            }
        }
    }

    // Results that raced the deadline are still usable.
    while let Ok((index, outcome)) = rx.try_recv() {
        slots[index] = Some(outcome);
        settled += 1;
    }
    tasks.abort_all();

    if settled < total {
        tracing::warn!(
            pending = total - settled,
            deadline_ms = deadline.as_millis() as u64,
            deadline_hit,
            "Fetch batch finished with unsettled sources"
        );
    }

    slots
        .into_iter()
        .map(|slot| match slot {
            Some(outcome) => outcome,
            None if deadline_hit => FetchOutcome::TimedOut,
            None => FetchOutcome::Failed(FetchError::Aborted),
        })
        .collect()
}

/// Joins `relative` onto `root`, dropping any root or drive prefix so an
/// absolute source path still resolves inside the storage root.
fn resolve_under(root: &Path, relative: &str) -> PathBuf {
    let inner: PathBuf = Path::new(relative)
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();
    root.join(inner)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Capture Content-Length for completeness check
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
