use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::profile::ExtractionProfile;
use super::retry::{RetryExhausted, RetryPolicy};
use crate::document::SourceDocument;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Credentials unavailable: {0}")]
    Credentials(String),
    #[error("Invalid service endpoint: {0}")]
    Endpoint(String),
    #[error("Authentication rejected: {0}")]
    Auth(String),
    #[error("Usage quota exceeded: {0}")]
    Quota(String),
    #[error("Service returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Extraction job did not finish within {0:?}")]
    Timeout(std::time::Duration),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to read source document: {0}")]
    Source(#[from] std::io::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Whether another attempt could plausibly succeed.
    pub const fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Credentials(_) | Self::Endpoint(_) | Self::Source(_)
        )
    }

    /// Map a non-success HTTP status and body to an error.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Auth(message),
            429 => Self::Quota(message),
            _ => Self::Api { status, message },
        }
    }
}

/// One request/response cycle against a remote extraction service.
///
/// Implementations submit the document with the given profile and return
/// the raw archive bytes.
#[async_trait::async_trait]
pub trait ExtractionService: Send + Sync {
    async fn submit(
        &self,
        document: &SourceDocument,
        profile: &ExtractionProfile,
    ) -> ServiceResult<Vec<u8>>;
}

/// An archive written to disk for one document.
#[derive(Debug, Clone)]
pub struct SavedArchive {
    pub path: PathBuf,
    pub attempts: u32,
}

/// Terminal failure for one document.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ExtractionFailure {
    pub error: crate::Error,
    pub attempts: u32,
}

impl From<RetryExhausted> for ExtractionFailure {
    fn from(e: RetryExhausted) -> Self {
        Self {
            error: e.error.into(),
            attempts: e.attempts,
        }
    }
}

/// Submits documents with bounded retry and persists each archive as
/// `<zip_dir>/<stem>.zip`.
#[derive(Clone)]
pub struct ExtractionClient {
    service: Arc<dyn ExtractionService>,
    profile: ExtractionProfile,
    retry: RetryPolicy,
    zip_dir: PathBuf,
}

impl ExtractionClient {
    pub fn new(
        service: Arc<dyn ExtractionService>,
        profile: ExtractionProfile,
        retry: RetryPolicy,
        zip_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            service,
            profile,
            retry,
            zip_dir: zip_dir.into(),
        }
    }

    pub fn profile(&self) -> &ExtractionProfile {
        &self.profile
    }

    pub fn archive_path(&self, document: &SourceDocument) -> PathBuf {
        self.zip_dir.join(format!("{}.zip", document.stem))
    }

    pub async fn submit(&self, document: &SourceDocument) -> Result<SavedArchive, ExtractionFailure> {
        debug!("Submitting {}", document.path.display());

        let label = document.file_name();
        let archive = self
            .retry
            .run(&label, |attempt| async move {
                debug!("{}: attempt {}", document.stem, attempt);
                self.service.submit(document, &self.profile).await
            })
            .await?;

        let path = self.archive_path(document);
        write_atomically(&path, &archive.value)
            .await
            .map_err(|e| ExtractionFailure {
                error: e.into(),
                attempts: archive.attempts,
            })?;

        info!(
            "{}: saved {} ({} bytes, {} retries)",
            label,
            path.display(),
            archive.value.len(),
            archive.retries()
        );

        Ok(SavedArchive {
            path,
            attempts: archive.attempts,
        })
    }
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let written = match tokio::fs::write(&partial, bytes).await {
        Ok(()) => tokio::fs::rename(&partial, path).await,
        Err(e) => Err(e),
    };
    if written.is_err() {
        let _ = tokio::fs::remove_file(&partial).await;
    }
    written
}
