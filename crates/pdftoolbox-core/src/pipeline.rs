use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::archive::{self, UnpackReport};
use crate::config::{ConfigError, ToolboxConfig};
use crate::document::{self, SourceDocument};
use crate::normalize::{JsonNormalizer, SchemaMapping};
use crate::service::{self, ExtractionClient, ExtractionService};
use crate::storage::Storage;
use crate::{Error, Result};

/// Result of extracting one document.
#[derive(Debug)]
pub struct DocumentOutcome {
    pub document: SourceDocument,
    pub attempts: u32,
    /// Archive path on success
    pub result: std::result::Result<PathBuf, Error>,
}

impl DocumentOutcome {
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub const fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Rows persisted by a normalize pass, and the documents that failed.
#[derive(Debug, Default)]
pub struct NormalizeSummary {
    pub persisted: Vec<(String, usize)>,
    pub failed: Vec<(String, Error)>,
}

impl NormalizeSummary {
    pub fn row_count(&self) -> usize {
        self.persisted.iter().map(|(_, rows)| rows).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }
}

#[derive(Debug)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub documents: Vec<DocumentOutcome>,
    pub unpack: UnpackReport,
    pub normalize: NormalizeSummary,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn success_count(&self) -> usize {
        self.documents.iter().filter(|d| d.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.documents.len() - self.success_count()
    }

    /// True when nothing was extracted; drives the process exit status.
    pub fn all_failed(&self) -> bool {
        self.success_count() == 0
    }

    pub fn log_summary(&self) {
        for outcome in &self.documents {
            match &outcome.result {
                Ok(_) => info!(
                    "{}: ok after {} attempt(s), {} retries",
                    outcome.document.file_name(),
                    outcome.attempts,
                    outcome.retries()
                ),
                Err(e) => error!(
                    "{}: failed after {} attempt(s) [{}]: {}",
                    outcome.document.file_name(),
                    outcome.attempts,
                    e.kind(),
                    e
                ),
            }
        }

        let summary = format!(
            "Run {}: {}/{} documents succeeded, {} archives unpacked, {} rows normalized",
            self.run_id,
            self.success_count(),
            self.documents.len(),
            self.unpack.extracted_count(),
            self.normalize.row_count()
        );
        if self.failure_count() == 0 {
            info!("{}", summary);
        } else {
            warn!("{}", summary);
        }
    }
}

/// Drives extraction, unpacking and normalization over a batch of PDFs.
///
/// Each phase finishes for every document before the next starts. The
/// local phases ([`BatchPipeline::unpack`], [`BatchPipeline::normalize`])
/// need no extraction service and can be rerun on their own.
pub struct BatchPipeline {
    config: ToolboxConfig,
    normalizer: JsonNormalizer,
    client: Option<ExtractionClient>,
}

impl BatchPipeline {
    pub fn new(config: ToolboxConfig) -> Result<Self> {
        let mapping = match &config.schema_mapping {
            Some(path) => {
                info!("Using schema mapping {}", path.display());
                SchemaMapping::from_file(path)?
            }
            None => SchemaMapping::pdf_services(),
        };
        let normalizer = JsonNormalizer::new(mapping)?;

        Ok(Self {
            config,
            normalizer,
            client: None,
        })
    }

    #[must_use]
    pub fn with_client(mut self, client: ExtractionClient) -> Self {
        self.client = Some(client);
        self
    }

    #[must_use]
    pub fn with_service(self, service: Arc<dyn ExtractionService>) -> Self {
        let client = service::extraction_client(&self.config, service);
        self.with_client(client)
    }

    pub const fn config(&self) -> &ToolboxConfig {
        &self.config
    }

    pub async fn run(&self, source: &Path) -> Result<BatchReport> {
        let start = Instant::now();
        let run_id = Uuid::now_v7();
        info!("Starting run {}", run_id);

        let documents = self.extract(source).await?;
        let unpack = self.unpack().await?;
        let normalize = self.normalize(run_id).await?;

        let report = BatchReport {
            run_id,
            documents,
            unpack,
            normalize,
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        report.log_summary();
        Ok(report)
    }

    /// Submit every PDF under `source`, saving one archive per document.
    ///
    /// Outcomes come back in discovery order regardless of concurrency.
    pub async fn extract(&self, source: &Path) -> Result<Vec<DocumentOutcome>> {
        let client = self.client.as_ref().ok_or_else(|| {
            ConfigError::Invalid("no extraction service configured".into())
        })?;

        let documents = document::discover(source)?;
        if documents.is_empty() {
            return Err(Error::NoDocuments(source.to_path_buf()));
        }
        info!(
            "Found {} documents in {}; extracting with concurrency {}",
            documents.len(),
            source.display(),
            self.config.concurrency
        );

        let outcomes = stream::iter(documents)
            .map(move |document| async move {
                match client.submit(&document).await {
                    Ok(saved) => DocumentOutcome {
                        document,
                        attempts: saved.attempts,
                        result: Ok(saved.path),
                    },
                    Err(failure) => {
                        warn!("{}: {}", document.file_name(), failure.error);
                        DocumentOutcome {
                            document,
                            attempts: failure.attempts,
                            result: Err(failure.error),
                        }
                    }
                }
            })
            .buffered(self.config.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        info!("Extraction finished: {}/{} succeeded", succeeded, outcomes.len());
        Ok(outcomes)
    }

    /// Unpack every archive in the zip directory.
    pub async fn unpack(&self) -> Result<UnpackReport> {
        let zip_dir = self.config.zip_dir.clone();
        let json_dir = self.config.json_dir.clone();
        let policy = self.config.unpack;

        let report =
            tokio::task::spawn_blocking(move || archive::unpack(&zip_dir, &json_dir, policy))
                .await??;

        info!(
            "Unpack finished: {} extracted, {} skipped, {} failed",
            report.extracted_count(),
            report.skipped_count(),
            report.failure_count()
        );
        Ok(report)
    }

    /// Normalize everything in the JSON directory into the database.
    pub async fn normalize(&self, run_id: Uuid) -> Result<NormalizeSummary> {
        let normalizer = self.normalizer.clone();
        let json_dir = self.config.json_dir.clone();
        let report =
            tokio::task::spawn_blocking(move || normalizer.normalize_dir(&json_dir)).await??;

        let storage = Storage::open(&self.config.database).await?;
        let version = &self.normalizer.mapping().version;

        let mut summary = NormalizeSummary::default();
        for (stem, e) in report.failed {
            summary.failed.push((stem, e.into()));
        }
        for doc in report.documents {
            match storage.replace_document(&doc, run_id, version).await {
                Ok(()) => summary.persisted.push((doc.stem, doc.records.len())),
                Err(e) => {
                    warn!("{}: failed to store rows: {}", doc.stem, e);
                    summary.failed.push((doc.stem, e));
                }
            }
        }

        info!(
            "Normalize finished: {} documents, {} rows into {}, {} failed",
            summary.persisted.len(),
            summary.row_count(),
            self.config.database.display(),
            summary.failure_count()
        );
        Ok(summary)
    }
}
