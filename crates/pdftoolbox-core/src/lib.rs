#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::option_if_let_else)]

pub mod archive;
pub mod config;
pub mod document;
pub mod error;
pub mod manifest;
pub mod normalize;
pub mod pipeline;
pub mod service;
pub mod storage;

pub use archive::{ArchiveError, ExistingPolicy, UnpackReport, UnpackStatus, UnpackedArchive};
pub use config::{ConfigError, ToolboxConfig};
pub use document::SourceDocument;
pub use error::{Error, Result};
pub use normalize::{
    ElementKind, Granularity, JsonNormalizer, NormalizeReport, NormalizedRecord, SchemaError,
    SchemaMapping,
};
pub use pipeline::{BatchPipeline, BatchReport, DocumentOutcome, NormalizeSummary};
pub use service::{
    Credentials, ExtractionClient, ExtractionProfile, ExtractionService, PdfServicesClient,
    RetryPolicy, ServiceConfig, ServiceError,
};
pub use storage::{Storage, StoredDocument};
