use thiserror::Error;

use crate::archive::ArchiveError;
use crate::config::ConfigError;
use crate::normalize::SchemaError;
use crate::service::ServiceError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("No PDF documents found at {0}")]
    NoDocuments(std::path::PathBuf),
}

impl Error {
    /// Short label used in batch reports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Service(_) => "service",
            Self::Archive(_) => "archive",
            Self::Schema(_) | Self::Serialization(_) => "schema",
            Self::Config(_) => "config",
            Self::Io(_) | Self::NoDocuments(_) => "io",
            Self::Database(_) => "database",
            Self::Task(_) => "task",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
