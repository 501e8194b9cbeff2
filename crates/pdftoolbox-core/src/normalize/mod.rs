mod normalizer;
mod schema;

pub use normalizer::{
    discover_documents, JsonNormalizer, NormalizeReport, NormalizedDocument, NormalizedRecord,
};
pub use schema::{
    ColumnPointers, CompiledMapping, ElementKind, Granularity, KindRule, SchemaMapping,
};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid JSON in {path}: {source}")]
    InvalidJson {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("No element list at {pointer}")]
    MissingElements { pointer: String },
    #[error("Element list at {pointer} is not an array")]
    NotAnArray { pointer: String },
    #[error("Element {index} is not an object")]
    InvalidElement { index: usize },
    #[error("No JSON files in {0}")]
    NoJson(PathBuf),
    #[error("Invalid schema mapping: {0}")]
    Mapping(String),
    #[error("Line {line}: {message}")]
    InvalidLine { line: usize, message: String },
}
