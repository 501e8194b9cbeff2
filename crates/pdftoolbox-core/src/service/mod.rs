mod client;
mod config;
mod credentials;
mod pdf_services;
mod profile;
mod retry;

pub use client::{
    ExtractionClient, ExtractionFailure, ExtractionService, SavedArchive, ServiceError,
    ServiceResult,
};
pub use config::{ServiceConfig, DEFAULT_ENDPOINT};
pub use credentials::Credentials;
pub use pdf_services::PdfServicesClient;
pub use profile::{ElementType, ExtractionProfile, RenditionType, TableFormat};
pub use retry::{Attempted, RetryExhausted, RetryPolicy};

use std::sync::Arc;

use crate::config::ToolboxConfig;

/// Build the PDF Services client described by `config`, loading the
/// credential file from its base directory.
pub fn pdf_services_client(config: &ToolboxConfig) -> ServiceResult<PdfServicesClient> {
    let credentials = Credentials::from_file(&config.credentials_path())?;
    PdfServicesClient::new(config.service.clone(), credentials)
}

/// An [`ExtractionClient`] over `service` using the profile, retry policy
/// and archive directory from `config`.
pub fn extraction_client(
    config: &ToolboxConfig,
    service: Arc<dyn ExtractionService>,
) -> ExtractionClient {
    ExtractionClient::new(
        service,
        config.profile.clone(),
        config.retry.clone(),
        config.zip_dir.clone(),
    )
}
