use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use pdftoolbox_core::pipeline::{BatchPipeline, BatchReport, DocumentOutcome};
use pdftoolbox_core::{service, ToolboxConfig};

use super::exit_status;

fn pipeline(config: ToolboxConfig) -> Result<BatchPipeline> {
    let client = service::pdf_services_client(&config)
        .with_context(|| format!("Cannot reach PDF Services from {}", config.base_dir.display()))?;
    Ok(BatchPipeline::new(config)?.with_service(Arc::new(client)))
}

pub async fn run(config: ToolboxConfig, source: &Path) -> Result<ExitCode> {
    let report = pipeline(config)?.run(source).await?;
    print_report(&report);
    Ok(exit_status(report.all_failed()))
}

pub async fn extract_only(config: ToolboxConfig, source: &Path) -> Result<ExitCode> {
    let outcomes = pipeline(config)?.extract(source).await?;
    print_outcomes(&outcomes);

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    eprintln!();
    eprintln!("{}/{} documents extracted", succeeded, outcomes.len());
    Ok(exit_status(succeeded == 0))
}

fn print_outcomes(outcomes: &[DocumentOutcome]) {
    for outcome in outcomes {
        let name = outcome.document.file_name();
        match &outcome.result {
            Ok(archive) => {
                let retries = match outcome.retries() {
                    0 => String::new(),
                    n => format!(" ({n} retries)"),
                };
                eprintln!(
                    "  {} {} -> {}{}",
                    style("✓").green(),
                    name,
                    archive.display(),
                    style(retries).dim()
                );
            }
            Err(e) => eprintln!(
                "  {} {} [{}] {}",
                style("✗").red(),
                style(&name).bold(),
                e.kind(),
                e
            ),
        }
    }
}

fn print_report(report: &BatchReport) {
    print_outcomes(&report.documents);

    eprintln!();
    let marker = if report.failure_count() == 0 {
        style("●").green()
    } else if report.all_failed() {
        style("●").red()
    } else {
        style("●").yellow()
    };
    eprintln!(
        "{} {}/{} documents succeeded",
        marker,
        report.success_count(),
        report.documents.len()
    );
    eprintln!(
        "  Archives: {} unpacked, {} skipped, {} failed",
        report.unpack.extracted_count(),
        report.unpack.skipped_count(),
        report.unpack.failure_count()
    );
    eprintln!(
        "  Rows: {} from {} documents ({} failed)",
        report.normalize.row_count(),
        report.normalize.persisted.len(),
        report.normalize.failure_count()
    );
    eprintln!("  Run: {} in {} ms", report.run_id, report.duration_ms);
}
