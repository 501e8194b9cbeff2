use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use console::style;
use pdftoolbox_core::pipeline::BatchPipeline;
use pdftoolbox_core::ToolboxConfig;
use uuid::Uuid;

pub async fn run(mut config: ToolboxConfig, mapping: Option<PathBuf>) -> Result<ExitCode> {
    if let Some(mapping) = mapping {
        config.schema_mapping = Some(mapping);
    }
    let database = config.database.clone();
    let summary = BatchPipeline::new(config)?.normalize(Uuid::now_v7()).await?;

    for (stem, rows) in &summary.persisted {
        eprintln!("  {} {} ({} rows)", style("✓").green(), stem, rows);
    }
    for (stem, e) in &summary.failed {
        eprintln!("  {} {} [{}] {}", style("✗").red(), style(stem).bold(), e.kind(), e);
    }

    eprintln!(
        "Stored {} rows from {} documents in {}",
        summary.row_count(),
        summary.persisted.len(),
        database.display()
    );
    Ok(ExitCode::SUCCESS)
}
