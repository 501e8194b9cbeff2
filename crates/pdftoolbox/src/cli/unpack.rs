use std::process::ExitCode;

use anyhow::Result;
use console::style;
use pdftoolbox_core::pipeline::BatchPipeline;
use pdftoolbox_core::{ExistingPolicy, ToolboxConfig, UnpackStatus};

pub async fn run(mut config: ToolboxConfig, skip_existing: bool) -> Result<ExitCode> {
    if skip_existing {
        config.unpack = ExistingPolicy::Skip;
    }
    let json_dir = config.json_dir.clone();
    let report = BatchPipeline::new(config)?.unpack().await?;

    for unpacked in &report.unpacked {
        match unpacked.status {
            UnpackStatus::Extracted { entries } => eprintln!(
                "  {} {} ({} entries)",
                style("✓").green(),
                unpacked.stem,
                entries
            ),
            UnpackStatus::Skipped => eprintln!(
                "  {} {} (exists, skipped)",
                style("○").dim(),
                unpacked.stem
            ),
        }
    }
    for (archive, e) in &report.failed {
        eprintln!("  {} {}: {}", style("✗").red(), archive.display(), e);
    }

    eprintln!(
        "Unpacked {} archives into {}",
        report.extracted_count(),
        json_dir.display()
    );
    Ok(ExitCode::SUCCESS)
}
