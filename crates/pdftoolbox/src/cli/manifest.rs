use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use console::style;
use pdftoolbox_core::manifest::{write_url_manifest, INPUT_FILE_NAME};
use pdftoolbox_core::ToolboxConfig;

pub fn run(config: &ToolboxConfig, input: Option<&Path>, output: Option<&Path>) -> Result<ExitCode> {
    let input = input.map_or_else(|| config.base_dir.join(INPUT_FILE_NAME), Path::to_path_buf);
    let output = output.map_or_else(|| config.manifest_path(), Path::to_path_buf);

    let count = write_url_manifest(&input, &output)
        .with_context(|| format!("Failed to build manifest from {}", input.display()))?;

    eprintln!(
        "{} Wrote {} URLs to {}",
        style("✓").green(),
        count,
        output.display()
    );
    Ok(ExitCode::SUCCESS)
}
