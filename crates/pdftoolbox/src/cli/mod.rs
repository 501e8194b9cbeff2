pub mod extract;
pub mod manifest;
pub mod normalize;
pub mod unpack;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pdftoolbox_core::{ExtractionProfile, ToolboxConfig};

#[derive(Parser)]
#[command(
    name = "pdftb",
    about = "Batch PDF extraction through PDF Services, with unpacking and normalization",
    version
)]
pub struct Cli {
    /// Configuration file (defaults to <base-dir>/pdftoolbox.toml)
    #[arg(long, global = true, env = "PDFTOOLBOX_CONFIG")]
    pub config: Option<PathBuf>,
    /// Directory holding the credential file; relative paths resolve here
    #[arg(long, global = true, env = "PDFTOOLBOX_BASE_DIR", default_value = ".")]
    pub base_dir: PathBuf,
    /// Extraction profile
    #[arg(long, global = true, value_enum)]
    pub profile: Option<ProfileArg>,
    /// Maximum extraction requests in flight
    #[arg(long, global = true, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: Option<u16>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ProfileArg {
    /// Text and tables, CSV tables, figure and table renditions
    Standard,
    /// Standard plus character bounds and styling
    Detailed,
}

impl From<ProfileArg> for ExtractionProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Standard => Self::standard(),
            ProfileArg::Detailed => Self::detailed(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract, unpack and normalize every PDF under SOURCE
    Run {
        /// A PDF file or a directory to scan recursively
        source: PathBuf,
    },
    /// Only submit PDFs and save their archives
    Extract {
        /// A PDF file or a directory to scan recursively
        source: PathBuf,
    },
    /// Unpack saved archives into the JSON directory
    Unpack {
        /// Leave already unpacked directories untouched
        #[arg(long)]
        skip_existing: bool,
    },
    /// Normalize unpacked JSON into the database
    Normalize {
        /// Schema mapping file overriding the configured one
        #[arg(long)]
        mapping: Option<PathBuf>,
    },
    /// Convert pdf-urls.jl into the pdf-urls.txt manifest
    Manifest {
        /// Crawl log (defaults to <base-dir>/pdf-urls.jl)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Output file (defaults to <src_dir>/pdf-urls.txt)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// Build the configuration for this invocation; flags override every
    /// other source.
    pub fn load_config(&self) -> Result<ToolboxConfig> {
        let mut config = ToolboxConfig::load(&self.base_dir, self.config.as_deref())
            .context("Failed to load configuration")?;

        if let Some(profile) = self.profile {
            config.profile = profile.into();
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = usize::from(concurrency);
        }
        tracing::debug!("Base directory {}", config.base_dir.display());
        Ok(config)
    }
}

pub async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let config = cli.load_config()?;

    match cli.command {
        Commands::Run { source } => extract::run(config, &source).await,
        Commands::Extract { source } => extract::extract_only(config, &source).await,
        Commands::Unpack { skip_existing } => unpack::run(config, skip_existing).await,
        Commands::Normalize { mapping } => normalize::run(config, mapping).await,
        Commands::Manifest { input, output } => {
            manifest::run(&config, input.as_deref(), output.as_deref())
        }
    }
}

pub(crate) const fn exit_status(all_failed: bool) -> ExitCode {
    if all_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
