use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::archive::ExistingPolicy;
use crate::service::{ExtractionProfile, RetryPolicy, ServiceConfig};

/// File looked up in the base directory when no config path is given.
pub const CONFIG_FILE_NAME: &str = "pdftoolbox.toml";

/// Credential file expected inside the base directory.
pub const CREDENTIALS_FILE_NAME: &str = "pdfservices-api-credentials.json";

const ENV_PREFIX: &str = "PDFTOOLBOX_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration shared by every pipeline stage.
///
/// Built once per invocation and passed by reference into each component.
/// Relative directories are resolved against `base_dir` by [`ToolboxConfig::resolve`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolboxConfig {
    /// Directory holding the credential file; anchor for relative paths
    #[serde(skip)]
    pub base_dir: PathBuf,
    /// Where `<stem>.zip` archives are written
    pub zip_dir: PathBuf,
    /// Where archives are unpacked, one subdirectory per stem
    pub json_dir: PathBuf,
    /// Where the URL manifest is written
    pub src_dir: PathBuf,
    /// SQLite database holding normalized rows
    pub database: PathBuf,
    /// Maximum extraction requests in flight
    pub concurrency: usize,
    /// Optional TOML schema mapping; the built-in mapping is used otherwise
    pub schema_mapping: Option<PathBuf>,
    pub unpack: ExistingPolicy,
    pub profile: ExtractionProfile,
    pub service: ServiceConfig,
    pub retry: RetryPolicy,
}

impl Default for ToolboxConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            zip_dir: PathBuf::from("json-zips"),
            json_dir: PathBuf::from("json"),
            src_dir: PathBuf::from("src"),
            database: PathBuf::from("pdftoolbox.db"),
            concurrency: 1,
            schema_mapping: None,
            unpack: ExistingPolicy::default(),
            profile: ExtractionProfile::default(),
            service: ServiceConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ToolboxConfig {
    /// Default configuration anchored at `base_dir`.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    /// Load configuration for `base_dir`.
    ///
    /// Precedence, lowest first: defaults, the TOML file (`explicit`, else
    /// `<base_dir>/pdftoolbox.toml`, else the user config directory),
    /// `PDFTOOLBOX_*` environment variables.
    pub fn load(base_dir: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => discover_config_file(base_dir),
        };

        let mut config = match file {
            Some(path) => {
                tracing::debug!("Loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        config.base_dir = base_dir.to_path_buf();

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config.resolve())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Override fields from environment-style variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("ZIP_DIR") {
            self.zip_dir = PathBuf::from(v);
        }
        if let Some(v) = var("JSON_DIR") {
            self.json_dir = PathBuf::from(v);
        }
        if let Some(v) = var("SRC_DIR") {
            self.src_dir = PathBuf::from(v);
        }
        if let Some(v) = var("DATABASE") {
            self.database = PathBuf::from(v);
        }
        if let Some(v) = var("SCHEMA_MAPPING") {
            self.schema_mapping = Some(PathBuf::from(v));
        }
        if let Some(v) = var("ENDPOINT") {
            self.service.endpoint = v;
        }
        if let Some(v) = var("CONCURRENCY") {
            self.concurrency = parse_number("CONCURRENCY", &v)?;
        }
        if let Some(v) = var("MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_number("MAX_ATTEMPTS", &v)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        self.service.validate()
    }

    /// Anchor every relative directory at `base_dir`.
    #[must_use]
    pub fn resolve(mut self) -> Self {
        let base = self.base_dir.clone();
        let anchor = |p: &Path| if p.is_absolute() { p.to_path_buf() } else { base.join(p) };

        self.zip_dir = anchor(&self.zip_dir);
        self.json_dir = anchor(&self.json_dir);
        self.src_dir = anchor(&self.src_dir);
        self.database = anchor(&self.database);
        self.schema_mapping = self.schema_mapping.as_deref().map(anchor);
        self
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.base_dir.join(CREDENTIALS_FILE_NAME)
    }

    pub fn archive_path(&self, stem: &str) -> PathBuf {
        self.zip_dir.join(format!("{stem}.zip"))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.src_dir.join(crate::manifest::MANIFEST_FILE_NAME)
    }
}

fn discover_config_file(base_dir: &Path) -> Option<PathBuf> {
    let local = base_dir.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("pdftoolbox").join("config.toml"))
        .filter(|p| p.is_file())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: format!("{ENV_PREFIX}{key}"),
        value: value.to_string(),
    })
}
