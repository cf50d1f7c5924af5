//! Configuration loading for the ingest service
//!
//! Resolution priority (highest first):
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the database file
pub const ENV_DATABASE: &str = "PREFAB_DATABASE";
/// Environment variable naming the HTTP bind address
pub const ENV_BIND: &str = "PREFAB_BIND";

/// Default HTTP bind address
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5740";

/// How the overall confidence score treats sections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    /// Every expected section counts; absent ones contribute zero
    Strict,
    /// Only present sections are averaged
    #[default]
    Proportional,
}

/// What the identifier allocator does after running out of suffix attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    /// Report the exhaustion as an error
    #[default]
    Error,
    /// Append a time-derived suffix
    Timestamp,
}

/// `[scoring]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub mode: ScoringMode,
    /// Include the project/label/title pseudo-section
    pub include_details: bool,
    /// Proportional mode only: count absent expected sections as zero
    pub penalize_missing: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            mode: ScoringMode::Proportional,
            include_details: true,
            penalize_missing: false,
        }
    }
}

/// `[allocator]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    pub max_attempts: usize,
    pub on_exhausted: ExhaustionPolicy,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            on_exhausted: ExhaustionPolicy::Error,
        }
    }
}

/// Complete ingest service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub database_path: PathBuf,
    pub bind_address: String,
    pub scoring: ScoringConfig,
    pub allocator: AllocatorConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            scoring: ScoringConfig::default(),
            allocator: AllocatorConfig::default(),
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub bind_address: Option<String>,
}

/// Resolve the effective configuration
///
/// An explicitly named config file must exist; the default config file is
/// optional and its absence only logs a warning.
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<IngestConfig> {
    // Priority 3: TOML config file
    let mut config = match &overrides.config_file {
        Some(path) => load_toml_config(path)?,
        None => match default_config_file() {
            Some(path) if path.exists() => load_toml_config(&path)?,
            _ => {
                warn!("No config file found, using compiled defaults");
                IngestConfig::default()
            }
        },
    };

    // Priority 2: Environment variables
    if let Ok(path) = std::env::var(ENV_DATABASE) {
        config.database_path = PathBuf::from(path);
    }
    if let Ok(bind) = std::env::var(ENV_BIND) {
        config.bind_address = bind;
    }

    // Priority 1: Command-line arguments
    if let Some(path) = &overrides.database_path {
        config.database_path = path.clone();
    }
    if let Some(bind) = &overrides.bind_address {
        config.bind_address = bind.clone();
    }

    validate(&config)?;
    Ok(config)
}

/// Load configuration from a TOML file
pub fn load_toml_config(path: &Path) -> Result<IngestConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
    let config: IngestConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn validate(config: &IngestConfig) -> Result<()> {
    if config.allocator.max_attempts == 0 {
        return Err(Error::Config(
            "allocator.max_attempts must be at least 1".to_string(),
        ));
    }
    if config.bind_address.trim().is_empty() {
        return Err(Error::Config("bind_address must not be empty".to_string()));
    }
    Ok(())
}

/// Platform config file location (`~/.config/prefab/config.toml` on Linux)
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("prefab").join("config.toml"))
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("prefab").join("prefab.db"))
        .unwrap_or_else(|| PathBuf::from("./prefab_data/prefab.db"))
}
