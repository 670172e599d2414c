//! Configuration loading and typed config structures for the regeneration
//! engine.
//!
//! The canonical configuration lives in `regen-config.yaml` at the project
//! root. Scheduler, reaper and logging settings are strongly typed; the
//! per-material table is kept as raw YAML values and parsed entry by entry
//! (see [`parse_material_entry`]) so one malformed material cannot fail the
//! whole document.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Environment variable overriding [`SchedulerConfig::max_pending_jobs`].
pub const MAX_PENDING_JOBS_ENV: &str = "REGEN_MAX_PENDING_JOBS";

/// Smallest accepted restore delay in seconds.
pub const MIN_REGENERATE_DELAY_SECS: u64 = 1;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level regeneration configuration.
///
/// Mirrors the structure of `regen-config.yaml`. Every section falls back to
/// its defaults when absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RegenConfig {
    /// Admission and write settings for the scheduler.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Periodic sweep settings.
    #[serde(default)]
    pub reaper: ReaperConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Raw per-material entries keyed by material name.
    #[serde(default)]
    pub materials: BTreeMap<String, serde_yml::Value>,
}

impl RegenConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `REGEN_MAX_PENDING_JOBS` overrides `scheduler.max_pending_jobs` when
    /// set to a valid integer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse_raw(&contents)?;
        config.scheduler.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse_raw(yaml)?;
        config.scheduler.apply_env_overrides();
        Ok(config)
    }

    fn parse_raw(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to an empty mapping.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Ceiling on concurrently pending regeneration jobs.
    #[serde(default = "default_max_pending_jobs")]
    pub max_pending_jobs: usize,

    /// Whether placeholder and restore writes notify neighbouring cells.
    #[serde(default)]
    pub notify_neighbors: bool,
}

impl SchedulerConfig {
    /// Override the ceiling from `REGEN_MAX_PENDING_JOBS` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(MAX_PENDING_JOBS_ENV) {
            match val.trim().parse::<usize>() {
                Ok(ceiling) => self.max_pending_jobs = ceiling,
                Err(e) => {
                    tracing::warn!(value = val, error = %e, "ignoring invalid {MAX_PENDING_JOBS_ENV}");
                }
            }
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_pending_jobs: default_max_pending_jobs(),
            notify_neighbors: false,
        }
    }
}

/// Reaper sweep settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReaperConfig {
    /// Seconds between sweeps (values below 1 are treated as 1).
    #[serde(default = "default_reaper_interval_secs")]
    pub interval_secs: u64,

    /// Snapshots older than this many seconds are evicted.
    #[serde(default = "default_max_snapshot_age_secs")]
    pub max_snapshot_age_secs: u64,
}

impl ReaperConfig {
    /// Sweep period as a [`Duration`], at least one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Maximum snapshot age as a [`Duration`].
    pub const fn max_snapshot_age(&self) -> Duration {
        Duration::from_secs(self.max_snapshot_age_secs)
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reaper_interval_secs(),
            max_snapshot_age_secs: default_max_snapshot_age_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One material's regeneration settings as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MaterialEntry {
    /// Placeholder state spec shown while the cell regenerates.
    #[serde(rename = "replace-with", default = "default_replace_with")]
    pub replace_with: String,

    /// Seconds until restoration (clamped to at least one second).
    #[serde(rename = "regenerate-delay", default = "default_regenerate_delay")]
    pub regenerate_delay: i64,

    /// Fallback state spec; defaults to the material's own name.
    #[serde(rename = "regenerate-into", default)]
    pub regenerate_into: Option<String>,
}

impl MaterialEntry {
    /// The restore delay with the one-second floor applied.
    pub fn delay(&self) -> Duration {
        let secs = u64::try_from(self.regenerate_delay).unwrap_or(0);
        Duration::from_secs(secs.max(MIN_REGENERATE_DELAY_SECS))
    }

    /// The fallback spec, or `material_name` when none was configured.
    pub fn fallback_spec<'a>(&'a self, material_name: &'a str) -> &'a str {
        self.regenerate_into.as_deref().unwrap_or(material_name)
    }
}

impl Default for MaterialEntry {
    fn default() -> Self {
        Self {
            replace_with: default_replace_with(),
            regenerate_delay: default_regenerate_delay(),
            regenerate_into: None,
        }
    }
}

/// Parse one raw `materials` value into a [`MaterialEntry`].
///
/// A bare key with no settings (`STONE:`) yields all defaults.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] if the value does not have the expected shape.
pub fn parse_material_entry(value: &serde_yml::Value) -> Result<MaterialEntry, ConfigError> {
    if value.is_null() {
        return Ok(MaterialEntry::default());
    }
    Ok(serde_yml::from_value(value.clone())?)
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_max_pending_jobs() -> usize {
    1000
}

const fn default_reaper_interval_secs() -> u64 {
    30
}

const fn default_max_snapshot_age_secs() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_replace_with() -> String {
    "AIR".to_owned()
}

const fn default_regenerate_delay() -> i64 {
    1
}
