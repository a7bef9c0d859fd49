//! Loads monitor configuration updates from files and the environment.

use crate::core::MonitorConfigUpdate;
use crate::error::{MonitorError, Result};
use config::{Environment, File};
use std::path::PathBuf;

/// Default prefix of monitor environment variables, as in `APP_MONITOR_POLLINGRATE`.
pub const DEFAULT_ENV_PREFIX: &str = "APP_MONITOR";

/// Merges configuration files and environment variables into one
/// [`MonitorConfigUpdate`].
///
/// Files are merged in the order they were added, later files overriding
/// earlier ones; environment variables override every file. Supported file
/// formats: YAML (`.yaml`, `.yml`), TOML (`.toml`) and JSON (`.json`).
///
/// Keys are the update's field names: `pollingRate`, `dropins`,
/// `updateTrigger` and `dropinsEnabled`.
///
/// # Examples
///
/// ```rust,no_run
/// use app_monitor::core::ConfigLoader;
///
/// # fn example() -> app_monitor::error::Result<()> {
/// let update = ConfigLoader::new()
///     .with_file("server/monitor.yaml")
///     .with_env_prefix("APP_MONITOR")
///     .load()?;
/// println!("polling rate: {:?}", update.polling_rate);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    files: Vec<PathBuf>,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Create a loader with no sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configuration file.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Read `<PREFIX>_*` environment variables.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Files in merge order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Load and merge all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No source was configured
    /// - A file is missing, has an unsupported extension or cannot be parsed
    /// - A value has the wrong type
    pub fn load(&self) -> Result<MonitorConfigUpdate> {
        if self.files.is_empty() && self.env_prefix.is_none() {
            return Err(MonitorError::LoadError(
                "No configuration sources specified".to_string(),
            ));
        }

        let mut builder = config::Config::builder();
        for path in &self.files {
            validate_extension(path)?;
            if !path.exists() {
                return Err(MonitorError::LoadError(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path.clone()).required(true));
        }

        if let Some(prefix) = &self.env_prefix {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let merged = builder
            .build()
            .map_err(|e| MonitorError::LoadError(format!("Failed to build configuration: {}", e)))?;

        let update: MonitorConfigUpdate = merged.try_deserialize().map_err(|e| {
            MonitorError::DeserializationError(format!("Failed to deserialize configuration: {}", e))
        })?;
        tracing::debug!(?update, "loaded monitor configuration");
        Ok(update)
    }
}

fn validate_extension(path: &std::path::Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| {
            MonitorError::LoadError(format!(
                "Unable to determine file format for: {}",
                path.display()
            ))
        })?;

    match extension {
        "yaml" | "yml" | "toml" | "json" => Ok(()),
        _ => Err(MonitorError::LoadError(format!(
            "Unsupported file extension: {}. Supported: .yaml, .yml, .toml, .json",
            extension
        ))),
    }
}
