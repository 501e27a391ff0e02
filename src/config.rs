use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

use crate::storage::{StorageError, StorageResult};

/// Interval used when the configured autosave interval is 0
pub const DEFAULT_AUTO_SAVE_INTERVAL: Duration = Duration::from_secs(7 * 60);

/// Persistence configuration as written by the user
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageConfig {
    /// Path of the file to persist to. If blank, file persistence is disabled.
    pub file: String,

    /// Namespace of the database tables. If blank, database persistence is disabled.
    pub table_namespace: String,

    /// Milliseconds between two autosaves (0 = default of 7 minutes)
    pub auto_save_interval_ms: i64,
}

/// Validated persistence configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStorageConfig {
    pub file: Option<PathBuf>,
    pub table_namespace: Option<String>,
    pub auto_save_interval: Duration,
}

impl StorageConfig {
    /// Validate the configuration and fill in defaults
    pub fn validate_and_set_defaults(&self) -> StorageResult<ResolvedStorageConfig> {
        let auto_save_interval = match self.auto_save_interval_ms {
            ms if ms < 0 => {
                return Err(StorageError::InvalidConfig(format!(
                    "invalid auto save interval {}ms: value must not be negative",
                    ms
                )));
            }
            0 => DEFAULT_AUTO_SAVE_INTERVAL,
            ms => Duration::from_millis(ms.unsigned_abs()),
        };

        let file = self.file.trim();
        let table_namespace = self.table_namespace.trim();

        Ok(ResolvedStorageConfig {
            file: (!file.is_empty()).then(|| PathBuf::from(file)),
            table_namespace: (!table_namespace.is_empty()).then(|| table_namespace.to_string()),
            auto_save_interval,
        })
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    /// Storage configuration (optional - defaults to in-memory)
    pub storage: Option<StorageConfig>,
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
