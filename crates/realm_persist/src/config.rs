//! Save pipeline configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// On-disk encoding of saved records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveFormat {
    /// JSON (human readable)
    #[default]
    Json,
    /// Binary (compact)
    Binary,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Binary => "bin",
        }
    }
}

/// Configuration for the save pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Base directory for saved characters
    pub save_dir: PathBuf,
    pub format: SaveFormat,
    /// Number of save worker threads
    pub workers: usize,
    /// Pause before a failed save is re-queued (milliseconds)
    pub retry_backoff_ms: u64,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("./saves"),
            format: SaveFormat::Json,
            workers: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl PersistConfig {
    /// Create config for testing
    pub fn testing() -> Self {
        Self {
            save_dir: std::env::temp_dir().join("realm_test_saves"),
            workers: 1,
            retry_backoff_ms: 1,
            ..Default::default()
        }
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
