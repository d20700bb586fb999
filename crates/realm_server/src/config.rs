//! Server configuration
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Path given on the command line
//! 2. Environment variable: `REALM_CONFIG=/etc/realm/realm.toml`
//! 3. `realm.toml` in the working directory, if present
//! 4. Built-in defaults
//!
//! # Example Config File
//!
//! ```toml
//! static_tables = "data/tables.json"
//!
//! [world]
//! vision_range = 128.0
//! save_interval_secs = 60.0
//!
//! [persist]
//! save_dir = "./saves"
//! format = "binary"
//!
//! [scheduler]
//! workers = 4
//! target_frame_ms = 50
//!
//! [[disables]]
//! kind = "world"
//! id = 1229
//! ```

use realm_core::{DisableEntry, StaticDataError, WorldConfig};
use realm_map::SchedulerConfig;
use realm_persist::{PersistConfig, PersistError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "REALM_CONFIG";

/// Config file picked up from the working directory
pub const DEFAULT_CONFIG_FILE: &str = "realm.toml";

/// Errors while loading configuration or starting the server
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Static tables: {0}")]
    Tables(#[from] StaticDataError),

    #[error("Save pipeline: {0}")]
    Persist(#[from] PersistError),

    #[error("Failed to start workers: {0}")]
    Workers(#[from] std::io::Error),
}

/// Everything the server binary reads at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub world: WorldConfig,
    pub persist: PersistConfig,
    pub scheduler: SchedulerConfig,
    /// Administratively disabled worlds and spells
    pub disables: Vec<DisableEntry>,
    /// JSON static tables; empty tables when unset
    pub static_tables: Option<PathBuf>,
}

impl ServerConfig {
    /// Load from the first configured source
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::load_from(explicit, env.as_deref())
    }

    fn load_from(explicit: Option<&Path>, env: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit.or(env) {
            return Self::load_file(path);
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::load_file(local);
        }
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load a TOML file
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Log the effective settings
    pub fn print_summary(&self) {
        log::info!("=== Realm Configuration ===");
        log::info!("  Map workers: {}", self.scheduler.workers);
        log::info!("  Frame time: {:?}", self.scheduler.target_frame());
        log::info!(
            "  Saves: {} ({:?}, {} workers)",
            self.persist.save_dir.display(),
            self.persist.format,
            self.persist.workers
        );
        log::info!("  Save interval: {}s", self.world.save_interval_secs);
        log::info!("  Disabled entries: {}", self.disables.len());
        match &self.static_tables {
            Some(path) => log::info!("  Static tables: {}", path.display()),
            None => log::info!("  Static tables: none"),
        }
        log::info!("===========================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_core::DisableKind;
    use realm_persist::SaveFormat;

    #[test]
    fn test_empty_file_is_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.world.save_interval_secs, 60.0);
        assert!(config.disables.is_empty());
        assert!(config.static_tables.is_none());
    }

    #[test]
    fn test_parse_sections() {
        let config = ServerConfig::from_toml(
            r#"
            static_tables = "data/tables.json"

            [world]
            vision_range = 64.0

            [persist]
            format = "binary"
            workers = 3

            [scheduler]
            workers = 8

            [[disables]]
            kind = "world"
            id = 1229

            [[disables]]
            kind = "base_spell"
            id = 400
            "#,
        )
        .unwrap();

        assert_eq!(config.world.vision_range, 64.0);
        assert_eq!(config.world.logout_delay_secs, 30.0);
        assert_eq!(config.persist.format, SaveFormat::Binary);
        assert_eq!(config.persist.workers, 3);
        assert_eq!(config.scheduler.workers, 8);
        assert_eq!(config.scheduler.target_frame_ms, 50);
        assert_eq!(
            config.disables,
            vec![
                DisableEntry {
                    kind: DisableKind::World,
                    id: 1229
                },
                DisableEntry {
                    kind: DisableKind::BaseSpell,
                    id: 400
                },
            ]
        );
        assert_eq!(config.static_tables, Some(PathBuf::from("data/tables.json")));
    }

    #[test]
    fn test_explicit_path_wins_over_env() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("explicit.toml");
        let env = dir.path().join("env.toml");
        std::fs::write(&explicit, "[scheduler]\nworkers = 1\n").unwrap();
        std::fs::write(&env, "[scheduler]\nworkers = 2\n").unwrap();

        let config = ServerConfig::load_from(Some(&explicit), Some(&env)).unwrap();
        assert_eq!(config.scheduler.workers, 1);
        let config = ServerConfig::load_from(None, Some(&env)).unwrap();
        assert_eq!(config.scheduler.workers, 2);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            ServerConfig::load_from(Some(&missing), None),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_bad_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[scheduler\nworkers = ").unwrap();
        assert!(matches!(
            ServerConfig::load_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
