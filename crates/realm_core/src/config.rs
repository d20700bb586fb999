//! Simulation configuration
//!
//! `WorldConfig` holds the tunables the entity and map simulation read on
//! every tick. Every field has a default, so partial TOML sections work.

use serde::{Deserialize, Serialize};

/// Companion (pet) tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PetConfig {
    /// How often a pet re-evaluates following its owner (seconds)
    pub follow_interval_secs: f64,
    /// Distance a following pet stops at
    pub follow_distance: f32,
    /// Minimum owner distance before a pet starts following again
    pub follow_recalculate_distance: f32,
    /// Distance from the owner a summoned pet appears at
    pub spawn_offset: f32,
}

impl Default for PetConfig {
    fn default() -> Self {
        Self {
            follow_interval_secs: 1.0,
            follow_distance: 3.0,
            follow_recalculate_distance: 5.0,
            spawn_offset: 2.0,
        }
    }
}

/// Entity and map simulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Range within which players observe an entity
    pub vision_range: f32,
    /// Passive health/shield regeneration period (seconds)
    pub regen_interval_secs: f64,
    /// Inactivity after which a player-vs-player threat entry is evicted (seconds)
    pub threat_stale_secs: f64,
    /// Period between automatic player saves (seconds)
    pub save_interval_secs: f64,
    /// Default delay of a requested logout (seconds)
    pub logout_delay_secs: f64,
    /// Maximum player level reachable through experience
    pub max_level: u32,
    /// Distance a unit may chase from its leash anchor
    pub leash_range: f32,
    /// Companion settings
    pub pet: PetConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            vision_range: 128.0,
            regen_interval_secs: 0.5,
            threat_stale_secs: 10.0,
            save_interval_secs: 60.0,
            logout_delay_secs: 30.0,
            max_level: 50,
            leash_range: 15.0,
            pet: PetConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Configuration for tests: same rules, shorter save period
    pub fn testing() -> Self {
        Self {
            save_interval_secs: 5.0,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorldConfig::default();
        assert_eq!(config.regen_interval_secs, 0.5);
        assert_eq!(config.threat_stale_secs, 10.0);
        assert_eq!(config.pet.follow_distance, 3.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: WorldConfig =
            serde_json::from_str(r#"{ "vision_range": 64.0, "pet": { "spawn_offset": 4.0 } }"#)
                .unwrap();
        assert_eq!(config.vision_range, 64.0);
        assert_eq!(config.pet.spawn_offset, 4.0);
        assert_eq!(config.pet.follow_interval_secs, 1.0);
        assert_eq!(config.save_interval_secs, 60.0);
    }
}
