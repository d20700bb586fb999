//! Damage descriptions

use realm_core::EntityId;
use serde::{Deserialize, Serialize};

/// Types of damage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageType {
    #[default]
    Physical,
    Tech,
    Magic,
    Fall,
    Suffocate,
}

/// A resolved damage instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DamageDescription {
    /// Damage before mitigation
    pub raw_damage: u32,
    /// Damage applied to health
    pub adjusted_damage: u32,
    /// Damage taken by the shield
    pub shield_absorbed: u32,
    pub damage_type: DamageType,
    pub is_critical: bool,
}

impl DamageDescription {
    /// Unmitigated damage straight to health
    pub fn new(amount: u32, damage_type: DamageType) -> Self {
        Self {
            raw_damage: amount,
            adjusted_damage: amount,
            shield_absorbed: 0,
            damage_type,
            is_critical: false,
        }
    }

    /// Move part of the damage onto the shield
    pub fn with_shield_absorb(mut self, absorbed: u32) -> Self {
        let absorbed = absorbed.min(self.adjusted_damage);
        self.shield_absorbed = absorbed;
        self.adjusted_damage -= absorbed;
        self
    }

    pub fn with_critical(mut self) -> Self {
        self.is_critical = true;
        self
    }

    /// Total damage dealt (health and shield)
    pub fn total(&self) -> u32 {
        self.adjusted_damage.saturating_add(self.shield_absorbed)
    }
}

/// What a victim needs to know about its attacker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attacker {
    pub guid: EntityId,
    pub is_player: bool,
    pub is_alive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shield_absorb_is_capped() {
        let damage = DamageDescription::new(100, DamageType::Tech).with_shield_absorb(30);
        assert_eq!(damage.adjusted_damage, 70);
        assert_eq!(damage.shield_absorbed, 30);
        assert_eq!(damage.total(), 100);

        let damage = DamageDescription::new(10, DamageType::Physical).with_shield_absorb(50);
        assert_eq!(damage.adjusted_damage, 0);
        assert_eq!(damage.shield_absorbed, 10);
    }
}
