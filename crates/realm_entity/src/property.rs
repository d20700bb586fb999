//! Property storage
//!
//! Properties are `(base, value)` pairs. Derived quantities such as maximum
//! health and shield capacity are read from here and never stored twice.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Property kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Property {
    /// Maximum health
    BaseHealth,
    ShieldCapacityMax,
    /// Fraction of max shield regenerated per second
    ShieldRegenPct,
    BaseFocusPool,
    MoveSpeedMultiplier,
    JumpHeight,
    GravityMultiplier,
}

/// Base and effective value of a property
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub property: Property,
    pub base: f32,
    pub value: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyStore {
    values: HashMap<Property, PropertyValue>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property.
    ///
    /// An existing property keeps its base and only takes the new value.
    pub fn set(&mut self, property: Property, base: f32, value: f32) {
        self.values
            .entry(property)
            .and_modify(|p| p.value = value)
            .or_insert(PropertyValue {
                property,
                base,
                value,
            });
    }

    /// Effective value
    pub fn value(&self, property: Property) -> Option<f32> {
        self.values.get(&property).map(|p| p.value)
    }

    pub fn base(&self, property: Property) -> Option<f32> {
        self.values.get(&property).map(|p| p.base)
    }

    pub fn get(&self, property: Property) -> Option<&PropertyValue> {
        self.values.get(&property)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyValue> {
        self.values.values()
    }
}
