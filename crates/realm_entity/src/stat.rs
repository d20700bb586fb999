//! Stat storage
//!
//! Stats are numeric values keyed by [`Stat`]. Every stat has a static
//! [`StatAttribute`] describing its value type and whether changes are sent to
//! observers. Writing a stat with the wrong value type is a [`Violation`].

use realm_core::{Violation, ViolationResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Value type of a stat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatType {
    Integer,
    Float,
}

impl StatType {
    fn name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
        }
    }
}

/// Static description of a stat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatAttribute {
    pub kind: StatType,
    /// Whether changes are broadcast to observers
    pub send_update: bool,
}

/// Stat kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stat {
    /// Current health, broadcast through dedicated health messages
    Health,
    /// Current shield
    Shield,
    Level,
    /// 1 while weapons are sheathed
    Sheathed,
    StandState,
    /// Current focus (spell resource)
    Focus,
    /// Dash charge, internal bookkeeping
    Dash,
}

impl Stat {
    /// Attribute of this stat
    pub const fn attribute(self) -> StatAttribute {
        match self {
            Self::Health => StatAttribute {
                kind: StatType::Integer,
                send_update: false,
            },
            Self::Shield | Self::Level | Self::Sheathed | Self::StandState => StatAttribute {
                kind: StatType::Integer,
                send_update: true,
            },
            Self::Focus => StatAttribute {
                kind: StatType::Float,
                send_update: true,
            },
            Self::Dash => StatAttribute {
                kind: StatType::Float,
                send_update: false,
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Health => "Health",
            Self::Shield => "Shield",
            Self::Level => "Level",
            Self::Sheathed => "Sheathed",
            Self::StandState => "StandState",
            Self::Focus => "Focus",
            Self::Dash => "Dash",
        }
    }

    fn check(self, expected: StatType) -> ViolationResult<()> {
        if self.attribute().kind == expected {
            Ok(())
        } else {
            Err(Violation::StatType {
                stat: self.name(),
                expected: expected.name(),
            })
        }
    }
}

/// Stance values stored in [`Stat::StandState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum StandState {
    /// Idle stance
    State0 = 0,
    Stand = 1,
}

/// A single stat value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatValue {
    pub stat: Stat,
    pub value: f32,
}

/// Stat values of an entity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatStore {
    values: HashMap<Stat, f32>,
}

impl StatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an integer stat
    pub fn integer(&self, stat: Stat) -> ViolationResult<Option<u32>> {
        stat.check(StatType::Integer)?;
        Ok(self.values.get(&stat).map(|v| *v as u32))
    }

    /// Read a float stat
    pub fn float(&self, stat: Stat) -> ViolationResult<Option<f32>> {
        stat.check(StatType::Float)?;
        Ok(self.values.get(&stat).copied())
    }

    /// Write an integer stat.
    ///
    /// Returns the new value when the stat is observable.
    pub fn set_integer(&mut self, stat: Stat, value: u32) -> ViolationResult<Option<StatValue>> {
        stat.check(StatType::Integer)?;
        Ok(self.store(stat, value as f32))
    }

    /// Write a float stat.
    ///
    /// Returns the new value when the stat is observable.
    pub fn set_float(&mut self, stat: Stat, value: f32) -> ViolationResult<Option<StatValue>> {
        stat.check(StatType::Float)?;
        Ok(self.store(stat, value))
    }

    /// Untyped read used where the type is statically known
    pub(crate) fn raw(&self, stat: Stat) -> f32 {
        self.values.get(&stat).copied().unwrap_or(0.0)
    }

    /// Untyped write used where the type is statically known
    pub(crate) fn store(&mut self, stat: Stat, value: f32) -> Option<StatValue> {
        self.values.insert(stat, value);
        stat.attribute()
            .send_update
            .then_some(StatValue { stat, value })
    }

    pub fn contains(&self, stat: Stat) -> bool {
        self.values.contains_key(&stat)
    }

    pub fn iter(&self) -> impl Iterator<Item = StatValue> + '_ {
        self.values
            .iter()
            .map(|(&stat, &value)| StatValue { stat, value })
    }
}
