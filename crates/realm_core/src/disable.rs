//! Administrative disables
//!
//! Spells and worlds can be switched off without a restart. Callers consult
//! [`DisableCheck`] before casting or entering a world and short-circuit with
//! a user-visible notice when the answer is yes.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Category of a disable entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisableKind {
    /// A single spell tier
    Spell,
    /// Every tier of a base spell
    BaseSpell,
    /// A world entry (teleports and world entry)
    World,
}

/// Feature flag lookup
pub trait DisableCheck: Send + Sync {
    /// Whether `id` of the given category is disabled
    fn is_disabled(&self, kind: DisableKind, id: u32) -> bool;
}

/// A single configured disable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisableEntry {
    pub kind: DisableKind,
    pub id: u32,
}

/// In-memory disable list that can be edited while the server runs
#[derive(Debug, Default)]
pub struct DisableList {
    entries: RwLock<HashSet<(DisableKind, u32)>>,
}

impl DisableList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a list from configured entries
    pub fn from_entries(entries: impl IntoIterator<Item = DisableEntry>) -> Self {
        let list = Self::new();
        for entry in entries {
            list.disable(entry.kind, entry.id);
        }
        list
    }

    /// Disable an id
    pub fn disable(&self, kind: DisableKind, id: u32) {
        if self.entries.write().insert((kind, id)) {
            log::info!("Disabled {:?} {}", kind, id);
        }
    }

    /// Re-enable an id
    pub fn enable(&self, kind: DisableKind, id: u32) {
        if self.entries.write().remove(&(kind, id)) {
            log::info!("Enabled {:?} {}", kind, id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl DisableCheck for DisableList {
    fn is_disabled(&self, kind: DisableKind, id: u32) -> bool {
        self.entries.read().contains(&(kind, id))
    }
}
