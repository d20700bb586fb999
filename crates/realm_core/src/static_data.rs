//! Static game tables
//!
//! Read-only lookups into creature, world, spell, faction and experience
//! tables. The tables are loaded once at startup and shared behind
//! `Arc<dyn StaticData>`; lookups are side-effect free and always available.
//!
//! # Table File Format
//!
//! ```json
//! {
//!   "creatures": [{ "id": 1, "name": "Wolf", "display_info": 12, "hit_radius": 1.0 }],
//!   "worlds": [{ "id": 870, "name": "Crimson Isle", "kind": "open" }],
//!   "spells": [{ "id": 100, "base_id": 10, "tier": 1, "cast_time_secs": 1.5 }],
//!   "factions": [{ "id": 166, "relations": [{ "faction": 167, "disposition": "hostile" }] }],
//!   "xp_per_level": [0, 400, 1000]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::id::WorldId;

/// Errors from loading static tables
#[derive(Debug, Error)]
pub enum StaticDataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Creature template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatureEntry {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_info: u32,
    #[serde(default = "default_one")]
    pub hit_radius: f32,
    #[serde(default = "default_one")]
    pub model_scale: f32,
}

fn default_one() -> f32 {
    1.0
}

/// How a world is hosted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldKind {
    /// One shared map for everyone
    Open,
    /// Separate copies per group, created on demand
    Instance,
    /// Instanced per residence (housing)
    Residence,
}

impl WorldKind {
    /// Whether the world is hosted through an instance container
    pub fn is_instanced(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

/// World (zone) entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldEntry {
    pub id: WorldId,
    #[serde(default)]
    pub name: String,
    pub kind: WorldKind,
}

/// Spell tier entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellEntry {
    pub id: u32,
    pub base_id: u32,
    #[serde(default)]
    pub tier: u8,
    /// Zero means instant
    #[serde(default)]
    pub cast_time_secs: f64,
    /// Focus reserved when the cast starts
    #[serde(default)]
    pub focus_cost: u32,
    /// Whether moving cancels the cast
    #[serde(default)]
    pub move_interruptible: bool,
}

/// Relation of one faction toward another
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Hostile,
    Neutral,
    Friendly,
}

/// Explicit friendship level toward another faction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactionRelation {
    pub faction: u32,
    pub disposition: Disposition,
}

/// Faction tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactionEntry {
    pub id: u32,
    #[serde(default)]
    pub parent: Option<u32>,
    #[serde(default)]
    pub relations: Vec<FactionRelation>,
}

impl FactionEntry {
    fn relation_to(&self, faction: u32) -> Option<Disposition> {
        self.relations
            .iter()
            .find(|r| r.faction == faction)
            .map(|r| r.disposition)
    }
}

/// Read-only game table lookups
pub trait StaticData: Send + Sync {
    fn creature(&self, id: u32) -> Option<&CreatureEntry>;
    fn world(&self, id: WorldId) -> Option<&WorldEntry>;
    fn spell(&self, id: u32) -> Option<&SpellEntry>;
    fn faction(&self, id: u32) -> Option<&FactionEntry>;
    /// Total experience required to reach `level`
    fn min_xp_for_level(&self, level: u32) -> Option<u32>;

    /// Disposition of faction `from` toward faction `to`.
    ///
    /// The target's friendships are consulted first (walking up its parents),
    /// then the invoker's; without any explicit relation the answer is neutral.
    fn disposition(&self, from: u32, to: u32) -> Disposition {
        if let Some(d) = self.friendship(to, from) {
            return d;
        }
        if let Some(d) = self.friendship(from, to) {
            return d;
        }
        Disposition::Neutral
    }

    /// Friendship of `node` (or its nearest ancestor that has one) toward `faction`
    fn friendship(&self, node: u32, faction: u32) -> Option<Disposition> {
        let mut current = self.faction(node);
        while let Some(entry) = current {
            if let Some(d) = entry.relation_to(faction) {
                return Some(d);
            }
            current = entry.parent.and_then(|p| self.faction(p));
        }
        None
    }
}

/// On-disk layout of the tables
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct TablesFile {
    creatures: Vec<CreatureEntry>,
    worlds: Vec<WorldEntry>,
    spells: Vec<SpellEntry>,
    factions: Vec<FactionEntry>,
    xp_per_level: Vec<u32>,
}

/// In-memory static tables
#[derive(Debug, Default, Clone)]
pub struct StaticTables {
    creatures: HashMap<u32, CreatureEntry>,
    worlds: HashMap<WorldId, WorldEntry>,
    spells: HashMap<u32, SpellEntry>,
    factions: HashMap<u32, FactionEntry>,
    /// Index 0 is level 1
    xp_per_level: Vec<u32>,
}

impl StaticTables {
    /// Create empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse tables from JSON text
    pub fn from_json(text: &str) -> Result<Self, StaticDataError> {
        let file: TablesFile = serde_json::from_str(text)?;
        let mut tables = Self::new();
        for creature in file.creatures {
            tables = tables.with_creature(creature);
        }
        for world in file.worlds {
            tables = tables.with_world(world);
        }
        for spell in file.spells {
            tables = tables.with_spell(spell);
        }
        for faction in file.factions {
            tables = tables.with_faction(faction);
        }
        tables.xp_per_level = file.xp_per_level;
        Ok(tables)
    }

    /// Load tables from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StaticDataError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let tables = Self::from_json(&text)?;
        log::info!(
            "Loaded static tables from {}: {} creatures, {} worlds, {} spells, {} factions",
            path.as_ref().display(),
            tables.creatures.len(),
            tables.worlds.len(),
            tables.spells.len(),
            tables.factions.len()
        );
        Ok(tables)
    }

    pub fn with_creature(mut self, entry: CreatureEntry) -> Self {
        self.creatures.insert(entry.id, entry);
        self
    }

    pub fn with_world(mut self, entry: WorldEntry) -> Self {
        self.worlds.insert(entry.id, entry);
        self
    }

    pub fn with_spell(mut self, entry: SpellEntry) -> Self {
        self.spells.insert(entry.id, entry);
        self
    }

    pub fn with_faction(mut self, entry: FactionEntry) -> Self {
        self.factions.insert(entry.id, entry);
        self
    }

    pub fn with_xp_table(mut self, xp_per_level: Vec<u32>) -> Self {
        self.xp_per_level = xp_per_level;
        self
    }
}

impl StaticData for StaticTables {
    fn creature(&self, id: u32) -> Option<&CreatureEntry> {
        self.creatures.get(&id)
    }

    fn world(&self, id: WorldId) -> Option<&WorldEntry> {
        self.worlds.get(&id)
    }

    fn spell(&self, id: u32) -> Option<&SpellEntry> {
        self.spells.get(&id)
    }

    fn faction(&self, id: u32) -> Option<&FactionEntry> {
        self.factions.get(&id)
    }

    fn min_xp_for_level(&self, level: u32) -> Option<u32> {
        let index = level.checked_sub(1)? as usize;
        self.xp_per_level.get(index).copied()
    }
}
