//! # realm_core - Realm Core
//!
//! Primitives shared by every crate of the world server:
//! - **Identifiers** for entities, instances, worlds and characters
//! - **Violations**, the programming-error taxonomy surfaced at tick boundaries
//! - **Configuration** for the simulation (`WorldConfig`)
//! - **Update timers** that accumulate simulated time
//! - **Read-only context**: static game tables and the disable list
//!
//! Everything here is constructed once at startup and passed explicitly to
//! the subsystems that need it. There is no global mutable state.

pub mod config;
pub mod disable;
pub mod error;
pub mod id;
pub mod location;
pub mod static_data;
pub mod timer;

pub use config::{PetConfig, WorldConfig};
pub use disable::{DisableCheck, DisableEntry, DisableKind, DisableList};
pub use error::{Violation, ViolationResult};
pub use id::{CharacterId, EntityId, IdGenerator, InstanceId, WorldId};
pub use location::MapInfo;
pub use static_data::{
    CreatureEntry, Disposition, FactionEntry, FactionRelation, SpellEntry, StaticData,
    StaticDataError, StaticTables, WorldEntry, WorldKind,
};
pub use timer::UpdateTimer;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WorldConfig;
    pub use crate::disable::{DisableCheck, DisableKind};
    pub use crate::error::{Violation, ViolationResult};
    pub use crate::id::{CharacterId, EntityId, InstanceId, WorldId};
    pub use crate::location::MapInfo;
    pub use crate::static_data::{Disposition, StaticData};
    pub use crate::timer::UpdateTimer;
    pub use glam::Vec3;
}
