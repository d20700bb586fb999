//! Realm Entity - Entity Simulation for the World Server
//!
//! Everything that lives on a map is an [`Entity`]: non-player units,
//! players and their companions.
//!
//! # Features
//!
//! - Typed stats and properties with clamped health and shield
//! - Death state machine with validated cascading transitions
//! - Threat tables, target selection and combat state
//! - Spell casting with disables and focus reservation
//! - Combat and vanity pets with owner bookkeeping
//! - Player logout, experience and a save cycle gated on persistence
//!
//! Entities do not own references to their map. Every outside effect is queued
//! as an [`EntityEvent`] that the map drains after the call.
//!
//! # Example
//!
//! ```ignore
//! use realm_entity::prelude::*;
//!
//! let template = EntityTemplate { health: 900, ..Default::default() };
//! let mut wolf = Entity::non_player(&template, &config);
//! wolf.take_damage(attacker, &DamageDescription::new(500, DamageType::Physical))?;
//!
//! for event in wolf.drain_events() {
//!     map.apply(event);
//! }
//! ```

pub mod context;
pub mod damage;
pub mod death;
pub mod entity;
pub mod event;
pub mod message;
pub mod pet;
pub mod player;
pub mod property;
pub mod spell;
pub mod stat;
pub mod teleport;
pub mod threat;
pub mod unit;

pub mod prelude {
    pub use crate::context::SimContext;
    pub use crate::damage::{Attacker, DamageDescription, DamageType};
    pub use crate::death::{DeathState, DeathStateMachine};
    pub use crate::entity::{Entity, EntityKind, EntityTemplate, ItemVisual, Variant};
    pub use crate::event::EntityEvent;
    pub use crate::message::{
        Broadcaster, HealthMask, LogBroadcast, LogoutReason, NullBroadcast, ServerMessage,
    };
    pub use crate::pet::{CompanionState, PetKind, PetManager};
    pub use crate::player::{
        AccountSnapshot, CharacterRecord, PlayerSnapshot, PlayerState, SaveFollowUp, SaveMask,
    };
    pub use crate::property::{Property, PropertyStore, PropertyValue};
    pub use crate::spell::{CastResult, CastStatus, Spell, SpellParameters};
    pub use crate::stat::{Stat, StatStore, StatType, StatValue};
    pub use crate::teleport::{PendingTeleport, TeleportOrigin, TeleportReason};
    pub use crate::threat::{HostileEntity, ThreatEvent, ThreatManager};
    pub use crate::unit::{Leash, UnitAi, UnitState};
}

pub use prelude::*;
