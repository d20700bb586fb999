//! Inbound map traffic
//!
//! Anything that reaches a map from outside its own tick goes through its
//! inbound channel as a [`MapInbound`] and is applied at the start of the
//! next tick.

use glam::Vec3;
use realm_core::{CharacterId, MapInfo};
use realm_entity::{Entity, LogoutReason, PetKind, SpellParameters, TeleportReason};
use realm_persist::SaveCompletion;

/// Requests a player's session makes of the simulation
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Move(Vec3),
    CastSpell(SpellParameters),
    CancelCast(u32),
    Teleport {
        destination: MapInfo,
        position: Vec3,
        reason: TeleportReason,
    },
    SummonPet {
        kind: PetKind,
        creature_id: u32,
        casting_id: u32,
        spell_base_id: u32,
    },
    DismissPets,
    LogoutStart {
        reason: LogoutReason,
        requested: bool,
    },
    LogoutCancel,
    GrantXp(u32),
    Resurrect,
}

/// Message queued on a map's inbound channel
#[derive(Debug)]
pub enum MapInbound {
    /// Place an entity on the map at the next tick
    Add { entity: Box<Entity>, position: Vec3 },
    /// Queue a command for a player on this map
    Command {
        character: CharacterId,
        command: PlayerCommand,
    },
    /// A save submitted by this map finished
    SaveComplete(SaveCompletion),
}
