//! Server messages and the broadcast collaborator
//!
//! Entities describe what observers should learn as [`ServerMessage`]s. How a
//! message reaches a client is up to the [`Broadcaster`] implementation.

use glam::Vec3;
use realm_core::{CharacterId, EntityId, WorldId};
use serde::{Deserialize, Serialize};

use crate::spell::CastResult;
use crate::stat::StatValue;

/// Why a player health update was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthMask {
    Normal,
    /// The change was a death blow
    Damage,
}

/// Death packet reason for dying
pub const DEATH_REASON_KILLED: u8 = 7;
/// Death packet reason for coming back to life
pub const DEATH_REASON_RESURRECTED: u8 = 2;

/// Why a client is being logged out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogoutReason {
    #[default]
    Requested,
    Kicked,
    ServerShutdown,
}

/// Messages pushed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    StatUpdate {
        unit: EntityId,
        stat: StatValue,
    },
    HealthUpdate {
        unit: EntityId,
        health: u32,
    },
    PlayerHealthUpdate {
        unit: EntityId,
        health: u32,
        mask: HealthMask,
    },
    Death {
        unit: EntityId,
        dead: bool,
        reason: u8,
        rez_health: u32,
    },
    VisualUpdate {
        unit: EntityId,
        display_info: u32,
        outfit_info: u16,
        slots: Vec<(u32, u32)>,
    },
    TargetUpdate {
        unit: EntityId,
        target: Option<EntityId>,
    },
    SpellStart {
        caster: EntityId,
        casting_id: u32,
        spell_id: u32,
    },
    SpellFinish {
        casting_id: u32,
    },
    CastResult {
        casting_id: u32,
        result: CastResult,
    },
    PetSummoned {
        owner: EntityId,
        pet: EntityId,
        casting_id: u32,
    },
    MovementControl {
        unit: EntityId,
    },
    ChangeWorld {
        world: WorldId,
        position: Vec3,
    },
    Xp {
        total_xp: u32,
        granted: u32,
    },
    LogoutStart {
        delay_secs: f64,
    },
    LogoutCancel,
    ClientLogout {
        requested: bool,
        reason: LogoutReason,
    },
    /// Plain text notice, used for non-fatal rejections
    SystemMessage {
        text: String,
    },
}

impl ServerMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self::SystemMessage { text: text.into() }
    }
}

/// Visibility broadcast collaborator.
///
/// Fire and forget; implementations must not call back into the simulation.
pub trait Broadcaster: Send + Sync {
    fn notify_visible(&self, observers: &[CharacterId], message: &ServerMessage);
}

/// Broadcaster that drops everything
#[derive(Debug, Default)]
pub struct NullBroadcast;

impl Broadcaster for NullBroadcast {
    fn notify_visible(&self, _observers: &[CharacterId], _message: &ServerMessage) {}
}

/// Broadcaster that logs every message at debug level
#[derive(Debug, Default)]
pub struct LogBroadcast;

impl Broadcaster for LogBroadcast {
    fn notify_visible(&self, observers: &[CharacterId], message: &ServerMessage) {
        if !observers.is_empty() {
            log::debug!("-> {:?}: {:?}", observers, message);
        }
    }
}
