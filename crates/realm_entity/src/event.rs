//! Entity effects
//!
//! Entity methods never reach into other entities or the map. Anything that
//! leaves the entity is queued as an [`EntityEvent`] and applied by the map
//! after the call returns, in queue order.

use glam::Vec3;
use realm_core::EntityId;

use crate::death::DeathState;
use crate::entity::Entity;
use crate::message::ServerMessage;
use crate::player::{PlayerSnapshot, SaveFollowUp};

#[derive(Debug)]
pub enum EntityEvent {
    /// Send to every player that can see the entity
    Broadcast {
        message: ServerMessage,
        /// Also send to the entity itself and its controller
        include_self: bool,
    },
    /// Send to the entity's own session only (players)
    Send(ServerMessage),
    /// A death state was entered
    DeathStateChanged(DeathState),
    CombatStateChanged(bool),
    /// The entity was killed
    Killed { killer: Option<EntityId> },
    /// Add a new entity to the map
    Spawn { entity: Box<Entity>, position: Vec3 },
    /// Remove an entity from the map
    Remove(EntityId),
    /// Move another entity along with this one
    Relocate { entity: EntityId, position: Vec3 },
    /// Pet wants to catch up with its owner
    FollowOwner { owner: EntityId },
    /// Submit a save to the persistence pipeline
    Save {
        snapshot: Box<PlayerSnapshot>,
        follow_up: SaveFollowUp,
    },
}

impl EntityEvent {
    pub fn broadcast(message: ServerMessage, include_self: bool) -> Self {
        Self::Broadcast {
            message,
            include_self,
        }
    }
}
