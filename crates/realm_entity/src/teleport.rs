//! Teleport staging record

use glam::Vec3;
use realm_core::MapInfo;
use serde::{Deserialize, Serialize};

use crate::entity::Entity;

/// Why a teleport was requested
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeleportReason {
    #[default]
    Relocate,
    /// First placement after login
    Login,
    Spell,
    Command,
    /// Returning after a failed teleport
    Return,
}

/// Where an entity came from, so a failed teleport can put it back
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeleportOrigin {
    pub info: MapInfo,
    pub position: Vec3,
}

/// Staging record owned by an entity between leaving one map and joining another
#[derive(Debug)]
pub struct PendingTeleport {
    destination: MapInfo,
    position: Vec3,
    reason: TeleportReason,
    /// None during initial login
    origin: Option<TeleportOrigin>,
    /// Template of the vanity pet to summon again after arrival
    vanity_pet_creature: Option<u32>,
    /// Detached combat pets travelling with the owner
    pets: Vec<Entity>,
}

impl PendingTeleport {
    pub fn new(destination: MapInfo, position: Vec3, reason: TeleportReason) -> Self {
        Self {
            destination,
            position,
            reason,
            origin: None,
            vanity_pet_creature: None,
            pets: Vec::new(),
        }
    }

    /// Initial placement of a freshly loaded player
    pub fn login(destination: MapInfo, position: Vec3) -> Self {
        Self::new(destination, position, TeleportReason::Login)
    }

    pub fn with_origin(mut self, origin: TeleportOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn destination(&self) -> MapInfo {
        self.destination
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn reason(&self) -> TeleportReason {
        self.reason
    }

    pub fn origin(&self) -> Option<TeleportOrigin> {
        self.origin
    }

    pub fn vanity_pet_creature(&self) -> Option<u32> {
        self.vanity_pet_creature
    }

    pub fn pets(&self) -> &[Entity] {
        &self.pets
    }

    pub fn set_vanity_pet(&mut self, creature: u32) {
        self.vanity_pet_creature = Some(creature);
    }

    pub fn add_pet(&mut self, pet: Entity) {
        self.pets.push(pet);
    }

    /// Split into the vanity template and the staged combat pets
    pub fn into_companions(self) -> (Option<u32>, Vec<Entity>) {
        (self.vanity_pet_creature, self.pets)
    }

    /// Record sending the entity back where it came from, companions included.
    ///
    /// Returns None when there is nowhere to go back to.
    pub fn into_return(self) -> Option<PendingTeleport> {
        let origin = self.origin?;
        Some(PendingTeleport {
            destination: origin.info,
            position: origin.position,
            reason: TeleportReason::Return,
            origin: None,
            vanity_pet_creature: self.vanity_pet_creature,
            pets: self.pets,
        })
    }
}
