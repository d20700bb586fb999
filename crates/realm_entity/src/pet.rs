//! Companion tracking
//!
//! The owning player keeps a [`PetManager`] with the guids of its companions.
//! Combat pets are kept in summon order; at most one vanity pet exists.
//! Companion entities themselves carry a [`CompanionState`].

use realm_core::{EntityId, UpdateTimer, Violation, ViolationResult};
use serde::{Deserialize, Serialize};

/// Kind of summoned companion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PetKind {
    /// Fights alongside its owner
    Combat,
    /// Cosmetic, at most one per owner
    Vanity,
}

/// Companion guids of one player
#[derive(Debug, Clone, Default)]
pub struct PetManager {
    combat_pets: Vec<EntityId>,
    vanity_pet: Option<EntityId>,
}

impl PetManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Combat pets in summon order
    pub fn combat_pets(&self) -> &[EntityId] {
        &self.combat_pets
    }

    pub fn vanity_pet(&self) -> Option<EntityId> {
        self.vanity_pet
    }

    /// Start tracking a companion that joined the map
    pub fn add_pet_guid(
        &mut self,
        owner: EntityId,
        kind: PetKind,
        guid: EntityId,
    ) -> ViolationResult<()> {
        match kind {
            PetKind::Combat => {
                if !self.combat_pets.contains(&guid) {
                    self.combat_pets.push(guid);
                }
            }
            PetKind::Vanity => {
                if let Some(existing) = self.vanity_pet {
                    return Err(Violation::DuplicateVanityPet {
                        owner,
                        existing,
                        new: guid,
                    });
                }
                self.vanity_pet = Some(guid);
            }
        }
        Ok(())
    }

    /// Stop tracking a companion
    pub fn remove_pet_guid(
        &mut self,
        owner: EntityId,
        kind: PetKind,
        guid: EntityId,
    ) -> ViolationResult<()> {
        match kind {
            PetKind::Combat => self.combat_pets.retain(|&g| g != guid),
            PetKind::Vanity => {
                if self.vanity_pet != Some(guid) {
                    return Err(Violation::MissingVanityPet(owner));
                }
                self.vanity_pet = None;
            }
        }
        Ok(())
    }

    /// Forget the vanity pet, returning its guid
    pub fn take_vanity_pet(&mut self) -> Option<EntityId> {
        self.vanity_pet.take()
    }

    /// Forget every combat pet, returning them in summon order
    pub fn take_combat_pets(&mut self) -> Vec<EntityId> {
        std::mem::take(&mut self.combat_pets)
    }
}

/// State carried by a companion entity
#[derive(Debug, Clone)]
pub struct CompanionState {
    kind: PetKind,
    /// Guid of the owner on the current map, null while detached
    owner: EntityId,
    /// Casting id of the summoning spell
    casting_id: u32,
    spell_base_id: u32,
    follow_timer: UpdateTimer,
}

impl CompanionState {
    pub fn new(
        kind: PetKind,
        owner: EntityId,
        casting_id: u32,
        spell_base_id: u32,
        follow_interval: f64,
    ) -> Self {
        Self {
            kind,
            owner,
            casting_id,
            spell_base_id,
            follow_timer: UpdateTimer::new(follow_interval),
        }
    }

    pub fn kind(&self) -> PetKind {
        self.kind
    }

    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn casting_id(&self) -> u32 {
        self.casting_id
    }

    pub fn spell_base_id(&self) -> u32 {
        self.spell_base_id
    }

    pub(crate) fn set_owner(&mut self, owner: EntityId) {
        self.owner = owner;
    }

    pub(crate) fn resume_follow(&mut self) {
        self.follow_timer.reset();
    }

    /// Detach from the owner when leaving a map
    pub(crate) fn on_enqueue_remove(&mut self) {
        self.follow_timer.reset_disabled();
        self.owner = EntityId::null();
    }

    /// Advance the follow timer. Returns true when a follow check is due.
    pub(crate) fn update_follow(&mut self, delta: f64) -> bool {
        self.follow_timer.update(delta);
        self.follow_timer.take_elapsed() > 0
    }
}
