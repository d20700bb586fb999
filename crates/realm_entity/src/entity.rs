//! Entity state core
//!
//! An [`Entity`] is one value with the state every world object shares
//! (position, stats, properties, visuals, death state) plus a [`Variant`]
//! holding the capabilities of its kind. Units (players and non-players) carry
//! a [`UnitState`] for threat, spells and regeneration; players add a
//! [`PlayerState`]; companions carry a [`CompanionState`].
//!
//! Entities never touch their map directly. Effects on observers, other
//! entities or the map are queued as [`EntityEvent`]s and drained by the map.
//!
//! # Invariants
//!
//! - `0 <= health <= max_health`, where max health is the `BaseHealth` property
//! - `0 <= shield <= max_shield`, where max shield is `ShieldCapacityMax`
//! - Death state changes only through the transition table in [`crate::death`]

use glam::Vec3;
use realm_core::{
    CharacterId, Disposition, EntityId, StaticData, ViolationResult, WorldConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::context::SimContext;
use crate::death::{DeathState, DeathStateMachine};
use crate::event::EntityEvent;
use crate::message::{
    HealthMask, ServerMessage, DEATH_REASON_KILLED, DEATH_REASON_RESURRECTED,
};
use crate::pet::{CompanionState, PetKind};
use crate::player::PlayerState;
use crate::property::{Property, PropertyStore};
use crate::stat::{Stat, StatStore};
use crate::unit::UnitState;

/// Kind of entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    NonPlayer,
    Player,
    Pet,
    VanityPet,
}

/// Capabilities selected by entity kind
#[derive(Debug)]
pub enum Variant {
    NonPlayer(Box<UnitState>),
    Player(Box<PlayerState>),
    Companion(CompanionState),
}

/// Item visual in an equipment slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemVisual {
    pub slot: u32,
    /// Zero clears the slot
    pub display_id: u32,
}

fn default_level() -> u32 {
    1
}

/// Persisted description of a non-player entity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityTemplate {
    pub creature_id: u32,
    pub rotation: Vec3,
    pub display_info: u32,
    pub outfit_info: u16,
    pub faction1: u32,
    pub faction2: u32,
    #[serde(default = "default_level")]
    pub level: u32,
    pub health: u32,
    /// Defaults to `health`
    pub max_health: Option<u32>,
    pub shield: u32,
    pub max_shield: u32,
    pub shield_regen_pct: f32,
    pub visuals: Vec<ItemVisual>,
}

/// A live world object
#[derive(Debug)]
pub struct Entity {
    /// Null until the entity is added to a map
    pub(crate) guid: EntityId,
    pub(crate) variant: Variant,
    pub(crate) creature_id: u32,
    pub(crate) position: Vec3,
    /// Yaw in `x`
    pub(crate) rotation: Vec3,
    pub(crate) stats: StatStore,
    pub(crate) properties: PropertyStore,
    pub(crate) visuals: BTreeMap<u32, u32>,
    pub(crate) display_info: u32,
    pub(crate) outfit_info: u16,
    pub(crate) faction1: u32,
    pub(crate) faction2: u32,
    pub(crate) controller: Option<EntityId>,
    pub(crate) target: Option<EntityId>,
    pub(crate) death: DeathStateMachine,
    pub(crate) events: Vec<EntityEvent>,
}

impl Entity {
    fn with_variant(variant: Variant) -> Self {
        Self {
            guid: EntityId::null(),
            variant,
            creature_id: 0,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            stats: StatStore::new(),
            properties: PropertyStore::new(),
            visuals: BTreeMap::new(),
            display_info: 0,
            outfit_info: 0,
            faction1: 0,
            faction2: 0,
            controller: None,
            target: None,
            death: DeathStateMachine::new(),
            events: Vec::new(),
        }
    }

    /// Create a non-player unit from a template
    pub fn non_player(template: &EntityTemplate, config: &WorldConfig) -> Self {
        let mut entity = Self::with_variant(Variant::NonPlayer(Box::new(UnitState::new(
            false, config,
        ))));
        entity.creature_id = template.creature_id;
        entity.rotation = template.rotation;
        entity.display_info = template.display_info;
        entity.outfit_info = template.outfit_info;
        entity.faction1 = template.faction1;
        entity.faction2 = template.faction2;

        // A template health above its max raises the max
        let max_health = template
            .max_health
            .unwrap_or(template.health)
            .max(template.health) as f32;
        entity.properties.set(Property::BaseHealth, max_health, max_health);
        entity.properties.set(
            Property::ShieldCapacityMax,
            template.max_shield as f32,
            template.max_shield as f32,
        );
        entity.properties.set(
            Property::ShieldRegenPct,
            template.shield_regen_pct,
            template.shield_regen_pct,
        );
        entity.stats.store(Stat::Health, template.health as f32);
        entity
            .stats
            .store(Stat::Shield, template.shield.min(template.max_shield) as f32);
        entity.stats.store(Stat::Level, template.level as f32);
        entity.stats.store(Stat::Sheathed, 1.0);
        for visual in &template.visuals {
            if visual.display_id != 0 {
                entity.visuals.insert(visual.slot, visual.display_id);
            }
        }
        entity
    }

    /// Create a companion bound to `owner`
    pub fn companion(
        kind: PetKind,
        owner: EntityId,
        creature_id: u32,
        display_info: u32,
        casting_id: u32,
        spell_base_id: u32,
        config: &WorldConfig,
    ) -> Self {
        let mut entity = Self::with_variant(Variant::Companion(CompanionState::new(
            kind,
            owner,
            casting_id,
            spell_base_id,
            config.pet.follow_interval_secs,
        )));
        entity.creature_id = creature_id;
        entity.display_info = display_info;

        entity.properties.set(Property::BaseHealth, 800.0, 800.0);
        entity.stats.store(Stat::Health, 800.0);
        entity.stats.store(Stat::Level, 3.0);
        entity.stats.store(Stat::Sheathed, 0.0);
        entity
    }

    pub(crate) fn player_from_state(state: PlayerState) -> Self {
        Self::with_variant(Variant::Player(Box::new(state)))
    }

    // ---- Identity ----

    pub fn guid(&self) -> EntityId {
        self.guid
    }

    pub fn kind(&self) -> EntityKind {
        match &self.variant {
            Variant::NonPlayer(_) => EntityKind::NonPlayer,
            Variant::Player(_) => EntityKind::Player,
            Variant::Companion(c) => match c.kind() {
                PetKind::Combat => EntityKind::Pet,
                PetKind::Vanity => EntityKind::VanityPet,
            },
        }
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    pub fn is_player(&self) -> bool {
        matches!(self.variant, Variant::Player(_))
    }

    /// Players and non-players take part in combat
    pub fn is_unit(&self) -> bool {
        self.unit().is_some()
    }

    pub fn character_id(&self) -> Option<CharacterId> {
        self.player().map(|p| p.character_id())
    }

    pub fn creature_id(&self) -> u32 {
        self.creature_id
    }

    pub fn player(&self) -> Option<&PlayerState> {
        match &self.variant {
            Variant::Player(p) => Some(p.as_ref()),
            _ => None,
        }
    }

    pub fn player_mut(&mut self) -> Option<&mut PlayerState> {
        match &mut self.variant {
            Variant::Player(p) => Some(p.as_mut()),
            _ => None,
        }
    }

    pub fn unit(&self) -> Option<&UnitState> {
        match &self.variant {
            Variant::NonPlayer(u) => Some(u.as_ref()),
            Variant::Player(p) => Some(p.unit()),
            Variant::Companion(_) => None,
        }
    }

    pub fn unit_mut(&mut self) -> Option<&mut UnitState> {
        match &mut self.variant {
            Variant::NonPlayer(u) => Some(u.as_mut()),
            Variant::Player(p) => Some(p.unit_mut()),
            Variant::Companion(_) => None,
        }
    }

    pub fn companion_state(&self) -> Option<&CompanionState> {
        match &self.variant {
            Variant::Companion(c) => Some(c),
            _ => None,
        }
    }

    pub fn companion_state_mut(&mut self) -> Option<&mut CompanionState> {
        match &mut self.variant {
            Variant::Companion(c) => Some(c),
            _ => None,
        }
    }

    // ---- Placement ----

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: Vec3) {
        self.rotation = rotation;
    }

    /// Where a companion of this entity appears, `offset` units behind it
    pub fn companion_spawn_position(&self, offset: f32) -> Vec3 {
        let yaw = self.rotation.x;
        self.position - Vec3::new(yaw.sin(), 0.0, yaw.cos()) * offset
    }

    pub fn controller(&self) -> Option<EntityId> {
        self.controller
    }

    /// Mark this entity as puppeted by `controller`
    pub fn set_controller(&mut self, controller: Option<EntityId>) {
        self.controller = controller;
    }

    pub fn target(&self) -> Option<EntityId> {
        self.target
    }

    // ---- Factions ----

    pub fn faction1(&self) -> u32 {
        self.faction1
    }

    pub fn faction2(&self) -> u32 {
        self.faction2
    }

    pub fn set_factions(&mut self, faction1: u32, faction2: u32) {
        self.faction1 = faction1;
        self.faction2 = faction2;
    }

    /// Disposition of this entity toward a faction
    pub fn disposition_to(&self, faction: u32, data: &dyn StaticData) -> Disposition {
        data.disposition(self.faction1, faction)
    }

    // ---- Stats ----

    pub fn stats(&self) -> &StatStore {
        &self.stats
    }

    pub fn stat_integer(&self, stat: Stat) -> ViolationResult<Option<u32>> {
        self.stats.integer(stat)
    }

    pub fn stat_float(&self, stat: Stat) -> ViolationResult<Option<f32>> {
        self.stats.float(stat)
    }

    /// Set an integer stat, broadcasting it when observable.
    ///
    /// Health and shield go through their clamped setters.
    pub fn set_stat_integer(&mut self, stat: Stat, value: u32) -> ViolationResult<()> {
        match stat {
            Stat::Health => self.modify_health(i64::from(value) - i64::from(self.health())),
            Stat::Shield => self.set_shield(value),
            _ => {
                if let Some(update) = self.stats.set_integer(stat, value)? {
                    self.broadcast(
                        ServerMessage::StatUpdate {
                            unit: self.guid,
                            stat: update,
                        },
                        true,
                    );
                }
                Ok(())
            }
        }
    }

    /// Set a float stat, broadcasting it when observable
    pub fn set_stat_float(&mut self, stat: Stat, value: f32) -> ViolationResult<()> {
        if let Some(update) = self.stats.set_float(stat, value)? {
            self.broadcast(
                ServerMessage::StatUpdate {
                    unit: self.guid,
                    stat: update,
                },
                true,
            );
        }
        Ok(())
    }

    pub fn level(&self) -> u32 {
        self.stats.raw(Stat::Level) as u32
    }

    // ---- Properties ----

    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    pub fn property(&self, property: Property) -> Option<f32> {
        self.properties.value(property)
    }

    /// Set a property; lowering a maximum clamps the current value
    pub fn set_property(
        &mut self,
        property: Property,
        base: f32,
        value: f32,
    ) -> ViolationResult<()> {
        self.properties.set(property, base, value);
        match property {
            Property::BaseHealth if self.health() > self.max_health() => self.modify_health(0),
            Property::ShieldCapacityMax if self.shield() > self.max_shield() => {
                self.set_shield(self.shield())
            }
            _ => Ok(()),
        }
    }

    // ---- Health and shield ----

    pub fn health(&self) -> u32 {
        self.stats.raw(Stat::Health) as u32
    }

    /// Derived from the `BaseHealth` property
    pub fn max_health(&self) -> u32 {
        self.properties.value(Property::BaseHealth).unwrap_or(0.0).max(0.0) as u32
    }

    pub fn shield(&self) -> u32 {
        self.stats.raw(Stat::Shield) as u32
    }

    pub fn max_shield(&self) -> u32 {
        self.properties
            .value(Property::ShieldCapacityMax)
            .unwrap_or(0.0)
            .max(0.0) as u32
    }

    /// Alive means positive health in a living death state
    pub fn is_alive(&self) -> bool {
        self.health() > 0 && self.death.current().is_living()
    }

    pub fn death_state(&self) -> DeathState {
        self.death.current()
    }

    /// Apply a signed health change, clamped into `[0, max_health]`.
    ///
    /// Dropping to zero enters `JustDied`, rising from zero enters
    /// `JustSpawned`. The transition is validated before anything changes.
    /// A living entity that sits at zero health (spawned without any) is
    /// healed in place and settles into `Alive`.
    pub fn modify_health(&mut self, delta: i64) -> ViolationResult<()> {
        let current = self.health();
        let new = i64::from(current)
            .saturating_add(delta)
            .clamp(0, i64::from(self.max_health())) as u32;
        let state = self.death_state();

        let transition = if current > 0 && new == 0 {
            Some(DeathState::JustDied)
        } else if current == 0 && new > 0 && !state.is_living() {
            Some(DeathState::JustSpawned)
        } else {
            None
        };
        let path = match transition {
            Some(to) => self.death.plan(self.guid, to, self.is_player())?,
            None if current == 0 && new > 0 && state == DeathState::JustSpawned => {
                vec![DeathState::Alive]
            }
            None => Vec::new(),
        };

        if new != current {
            self.stats.store(Stat::Health, new as f32);
            let mask = if transition == Some(DeathState::JustDied) {
                HealthMask::Damage
            } else {
                HealthMask::Normal
            };
            self.broadcast(
                ServerMessage::HealthUpdate {
                    unit: self.guid,
                    health: new,
                },
                false,
            );
            if self.is_player() {
                self.send(ServerMessage::PlayerHealthUpdate {
                    unit: self.guid,
                    health: new,
                    mask,
                });
            }
        }

        if let Some(to) = transition {
            let dead = to == DeathState::JustDied;
            self.broadcast(
                ServerMessage::Death {
                    unit: self.guid,
                    dead,
                    reason: if dead {
                        DEATH_REASON_KILLED
                    } else {
                        DEATH_REASON_RESURRECTED
                    },
                    rez_health: if dead { 0 } else { new },
                },
                true,
            );
        }
        self.enter_death_states(path);
        Ok(())
    }

    /// Set the shield, clamped into `[0, max_shield]`
    pub fn set_shield(&mut self, value: u32) -> ViolationResult<()> {
        let value = value.min(self.max_shield());
        if let Some(update) = self.stats.set_integer(Stat::Shield, value)? {
            self.broadcast(
                ServerMessage::StatUpdate {
                    unit: self.guid,
                    stat: update,
                },
                true,
            );
        }
        Ok(())
    }

    /// Apply a signed shield change
    pub fn modify_shield(&mut self, delta: i64) -> ViolationResult<()> {
        let value = i64::from(self.shield())
            .saturating_add(delta)
            .clamp(0, i64::from(u32::MAX)) as u32;
        self.set_shield(value)
    }

    // ---- Death state ----

    /// Request an explicit death-state transition (`Dead`, or `JustSpawned`
    /// to resurrect without touching health)
    pub fn set_death_state(&mut self, to: DeathState) -> ViolationResult<()> {
        let path = self.death.plan(self.guid, to, self.is_player())?;
        self.enter_death_states(path);
        Ok(())
    }

    /// Bring a dead entity back with `health` (full health when None)
    pub fn resurrect(&mut self, health: Option<u32>) -> ViolationResult<()> {
        let health = health.unwrap_or_else(|| self.max_health()).max(1);
        if self.health() == 0 {
            self.modify_health(i64::from(health))
        } else {
            self.set_death_state(DeathState::JustSpawned)
        }
    }

    fn enter_death_states(&mut self, path: Vec<DeathState>) {
        for state in path {
            self.death.enter(state);
            self.on_death_state_change(state);
        }
    }

    fn on_death_state_change(&mut self, state: DeathState) {
        log::debug!("Entity {} entered death state {}", self.guid, state.name());
        if state == DeathState::JustDied {
            self.on_unit_death();
        }
        self.events.push(EntityEvent::DeathStateChanged(state));
    }

    // ---- Visuals ----

    pub fn display_info(&self) -> u32 {
        self.display_info
    }

    pub fn outfit_info(&self) -> u16 {
        self.outfit_info
    }

    /// Equipped visuals by slot
    pub fn appearance(&self) -> impl Iterator<Item = ItemVisual> + '_ {
        self.visuals.iter().map(|(&slot, &display_id)| ItemVisual { slot, display_id })
    }

    /// Equip or clear a visual slot
    pub fn set_appearance(&mut self, visual: ItemVisual) {
        if visual.display_id == 0 {
            self.visuals.remove(&visual.slot);
        } else {
            self.visuals.insert(visual.slot, visual.display_id);
        }
    }

    /// Change the model and tell everyone, including self
    pub fn set_display_info(&mut self, display_info: u32, outfit_info: u16) {
        self.display_info = display_info;
        self.outfit_info = outfit_info;
        let slots = self.visuals.iter().map(|(&s, &d)| (s, d)).collect();
        self.broadcast(
            ServerMessage::VisualUpdate {
                unit: self.guid,
                display_info,
                outfit_info,
                slots,
            },
            true,
        );
    }

    // ---- Movement ----

    /// Move to a new position.
    ///
    /// Cancels movement-interruptible casts and drags the vanity pet along.
    pub fn relocate(&mut self, position: Vec3) {
        self.position = position;
        self.cancel_spells_on_move();
        let vanity = self.player_mut().and_then(|player| {
            player.on_relocate();
            player.pets().vanity_pet()
        });
        if let Some(vanity) = vanity {
            self.events.push(EntityEvent::Relocate {
                entity: vanity,
                position,
            });
        }
    }

    // ---- Map hooks ----

    /// Called by the map when the entity joins it
    pub fn on_add_to_map(&mut self, guid: EntityId, position: Vec3) {
        self.guid = guid;
        self.position = position;
        if let Some(unit) = self.unit_mut() {
            unit.set_leash(position);
        }
        if let Some(companion) = self.companion_state_mut() {
            companion.resume_follow();
        }
    }

    /// Called by the map when removal is queued
    pub fn on_enqueue_remove(&mut self) {
        if let Some(companion) = self.companion_state_mut() {
            companion.on_enqueue_remove();
        }
    }

    /// Called by the map when the entity leaves it
    pub fn on_remove_from_map(&mut self) {
        self.clear_threat();
        self.target = None;
        self.controller = None;
        self.guid = EntityId::null();
    }

    /// Bind a detached companion to its owner's guid on the new map
    pub fn set_companion_owner(&mut self, owner: EntityId) {
        if let Some(companion) = self.companion_state_mut() {
            companion.set_owner(owner);
        }
    }

    // ---- Tick ----

    /// Advance the entity by `delta` seconds
    pub fn update(&mut self, delta: f64, ctx: &SimContext<'_>) -> ViolationResult<()> {
        if self.is_player() && !self.update_player(delta) {
            return Ok(());
        }

        if let Some(companion) = self.companion_state_mut() {
            let owner = companion.owner();
            if companion.update_follow(delta) && !owner.is_null() {
                self.events.push(EntityEvent::FollowOwner { owner });
            }
        }

        self.update_unit(delta, ctx)
    }

    // ---- Events ----

    /// Write a stat whose type is statically known, broadcasting it when observable
    pub(crate) fn store_stat(&mut self, stat: Stat, value: f32) {
        if let Some(update) = self.stats.store(stat, value) {
            self.broadcast(
                ServerMessage::StatUpdate {
                    unit: self.guid,
                    stat: update,
                },
                true,
            );
        }
    }

    pub(crate) fn broadcast(&mut self, message: ServerMessage, include_self: bool) {
        self.events.push(EntityEvent::broadcast(message, include_self));
    }

    pub(crate) fn send(&mut self, message: ServerMessage) {
        self.events.push(EntityEvent::Send(message));
    }

    /// Take all queued effects
    pub fn drain_events(&mut self) -> Vec<EntityEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }
}
