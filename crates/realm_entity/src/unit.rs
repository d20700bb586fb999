//! Combat capability
//!
//! Players and non-players carry a [`UnitState`]: a threat table, the combat
//! flag, pending spell casts, the passive regeneration timer and an optional
//! AI collaborator.
//!
//! Threat table mutations are turned into hooks in a fixed order. A newly
//! hated unit becomes the target when there is none, a removal re-runs target
//! selection, and every change first recomputes the combat flag and then
//! re-runs target selection.

use glam::Vec3;
use realm_core::{
    DisableKind, Disposition, EntityId, StaticData, UpdateTimer, Violation, ViolationResult,
    WorldConfig,
};
use std::fmt;

use crate::context::SimContext;
use crate::damage::{Attacker, DamageDescription};
use crate::entity::Entity;
use crate::event::EntityEvent;
use crate::message::ServerMessage;
use crate::property::Property;
use crate::spell::{CastResult, Spell, SpellParameters};
use crate::stat::{Stat, StandState};
use crate::threat::{ThreatEvent, ThreatManager};

/// AI collaborator notified by the combat state machine
pub trait UnitAi: Send {
    fn on_enter_combat(&mut self, _unit: EntityId) {}
    fn on_exit_combat(&mut self, _unit: EntityId) {}
    fn on_death(&mut self, _unit: EntityId, _killer: Option<EntityId>) {}
}

/// Anchor a unit returns to after combat
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leash {
    pub position: Vec3,
    pub rotation: Vec3,
}

/// Combat state of a unit
pub struct UnitState {
    pub(crate) threat: ThreatManager,
    pub(crate) in_combat: bool,
    pub(crate) spells: Vec<Spell>,
    regen_timer: UpdateTimer,
    leash: Leash,
    leash_range: f32,
    pub(crate) ai: Option<Box<dyn UnitAi>>,
}

impl fmt::Debug for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitState")
            .field("threat", &self.threat)
            .field("in_combat", &self.in_combat)
            .field("spells", &self.spells)
            .field("leash", &self.leash)
            .field("has_ai", &self.ai.is_some())
            .finish_non_exhaustive()
    }
}

impl UnitState {
    pub fn new(is_player: bool, config: &WorldConfig) -> Self {
        Self {
            threat: ThreatManager::new(is_player, config.threat_stale_secs),
            in_combat: false,
            spells: Vec::new(),
            regen_timer: UpdateTimer::new(config.regen_interval_secs),
            leash: Leash {
                position: Vec3::ZERO,
                rotation: Vec3::ZERO,
            },
            leash_range: config.leash_range,
            ai: None,
        }
    }

    pub fn threat(&self) -> &ThreatManager {
        &self.threat
    }

    pub fn in_combat(&self) -> bool {
        self.in_combat
    }

    pub fn leash(&self) -> Leash {
        self.leash
    }

    pub fn leash_range(&self) -> f32 {
        self.leash_range
    }

    /// Casts that have not been cleaned up yet
    pub fn spells(&self) -> &[Spell] {
        &self.spells
    }

    pub(crate) fn set_leash(&mut self, position: Vec3) {
        self.leash.position = position;
    }
}

fn no_combat(entity: EntityId) -> Violation {
    Violation::MissingCapability {
        entity,
        capability: "combat",
    }
}

impl Entity {
    /// Attach an AI collaborator
    pub fn set_ai(&mut self, ai: Box<dyn UnitAi>) -> ViolationResult<()> {
        let guid = self.guid;
        self.unit_mut().ok_or_else(|| no_combat(guid))?.ai = Some(ai);
        Ok(())
    }

    pub fn in_combat(&self) -> bool {
        self.unit().map_or(false, |u| u.in_combat)
    }

    /// Threat this unit holds against `target`
    pub fn threat_against(&self, target: EntityId) -> Option<u32> {
        self.unit().and_then(|u| u.threat.threat(target))
    }

    /// Whether the unit is farther from its leash anchor than allowed
    pub fn is_outside_leash(&self) -> bool {
        self.unit().map_or(false, |u| {
            self.position.distance(u.leash.position) > u.leash_range
        })
    }

    // ---- Threat ----

    /// Add signed threat against `target`
    pub fn adjust_threat(
        &mut self,
        target: EntityId,
        target_is_player: bool,
        delta: i64,
    ) -> ViolationResult<()> {
        let guid = self.guid;
        let unit = self.unit_mut().ok_or_else(|| no_combat(guid))?;
        let events = unit.threat.adjust_threat(target, target_is_player, delta);
        self.on_threat_events(events);
        Ok(())
    }

    /// Forget `target`; no-op for entities without combat
    pub fn remove_threat(&mut self, target: EntityId) {
        if let Some(unit) = self.unit_mut() {
            let events = unit.threat.remove(target);
            self.on_threat_events(events);
        }
    }

    /// Forget every hated unit
    pub fn clear_threat(&mut self) {
        if let Some(unit) = self.unit_mut() {
            let events = unit.threat.clear();
            self.on_threat_events(events);
        }
    }

    fn on_threat_events(&mut self, events: Vec<ThreatEvent>) {
        for event in events {
            match event {
                ThreatEvent::Added(hated) => {
                    if self.target.is_none() {
                        self.set_target(Some(hated));
                    }
                }
                ThreatEvent::Removed(_) => self.select_target(),
                ThreatEvent::Changed => {
                    self.check_combat_state();
                    self.select_target();
                }
            }
        }
    }

    /// Target the unit with the most threat
    fn select_target(&mut self) {
        let top = self
            .unit()
            .and_then(|u| u.threat.top())
            .map(|h| h.hated());
        self.set_target(top);
    }

    pub(crate) fn set_target(&mut self, target: Option<EntityId>) {
        if self.target == target {
            return;
        }
        self.target = target;
        self.broadcast(
            ServerMessage::TargetUpdate {
                unit: self.guid,
                target,
            },
            true,
        );
    }

    fn check_combat_state(&mut self) {
        let Some(unit) = self.unit() else {
            return;
        };
        let in_combat = !unit.threat.is_empty();
        if in_combat != unit.in_combat {
            self.on_combat_state_change(in_combat);
        }
    }

    fn on_combat_state_change(&mut self, in_combat: bool) {
        let (guid, position, rotation) = (self.guid, self.position, self.rotation);

        self.store_stat(Stat::Sheathed, if in_combat { 0.0 } else { 1.0 });
        let stance = if in_combat {
            StandState::Stand
        } else {
            StandState::State0
        };
        self.store_stat(Stat::StandState, stance as u32 as f32);

        if let Some(unit) = self.unit_mut() {
            unit.in_combat = in_combat;
            if in_combat {
                unit.leash = Leash { position, rotation };
            }
            if let Some(ai) = unit.ai.as_mut() {
                if in_combat {
                    ai.on_enter_combat(guid);
                } else {
                    ai.on_exit_combat(guid);
                }
            }
        }
        log::debug!(
            "Entity {} {} combat",
            guid,
            if in_combat { "entered" } else { "left" }
        );
        self.events.push(EntityEvent::CombatStateChanged(in_combat));
    }

    // ---- Attacks ----

    /// Whether this unit may attack `target`
    pub fn can_attack(&self, target: &Entity, data: &dyn StaticData) -> bool {
        if !self.is_alive() {
            return false;
        }
        if !self.is_unit() || !target.is_unit() {
            return false;
        }
        if self.is_player() && target.is_player() {
            return false;
        }
        self.disposition_to(target.faction1(), data) < Disposition::Friendly
    }

    /// Receive damage from `attacker`.
    ///
    /// Ignored unless both sides are alive. The victim gains threat against
    /// the attacker equal to the damage; reaching zero health kills it.
    pub fn take_damage(
        &mut self,
        attacker: Attacker,
        damage: &DamageDescription,
    ) -> ViolationResult<()> {
        if !self.is_alive() || !attacker.is_alive {
            return Ok(());
        }

        if self.is_unit() {
            self.adjust_threat(attacker.guid, attacker.is_player, i64::from(damage.total()))?;
        }
        self.modify_shield(-i64::from(damage.shield_absorbed))?;
        self.modify_health(-i64::from(damage.adjusted_damage))?;

        if self.health() == 0 {
            self.kill(Some(attacker.guid))?;
        }
        Ok(())
    }

    /// Finish off an entity whose health already reached zero
    pub fn kill(&mut self, killer: Option<EntityId>) -> ViolationResult<()> {
        let health = self.health();
        if health > 0 {
            return Err(Violation::KillWithHealth {
                entity: self.guid,
                health,
            });
        }
        let state = self.death.current();
        if state.is_living() {
            return Err(Violation::KillWhileAlive {
                entity: self.guid,
                state: state.name(),
            });
        }

        let guid = self.guid;
        if let Some(ai) = self.unit_mut().and_then(|u| u.ai.as_mut()) {
            ai.on_death(guid, killer);
        }
        log::debug!("Entity {} killed by {:?}", guid, killer);
        self.events.push(EntityEvent::Killed { killer });
        Ok(())
    }

    /// Death cleanup for units: drop threat, stop casting
    pub(crate) fn on_unit_death(&mut self) {
        if !self.is_unit() {
            return;
        }
        self.clear_threat();
        self.cancel_spells_where(CastResult::CasterCannotBeDead, |_| true);
    }

    // ---- Spells ----

    /// Start casting a spell.
    ///
    /// Dead casters are ignored; disabled spells are refused with a notice.
    pub fn cast_spell(
        &mut self,
        params: SpellParameters,
        ctx: &SimContext<'_>,
    ) -> ViolationResult<CastResult> {
        if !self.is_unit() {
            return Err(no_combat(self.guid));
        }
        if !self.is_alive() {
            return Ok(CastResult::CasterCannotBeDead);
        }
        let Some(entry) = ctx.data.spell(params.spell_id) else {
            return Ok(CastResult::UnknownSpell);
        };

        if ctx.disables.is_disabled(DisableKind::BaseSpell, entry.base_id) {
            self.send(ServerMessage::system(format!(
                "Unable to cast base spell {} because it is disabled.",
                entry.base_id
            )));
            return Ok(CastResult::SpellDisabled);
        }
        if ctx.disables.is_disabled(DisableKind::Spell, entry.id) {
            self.send(ServerMessage::system(format!(
                "Unable to cast spell {} because it is disabled.",
                entry.id
            )));
            return Ok(CastResult::SpellDisabled);
        }

        let cost = entry.focus_cost;
        if cost > 0 {
            let focus = self.stats.raw(Stat::Focus);
            if focus < cost as f32 {
                return Ok(CastResult::NotEnoughFocus);
            }
            self.store_stat(Stat::Focus, focus - cost as f32);
        }

        let spell = Spell::new(entry.clone(), params.target, cost);
        self.broadcast(
            ServerMessage::SpellStart {
                caster: self.guid,
                casting_id: spell.casting_id(),
                spell_id: entry.id,
            },
            true,
        );
        if let Some(unit) = self.unit_mut() {
            unit.spells.push(spell);
        }
        Ok(CastResult::Ok)
    }

    /// Cancel casts that moving interrupts
    pub fn cancel_spells_on_move(&mut self) {
        self.cancel_spells_where(CastResult::CasterMovement, |s| s.is_moving_interrupted());
    }

    /// Cancel one cast by casting id
    pub fn cancel_spell_cast(&mut self, casting_id: u32) {
        self.cancel_spells_where(CastResult::SpellCancelled, |s| {
            s.casting_id() == casting_id
        });
    }

    fn cancel_spells_where(&mut self, result: CastResult, filter: impl Fn(&Spell) -> bool) {
        let Some(unit) = self.unit_mut() else {
            return;
        };
        let mut refund = 0u32;
        let mut cancelled = Vec::new();
        for spell in unit.spells.iter_mut().filter(|s| s.is_casting() && filter(s)) {
            refund = refund.saturating_add(spell.cancel(result));
            cancelled.push(spell.casting_id());
        }

        for casting_id in cancelled {
            self.broadcast(ServerMessage::CastResult { casting_id, result }, true);
            self.broadcast(ServerMessage::SpellFinish { casting_id }, true);
        }
        if refund > 0 {
            let focus = self.stats.raw(Stat::Focus);
            self.store_stat(Stat::Focus, focus + refund as f32);
        }
    }

    // ---- Tick ----

    pub(crate) fn update_unit(&mut self, delta: f64, ctx: &SimContext<'_>) -> ViolationResult<()> {
        let Some(unit) = self.unit_mut() else {
            return Ok(());
        };

        let mut finished = Vec::new();
        unit.spells.retain(|s| s.is_casting());
        for spell in unit.spells.iter_mut() {
            if spell.update(delta) {
                finished.push(spell.casting_id());
            }
        }

        let threat_events = unit.threat.update(delta);

        unit.regen_timer.update(delta);
        let regen_ticks = unit.regen_timer.take_elapsed();

        for casting_id in finished {
            self.broadcast(ServerMessage::SpellFinish { casting_id }, true);
        }
        self.on_threat_events(threat_events);

        // Both conditions gate regeneration
        for _ in 0..regen_ticks {
            if !self.is_alive() || self.in_combat() {
                break;
            }
            self.regenerate(ctx.config.regen_interval_secs)?;
        }
        Ok(())
    }

    fn regenerate(&mut self, interval: f64) -> ViolationResult<()> {
        let max_health = self.max_health();
        if self.health() < max_health {
            self.modify_health(i64::from(max_health / 200))?;
        }

        let max_shield = self.max_shield();
        if self.shield() < max_shield {
            let pct = self.property(Property::ShieldRegenPct).unwrap_or(0.0);
            let amount = (max_shield as f64 * f64::from(pct) * interval).round() as i64;
            if amount > 0 {
                self.modify_shield(amount)?;
            }
        }
        Ok(())
    }
}
