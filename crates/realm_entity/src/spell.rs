//! Pending spell casts

use realm_core::{EntityId, IdGenerator, SpellEntry};
use serde::{Deserialize, Serialize};

static CASTING_IDS: IdGenerator = IdGenerator::new();

/// Outcome of a cast request or the reason a cast ended early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastResult {
    Ok,
    /// Caster is not alive
    CasterCannotBeDead,
    CasterMovement,
    SpellCancelled,
    /// Spell or base spell administratively disabled
    SpellDisabled,
    UnknownSpell,
    NotEnoughFocus,
}

/// Request to cast a spell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpellParameters {
    pub spell_id: u32,
    pub target: Option<EntityId>,
    /// Cast came from a client request rather than a script
    pub user_initiated: bool,
}

impl SpellParameters {
    pub fn new(spell_id: u32) -> Self {
        Self {
            spell_id,
            target: None,
            user_initiated: false,
        }
    }

    pub fn with_target(mut self, target: EntityId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn user_initiated(mut self) -> Self {
        self.user_initiated = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastStatus {
    Casting,
    Finished,
    Cancelled(CastResult),
}

/// A cast in progress
#[derive(Debug, Clone)]
pub struct Spell {
    casting_id: u32,
    entry: SpellEntry,
    target: Option<EntityId>,
    elapsed: f64,
    status: CastStatus,
    /// Focus held until the cast finishes or is refunded on cancel
    reserved_focus: u32,
}

impl Spell {
    pub(crate) fn new(entry: SpellEntry, target: Option<EntityId>, reserved_focus: u32) -> Self {
        Self {
            casting_id: CASTING_IDS.next_raw(),
            entry,
            target,
            elapsed: 0.0,
            status: CastStatus::Casting,
            reserved_focus,
        }
    }

    pub fn casting_id(&self) -> u32 {
        self.casting_id
    }

    pub fn entry(&self) -> &SpellEntry {
        &self.entry
    }

    pub fn target(&self) -> Option<EntityId> {
        self.target
    }

    pub fn status(&self) -> CastStatus {
        self.status
    }

    pub fn is_casting(&self) -> bool {
        self.status == CastStatus::Casting
    }

    pub fn is_finished(&self) -> bool {
        !self.is_casting()
    }

    pub fn is_moving_interrupted(&self) -> bool {
        self.entry.move_interruptible
    }

    /// Advance the cast. Returns true when it completed during this call.
    pub(crate) fn update(&mut self, delta: f64) -> bool {
        if !self.is_casting() {
            return false;
        }
        self.elapsed += delta;
        if self.elapsed >= self.entry.cast_time_secs {
            self.status = CastStatus::Finished;
            self.reserved_focus = 0;
            return true;
        }
        false
    }

    /// Stop the cast and hand back the reserved focus
    pub(crate) fn cancel(&mut self, result: CastResult) -> u32 {
        self.status = CastStatus::Cancelled(result);
        std::mem::take(&mut self.reserved_focus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(cast_time_secs: f64) -> SpellEntry {
        SpellEntry {
            id: 100,
            base_id: 10,
            tier: 1,
            cast_time_secs,
            focus_cost: 20,
            move_interruptible: true,
        }
    }

    #[test]
    fn test_cast_finishes_after_cast_time() {
        let mut spell = Spell::new(entry(1.0), None, 20);
        assert!(!spell.update(0.6));
        assert!(spell.update(0.6));
        assert_eq!(spell.status(), CastStatus::Finished);
        assert!(!spell.update(0.6));
        assert_eq!(spell.cancel(CastResult::SpellCancelled), 0);
    }

    #[test]
    fn test_cancel_refunds_once() {
        let mut spell = Spell::new(entry(2.0), None, 20);
        assert_eq!(spell.cancel(CastResult::CasterMovement), 20);
        assert_eq!(spell.status(), CastStatus::Cancelled(CastResult::CasterMovement));
        assert_eq!(spell.cancel(CastResult::CasterMovement), 0);
    }

    #[test]
    fn test_casting_ids_are_unique() {
        let a = Spell::new(entry(1.0), None, 0);
        let b = Spell::new(entry(1.0), None, 0);
        assert_ne!(a.casting_id(), b.casting_id());
    }
}
