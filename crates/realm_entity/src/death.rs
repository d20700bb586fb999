//! Death-state machine
//!
//! Transitions are resolved through a fixed table before anything changes.
//! [`DeathStateMachine::plan`] returns every state the entity will pass
//! through (including automatic cascades) so the caller can apply them one at
//! a time and fire exactly one hook per entered state.
//!
//! ```text
//! JustSpawned ──► Alive ──► JustDied ──► Corpse ──► Dead
//!      ▲          (auto)                 (auto)       │
//!      └──────────────── resurrect ◄─────────────────┘
//! ```

use realm_core::{EntityId, Violation, ViolationResult};
use serde::{Deserialize, Serialize};

/// Life cycle state of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeathState {
    JustSpawned,
    Alive,
    JustDied,
    Corpse,
    Dead,
}

impl DeathState {
    pub fn name(self) -> &'static str {
        match self {
            Self::JustSpawned => "JustSpawned",
            Self::Alive => "Alive",
            Self::JustDied => "JustDied",
            Self::Corpse => "Corpse",
            Self::Dead => "Dead",
        }
    }

    /// JustSpawned or Alive
    pub fn is_living(self) -> bool {
        matches!(self, Self::JustSpawned | Self::Alive)
    }

    /// State entered automatically after this one
    fn cascade(self) -> Option<DeathState> {
        match self {
            Self::JustSpawned => Some(Self::Alive),
            Self::JustDied => Some(Self::Corpse),
            _ => None,
        }
    }

    /// Whether an explicit request may move `from` into this state
    fn accepts_from(self, from: DeathState) -> bool {
        match self {
            Self::JustDied => from.is_living(),
            Self::Dead => from == Self::Corpse,
            Self::JustSpawned => matches!(from, Self::Corpse | Self::Dead),
            // Only reachable through cascades
            Self::Alive | Self::Corpse => false,
        }
    }
}

/// Current and previous death state of one entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeathStateMachine {
    current: DeathState,
    previous: Option<DeathState>,
}

impl Default for DeathStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl DeathStateMachine {
    /// New entities start out just spawned
    pub fn new() -> Self {
        Self {
            current: DeathState::JustSpawned,
            previous: None,
        }
    }

    pub fn current(&self) -> DeathState {
        self.current
    }

    pub fn previous(&self) -> Option<DeathState> {
        self.previous
    }

    /// Resolve an explicit transition request without changing anything.
    ///
    /// Returns the entered states in order, cascades included.
    pub fn plan(
        &self,
        entity: EntityId,
        to: DeathState,
        player_controlled: bool,
    ) -> ViolationResult<Vec<DeathState>> {
        if to == DeathState::Dead && player_controlled {
            return Err(Violation::DeadStateForPlayer(entity));
        }
        if !to.accepts_from(self.current) {
            return Err(Violation::IllegalDeathTransition {
                entity,
                from: self.current.name(),
                to: to.name(),
            });
        }

        let mut path = vec![to];
        let mut state = to;
        while let Some(next) = state.cascade() {
            path.push(next);
            state = next;
        }
        Ok(path)
    }

    /// Enter a single planned state
    pub(crate) fn enter(&mut self, state: DeathState) {
        self.previous = Some(self.current);
        self.current = state;
    }
}
