//! Programming-error taxonomy
//!
//! A [`Violation`] is an invariant breach that correct callers never produce.
//! Violations are returned (never swallowed) and travel with `?` up to the
//! map tick, which logs them at error level. Expected runtime conditions such
//! as a rejected teleport have their own error types next to the operation
//! that produces them.

use thiserror::Error;

use crate::id::{EntityId, WorldId};

/// Invariant violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("Kill requested for entity {entity} with {health} health remaining")]
    KillWithHealth { entity: EntityId, health: u32 },

    #[error("Kill requested for entity {entity} while in death state {state}")]
    KillWhileAlive { entity: EntityId, state: &'static str },

    #[error("Illegal death state transition {from} -> {to} for entity {entity}")]
    IllegalDeathTransition {
        entity: EntityId,
        from: &'static str,
        to: &'static str,
    },

    #[error("Dead state is invalid for player-controlled entity {0}")]
    DeadStateForPlayer(EntityId),

    #[error("Owner {owner} already has vanity pet {existing}, cannot register {new}")]
    DuplicateVanityPet {
        owner: EntityId,
        existing: EntityId,
        new: EntityId,
    },

    #[error("Owner {0} has no vanity pet to remove")]
    MissingVanityPet(EntityId),

    #[error("Combat pet {pet} of owner {owner} is not on the map")]
    MissingCombatPet { owner: EntityId, pet: EntityId },

    #[error("Entities cannot be added to the instance container of world {0}")]
    AddToInstanceContainer(WorldId),

    #[error("Logout timer has already elapsed")]
    LogoutElapsed,

    #[error("No logout in progress")]
    NoLogoutInProgress,

    #[error("Stat {stat} is not an {expected} stat")]
    StatType {
        stat: &'static str,
        expected: &'static str,
    },

    #[error("Entity {0} is not on this map")]
    UnknownEntity(EntityId),

    #[error("Entity {entity} has no {capability} capability")]
    MissingCapability {
        entity: EntityId,
        capability: &'static str,
    },
}

/// Result type for operations that can only fail on a violated invariant
pub type ViolationResult<T> = Result<T, Violation>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_display() {
        let err = Violation::KillWithHealth {
            entity: EntityId::new(7),
            health: 12,
        };
        assert_eq!(
            err.to_string(),
            "Kill requested for entity 7 with 12 health remaining"
        );

        let err = Violation::AddToInstanceContainer(WorldId(3460));
        assert!(err.to_string().contains("3460"));
    }
}
