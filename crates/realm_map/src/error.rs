//! Map errors
//!
//! [`MapError`] covers lookups and routing. [`TeleportError`] is the expected
//! rejection of a teleport request; it is reported to the player as a notice
//! and leaves every piece of state as it was.

use realm_core::{CharacterId, InstanceId, Violation, WorldId};
use thiserror::Error;

/// Errors from map lookup and routing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("World {0} has no static entry")]
    UnknownWorld(WorldId),

    #[error("Instance {instance} of world {world} does not exist")]
    InstanceNotFound { world: WorldId, instance: InstanceId },

    #[error("Character {0} is not in the world")]
    UnknownCharacter(CharacterId),

    #[error("Map of world {0} is no longer accepting entities")]
    MapClosed(WorldId),

    #[error(transparent)]
    Violation(#[from] Violation),
}

pub type MapResult<T> = Result<T, MapError>;

/// Why a teleport request was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TeleportError {
    #[error("A teleport is already pending")]
    AlreadyPending,

    #[error("World {0} is disabled")]
    Disabled(WorldId),

    #[error("World {0} does not exist")]
    UnknownWorld(WorldId),

    #[error("Only players can teleport between maps")]
    NotAPlayer,
}

impl TeleportError {
    /// Text of the notice sent to the requester
    pub fn notice(&self) -> String {
        match self {
            Self::AlreadyPending => "Unable to teleport: a teleport is already pending.".into(),
            Self::Disabled(world) => {
                format!("Unable to teleport to world {} because it is disabled.", world)
            }
            Self::UnknownWorld(world) => format!("Unable to teleport: unknown world {}.", world),
            Self::NotAPlayer => "Unable to teleport.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_names_world() {
        let notice = TeleportError::Disabled(WorldId(1229)).notice();
        assert!(notice.contains("1229"));
        assert!(notice.contains("disabled"));
    }
}
