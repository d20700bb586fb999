//! Shared world context
//!
//! Everything a map needs besides its own entities: configuration, read-only
//! tables, the disable list and the outward collaborators. Built once at
//! startup and shared behind an `Arc` by every map and instance.

use realm_core::{CharacterId, DisableCheck, MapInfo, StaticData, WorldConfig};
use realm_entity::{Broadcaster, SimContext};
use realm_persist::SaveQueue;
use std::sync::Arc;

/// Quest objectives credited by kills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestObjectiveType {
    KillCreature,
    KillCreature2,
    KillTargetGroup,
    KillTargetGroups,
}

impl QuestObjectiveType {
    /// Objectives a creature kill counts toward
    pub const KILL: [QuestObjectiveType; 4] = [
        Self::KillCreature,
        Self::KillCreature2,
        Self::KillTargetGroup,
        Self::KillTargetGroups,
    ];
}

/// Quest content hook
pub trait QuestHooks: Send + Sync {
    fn objective_update(
        &self,
        character: CharacterId,
        objective: QuestObjectiveType,
        data: u32,
        progress: u32,
    );
}

/// Quest hook that ignores everything
#[derive(Debug, Default)]
pub struct NoQuests;

impl QuestHooks for NoQuests {
    fn objective_update(&self, _: CharacterId, _: QuestObjectiveType, _: u32, _: u32) {}
}

/// Session side of the world: what happens to the connection behind a player
pub trait SessionGateway: Send + Sync {
    /// The player joined a map
    fn entered_world(&self, character: CharacterId, info: MapInfo);

    /// The player finished logging out and left the world
    fn logged_out(&self, character: CharacterId);

    /// The player cannot be placed anywhere; drop the connection
    fn disconnect(&self, character: CharacterId, reason: &str);
}

/// Session gateway that only logs
#[derive(Debug, Default)]
pub struct LogSessions;

impl SessionGateway for LogSessions {
    fn entered_world(&self, character: CharacterId, info: MapInfo) {
        log::info!("Character {} entered {}", character, info);
    }

    fn logged_out(&self, character: CharacterId) {
        log::info!("Character {} logged out", character);
    }

    fn disconnect(&self, character: CharacterId, reason: &str) {
        log::warn!("Disconnecting character {}: {}", character, reason);
    }
}

/// Read-only collaborators shared by every map
pub struct WorldContext {
    pub config: WorldConfig,
    pub data: Arc<dyn StaticData>,
    pub disables: Arc<dyn DisableCheck>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub quests: Arc<dyn QuestHooks>,
    pub sessions: Arc<dyn SessionGateway>,
    pub saves: Arc<SaveQueue>,
}

impl WorldContext {
    pub fn new(
        config: WorldConfig,
        data: Arc<dyn StaticData>,
        disables: Arc<dyn DisableCheck>,
        broadcaster: Arc<dyn Broadcaster>,
        saves: Arc<SaveQueue>,
    ) -> Self {
        Self {
            config,
            data,
            disables,
            broadcaster,
            quests: Arc::new(NoQuests),
            sessions: Arc::new(LogSessions),
            saves,
        }
    }

    pub fn with_quests(mut self, quests: Arc<dyn QuestHooks>) -> Self {
        self.quests = quests;
        self
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionGateway>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Borrowed view handed to entity updates
    pub fn sim(&self) -> SimContext<'_> {
        SimContext::new(&self.config, self.data.as_ref(), self.disables.as_ref())
    }
}
