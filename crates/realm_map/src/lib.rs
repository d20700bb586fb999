//! # realm_map - Maps, Instances and Teleports
//!
//! The simulation side of the world server:
//! - **Map**: one world copy, ticked strictly sequentially
//! - **InstancedMap**: every copy of an instanced world, with deferred
//!   publication of new instances
//! - **MapManager**: one top-level map per world, transfer routing
//! - **Scheduler**: per-frame promotion, parallel map ticks, transfer routing
//!
//! ```ignore
//! let ctx = Arc::new(WorldContext::new(config, data, disables, broadcaster, saves));
//! let manager = Arc::new(MapManager::new(ctx));
//! manager.login(&record, MapInfo::world(WorldId(870)), position)?;
//!
//! let mut scheduler = Scheduler::start(manager, SchedulerConfig::default())?;
//! loop {
//!     scheduler.tick(0.05);
//! }
//! ```

pub mod broadcast;
pub mod command;
pub mod context;
pub mod error;
pub mod instance;
pub mod manager;
pub mod map;
pub mod scheduler;

pub use broadcast::{RecordingBroadcast, RecordingQuests, RecordingSessions, SessionEvent};
pub use command::{MapInbound, PlayerCommand};
pub use context::{
    LogSessions, NoQuests, QuestHooks, QuestObjectiveType, SessionGateway, WorldContext,
};
pub use error::{MapError, MapResult, TeleportError};
pub use instance::InstancedMap;
pub use manager::{MapManager, WorldMap};
pub use map::{Map, MapCell};
pub use scheduler::{FrameStats, Scheduler, SchedulerConfig};

pub mod prelude {
    pub use crate::command::PlayerCommand;
    pub use crate::context::WorldContext;
    pub use crate::error::{MapError, MapResult, TeleportError};
    pub use crate::manager::MapManager;
    pub use crate::map::{Map, MapCell};
    pub use crate::scheduler::{Scheduler, SchedulerConfig};
}
