//! World server lifecycle
//!
//! Builds the shared world context from configuration, starts the save
//! pipeline and the map scheduler, and paces frames until asked to stop.

use realm_core::{DisableList, StaticData, StaticTables};
use realm_entity::LogBroadcast;
use realm_map::{FrameStats, MapManager, Scheduler, WorldContext};
use realm_persist::{FilePersistence, SaveQueue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{ConfigError, ServerConfig};

/// A running world server
pub struct WorldServer {
    config: ServerConfig,
    manager: Arc<MapManager>,
    scheduler: Scheduler,
    saves: Arc<SaveQueue>,
    disables: Arc<DisableList>,
}

impl WorldServer {
    /// Build the world context and start every worker
    pub fn start(config: ServerConfig) -> Result<Self, ConfigError> {
        let tables = match &config.static_tables {
            Some(path) => StaticTables::load(path)?,
            None => {
                log::warn!("No static tables configured; every world lookup will fail");
                StaticTables::new()
            }
        };
        let data: Arc<dyn StaticData> = Arc::new(tables);
        let disables = Arc::new(DisableList::from_entries(config.disables.iter().copied()));

        let store = Arc::new(FilePersistence::new(
            config.persist.save_dir.clone(),
            config.persist.format,
        )?);
        let saves = Arc::new(SaveQueue::start(&config.persist, store)?);

        let ctx = WorldContext::new(
            config.world.clone(),
            data,
            disables.clone(),
            Arc::new(LogBroadcast),
            Arc::clone(&saves),
        );
        let manager = Arc::new(MapManager::new(Arc::new(ctx)));
        let scheduler = Scheduler::start(Arc::clone(&manager), config.scheduler.clone())?;

        log::info!("World server started");
        Ok(Self {
            config,
            manager,
            scheduler,
            saves,
            disables,
        })
    }

    pub fn manager(&self) -> &Arc<MapManager> {
        &self.manager
    }

    /// Runtime-editable disable list
    pub fn disables(&self) -> &Arc<DisableList> {
        &self.disables
    }

    /// Run one frame of `delta` seconds
    pub fn tick(&mut self, delta: f64) -> FrameStats {
        self.scheduler.tick(delta)
    }

    /// Pace frames until `shutdown` is raised
    pub fn run(&mut self, shutdown: &AtomicBool) {
        let target = self.config.scheduler.target_frame();
        let mut last = Instant::now();
        log::info!("Entering frame loop ({:?} per frame)", target);

        while !shutdown.load(Ordering::Relaxed) {
            let frame_start = Instant::now();
            let delta = frame_start.duration_since(last).as_secs_f64();
            last = frame_start;

            let stats = self.tick(delta);
            if stats.frame % 1200 == 0 {
                log::info!(
                    "Frame {}: {} maps, {} saves pending",
                    stats.frame,
                    stats.maps,
                    self.saves.pending()
                );
            }

            // Frame pacing
            let frame_duration = frame_start.elapsed();
            if frame_duration < target {
                std::thread::sleep(target - frame_duration);
            }
        }
    }

    /// Stop the map workers, then drain the save queue
    pub fn shutdown(mut self) {
        log::info!("Shutting down after {} frames", self.scheduler.frame());
        self.scheduler.shutdown();
        self.saves.shutdown();
        log::info!("World server stopped");
    }
}
