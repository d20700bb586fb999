//! Frame scheduler
//!
//! Drives every map once per frame in three phases:
//!
//! 1. Promote pending instances in every container
//! 2. Tick every live map and instance, each on one worker at a time
//! 3. Route players staged for transfer to their destination maps
//!
//! Maps are independent units of work. Each sits behind its own mutex, so a
//! map is never ticked twice at once and its entities never update in
//! parallel with each other.

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::manager::MapManager;
use crate::map::MapCell;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Map worker threads; zero ticks every map on the calling thread
    pub workers: usize,
    /// Target frame duration in milliseconds
    pub target_frame_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            target_frame_ms: 50,
        }
    }
}

impl SchedulerConfig {
    /// Single-threaded configuration for tests
    pub fn inline() -> Self {
        Self {
            workers: 0,
            ..Self::default()
        }
    }

    pub fn target_frame(&self) -> Duration {
        Duration::from_millis(self.target_frame_ms.max(1))
    }
}

/// What one frame did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub promoted: usize,
    pub maps: usize,
    pub routed: usize,
    pub elapsed: Duration,
}

struct TickJob {
    cell: Arc<MapCell>,
    delta: f64,
    done: Sender<()>,
}

/// Ticks all maps of a [`MapManager`]
pub struct Scheduler {
    manager: Arc<MapManager>,
    config: SchedulerConfig,
    jobs: Option<Sender<TickJob>>,
    workers: Vec<JoinHandle<()>>,
    frame: u64,
}

impl Scheduler {
    /// Start the map workers
    pub fn start(manager: Arc<MapManager>, config: SchedulerConfig) -> std::io::Result<Self> {
        let mut workers = Vec::with_capacity(config.workers);
        let jobs = if config.workers == 0 {
            None
        } else {
            let (sender, receiver) = crossbeam_channel::unbounded::<TickJob>();
            for index in 0..config.workers {
                let receiver = receiver.clone();
                let handle = thread::Builder::new()
                    .name(format!("map-worker-{}", index))
                    .spawn(move || Self::worker_loop(receiver))?;
                workers.push(handle);
            }
            Some(sender)
        };

        log::info!(
            "Scheduler started with {} map workers, {:?} frames",
            config.workers,
            config.target_frame()
        );
        Ok(Self {
            manager,
            config,
            jobs,
            workers,
            frame: 0,
        })
    }

    pub fn manager(&self) -> &Arc<MapManager> {
        &self.manager
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    fn worker_loop(receiver: Receiver<TickJob>) {
        while let Ok(job) = receiver.recv() {
            job.cell.update(job.delta);
            let _ = job.done.send(());
        }
    }

    /// Run one frame of `delta` seconds
    pub fn tick(&mut self, delta: f64) -> FrameStats {
        let start = Instant::now();
        self.frame += 1;

        let promoted = self.manager.promote_pending();

        let cells = self.manager.cells();
        match &self.jobs {
            None => {
                for cell in &cells {
                    cell.update(delta);
                }
            }
            Some(jobs) => {
                let (done, finished) = crossbeam_channel::bounded(cells.len());
                let mut dispatched = 0;
                for cell in &cells {
                    let job = TickJob {
                        cell: Arc::clone(cell),
                        delta,
                        done: done.clone(),
                    };
                    if jobs.send(job).is_err() {
                        log::error!("Map workers are gone; ticking {:?} inline", cell);
                        cell.update(delta);
                        continue;
                    }
                    dispatched += 1;
                }
                drop(done);
                for _ in 0..dispatched {
                    if finished.recv().is_err() {
                        log::error!("A map worker died during frame {}", self.frame);
                        break;
                    }
                }
            }
        }

        let routed = self.manager.route_transfers();

        let stats = FrameStats {
            frame: self.frame,
            promoted,
            maps: cells.len(),
            routed,
            elapsed: start.elapsed(),
        };
        if stats.elapsed > self.config.target_frame() {
            log::warn!(
                "Frame {} took {:?} (target {:?})",
                self.frame,
                stats.elapsed,
                self.config.target_frame()
            );
        }
        stats
    }

    /// Stop the workers after the current frame
    pub fn shutdown(&mut self) {
        if self.jobs.take().is_none() && self.workers.is_empty() {
            return;
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Map worker panicked");
            }
        }
        log::info!("Scheduler stopped after {} frames", self.frame);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
