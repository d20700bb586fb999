//! Asynchronous save queue
//!
//! Map ticks hand snapshots to the queue and move on. Worker threads write
//! every phase through the [`Persistence`] store and then call the request's
//! continuation, which is how the owning map learns the save is done.
//!
//! A failed phase is logged and the request goes back on the queue, resuming
//! at the phase that failed. In-memory state is never rolled back.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use realm_core::CharacterId;
use realm_entity::{PlayerSnapshot, SaveFollowUp};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::PersistConfig;
use crate::error::{PersistError, PersistResult};
use crate::store::{Persistence, SavePhase};

/// How often idle workers check for shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Delivered to the continuation once every phase is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveCompletion {
    pub character_id: CharacterId,
    pub follow_up: SaveFollowUp,
}

type Continuation = Box<dyn FnOnce(SaveCompletion) + Send>;

/// A snapshot plus what to do when it is persisted
pub struct SaveRequest {
    snapshot: PlayerSnapshot,
    follow_up: SaveFollowUp,
    reply: Continuation,
}

impl SaveRequest {
    pub fn new(
        snapshot: PlayerSnapshot,
        follow_up: SaveFollowUp,
        reply: impl FnOnce(SaveCompletion) + Send + 'static,
    ) -> Self {
        Self {
            snapshot,
            follow_up,
            reply: Box::new(reply),
        }
    }

    pub fn snapshot(&self) -> &PlayerSnapshot {
        &self.snapshot
    }

    pub fn follow_up(&self) -> SaveFollowUp {
        self.follow_up
    }
}

impl std::fmt::Debug for SaveRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveRequest")
            .field("character", &self.snapshot.character_id())
            .field("follow_up", &self.follow_up)
            .finish()
    }
}

/// A request in flight
struct SaveJob {
    request: SaveRequest,
    /// First phase not yet written
    phase: SavePhase,
    attempts: u32,
}

/// Counters shared by the workers
#[derive(Debug, Default)]
struct QueueShared {
    closing: AtomicBool,
    /// Submitted but not yet completed
    pending: AtomicUsize,
    completed: AtomicU64,
    retries: AtomicU64,
}

/// Worker pool writing saves off the tick thread
pub struct SaveQueue {
    sender: Sender<SaveJob>,
    shared: Arc<QueueShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SaveQueue {
    /// Start `config.workers` save workers (at least one)
    pub fn start(config: &PersistConfig, store: Arc<dyn Persistence>) -> PersistResult<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let shared = Arc::new(QueueShared::default());
        let backoff = config.retry_backoff();

        let count = config.workers.max(1);
        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let worker = SaveWorker {
                receiver: receiver.clone(),
                requeue: sender.clone(),
                store: Arc::clone(&store),
                shared: Arc::clone(&shared),
                backoff,
            };
            let handle = thread::Builder::new()
                .name(format!("save-worker-{}", index))
                .spawn(move || worker.run())?;
            workers.push(handle);
        }

        log::info!("Save queue started with {} workers", count);
        Ok(Self {
            sender,
            shared,
            workers: Mutex::new(workers),
        })
    }

    /// Queue a save; never blocks on the write
    pub fn submit(&self, request: SaveRequest) -> PersistResult<()> {
        if self.shared.closing.load(Ordering::SeqCst) {
            return Err(PersistError::QueueClosed);
        }
        log::debug!(
            "Queued save for character {} ({:?})",
            request.snapshot.character_id(),
            request.follow_up
        );
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        let job = SaveJob {
            request,
            phase: SavePhase::Account,
            attempts: 0,
        };
        if self.sender.send(job).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(PersistError::QueueClosed);
        }
        Ok(())
    }

    /// Saves submitted but not yet completed
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    /// Failed phase writes that were re-queued
    pub fn retries(&self) -> u64 {
        self.shared.retries.load(Ordering::Relaxed)
    }

    /// Stop accepting saves, finish the pending ones and join the workers
    pub fn shutdown(&self) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("Save queue shutting down with {} pending saves", self.pending());
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                log::error!("Save worker panicked");
            }
        }
        log::info!("Save queue stopped after {} saves", self.completed());
    }
}

impl Drop for SaveQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct SaveWorker {
    receiver: Receiver<SaveJob>,
    requeue: Sender<SaveJob>,
    store: Arc<dyn Persistence>,
    shared: Arc<QueueShared>,
    backoff: Duration,
}

impl SaveWorker {
    fn run(self) {
        loop {
            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(job) => self.process(job),
                Err(RecvTimeoutError::Timeout) => {
                    if self.shared.closing.load(Ordering::SeqCst)
                        && self.shared.pending.load(Ordering::SeqCst) == 0
                    {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process(&self, mut job: SaveJob) {
        let character_id = job.request.snapshot.character_id();
        let mut phase = Some(job.phase);
        while let Some(current) = phase {
            if let Err(err) = self.store.save(current, &job.request.snapshot) {
                job.phase = current;
                job.attempts += 1;
                self.retry(job, err);
                return;
            }
            phase = current.next();
        }

        let SaveRequest {
            follow_up, reply, ..
        } = job.request;
        (reply)(SaveCompletion {
            character_id,
            follow_up,
        });
        self.shared.completed.fetch_add(1, Ordering::Relaxed);
        self.shared.pending.fetch_sub(1, Ordering::SeqCst);
    }

    fn retry(&self, job: SaveJob, err: PersistError) {
        let character_id = job.request.snapshot.character_id();
        log::warn!(
            "Save of character {} failed in {:?} phase (attempt {}): {}; re-queuing",
            character_id,
            job.phase,
            job.attempts,
            err
        );
        self.shared.retries.fetch_add(1, Ordering::Relaxed);
        thread::sleep(self.backoff);
        if self.requeue.send(job).is_err() {
            log::error!("Save of character {} lost: queue disconnected", character_id);
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPersistence;
    use realm_core::WorldId;
    use realm_entity::{AccountSnapshot, CharacterRecord, SaveMask};

    fn request(id: u64, done: Sender<SaveCompletion>) -> SaveRequest {
        let snapshot = PlayerSnapshot {
            mask: SaveMask::empty(),
            account: AccountSnapshot {
                character_id: CharacterId(id),
                costume_index: -1,
            },
            character: CharacterRecord::new(CharacterId(id), "Tam", WorldId(1)),
        };
        SaveRequest::new(snapshot, SaveFollowUp::ResumeCommands, move |c| {
            let _ = done.send(c);
        })
    }

    #[test]
    fn test_save_writes_both_phases_then_replies() {
        let store = Arc::new(MemoryPersistence::new());
        let queue = SaveQueue::start(&PersistConfig::testing(), store.clone()).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();

        queue.submit(request(4, tx)).unwrap();
        let completion = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(completion.character_id, CharacterId(4));
        assert_eq!(completion.follow_up, SaveFollowUp::ResumeCommands);
        assert_eq!(
            store.writes(),
            vec![
                (SavePhase::Account, CharacterId(4)),
                (SavePhase::Character, CharacterId(4))
            ]
        );

        queue.shutdown();
        assert_eq!(queue.completed(), 1);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_failed_save_is_retried() {
        let store = Arc::new(MemoryPersistence::new().with_failures(2));
        let queue = SaveQueue::start(&PersistConfig::testing(), store.clone()).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();

        queue.submit(request(8, tx)).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(queue.retries(), 2);
        assert!(store.load_character(CharacterId(8)).unwrap().is_some());
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let store = Arc::new(MemoryPersistence::new());
        let queue = SaveQueue::start(&PersistConfig::testing(), store).unwrap();
        queue.shutdown();
        let (tx, _rx) = crossbeam_channel::unbounded();
        assert!(matches!(
            queue.submit(request(1, tx)),
            Err(PersistError::QueueClosed)
        ));
    }
}
