//! Persistence stores
//!
//! A save is written in two phases: the account-wide part first, then the
//! character. A [`Persistence`] implementation writes one phase at a time so
//! the queue can retry from the phase that failed.
//!
//! # Directory Layout
//!
//! ```text
//! save_dir/
//!   accounts/<character_id>.json
//!   characters/<character_id>.json
//! ```
//!
//! Writes are atomic (write to a temp file, then rename).

use parking_lot::Mutex;
use realm_core::CharacterId;
use realm_entity::{AccountSnapshot, CharacterRecord, PlayerSnapshot};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::config::SaveFormat;
use crate::error::{PersistError, PersistResult};

/// One step of a two-phase save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SavePhase {
    Account,
    Character,
}

impl SavePhase {
    /// Phases in the order they are written
    pub const ORDER: [SavePhase; 2] = [SavePhase::Account, SavePhase::Character];

    pub fn next(self) -> Option<SavePhase> {
        match self {
            Self::Account => Some(Self::Character),
            Self::Character => None,
        }
    }
}

/// Backing store for player saves
pub trait Persistence: Send + Sync {
    /// Write one phase of `snapshot`
    fn save(&self, phase: SavePhase, snapshot: &PlayerSnapshot) -> PersistResult<()>;

    /// Load a previously saved character
    fn load_character(&self, character_id: CharacterId) -> PersistResult<Option<CharacterRecord>>;
}

/// File-backed store
pub struct FilePersistence {
    root: PathBuf,
    format: SaveFormat,
}

impl FilePersistence {
    /// Create a store rooted at `root`, creating its directories
    pub fn new(root: impl Into<PathBuf>, format: SaveFormat) -> PersistResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("accounts"))?;
        fs::create_dir_all(root.join("characters"))?;
        log::info!("File persistence initialized at {:?} ({:?})", root, format);
        Ok(Self { root, format })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, phase: SavePhase, character_id: CharacterId) -> PathBuf {
        let dir = match phase {
            SavePhase::Account => "accounts",
            SavePhase::Character => "characters",
        };
        self.root
            .join(dir)
            .join(format!("{}.{}", character_id, self.format.extension()))
    }

    fn encode<T: Serialize>(&self, value: &T) -> PersistResult<Vec<u8>> {
        match self.format {
            SaveFormat::Json => serde_json::to_vec_pretty(value)
                .map_err(|e| PersistError::Serialization(e.to_string())),
            SaveFormat::Binary => {
                bincode::serialize(value).map_err(|e| PersistError::Serialization(e.to_string()))
            }
        }
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> PersistResult<T> {
        match self.format {
            SaveFormat::Json => serde_json::from_slice(data)
                .map_err(|e| PersistError::Deserialization(e.to_string())),
            SaveFormat::Binary => bincode::deserialize(data)
                .map_err(|e| PersistError::Deserialization(e.to_string())),
        }
    }

    fn write_atomic(path: &Path, data: &[u8]) -> PersistResult<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(".{}.tmp", file_name));
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(data)?;
            writer.flush()?;
        }
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Load the account part of a save
    pub fn load_account(
        &self,
        character_id: CharacterId,
    ) -> PersistResult<Option<AccountSnapshot>> {
        let path = self.path(SavePhase::Account, character_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path)?;
        self.decode(&data).map(Some)
    }
}

impl Persistence for FilePersistence {
    fn save(&self, phase: SavePhase, snapshot: &PlayerSnapshot) -> PersistResult<()> {
        let character_id = snapshot.character_id();
        let data = match phase {
            SavePhase::Account => self.encode(&snapshot.account)?,
            SavePhase::Character => self.encode(&snapshot.character)?,
        };
        Self::write_atomic(&self.path(phase, character_id), &data)?;
        log::debug!(
            "Saved {:?} phase of character {} ({} bytes)",
            phase,
            character_id,
            data.len()
        );
        Ok(())
    }

    fn load_character(&self, character_id: CharacterId) -> PersistResult<Option<CharacterRecord>> {
        let path = self.path(SavePhase::Character, character_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path)?;
        self.decode(&data).map(Some)
    }
}

/// In-memory store that can be told to fail
#[derive(Default)]
pub struct MemoryPersistence {
    characters: Mutex<HashMap<CharacterId, CharacterRecord>>,
    accounts: Mutex<HashMap<CharacterId, AccountSnapshot>>,
    /// Every successful write, in order
    writes: Mutex<Vec<(SavePhase, CharacterId)>>,
    failures_left: AtomicU32,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` writes
    pub fn with_failures(self, count: u32) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn writes(&self) -> Vec<(SavePhase, CharacterId)> {
        self.writes.lock().clone()
    }

    pub fn account(&self, character_id: CharacterId) -> Option<AccountSnapshot> {
        self.accounts.lock().get(&character_id).cloned()
    }

    /// Seed a character as if it had been saved before
    pub fn insert_character(&self, record: CharacterRecord) {
        self.characters.lock().insert(record.character_id, record);
    }
}

impl Persistence for MemoryPersistence {
    fn save(&self, phase: SavePhase, snapshot: &PlayerSnapshot) -> PersistResult<()> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(PersistError::Unavailable(format!("injected {:?} failure", phase)));
        }

        let character_id = snapshot.character_id();
        match phase {
            SavePhase::Account => {
                self.accounts
                    .lock()
                    .insert(character_id, snapshot.account.clone());
            }
            SavePhase::Character => {
                self.characters
                    .lock()
                    .insert(character_id, snapshot.character.clone());
            }
        }
        self.writes.lock().push((phase, character_id));
        Ok(())
    }

    fn load_character(&self, character_id: CharacterId) -> PersistResult<Option<CharacterRecord>> {
        Ok(self.characters.lock().get(&character_id).cloned())
    }
}
