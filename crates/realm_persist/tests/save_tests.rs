//! End-to-end tests for the save pipeline against the file store

use realm_core::{CharacterId, WorldId};
use realm_entity::{AccountSnapshot, CharacterRecord, PlayerSnapshot, SaveFollowUp, SaveMask};
use realm_persist::*;
use std::sync::Arc;
use std::time::Duration;

fn snapshot(id: u64, level: u32) -> PlayerSnapshot {
    let mut character = CharacterRecord::new(CharacterId(id), format!("char{}", id), WorldId(870));
    character.level = level;
    PlayerSnapshot {
        mask: SaveMask::LEVEL,
        account: AccountSnapshot {
            character_id: CharacterId(id),
            costume_index: 0,
        },
        character,
    }
}

#[test]
fn test_many_saves_complete_across_workers() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FilePersistence::new(dir.path(), SaveFormat::Binary).unwrap());
    let config = PersistConfig {
        workers: 4,
        ..PersistConfig::testing()
    };
    let queue = SaveQueue::start(&config, store.clone()).unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();

    for id in 1..=20 {
        let tx = tx.clone();
        queue
            .submit(SaveRequest::new(
                snapshot(id, id as u32),
                SaveFollowUp::ResumeCommands,
                move |done| {
                    let _ = tx.send(done);
                },
            ))
            .unwrap();
    }

    let mut done: Vec<u64> = (0..20)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap().character_id.0)
        .collect();
    done.sort_unstable();
    assert_eq!(done, (1..=20).collect::<Vec<_>>());

    queue.shutdown();
    let record = store.load_character(CharacterId(17)).unwrap().unwrap();
    assert_eq!(record.level, 17);
}

#[test]
fn test_logout_save_reports_follow_up() {
    let store = Arc::new(MemoryPersistence::new().with_failures(1));
    let queue = SaveQueue::start(&PersistConfig::testing(), store.clone()).unwrap();
    let (tx, rx) = crossbeam_channel::bounded(1);

    queue
        .submit(SaveRequest::new(
            snapshot(5, 3),
            SaveFollowUp::RemoveFromMap,
            move |done| {
                let _ = tx.send(done);
            },
        ))
        .unwrap();

    let done = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(done.follow_up, SaveFollowUp::RemoveFromMap);
    // The failed account phase is retried before the character phase runs
    assert_eq!(
        store.writes(),
        vec![
            (SavePhase::Account, CharacterId(5)),
            (SavePhase::Character, CharacterId(5))
        ]
    );
}
