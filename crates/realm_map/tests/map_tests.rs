//! Map tick tests that run against the real save pipeline

use crossbeam_channel::Receiver;
use glam::Vec3;
use realm_core::{
    CharacterId, DisableList, EntityId, MapInfo, StaticTables, WorldConfig, WorldEntry, WorldId,
    WorldKind,
};
use realm_entity::{CharacterRecord, Entity, LogoutReason, PlayerSnapshot, ServerMessage};
use realm_map::*;
use realm_persist::{
    MemoryPersistence, PersistConfig, PersistResult, Persistence, SavePhase, SaveQueue,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const OPEN: WorldId = WorldId(870);

/// Store whose account phase waits for a release signal
struct GatedStore {
    release: Receiver<()>,
    inner: MemoryPersistence,
}

impl Persistence for GatedStore {
    fn save(&self, phase: SavePhase, snapshot: &PlayerSnapshot) -> PersistResult<()> {
        if phase == SavePhase::Account {
            let _ = self.release.recv_timeout(Duration::from_secs(5));
        }
        self.inner.save(phase, snapshot)
    }

    fn load_character(&self, character_id: CharacterId) -> PersistResult<Option<CharacterRecord>> {
        self.inner.load_character(character_id)
    }
}

struct Harness {
    map: Map,
    broadcast: Arc<RecordingBroadcast>,
    sessions: Arc<RecordingSessions>,
    saves: Arc<SaveQueue>,
}

fn harness(store: Arc<dyn Persistence>) -> Harness {
    let tables = StaticTables::new().with_world(WorldEntry {
        id: OPEN,
        name: "Thayd".into(),
        kind: WorldKind::Open,
    });
    let saves = Arc::new(SaveQueue::start(&PersistConfig::testing(), store).unwrap());
    let broadcast = Arc::new(RecordingBroadcast::new());
    let sessions = Arc::new(RecordingSessions::default());
    let ctx = WorldContext::new(
        WorldConfig::testing(),
        Arc::new(tables),
        Arc::new(DisableList::new()),
        broadcast.clone(),
        saves.clone(),
    )
    .with_sessions(sessions.clone());
    Harness {
        map: Map::new(MapInfo::world(OPEN), Arc::new(ctx)),
        broadcast,
        sessions,
        saves,
    }
}

fn login(map: &mut Map, id: u64) -> EntityId {
    let record = CharacterRecord::new(CharacterId(id), "Avra", OPEN);
    let entity = Entity::from_character(&record, &WorldConfig::testing(), &StaticTables::new());
    map.enqueue_add(entity, Vec3::ZERO);
    map.update(0.0);
    map.player_guid(CharacterId(id)).unwrap()
}

fn tick_until(map: &mut Map, mut done: impl FnMut(&Map) -> bool) -> bool {
    for _ in 0..500 {
        map.update(0.0);
        if done(map) {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn test_commands_wait_for_save() {
    let (release, gate) = crossbeam_channel::unbounded();
    let store = Arc::new(GatedStore {
        release: gate,
        inner: MemoryPersistence::new(),
    });
    let mut h = harness(store.clone());
    let guid = login(&mut h.map, 1);

    // Save period elapses; the save blocks in the store
    h.map.update(5.5);
    let player = h.map.entity(guid).unwrap().player().unwrap();
    assert!(!player.can_process_commands());

    let target = Vec3::new(10.0, 0.0, 3.0);
    h.map
        .sender()
        .send(MapInbound::Command {
            character: CharacterId(1),
            command: PlayerCommand::Move(target),
        })
        .unwrap();
    h.map.update(0.0);
    assert_eq!(h.map.entity(guid).unwrap().position(), Vec3::ZERO);

    release.send(()).unwrap();
    assert!(tick_until(&mut h.map, |m| m.entity(guid).unwrap().position() == target));
    assert!(store.inner.load_character(CharacterId(1)).unwrap().is_some());
    assert_eq!(h.map.faults(), 0);
}

#[test]
fn test_logout_saves_then_leaves_map() {
    let store = Arc::new(MemoryPersistence::new());
    let mut h = harness(store.clone());
    login(&mut h.map, 4);

    h.map
        .sender()
        .send(MapInbound::Command {
            character: CharacterId(4),
            command: PlayerCommand::LogoutStart {
                reason: LogoutReason::default(),
                requested: true,
            },
        })
        .unwrap();
    h.map.update(0.0);
    assert!(h
        .broadcast
        .received_by(CharacterId(4))
        .contains(&ServerMessage::LogoutStart { delay_secs: 30.0 }));

    h.map.update(30.0);
    assert!(tick_until(&mut h.map, |m| m.player_guid(CharacterId(4)).is_none()));

    assert!(h
        .sessions
        .events()
        .contains(&SessionEvent::LoggedOut(CharacterId(4))));
    assert!(h
        .broadcast
        .received_by(CharacterId(4))
        .iter()
        .any(|m| matches!(m, ServerMessage::ClientLogout { requested: true, .. })));
    assert!(store.account(CharacterId(4)).is_some());
    assert_eq!(h.map.entity_count(), 0);
}

#[test]
fn test_logout_cleanup_waits_for_periodic_save() {
    let (release, gate) = crossbeam_channel::unbounded();
    let store = Arc::new(GatedStore {
        release: gate,
        inner: MemoryPersistence::new(),
    });
    let mut h = harness(store.clone());
    let guid = login(&mut h.map, 6);

    h.map
        .sender()
        .send(MapInbound::Command {
            character: CharacterId(6),
            command: PlayerCommand::LogoutStart {
                reason: LogoutReason::default(),
                requested: true,
            },
        })
        .unwrap();
    h.map.update(0.0);

    // Periodic save goes out and blocks in the store
    h.map.update(5.5);
    assert_eq!(h.saves.pending(), 1);

    // The logout becomes ready while that save is still running
    h.map.update(30.0);
    h.map.update(0.0);
    let player = h.map.entity(guid).unwrap().player().unwrap();
    assert!(player.is_logged_out());
    assert_eq!(h.saves.pending(), 1);
    assert!(h
        .broadcast
        .received_by(CharacterId(6))
        .iter()
        .any(|m| matches!(m, ServerMessage::ClientLogout { .. })));

    // Releasing the first save issues the cleanup save, then the player leaves
    release.send(()).unwrap();
    release.send(()).unwrap();
    assert!(tick_until(&mut h.map, |m| m.player_guid(CharacterId(6)).is_none()));
    let saves = h.saves.clone();
    assert!(tick_until(&mut h.map, |_| saves.completed() == 2));
    assert!(h
        .sessions
        .events()
        .contains(&SessionEvent::LoggedOut(CharacterId(6))));
    assert_eq!(h.map.faults(), 0);
}

#[test]
fn test_logout_cancel_keeps_player() {
    let mut h = harness(Arc::new(MemoryPersistence::new()));
    let guid = login(&mut h.map, 5);
    let sender = h.map.sender();
    for command in [
        PlayerCommand::LogoutStart {
            reason: LogoutReason::default(),
            requested: true,
        },
        PlayerCommand::LogoutCancel,
    ] {
        sender
            .send(MapInbound::Command {
                character: CharacterId(5),
                command,
            })
            .unwrap();
    }
    h.map.update(0.0);
    h.map.update(1.0);

    let player = h.map.entity(guid).unwrap().player().unwrap();
    assert!(player.logout().is_none());
    assert!(h
        .broadcast
        .received_by(CharacterId(5))
        .contains(&ServerMessage::LogoutCancel));
}
