//! Recording collaborators
//!
//! In-memory broadcaster, quest hook and session gateway that remember every
//! call, for tests and tooling that need to observe what a map told the
//! outside world.

use parking_lot::Mutex;
use realm_core::{CharacterId, MapInfo};
use realm_entity::{Broadcaster, ServerMessage};

use crate::context::{QuestHooks, QuestObjectiveType, SessionGateway};

/// Broadcaster that stores every delivered message
#[derive(Debug, Default)]
pub struct RecordingBroadcast {
    sent: Mutex<Vec<(Vec<CharacterId>, ServerMessage)>>,
}

impl RecordingBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages delivered to `character`, oldest first
    pub fn received_by(&self, character: CharacterId) -> Vec<ServerMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|(observers, _)| observers.contains(&character))
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Every delivery, oldest first
    pub fn all(&self) -> Vec<(Vec<CharacterId>, ServerMessage)> {
        self.sent.lock().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl Broadcaster for RecordingBroadcast {
    fn notify_visible(&self, observers: &[CharacterId], message: &ServerMessage) {
        if observers.is_empty() {
            return;
        }
        self.sent.lock().push((observers.to_vec(), message.clone()));
    }
}

/// Quest hook that stores every objective update
#[derive(Debug, Default)]
pub struct RecordingQuests {
    updates: Mutex<Vec<(CharacterId, QuestObjectiveType, u32, u32)>>,
}

impl RecordingQuests {
    pub fn updates(&self) -> Vec<(CharacterId, QuestObjectiveType, u32, u32)> {
        self.updates.lock().clone()
    }
}

impl QuestHooks for RecordingQuests {
    fn objective_update(
        &self,
        character: CharacterId,
        objective: QuestObjectiveType,
        data: u32,
        progress: u32,
    ) {
        self.updates.lock().push((character, objective, data, progress));
    }
}

/// What happened to a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    EnteredWorld(CharacterId, MapInfo),
    LoggedOut(CharacterId),
    Disconnected(CharacterId, String),
}

/// Session gateway that stores every notification
#[derive(Debug, Default)]
pub struct RecordingSessions {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingSessions {
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }
}

impl SessionGateway for RecordingSessions {
    fn entered_world(&self, character: CharacterId, info: MapInfo) {
        self.events
            .lock()
            .push(SessionEvent::EnteredWorld(character, info));
    }

    fn logged_out(&self, character: CharacterId) {
        self.events.lock().push(SessionEvent::LoggedOut(character));
    }

    fn disconnect(&self, character: CharacterId, reason: &str) {
        self.events
            .lock()
            .push(SessionEvent::Disconnected(character, reason.to_string()));
    }
}
