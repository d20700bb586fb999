//! Player state
//!
//! Players are units with a session behind them. On top of combat they track
//! companions, a pending teleport, a delayed logout, experience and the save
//! cycle.
//!
//! # Save cycle
//!
//! Every `save_interval_secs` the player accumulates played time and queues
//! a [`PlayerSnapshot`] for the persistence pipeline. Command processing stays
//! suspended until the map reports the save complete, so a stale in-memory
//! state is never written over a newer one.

use glam::Vec3;
use realm_core::{
    CharacterId, EntityId, StaticData, UpdateTimer, Violation, ViolationResult, WorldConfig,
    WorldId,
};
use serde::{Deserialize, Serialize};

use crate::entity::{Entity, ItemVisual};
use crate::event::EntityEvent;
use crate::message::{LogoutReason, ServerMessage};
use crate::pet::{PetKind, PetManager};
use crate::property::Property;
use crate::stat::Stat;
use crate::teleport::PendingTeleport;
use crate::unit::UnitState;

/// Dirty fields of a player since the last save
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveMask(u8);

impl SaveMask {
    pub const LEVEL: Self = Self(1 << 0);
    pub const LOCATION: Self = Self(1 << 1);
    pub const PATH: Self = Self(1 << 2);
    pub const COSTUME: Self = Self(1 << 3);
    pub const XP: Self = Self(1 << 4);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

/// What happens once a save has been persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveFollowUp {
    /// Periodic save: resume command processing
    ResumeCommands,
    /// Logout cleanup: take the player off the map
    RemoveFromMap,
}

/// Delayed logout
#[derive(Debug, Clone)]
pub struct LogoutManager {
    timer: UpdateTimer,
    reason: LogoutReason,
    requested: bool,
}

impl LogoutManager {
    pub fn new(delay_secs: f64, reason: LogoutReason, requested: bool) -> Self {
        Self {
            timer: UpdateTimer::new(delay_secs),
            reason,
            requested,
        }
    }

    pub fn update(&mut self, delta: f64) {
        self.timer.update(delta);
    }

    pub fn ready_to_logout(&self) -> bool {
        self.timer.has_elapsed()
    }

    pub fn reason(&self) -> LogoutReason {
        self.reason
    }

    pub fn requested(&self) -> bool {
        self.requested
    }
}

fn default_level() -> u32 {
    1
}

/// Persisted character a player entity is created from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub character_id: CharacterId,
    pub name: String,
    pub world: WorldId,
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub total_xp: u32,
    #[serde(default)]
    pub path: u8,
    #[serde(default)]
    pub costume_index: i8,
    #[serde(default)]
    pub time_played_total: f64,
    #[serde(default)]
    pub time_played_level: f64,
    #[serde(default)]
    pub faction: u32,
    #[serde(default)]
    pub display_info: u32,
    #[serde(default)]
    pub visuals: Vec<ItemVisual>,
}

impl CharacterRecord {
    pub fn new(character_id: CharacterId, name: impl Into<String>, world: WorldId) -> Self {
        Self {
            character_id,
            name: name.into(),
            world,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            level: 1,
            total_xp: 0,
            path: 0,
            costume_index: -1,
            time_played_total: 0.0,
            time_played_level: 0.0,
            faction: 0,
            display_info: 0,
            visuals: Vec::new(),
        }
    }
}

/// Account-wide part of a save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub character_id: CharacterId,
    pub costume_index: i8,
}

/// Everything persisted by one save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Fields changed since the previous save
    pub mask: SaveMask,
    pub account: AccountSnapshot,
    pub character: CharacterRecord,
}

impl PlayerSnapshot {
    pub fn character_id(&self) -> CharacterId {
        self.character.character_id
    }

    /// Compact binary encoding
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Player-only state
#[derive(Debug)]
pub struct PlayerState {
    character_id: CharacterId,
    name: String,
    unit: UnitState,
    pets: PetManager,
    pending_teleport: Option<PendingTeleport>,
    logout: Option<LogoutManager>,
    /// Logout finished; nothing but the cleanup save gets saved
    logged_out: bool,
    /// Cleanup save waiting for the save in flight to complete
    cleanup_deferred: bool,
    can_process_commands: bool,
    save_timer: UpdateTimer,
    save_mask: SaveMask,
    world: WorldId,
    total_xp: u32,
    xp_to_next_level: u32,
    path: u8,
    costume_index: i8,
    time_played_total: f64,
    time_played_level: f64,
    time_played_session: f64,
    /// Entity this player moves
    control_guid: Option<EntityId>,
}

impl PlayerState {
    pub fn character_id(&self) -> CharacterId {
        self.character_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &UnitState {
        &self.unit
    }

    pub fn unit_mut(&mut self) -> &mut UnitState {
        &mut self.unit
    }

    pub fn pets(&self) -> &PetManager {
        &self.pets
    }

    pub fn pets_mut(&mut self) -> &mut PetManager {
        &mut self.pets
    }

    pub fn pending_teleport(&self) -> Option<&PendingTeleport> {
        self.pending_teleport.as_ref()
    }

    pub fn pending_teleport_mut(&mut self) -> Option<&mut PendingTeleport> {
        self.pending_teleport.as_mut()
    }

    /// Stage a teleport; the caller checks that none is pending
    pub fn set_pending_teleport(&mut self, pending: PendingTeleport) {
        self.pending_teleport = Some(pending);
    }

    pub fn take_pending_teleport(&mut self) -> Option<PendingTeleport> {
        self.pending_teleport.take()
    }

    /// Whether inbound commands may run (no save in flight)
    pub fn can_process_commands(&self) -> bool {
        self.can_process_commands
    }

    pub fn logout(&self) -> Option<&LogoutManager> {
        self.logout.as_ref()
    }

    pub fn is_logged_out(&self) -> bool {
        self.logged_out
    }

    pub fn save_mask(&self) -> SaveMask {
        self.save_mask
    }

    pub fn world(&self) -> WorldId {
        self.world
    }

    pub fn set_world(&mut self, world: WorldId) {
        self.world = world;
        self.save_mask.insert(SaveMask::LOCATION);
    }

    pub fn total_xp(&self) -> u32 {
        self.total_xp
    }

    pub fn xp_to_next_level(&self) -> u32 {
        self.xp_to_next_level
    }

    pub fn path(&self) -> u8 {
        self.path
    }

    pub fn set_path(&mut self, path: u8) {
        self.path = path;
        self.save_mask.insert(SaveMask::PATH);
    }

    pub fn costume_index(&self) -> i8 {
        self.costume_index
    }

    pub fn set_costume_index(&mut self, index: i8) {
        self.costume_index = index;
        self.save_mask.insert(SaveMask::COSTUME);
    }

    pub fn time_played_total(&self) -> f64 {
        self.time_played_total
    }

    pub fn time_played_session(&self) -> f64 {
        self.time_played_session
    }

    pub fn control_guid(&self) -> Option<EntityId> {
        self.control_guid
    }

    pub(crate) fn on_relocate(&mut self) {
        self.save_mask.insert(SaveMask::LOCATION);
    }

    fn accumulate_played_time(&mut self) {
        let since_last_save = self.save_timer.elapsed();
        self.time_played_session += since_last_save;
        self.time_played_level += since_last_save;
        self.time_played_total += since_last_save;
        self.save_timer.reset();
    }
}

fn not_a_player(entity: EntityId) -> Violation {
    Violation::MissingCapability {
        entity,
        capability: "player",
    }
}

impl Entity {
    /// Create a player from its persisted record
    pub fn from_character(
        record: &CharacterRecord,
        config: &WorldConfig,
        data: &dyn StaticData,
    ) -> Self {
        let state = PlayerState {
            character_id: record.character_id,
            name: record.name.clone(),
            unit: UnitState::new(true, config),
            pets: PetManager::new(),
            pending_teleport: None,
            logout: None,
            logged_out: false,
            cleanup_deferred: false,
            can_process_commands: true,
            save_timer: UpdateTimer::new(config.save_interval_secs),
            save_mask: SaveMask::empty(),
            world: record.world,
            total_xp: record.total_xp,
            xp_to_next_level: data.min_xp_for_level(record.level + 1).unwrap_or(0),
            path: record.path,
            costume_index: record.costume_index,
            time_played_total: record.time_played_total,
            time_played_level: record.time_played_level,
            time_played_session: 0.0,
            control_guid: None,
        };

        let mut entity = Entity::player_from_state(state);
        entity.position = record.position;
        entity.rotation = record.rotation;
        entity.faction1 = record.faction;
        entity.faction2 = record.faction;
        entity.display_info = record.display_info;
        for visual in &record.visuals {
            if visual.display_id != 0 {
                entity.visuals.insert(visual.slot, visual.display_id);
            }
        }

        entity.properties.set(Property::BaseHealth, 200.0, 800.0);
        entity.properties.set(Property::BaseFocusPool, 1000.0, 1000.0);
        entity.properties.set(Property::MoveSpeedMultiplier, 1.0, 1.0);
        entity.properties.set(Property::JumpHeight, 2.5, 2.5);
        entity.properties.set(Property::GravityMultiplier, 1.0, 1.0);

        entity.stats.store(Stat::Health, 800.0);
        entity.stats.store(Stat::Level, record.level as f32);
        entity.stats.store(Stat::Sheathed, 1.0);
        entity.stats.store(Stat::Focus, 1000.0);
        entity
    }

    fn require_player(&mut self) -> ViolationResult<&mut PlayerState> {
        let guid = self.guid;
        self.player_mut().ok_or_else(|| not_a_player(guid))
    }

    /// Start moving `controlled`; the controlled entity's controller is set by the caller
    pub fn set_control(&mut self, controlled: EntityId) -> ViolationResult<()> {
        self.require_player()?.control_guid = Some(controlled);
        self.send(ServerMessage::MovementControl { unit: controlled });
        Ok(())
    }

    // ---- Companions ----

    /// Summon a companion next to this player.
    ///
    /// A new vanity pet first removes the current one.
    pub fn summon_pet(
        &mut self,
        kind: PetKind,
        creature_id: u32,
        display_info: u32,
        casting_id: u32,
        spell_base_id: u32,
        config: &WorldConfig,
    ) -> ViolationResult<()> {
        let owner = self.guid;
        let replaced = match kind {
            PetKind::Vanity => self.require_player()?.pets.take_vanity_pet(),
            PetKind::Combat => {
                self.require_player()?;
                None
            }
        };
        if let Some(old) = replaced {
            self.events.push(EntityEvent::Remove(old));
        }

        let position = match kind {
            PetKind::Combat => self.companion_spawn_position(config.pet.spawn_offset),
            PetKind::Vanity => self.position,
        };
        let pet = Entity::companion(
            kind,
            owner,
            creature_id,
            display_info,
            casting_id,
            spell_base_id,
            config,
        );
        self.events.push(EntityEvent::Spawn {
            entity: Box::new(pet),
            position,
        });
        Ok(())
    }

    // ---- Logout ----

    /// Begin a delayed logout; ignored if one is already running
    pub fn logout_start(
        &mut self,
        delay_secs: f64,
        reason: LogoutReason,
        requested: bool,
    ) -> ViolationResult<()> {
        let player = self.require_player()?;
        if player.logout.is_some() {
            return Ok(());
        }
        player.logout = Some(LogoutManager::new(delay_secs, reason, requested));
        self.send(ServerMessage::LogoutStart { delay_secs });
        Ok(())
    }

    /// Abort a delayed logout whose timer is still running
    pub fn logout_cancel(&mut self) -> ViolationResult<()> {
        let player = self.require_player()?;
        if player.logout.as_ref().is_some_and(|l| l.ready_to_logout()) {
            return Err(Violation::LogoutElapsed);
        }
        if player.logout.take().is_some() {
            self.send(ServerMessage::LogoutCancel);
        }
        Ok(())
    }

    /// Complete the logout: notify the client, save, then leave the map.
    ///
    /// With a save already in flight the cleanup save waits for its
    /// completion, so one player never has two saves running.
    pub fn logout_finish(&mut self) -> ViolationResult<()> {
        let player = self.require_player()?;
        let logout = player.logout.as_ref().ok_or(Violation::NoLogoutInProgress)?;
        if player.logged_out {
            return Ok(());
        }
        let message = ServerMessage::ClientLogout {
            requested: logout.requested(),
            reason: logout.reason(),
        };
        let save_in_flight = !player.can_process_commands;
        if save_in_flight {
            player.logged_out = true;
            player.cleanup_deferred = true;
        }
        self.send(message);
        if !save_in_flight {
            self.request_save(SaveFollowUp::RemoveFromMap);
        }
        Ok(())
    }

    // ---- Experience ----

    /// Grant experience, levelling up through the experience table
    pub fn grant_xp(
        &mut self,
        xp: u32,
        data: &dyn StaticData,
        config: &WorldConfig,
    ) -> ViolationResult<()> {
        let level = self.level();
        let player = self.require_player()?;
        if xp == 0 || level >= config.max_level {
            return Ok(());
        }

        let total_xp = player.total_xp.saturating_add(xp);
        self.send(ServerMessage::Xp {
            total_xp,
            granted: xp,
        });

        let mut level = level;
        while level < config.max_level {
            match data.min_xp_for_level(level + 1) {
                Some(needed) if total_xp >= needed => {
                    self.grant_level(level + 1, false, data)?;
                    level += 1;
                }
                _ => break,
            }
        }

        let player = self.require_player()?;
        player.total_xp = total_xp;
        player.save_mask.insert(SaveMask::XP);
        Ok(())
    }

    /// Set the level, optionally resetting experience to the level's minimum
    pub fn grant_level(
        &mut self,
        level: u32,
        set_xp: bool,
        data: &dyn StaticData,
    ) -> ViolationResult<()> {
        let old_level = self.level();
        let player = self.require_player()?;
        if level == old_level {
            return Ok(());
        }

        if set_xp {
            let xp = data.min_xp_for_level(level).unwrap_or(0);
            let granted = xp.saturating_sub(player.total_xp);
            player.total_xp = xp;
            player.save_mask.insert(SaveMask::XP);
            self.send(ServerMessage::Xp {
                total_xp: xp,
                granted,
            });
        }

        let player = self.require_player()?;
        player.xp_to_next_level = data.min_xp_for_level(level + 1).unwrap_or(0);
        player.save_mask.insert(SaveMask::LEVEL);
        self.store_stat(Stat::Level, level as f32);
        log::debug!("Entity {} reached level {}", self.guid, level);
        Ok(())
    }

    // ---- Saving ----

    /// Player tick. Returns false when the world update must be skipped.
    pub(crate) fn update_player(&mut self, delta: f64) -> bool {
        let Some(player) = self.player_mut() else {
            return true;
        };
        if let Some(logout) = player.logout.as_mut() {
            if logout.ready_to_logout() {
                return false;
            }
            logout.update(delta);
        }

        player.save_timer.update(delta);
        let save_due = player.save_timer.has_elapsed()
            && player.can_process_commands
            && !player.logged_out;
        if save_due {
            self.request_save(SaveFollowUp::ResumeCommands);
        }
        true
    }

    /// Queue a save and suspend command processing until it completes
    pub(crate) fn request_save(&mut self, follow_up: SaveFollowUp) {
        let Some(player) = self.player_mut() else {
            return;
        };
        player.accumulate_played_time();
        player.can_process_commands = false;
        if follow_up == SaveFollowUp::RemoveFromMap {
            player.logged_out = true;
        }
        if let Some(snapshot) = self.snapshot() {
            self.events.push(EntityEvent::Save {
                snapshot: Box::new(snapshot),
                follow_up,
            });
        }
    }

    /// Capture the persistable state and clear the save mask
    pub fn snapshot(&mut self) -> Option<PlayerSnapshot> {
        let position = self.position;
        let rotation = self.rotation;
        let level = self.level();
        let faction = self.faction1;
        let display_info = self.display_info;
        let visuals = self.appearance().collect();

        let player = self.player_mut()?;
        let mask = std::mem::take(&mut player.save_mask);
        Some(PlayerSnapshot {
            mask,
            account: AccountSnapshot {
                character_id: player.character_id,
                costume_index: player.costume_index,
            },
            character: CharacterRecord {
                character_id: player.character_id,
                name: player.name.clone(),
                world: player.world,
                position,
                rotation,
                level,
                total_xp: player.total_xp,
                path: player.path,
                costume_index: player.costume_index,
                time_played_total: player.time_played_total,
                time_played_level: player.time_played_level,
                faction,
                display_info,
                visuals,
            },
        })
    }

    /// The persistence pipeline finished a save requested by this player
    pub fn on_save_complete(&mut self, follow_up: SaveFollowUp) {
        let Some(player) = self.player_mut() else {
            return;
        };
        if follow_up != SaveFollowUp::ResumeCommands {
            return;
        }
        if std::mem::take(&mut player.cleanup_deferred) {
            log::debug!("Issuing deferred logout save for character {}", player.character_id);
            self.request_save(SaveFollowUp::RemoveFromMap);
        } else {
            player.can_process_commands = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_core::StaticTables;

    fn player() -> Entity {
        let record = CharacterRecord::new(CharacterId(7), "Avra", WorldId(870));
        let tables = StaticTables::new();
        let mut entity = Entity::from_character(&record, &WorldConfig::testing(), &tables);
        entity.on_add_to_map(EntityId::new(1), Vec3::ZERO);
        entity.drain_events();
        entity
    }

    fn saves(entity: &mut Entity) -> Vec<SaveFollowUp> {
        entity
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                EntityEvent::Save { follow_up, .. } => Some(follow_up),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_player_defaults() {
        let entity = player();
        assert_eq!(entity.health(), 800);
        assert_eq!(entity.max_health(), 800);
        assert_eq!(entity.level(), 1);
        assert_eq!(entity.character_id(), Some(CharacterId(7)));
        assert!(entity.is_alive());
    }

    #[test]
    fn test_periodic_save_suspends_commands() {
        let mut entity = player();
        for _ in 0..4 {
            assert!(entity.update_player(1.0));
        }
        assert!(saves(&mut entity).is_empty());

        entity.update_player(1.0);
        assert_eq!(saves(&mut entity), vec![SaveFollowUp::ResumeCommands]);
        let state = entity.player().unwrap();
        assert!(!state.can_process_commands());
        assert_eq!(state.time_played_total(), 5.0);

        // No second save while one is in flight
        for _ in 0..10 {
            entity.update_player(1.0);
        }
        assert!(saves(&mut entity).is_empty());

        entity.on_save_complete(SaveFollowUp::ResumeCommands);
        assert!(entity.player().unwrap().can_process_commands());
        entity.update_player(0.1);
        assert_eq!(saves(&mut entity), vec![SaveFollowUp::ResumeCommands]);
    }

    #[test]
    fn test_snapshot_takes_mask() {
        let mut entity = player();
        entity.relocate(Vec3::new(5.0, 0.0, 5.0));
        entity.player_mut().unwrap().set_path(2);

        let snapshot = entity.snapshot().unwrap();
        assert!(snapshot.mask.contains(SaveMask::LOCATION));
        assert!(snapshot.mask.contains(SaveMask::PATH));
        assert!(!snapshot.mask.contains(SaveMask::XP));
        assert_eq!(snapshot.character.position, Vec3::new(5.0, 0.0, 5.0));
        assert!(entity.player().unwrap().save_mask().is_empty());

        let bytes = snapshot.to_bytes().unwrap();
        assert_eq!(PlayerSnapshot::from_bytes(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn test_logout_flow() {
        let mut entity = player();
        assert_eq!(entity.logout_finish(), Err(Violation::NoLogoutInProgress));

        entity.logout_start(10.0, LogoutReason::Requested, true).unwrap();
        // Second start is ignored
        entity.logout_start(99.0, LogoutReason::Kicked, false).unwrap();
        assert_eq!(
            entity.player().unwrap().logout().unwrap().reason(),
            LogoutReason::Requested
        );

        entity.logout_cancel().unwrap();
        assert!(entity.player().unwrap().logout().is_none());

        entity.logout_start(10.0, LogoutReason::Requested, true).unwrap();
        assert!(entity.update_player(10.0));
        assert!(!entity.update_player(0.1));
        assert_eq!(entity.logout_cancel(), Err(Violation::LogoutElapsed));
        // The periodic save that fell due on the way has completed
        entity.on_save_complete(SaveFollowUp::ResumeCommands);
        entity.drain_events();

        entity.logout_finish().unwrap();
        let events = entity.drain_events();
        assert!(matches!(
            &events[0],
            EntityEvent::Send(ServerMessage::ClientLogout { requested: true, .. })
        ));
        assert!(matches!(
            &events[1],
            EntityEvent::Save {
                follow_up: SaveFollowUp::RemoveFromMap,
                ..
            }
        ));
        assert!(entity.player().unwrap().is_logged_out());
    }

    #[test]
    fn test_logout_save_waits_for_save_in_flight() {
        let mut entity = player();
        entity.logout_start(5.0, LogoutReason::Requested, true).unwrap();
        entity.drain_events();

        for _ in 0..5 {
            entity.update_player(1.0);
        }
        assert_eq!(saves(&mut entity), vec![SaveFollowUp::ResumeCommands]);
        assert!(entity.player().unwrap().logout().unwrap().ready_to_logout());

        entity.logout_finish().unwrap();
        let events = entity.drain_events();
        assert!(matches!(
            &events[..],
            [EntityEvent::Send(ServerMessage::ClientLogout { .. })]
        ));
        assert!(entity.player().unwrap().is_logged_out());
        assert!(!entity.player().unwrap().can_process_commands());

        // Finishing again changes nothing
        entity.logout_finish().unwrap();
        assert!(entity.drain_events().is_empty());

        entity.on_save_complete(SaveFollowUp::ResumeCommands);
        assert_eq!(saves(&mut entity), vec![SaveFollowUp::RemoveFromMap]);
        assert!(!entity.player().unwrap().can_process_commands());
    }

    #[test]
    fn test_grant_xp_levels_up() {
        let tables = StaticTables::new().with_xp_table(vec![0, 100, 300, 600]);
        let config = WorldConfig::default();
        let mut entity = player();

        entity.grant_xp(350, &tables, &config).unwrap();
        assert_eq!(entity.level(), 3);
        let state = entity.player().unwrap();
        assert_eq!(state.total_xp(), 350);
        assert_eq!(state.xp_to_next_level(), 600);
        assert!(state.save_mask().contains(SaveMask::LEVEL));
        assert!(state.save_mask().contains(SaveMask::XP));

        let level_updates = entity
            .drain_events()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    EntityEvent::Broadcast {
                        message: ServerMessage::StatUpdate { .. },
                        include_self: true
                    }
                )
            })
            .count();
        assert_eq!(level_updates, 2);
    }

    #[test]
    fn test_grant_xp_stops_at_max_level() {
        let tables = StaticTables::new().with_xp_table(vec![0, 100, 300, 600]);
        let config = WorldConfig {
            max_level: 2,
            ..Default::default()
        };
        let mut entity = player();
        entity.grant_xp(10_000, &tables, &config).unwrap();
        assert_eq!(entity.level(), 2);

        entity.drain_events();
        entity.grant_xp(10, &tables, &config).unwrap();
        assert!(!entity.has_events());
    }

    #[test]
    fn test_grant_level_sets_xp() {
        let tables = StaticTables::new().with_xp_table(vec![0, 100, 300, 600]);
        let mut entity = player();
        entity.grant_level(3, true, &tables).unwrap();
        assert_eq!(entity.level(), 3);
        assert_eq!(entity.player().unwrap().total_xp(), 300);
    }

    #[test]
    fn test_summon_vanity_pet_replaces_old() {
        let config = WorldConfig::default();
        let mut entity = player();
        entity
            .player_mut()
            .unwrap()
            .pets_mut()
            .add_pet_guid(EntityId::new(1), PetKind::Vanity, EntityId::new(50))
            .unwrap();

        entity
            .summon_pet(PetKind::Vanity, 300, 0, 1, 10, &config)
            .unwrap();
        assert_eq!(entity.player().unwrap().pets().vanity_pet(), None);

        let events = entity.drain_events();
        assert!(matches!(events[0], EntityEvent::Remove(id) if id == EntityId::new(50)));
        assert!(matches!(
            &events[1],
            EntityEvent::Spawn { entity, .. } if entity.creature_id() == 300
        ));
    }

    #[test]
    fn test_set_control_sends_movement_control() {
        let mut entity = player();
        entity.set_control(EntityId::new(9)).unwrap();
        assert_eq!(entity.player().unwrap().control_guid(), Some(EntityId::new(9)));
        assert!(matches!(
            entity.drain_events()[..],
            [EntityEvent::Send(ServerMessage::MovementControl { .. })]
        ));
    }

    #[test]
    fn test_non_players_have_no_player_operations() {
        let template = crate::entity::EntityTemplate {
            health: 10,
            ..Default::default()
        };
        let mut entity = Entity::non_player(&template, &WorldConfig::default());
        assert!(matches!(
            entity.logout_start(1.0, LogoutReason::Requested, true),
            Err(Violation::MissingCapability { capability: "player", .. })
        ));
    }
}
