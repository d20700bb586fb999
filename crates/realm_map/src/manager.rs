//! Map manager
//!
//! Owns one top-level map per world entry: an open map, or an
//! [`InstancedMap`] container for instanced worlds. Maps are built lazily the
//! first time something is added to their world.
//!
//! The manager is also the half of the teleport coordinator that runs
//! between ticks: it picks up players that left a map with a pending
//! teleport and queues them on their destination, or sends them back where
//! they came from when the destination cannot be resolved.

use glam::Vec3;
use parking_lot::RwLock;
use realm_core::{CharacterId, MapInfo, Violation, WorldId};
use realm_entity::{CharacterRecord, Entity, PendingTeleport, ServerMessage};
use std::collections::HashMap;
use std::sync::Arc;

use crate::command::PlayerCommand;
use crate::context::WorldContext;
use crate::error::{MapError, MapResult};
use crate::instance::InstancedMap;
use crate::map::MapCell;

/// Top-level map of one world
#[derive(Debug, Clone)]
pub enum WorldMap {
    Open(Arc<MapCell>),
    Instanced(Arc<InstancedMap>),
}

impl WorldMap {
    /// Add straight to this map.
    ///
    /// An instance container holds no entities; adding to one is a
    /// [`Violation::AddToInstanceContainer`].
    pub fn add_to_map(&self, entity: Entity, position: Vec3) -> MapResult<()> {
        match self {
            Self::Open(cell) => cell.enqueue_add(entity, position),
            Self::Instanced(container) => {
                Err(Violation::AddToInstanceContainer(container.world()).into())
            }
        }
    }

    /// Every map this world currently ticks
    pub fn cells(&self) -> Vec<Arc<MapCell>> {
        match self {
            Self::Open(cell) => vec![Arc::clone(cell)],
            Self::Instanced(container) => container.instances(),
        }
    }
}

/// All maps of the world server
pub struct MapManager {
    ctx: Arc<WorldContext>,
    maps: RwLock<HashMap<WorldId, WorldMap>>,
    /// Map each character's player is on or headed to
    characters: RwLock<HashMap<CharacterId, Arc<MapCell>>>,
}

impl MapManager {
    pub fn new(ctx: Arc<WorldContext>) -> Self {
        Self {
            ctx,
            maps: RwLock::new(HashMap::new()),
            characters: RwLock::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &Arc<WorldContext> {
        &self.ctx
    }

    /// Top-level map of a world, built on first use
    pub fn world_map(&self, world: WorldId) -> MapResult<WorldMap> {
        if let Some(map) = self.maps.read().get(&world) {
            return Ok(map.clone());
        }

        let mut maps = self.maps.write();
        // Another thread may have built it between the two locks
        if let Some(map) = maps.get(&world) {
            return Ok(map.clone());
        }
        let entry = self
            .ctx
            .data
            .world(world)
            .ok_or(MapError::UnknownWorld(world))?;
        let map = if entry.kind.is_instanced() {
            WorldMap::Instanced(Arc::new(InstancedMap::new(world, Arc::clone(&self.ctx))))
        } else {
            WorldMap::Open(MapCell::new(MapInfo::world(world), Arc::clone(&self.ctx)))
        };
        log::info!("Created {:?} map for world {} ({})", entry.kind, world, entry.name);
        maps.insert(world, map.clone());
        Ok(map)
    }

    /// Concrete map a descriptor points at
    pub fn resolve(&self, info: MapInfo) -> MapResult<Arc<MapCell>> {
        match self.world_map(info.world)? {
            WorldMap::Open(cell) => Ok(cell),
            WorldMap::Instanced(container) => container.create_instance(info),
        }
    }

    /// Queue an entity on the map a descriptor resolves to
    pub fn add_to_map(&self, entity: Entity, info: MapInfo, position: Vec3) -> MapResult<()> {
        let cell = self.resolve(info)?;
        if let Some(character) = entity.character_id() {
            self.characters.write().insert(character, Arc::clone(&cell));
        }
        cell.enqueue_add(entity, position)
    }

    /// Place a freshly loaded character into the world.
    ///
    /// Failing to place a character that is not in any map yet is fatal for
    /// its session, which is disconnected.
    pub fn login(&self, record: &CharacterRecord, info: MapInfo, position: Vec3) -> MapResult<()> {
        let mut entity = Entity::from_character(record, &self.ctx.config, self.ctx.data.as_ref());
        if let Some(player) = entity.player_mut() {
            player.set_pending_teleport(PendingTeleport::login(info, position));
        }
        let result = self.add_to_map(entity, info, position);
        if let Err(err) = &result {
            log::error!("Login of character {} failed: {}", record.character_id, err);
            self.characters.write().remove(&record.character_id);
            self.ctx
                .sessions
                .disconnect(record.character_id, &err.to_string());
        }
        result
    }

    /// Queue a command for a character wherever it is
    pub fn submit_command(&self, character: CharacterId, command: PlayerCommand) -> MapResult<()> {
        let cell = self
            .characters
            .read()
            .get(&character)
            .cloned()
            .ok_or(MapError::UnknownCharacter(character))?;
        cell.submit_command(character, command)
    }

    /// Forget a character that left the world
    pub fn forget_character(&self, character: CharacterId) {
        self.characters.write().remove(&character);
    }

    pub fn world_maps(&self) -> Vec<WorldMap> {
        self.maps.read().values().cloned().collect()
    }

    /// Every live map and instance
    pub fn cells(&self) -> Vec<Arc<MapCell>> {
        self.world_maps().iter().flat_map(WorldMap::cells).collect()
    }

    /// Publish pending instances of every container
    pub fn promote_pending(&self) -> usize {
        self.world_maps()
            .iter()
            .map(|map| match map {
                WorldMap::Instanced(container) => container.promote_pending(),
                WorldMap::Open(_) => 0,
            })
            .sum()
    }

    /// Move players that left a map with a pending teleport to their destination
    pub fn route_transfers(&self) -> usize {
        let mut routed = 0;
        for cell in self.cells() {
            let transfers = cell.lock().take_transfers();
            for entity in transfers {
                self.route(entity);
                routed += 1;
            }
        }
        routed
    }

    fn route(&self, entity: Entity) {
        let Some((destination, position)) = entity
            .player()
            .and_then(|p| p.pending_teleport())
            .map(|t| (t.destination(), t.position()))
        else {
            log::error!("Entity {} was staged for transfer without a teleport", entity.guid());
            return;
        };

        if let Err((entity, err)) = self.place(entity, destination, position) {
            self.transfer_failed(entity, err);
        }
    }

    /// Queue on the destination, handing the entity back if it does not resolve
    fn place(
        &self,
        entity: Entity,
        destination: MapInfo,
        position: Vec3,
    ) -> Result<(), (Entity, MapError)> {
        let cell = match self.resolve(destination) {
            Ok(cell) => cell,
            Err(err) => return Err((entity, err)),
        };
        if let Some(character) = entity.character_id() {
            self.characters.write().insert(character, Arc::clone(&cell));
        }
        if let Err(err) = cell.enqueue_add(entity, position) {
            log::error!("{} dropped an arriving entity: {}", destination, err);
        }
        Ok(())
    }

    fn transfer_failed(&self, mut entity: Entity, err: MapError) {
        let Some(character) = entity.character_id() else {
            return;
        };
        let back = entity
            .player_mut()
            .and_then(|p| p.take_pending_teleport())
            .and_then(PendingTeleport::into_return);

        let Some(back) = back else {
            log::error!("Character {} cannot be placed: {}", character, err);
            self.forget_character(character);
            self.ctx.sessions.disconnect(character, &err.to_string());
            return;
        };

        log::warn!(
            "Teleport of character {} failed: {}; returning to {}",
            character,
            err,
            back.destination()
        );
        self.ctx.broadcaster.notify_visible(
            &[character],
            &ServerMessage::system(format!("Teleport failed: {}", err)),
        );
        let (destination, position) = (back.destination(), back.position());
        if let Some(player) = entity.player_mut() {
            player.set_pending_teleport(back);
        }
        if let Err((_, err)) = self.place(entity, destination, position) {
            log::error!("Character {} cannot return: {}", character, err);
            self.forget_character(character);
            self.ctx.sessions.disconnect(character, &err.to_string());
        }
    }
}

impl std::fmt::Debug for MapManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapManager")
            .field("worlds", &self.maps.read().len())
            .field("characters", &self.characters.read().len())
            .finish()
    }
}
