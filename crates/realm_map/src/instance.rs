//! Instanced maps
//!
//! An [`InstancedMap`] is the container for every copy of one instanced
//! world. It never holds entities itself; requests resolve to a concrete
//! instance through [`InstancedMap::create_instance`].
//!
//! New instances are built outside the lookup table and parked in a pending
//! list. [`InstancedMap::promote_pending`] issues their ids and publishes them
//! at the start of a scheduler frame, so no lookup or tick ever sees an
//! instance that is still being set up.

use parking_lot::{Mutex, RwLock};
use realm_core::{IdGenerator, InstanceId, MapInfo, WorldId};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::WorldContext;
use crate::error::{MapError, MapResult};
use crate::map::MapCell;

/// Every instance of one instanced world
pub struct InstancedMap {
    world: WorldId,
    ctx: Arc<WorldContext>,
    instances: RwLock<BTreeMap<InstanceId, Arc<MapCell>>>,
    /// Built but not yet published. Lock before `instances`.
    pending: Mutex<Vec<Arc<MapCell>>>,
    ids: IdGenerator,
}

impl InstancedMap {
    pub fn new(world: WorldId, ctx: Arc<WorldContext>) -> Self {
        Self {
            world,
            ctx,
            instances: RwLock::new(BTreeMap::new()),
            pending: Mutex::new(Vec::new()),
            ids: IdGenerator::new(),
        }
    }

    pub fn world(&self) -> WorldId {
        self.world
    }

    /// Resolve a descriptor to an instance.
    ///
    /// - An explicit instance id returns that live instance or fails.
    /// - A residence id returns the live or pending instance of that
    ///   residence if one exists.
    /// - Anything else builds a new pending instance.
    pub fn create_instance(&self, info: MapInfo) -> MapResult<Arc<MapCell>> {
        if let Some(instance) = info.instance_id {
            return self
                .instances
                .read()
                .get(&instance)
                .cloned()
                .ok_or(MapError::InstanceNotFound {
                    world: self.world,
                    instance,
                });
        }

        let mut pending = self.pending.lock();
        if let Some(residence) = info.residence_id {
            let existing = self
                .instances
                .read()
                .values()
                .chain(pending.iter())
                .find(|cell| cell.residence_id() == Some(residence))
                .cloned();
            if let Some(cell) = existing {
                return Ok(cell);
            }
        }

        let mut descriptor = MapInfo::world(self.world);
        descriptor.residence_id = info.residence_id;
        let cell = MapCell::new(descriptor, Arc::clone(&self.ctx));
        log::debug!("Built pending instance of world {}", self.world);
        pending.push(Arc::clone(&cell));
        Ok(cell)
    }

    /// Publish every pending instance under a fresh id
    pub fn promote_pending(&self) -> usize {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return 0;
        }
        let mut instances = self.instances.write();
        let count = pending.len();
        for cell in pending.drain(..) {
            let id = self.ids.next_instance();
            cell.lock().set_instance_id(id);
            instances.insert(id, cell);
            log::info!("Instance {} of world {} is live", id, self.world);
        }
        count
    }

    /// Live instance by id
    pub fn instance(&self, id: InstanceId) -> Option<Arc<MapCell>> {
        self.instances.read().get(&id).cloned()
    }

    /// Live instances, in id order
    pub fn instances(&self) -> Vec<Arc<MapCell>> {
        self.instances.read().values().cloned().collect()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drop an instance from the lookup table; its cell lives on while referenced
    pub fn remove_instance(&self, id: InstanceId) -> Option<Arc<MapCell>> {
        let removed = self.instances.write().remove(&id);
        if removed.is_some() {
            log::info!("Instance {} of world {} torn down", id, self.world);
        }
        removed
    }
}

impl std::fmt::Debug for InstancedMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstancedMap")
            .field("world", &self.world)
            .field("instances", &self.instance_count())
            .field("pending", &self.pending_count())
            .finish()
    }
}
