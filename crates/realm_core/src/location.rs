//! Map descriptors

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::id::{InstanceId, WorldId};

/// Describes which copy of a world an entity is (or wants to be) on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapInfo {
    /// World entry
    pub world: WorldId,
    /// Concrete instance; must already exist when set
    pub instance_id: Option<InstanceId>,
    /// Persistent residence the instance belongs to
    pub residence_id: Option<u64>,
}

impl MapInfo {
    /// Descriptor for a world without instance preferences
    pub fn world(world: WorldId) -> Self {
        Self {
            world,
            instance_id: None,
            residence_id: None,
        }
    }

    /// Target a specific, existing instance
    pub fn with_instance(mut self, instance_id: InstanceId) -> Self {
        self.instance_id = Some(instance_id);
        self
    }

    /// Target the instance of a residence
    pub fn with_residence(mut self, residence_id: u64) -> Self {
        self.residence_id = Some(residence_id);
        self
    }
}

impl fmt::Display for MapInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "world {}", self.world)?;
        if let Some(instance) = self.instance_id {
            write!(f, " instance {}", instance)?;
        }
        if let Some(residence) = self.residence_id {
            write!(f, " residence {}", residence)?;
        }
        Ok(())
    }
}
