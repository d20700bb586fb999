//! Identifiers for entities, instances, worlds and characters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Map-local identifier of a live entity.
///
/// Issued by a map when the entity is added to it, so the same entity gets a
/// different id on every map it visits. Zero is reserved for "no entity".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EntityId(u32);

impl EntityId {
    /// Create an id from its raw value
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The id of no entity
    #[inline]
    pub const fn null() -> Self {
        Self(0)
    }

    /// Check if this id refers to no entity
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Get the raw value
    #[inline]
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "EntityId(null)")
        } else {
            write!(f, "EntityId({})", self.0)
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Identifier of a promoted map instance inside an instanced world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(u32);

impl InstanceId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a world entry in the static tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorldId(pub u16);

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persistent identifier of a player character, stable across maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub u64);

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread-safe, monotonically increasing id source.
///
/// The first issued value is 1 so that zero stays free for null ids.
pub struct IdGenerator {
    next: AtomicU32,
}

impl IdGenerator {
    /// Create a new generator
    pub const fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Issue the next raw value
    pub fn next_raw(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Issue the next entity id
    pub fn next_entity(&self) -> EntityId {
        EntityId::new(self.next_raw())
    }

    /// Issue the next instance id
    pub fn next_instance(&self) -> InstanceId {
        InstanceId::new(self.next_raw())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator")
            .field("next", &self.next.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_entity() {
        assert!(EntityId::null().is_null());
        assert!(!EntityId::new(4).is_null());
        assert_eq!(EntityId::default(), EntityId::null());
        assert_eq!(format!("{:?}", EntityId::null()), "EntityId(null)");
    }

    #[test]
    fn test_generator_skips_zero() {
        let gen = IdGenerator::new();
        assert_eq!(gen.next_entity(), EntityId::new(1));
        assert_eq!(gen.next_instance(), InstanceId::new(2));
        assert_eq!(gen.next_raw(), 3);
    }

    #[test]
    fn test_generator_is_unique_across_threads() {
        let gen = std::sync::Arc::new(IdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gen = std::sync::Arc::clone(&gen);
                std::thread::spawn(move || (0..100).map(|_| gen.next_raw()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
    }
}
