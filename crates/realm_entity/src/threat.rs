//! Threat tables
//!
//! A [`ThreatManager`] keeps one [`HostileEntity`] per hated unit in creation
//! order. Every mutation returns the [`ThreatEvent`]s it caused, ordered as
//! add/remove notifications first and a single change notification last, so
//! the owning unit can react in a fixed order.

use realm_core::EntityId;

/// Threat held by one unit against another
#[derive(Debug, Clone, PartialEq)]
pub struct HostileEntity {
    hated: EntityId,
    threat: u32,
    target_is_player: bool,
    /// Simulation time of the last adjustment
    last_update: f64,
}

impl HostileEntity {
    fn new(hated: EntityId, target_is_player: bool, now: f64) -> Self {
        Self {
            hated,
            threat: 0,
            target_is_player,
            last_update: now,
        }
    }

    pub fn hated(&self) -> EntityId {
        self.hated
    }

    pub fn threat(&self) -> u32 {
        self.threat
    }

    pub fn target_is_player(&self) -> bool {
        self.target_is_player
    }

    pub fn last_update(&self) -> f64 {
        self.last_update
    }

    /// Apply a signed delta, saturating at zero and `u32::MAX`
    fn adjust(&mut self, delta: i64, now: f64) {
        self.threat = i64::from(self.threat)
            .saturating_add(delta)
            .clamp(0, i64::from(u32::MAX)) as u32;
        self.last_update = now;
    }

    /// Only player-vs-player entries expire
    fn is_stale(&self, owner_is_player: bool, now: f64, timeout: f64) -> bool {
        owner_is_player && self.target_is_player && now - self.last_update > timeout
    }
}

/// Notification produced by a threat table mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreatEvent {
    /// A new unit became hated
    Added(EntityId),
    /// A hated unit was dropped
    Removed(EntityId),
    /// The table changed in any way
    Changed,
}

/// Threat table of one unit
#[derive(Debug, Clone)]
pub struct ThreatManager {
    owner_is_player: bool,
    hostiles: Vec<HostileEntity>,
    /// Accumulated simulation time
    clock: f64,
    stale_timeout: f64,
}

impl ThreatManager {
    pub fn new(owner_is_player: bool, stale_timeout: f64) -> Self {
        Self {
            owner_is_player,
            hostiles: Vec::new(),
            clock: 0.0,
            stale_timeout,
        }
    }

    /// Add `delta` threat against `target`, creating the entry on first use
    pub fn adjust_threat(
        &mut self,
        target: EntityId,
        target_is_player: bool,
        delta: i64,
    ) -> Vec<ThreatEvent> {
        let now = self.clock;
        let mut events = Vec::with_capacity(2);
        match self.hostiles.iter_mut().find(|h| h.hated == target) {
            Some(hostile) => hostile.adjust(delta, now),
            None => {
                let mut hostile = HostileEntity::new(target, target_is_player, now);
                hostile.adjust(delta, now);
                self.hostiles.push(hostile);
                events.push(ThreatEvent::Added(target));
            }
        }
        events.push(ThreatEvent::Changed);
        events
    }

    /// Drop the entry for `target`
    pub fn remove(&mut self, target: EntityId) -> Vec<ThreatEvent> {
        let before = self.hostiles.len();
        self.hostiles.retain(|h| h.hated != target);
        if self.hostiles.len() == before {
            return Vec::new();
        }
        vec![ThreatEvent::Removed(target), ThreatEvent::Changed]
    }

    /// Drop every entry
    pub fn clear(&mut self) -> Vec<ThreatEvent> {
        if self.hostiles.is_empty() {
            return Vec::new();
        }
        let mut events: Vec<ThreatEvent> = self
            .hostiles
            .drain(..)
            .map(|h| ThreatEvent::Removed(h.hated))
            .collect();
        events.push(ThreatEvent::Changed);
        events
    }

    /// Advance the clock and evict stale entries
    pub fn update(&mut self, delta: f64) -> Vec<ThreatEvent> {
        self.clock += delta;
        let (now, timeout) = (self.clock, self.stale_timeout);
        let owner_is_player = self.owner_is_player;

        let mut events = Vec::new();
        self.hostiles.retain(|h| {
            if h.is_stale(owner_is_player, now, timeout) {
                log::debug!("Threat against {} went stale", h.hated);
                events.push(ThreatEvent::Removed(h.hated));
                false
            } else {
                true
            }
        });
        if !events.is_empty() {
            events.push(ThreatEvent::Changed);
        }
        events
    }

    /// Entry with the highest threat; ties go to the oldest entry
    pub fn top(&self) -> Option<&HostileEntity> {
        self.hostiles.iter().fold(None, |best, h| match best {
            Some(b) if b.threat >= h.threat => Some(b),
            _ => Some(h),
        })
    }

    pub fn threat(&self, target: EntityId) -> Option<u32> {
        self.hostiles
            .iter()
            .find(|h| h.hated == target)
            .map(|h| h.threat)
    }

    pub fn contains(&self, target: EntityId) -> bool {
        self.hostiles.iter().any(|h| h.hated == target)
    }

    pub fn is_empty(&self) -> bool {
        self.hostiles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hostiles.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostileEntity> {
        self.hostiles.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: EntityId = EntityId::new(1);
    const B: EntityId = EntityId::new(2);
    const C: EntityId = EntityId::new(3);

    #[test]
    fn test_event_order() {
        let mut threat = ThreatManager::new(false, 10.0);
        assert_eq!(
            threat.adjust_threat(A, false, 10),
            vec![ThreatEvent::Added(A), ThreatEvent::Changed]
        );
        assert_eq!(threat.adjust_threat(A, false, 5), vec![ThreatEvent::Changed]);
        assert_eq!(
            threat.remove(A),
            vec![ThreatEvent::Removed(A), ThreatEvent::Changed]
        );
        assert!(threat.remove(A).is_empty());
    }

    #[test]
    fn test_threat_saturates_at_zero() {
        let mut threat = ThreatManager::new(false, 10.0);
        threat.adjust_threat(A, false, 30);
        threat.adjust_threat(A, false, -50);
        assert_eq!(threat.threat(A), Some(0));

        threat.adjust_threat(A, false, i64::MAX);
        assert_eq!(threat.threat(A), Some(u32::MAX));
    }

    #[test]
    fn test_top_prefers_oldest_on_ties() {
        let mut threat = ThreatManager::new(false, 10.0);
        threat.adjust_threat(A, false, 50);
        threat.adjust_threat(B, false, 50);
        assert_eq!(threat.top().map(|h| h.hated()), Some(A));

        threat.adjust_threat(C, false, 51);
        assert_eq!(threat.top().map(|h| h.hated()), Some(C));
    }

    #[test]
    fn test_stale_only_between_players() {
        let mut threat = ThreatManager::new(true, 10.0);
        threat.adjust_threat(A, true, 10);
        threat.adjust_threat(B, false, 10);

        assert!(threat.update(9.0).is_empty());
        threat.adjust_threat(A, true, 1);
        assert!(threat.update(9.0).is_empty());

        let events = threat.update(2.0);
        assert_eq!(events, vec![ThreatEvent::Removed(A), ThreatEvent::Changed]);
        assert!(threat.contains(B));
    }

    #[test]
    fn test_clear_reports_every_entry() {
        let mut threat = ThreatManager::new(false, 10.0);
        assert!(threat.clear().is_empty());

        threat.adjust_threat(A, false, 1);
        threat.adjust_threat(B, false, 1);
        assert_eq!(
            threat.clear(),
            vec![
                ThreatEvent::Removed(A),
                ThreatEvent::Removed(B),
                ThreatEvent::Changed
            ]
        );
        assert!(threat.is_empty());
    }
}
