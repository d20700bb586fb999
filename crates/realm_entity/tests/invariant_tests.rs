//! Invariant tests for realm_entity
//!
//! These tests pin down entity guarantees the map relies on

use realm_core::{EntityId, Violation, WorldConfig};
use realm_entity::*;

fn unit(health: u32) -> Entity {
    let template = EntityTemplate {
        creature_id: 1,
        health,
        ..Default::default()
    };
    let mut entity = Entity::non_player(&template, &WorldConfig::default());
    entity.on_add_to_map(EntityId::new(100), glam::Vec3::ZERO);
    entity.drain_events();
    entity
}

fn attacker(raw: u32) -> Attacker {
    Attacker {
        guid: EntityId::new(raw),
        is_player: false,
        is_alive: true,
    }
}

fn death_states(events: &[EntityEvent]) -> Vec<DeathState> {
    events
        .iter()
        .filter_map(|e| match e {
            EntityEvent::DeathStateChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}

/// INVARIANT: Threat never goes negative or wraps
#[test]
fn invariant_threat_clamps_at_zero() {
    let mut threat = ThreatManager::new(false, 10.0);
    let target = EntityId::new(5);

    threat.adjust_threat(target, false, 30);
    threat.adjust_threat(target, false, -50);
    assert_eq!(threat.threat(target), Some(0));

    threat.adjust_threat(target, false, 25);
    assert_eq!(threat.threat(target), Some(25));

    threat.adjust_threat(target, false, i64::MAX);
    assert_eq!(threat.threat(target), Some(u32::MAX));
}

/// INVARIANT: Only player-vs-player threat goes stale
#[test]
fn invariant_threat_staleness() {
    let player = EntityId::new(1);
    let creature = EntityId::new(2);

    let mut pvp = ThreatManager::new(true, 10.0);
    pvp.adjust_threat(player, true, 10);
    pvp.update(5.0);
    assert!(pvp.contains(player));
    let events = pvp.update(5.5);
    assert_eq!(events, vec![ThreatEvent::Removed(player), ThreatEvent::Changed]);
    assert!(pvp.is_empty());

    let mut pve = ThreatManager::new(true, 10.0);
    pve.adjust_threat(creature, false, 10);
    pve.update(10_000.0);
    assert!(pve.contains(creature));

    let mut npc = ThreatManager::new(false, 10.0);
    npc.adjust_threat(player, true, 10);
    npc.update(10_000.0);
    assert!(npc.contains(player));
}

/// INVARIANT: Health stays within [0, max_health] for any delta
#[test]
fn invariant_health_is_clamped() {
    let mut entity = unit(800);
    for delta in [i64::MAX, 1, -1, 5_000, i64::MIN + 1] {
        let _ = entity.modify_health(delta);
        assert!(entity.health() <= entity.max_health());
    }

    let mut entity = unit(800);
    entity.modify_health(-1_000_000).unwrap();
    assert_eq!(entity.health(), 0);
}

/// INVARIANT: One JustDied then one Corpse notification per kill
#[test]
fn invariant_death_notifications_in_order() {
    let mut entity = unit(100);
    entity
        .take_damage(attacker(7), &DamageDescription::new(250, DamageType::Physical))
        .unwrap();

    let events = entity.drain_events();
    assert_eq!(
        death_states(&events),
        vec![DeathState::JustDied, DeathState::Corpse]
    );
    let kills = events
        .iter()
        .filter(|e| matches!(e, EntityEvent::Killed { .. }))
        .count();
    assert_eq!(kills, 1);
    assert_eq!(entity.death_state(), DeathState::Corpse);
}

/// INVARIANT: A rejected transition leaves the entity untouched
#[test]
fn invariant_rejected_transition_is_atomic() {
    let mut entity = unit(100);
    let result = entity.set_death_state(DeathState::Dead);
    assert!(matches!(
        result,
        Err(Violation::IllegalDeathTransition { .. })
    ));
    assert_eq!(entity.death_state(), DeathState::JustSpawned);
    assert_eq!(entity.health(), 100);
    assert!(!entity.has_events());
}

/// Damage to zero and healing back walks the full death cycle
#[test]
fn scenario_damage_then_heal() {
    let mut entity = unit(800);
    assert_eq!(entity.max_health(), 800);

    entity
        .take_damage(attacker(7), &DamageDescription::new(900, DamageType::Physical))
        .unwrap();
    assert_eq!(entity.health(), 0);
    assert_eq!(entity.death_state(), DeathState::Corpse);
    assert!(!entity.is_alive());
    entity.drain_events();

    entity.modify_health(500).unwrap();
    assert_eq!(entity.health(), 500);
    assert_eq!(entity.death_state(), DeathState::Alive);
    assert_eq!(
        death_states(&entity.drain_events()),
        vec![DeathState::JustSpawned, DeathState::Alive]
    );
}

/// The unit with the most threat is targeted, and losing it falls back
#[test]
fn scenario_threat_selects_highest() {
    let (a, b) = (EntityId::new(1), EntityId::new(2));
    let mut target = unit(1_000);

    target
        .take_damage(attacker(1), &DamageDescription::new(40, DamageType::Physical))
        .unwrap();
    target
        .take_damage(attacker(2), &DamageDescription::new(60, DamageType::Physical))
        .unwrap();
    assert_eq!(target.threat_against(a), Some(40));
    assert_eq!(target.threat_against(b), Some(60));
    assert_eq!(target.target(), Some(b));
    assert!(target.in_combat());

    target.adjust_threat(b, false, -60).unwrap();
    assert_eq!(target.threat_against(b), Some(0));
    assert_eq!(target.target(), Some(a));

    target.remove_threat(b);
    assert_eq!(target.threat_against(b), None);
    assert_eq!(target.target(), Some(a));

    target.clear_threat();
    assert_eq!(target.target(), None);
    assert!(!target.in_combat());
}

/// INVARIANT: An owner never tracks two vanity pets
#[test]
fn invariant_single_vanity_pet() {
    let owner = EntityId::new(1);
    let mut pets = PetManager::new();
    pets.add_pet_guid(owner, PetKind::Vanity, EntityId::new(10))
        .unwrap();

    let err = pets
        .add_pet_guid(owner, PetKind::Vanity, EntityId::new(11))
        .unwrap_err();
    assert!(matches!(err, Violation::DuplicateVanityPet { .. }));
    assert_eq!(pets.vanity_pet(), Some(EntityId::new(10)));

    pets.remove_pet_guid(owner, PetKind::Vanity, EntityId::new(10))
        .unwrap();
    assert_eq!(pets.vanity_pet(), None);
    assert!(matches!(
        pets.remove_pet_guid(owner, PetKind::Vanity, EntityId::new(10)),
        Err(Violation::MissingVanityPet(_))
    ));

    pets.add_pet_guid(owner, PetKind::Vanity, EntityId::new(11))
        .unwrap();
    assert_eq!(pets.vanity_pet(), Some(EntityId::new(11)));
}

/// INVARIANT: Killing with health left is a violation and changes nothing
#[test]
fn invariant_kill_requires_zero_health() {
    let mut entity = unit(50);
    assert!(matches!(
        entity.kill(None),
        Err(Violation::KillWithHealth { health: 50, .. })
    ));
    assert_eq!(entity.death_state(), DeathState::JustSpawned);
}
