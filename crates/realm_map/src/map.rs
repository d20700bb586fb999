//! A single map
//!
//! A [`Map`] owns the entities of one world copy (an open world or one
//! instance) and advances them once per tick. Each tick runs, in order:
//!
//! 1. Drain the inbound channel (additions, commands, save completions)
//! 2. Remove entities queued for removal, staging teleports as transfers
//! 3. Add entities queued for addition
//! 4. Run queued player commands for players not waiting on a save
//! 5. Update every entity and dispatch the effects it queued
//!
//! A tick is strictly sequential. Cross-map moves never happen inside it:
//! departing players are left in the transfer list for the manager to route.

use crossbeam_channel::{Receiver, Sender};
use glam::Vec3;
use parking_lot::{Mutex, MutexGuard};
use realm_core::{
    CharacterId, DisableKind, EntityId, IdGenerator, InstanceId, MapInfo, Violation,
    ViolationResult, WorldId,
};
use realm_entity::{
    Attacker, CastResult, DamageDescription, Entity, EntityEvent, EntityKind, PendingTeleport,
    PetKind, PlayerSnapshot, SaveFollowUp, ServerMessage, TeleportOrigin, TeleportReason,
};
use realm_persist::{SaveCompletion, SaveRequest};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use crate::command::{MapInbound, PlayerCommand};
use crate::context::{QuestObjectiveType, WorldContext};
use crate::error::{MapError, MapResult, TeleportError};

/// One world copy and its entities
pub struct Map {
    info: MapInfo,
    ctx: Arc<WorldContext>,
    entities: BTreeMap<EntityId, Entity>,
    guids: IdGenerator,
    characters: HashMap<CharacterId, EntityId>,
    pending_adds: Vec<(Entity, Vec3)>,
    pending_removes: Vec<EntityId>,
    /// Commands held back while a player's save is in flight
    commands: HashMap<CharacterId, VecDeque<PlayerCommand>>,
    /// Players that left with a pending teleport
    transfers: Vec<Entity>,
    inbound: Receiver<MapInbound>,
    /// Handed to save continuations
    reply: Sender<MapInbound>,
    ticks: u64,
    faults: u64,
}

impl Map {
    /// Create an empty map
    pub fn new(info: MapInfo, ctx: Arc<WorldContext>) -> Self {
        let (reply, inbound) = crossbeam_channel::unbounded();
        log::debug!("Created map for {}", info);
        Self {
            info,
            ctx,
            entities: BTreeMap::new(),
            guids: IdGenerator::new(),
            characters: HashMap::new(),
            pending_adds: Vec::new(),
            pending_removes: Vec::new(),
            commands: HashMap::new(),
            transfers: Vec::new(),
            inbound,
            reply,
            ticks: 0,
            faults: 0,
        }
    }

    pub fn info(&self) -> MapInfo {
        self.info
    }

    pub(crate) fn set_instance_id(&mut self, instance_id: InstanceId) {
        self.info.instance_id = Some(instance_id);
    }

    /// Sender for this map's inbound channel
    pub fn sender(&self) -> Sender<MapInbound> {
        self.reply.clone()
    }

    pub fn entity(&self, guid: EntityId) -> Option<&Entity> {
        self.entities.get(&guid)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Guid of a character's player entity on this map
    pub fn player_guid(&self, character: CharacterId) -> Option<EntityId> {
        self.characters.get(&character).copied()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Violations caught at this map's tick boundary
    pub fn faults(&self) -> u64 {
        self.faults
    }

    /// Run `f` on an entity and dispatch whatever it queued
    pub fn apply<R>(&mut self, guid: EntityId, f: impl FnOnce(&mut Entity) -> R) -> Option<R> {
        let result = f(self.entities.get_mut(&guid)?);
        self.flush(guid);
        Some(result)
    }

    // ---- Additions and removals ----

    /// Queue an entity for addition at the next tick
    pub fn enqueue_add(&mut self, entity: Entity, position: Vec3) {
        self.pending_adds.push((entity, position));
    }

    /// Queue an entity for removal at the next tick
    pub fn enqueue_remove(&mut self, guid: EntityId) {
        if self.pending_removes.contains(&guid) {
            return;
        }
        let Some(entity) = self.entities.get_mut(&guid) else {
            return;
        };
        // The companion forgets its owner here, so untrack it first
        let companion = entity.companion_state().map(|c| (c.owner(), c.kind()));
        entity.on_enqueue_remove();
        self.pending_removes.push(guid);
        if let Some((owner, kind)) = companion {
            self.detach_companion(owner, kind, guid);
        }
    }

    /// Players that left with a pending teleport since the last call
    pub fn take_transfers(&mut self) -> Vec<Entity> {
        std::mem::take(&mut self.transfers)
    }

    fn process_adds(&mut self) {
        for (mut entity, position) in std::mem::take(&mut self.pending_adds) {
            let guid = self.guids.next_entity();
            entity.on_add_to_map(guid, position);

            if let Some((owner, kind, casting_id)) = entity
                .companion_state()
                .map(|c| (c.owner(), c.kind(), c.casting_id()))
            {
                if let Err(err) = self.attach_companion(owner, kind, guid) {
                    log::error!(
                        "Pet {} (creature {}) cannot join {}: {}",
                        guid,
                        entity.creature_id(),
                        self.info,
                        err
                    );
                    continue;
                }
                self.notify_owner(
                    owner,
                    ServerMessage::PetSummoned {
                        owner,
                        pet: guid,
                        casting_id,
                    },
                );
            }

            let is_player = entity.is_player();
            self.entities.insert(guid, entity);
            if is_player {
                self.on_player_added(guid, position);
            }
            self.flush(guid);
        }
    }

    /// Register a new pet with its owner, who must be a player on this map
    fn attach_companion(
        &mut self,
        owner: EntityId,
        kind: PetKind,
        pet: EntityId,
    ) -> ViolationResult<()> {
        let player = self
            .entities
            .get_mut(&owner)
            .and_then(|o| o.player_mut())
            .ok_or(Violation::UnknownEntity(owner))?;
        player.pets_mut().add_pet_guid(owner, kind, pet)
    }

    fn on_player_added(&mut self, guid: EntityId, position: Vec3) {
        let ctx = Arc::clone(&self.ctx);
        let info = self.info;
        let Some(entity) = self.entities.get_mut(&guid) else {
            return;
        };
        let Some(character) = entity.character_id() else {
            return;
        };
        self.characters.insert(character, guid);

        if let Some(player) = entity.player_mut() {
            player.set_world(info.world);
        }
        ctx.broadcaster.notify_visible(
            &[character],
            &ServerMessage::ChangeWorld {
                world: info.world,
                position,
            },
        );
        entity.set_controller(Some(guid));
        if let Err(err) = entity.set_control(guid) {
            self.fault(err);
            return;
        }

        // Re-home companions that travelled with the player
        let pending = self
            .entities
            .get_mut(&guid)
            .and_then(|e| e.player_mut())
            .and_then(|p| p.take_pending_teleport());
        if let Some(pending) = pending {
            log::debug!(
                "Character {} arrived on {} ({:?})",
                character,
                info,
                pending.reason()
            );
            let (vanity, pets) = pending.into_companions();
            let spawn = self
                .entities
                .get(&guid)
                .map(|e| e.companion_spawn_position(ctx.config.pet.spawn_offset))
                .unwrap_or(position);
            for mut pet in pets {
                pet.set_companion_owner(guid);
                self.enqueue_add(pet, spawn);
            }
            if let Some(creature) = vanity {
                let display = ctx.data.creature(creature).map_or(0, |c| c.display_info);
                let result = self.entities.get_mut(&guid).map(|e| {
                    e.summon_pet(PetKind::Vanity, creature, display, 0, 0, &ctx.config)
                });
                if let Some(Err(err)) = result {
                    self.fault(err);
                }
            }
        }

        ctx.sessions.entered_world(character, info);
    }

    fn process_removes(&mut self) {
        for guid in std::mem::take(&mut self.pending_removes) {
            let Some(mut entity) = self.entities.remove(&guid) else {
                continue;
            };
            self.forget_hated(guid);

            if entity.is_player() {
                self.remove_player(entity);
            } else {
                entity.on_remove_from_map();
                entity.drain_events();
                log::debug!("Removed entity {} from {}", guid, self.info);
            }
        }
    }

    /// Drop a pet from its owner's bookkeeping if the owner still tracks it
    fn detach_companion(&mut self, owner: EntityId, kind: PetKind, pet: EntityId) {
        let Some(player) = self.entities.get_mut(&owner).and_then(|o| o.player_mut()) else {
            return;
        };
        let tracked = match kind {
            PetKind::Vanity => player.pets().vanity_pet() == Some(pet),
            PetKind::Combat => player.pets().combat_pets().contains(&pet),
        };
        if tracked {
            if let Err(err) = player.pets_mut().remove_pet_guid(owner, kind, pet) {
                self.fault(err);
            }
        }
    }

    fn remove_player(&mut self, mut entity: Entity) {
        let guid = entity.guid();
        let character = entity.character_id();
        if let Some(character) = character {
            self.characters.remove(&character);
            if let Some(dropped) = self.commands.remove(&character) {
                if !dropped.is_empty() {
                    log::debug!(
                        "Dropping {} queued commands of character {}",
                        dropped.len(),
                        character
                    );
                }
            }
        }

        let (teleporting, logged_out, vanity) = match entity.player_mut() {
            Some(player) => (
                player.pending_teleport().is_some(),
                player.is_logged_out(),
                player.pets_mut().take_vanity_pet(),
            ),
            None => (false, false, None),
        };

        // Without a teleport the vanity pet goes away outright
        if let Some(vanity) = vanity {
            if let Some(mut pet) = self.entities.remove(&vanity) {
                self.forget_hated(vanity);
                pet.on_remove_from_map();
                pet.drain_events();
            }
        }

        entity.on_remove_from_map();
        entity.drain_events();
        log::debug!("Removed player {} from {}", guid, self.info);

        if teleporting {
            self.transfers.push(entity);
        } else if let Some(character) = character {
            if logged_out {
                self.ctx.sessions.logged_out(character);
            }
        }
    }

    /// Remove `guid` from every threat table on the map
    fn forget_hated(&mut self, guid: EntityId) {
        let haters: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|(_, e)| e.threat_against(guid).is_some())
            .map(|(&id, _)| id)
            .collect();
        for hater in haters {
            self.apply(hater, |e| e.remove_threat(guid));
        }
    }

    // ---- Inbound ----

    fn process_inbound(&mut self) {
        while let Ok(message) = self.inbound.try_recv() {
            match message {
                MapInbound::Add { entity, position } => self.enqueue_add(*entity, position),
                MapInbound::Command { character, command } => {
                    let arriving = self
                        .pending_adds
                        .iter()
                        .any(|(e, _)| e.character_id() == Some(character));
                    if !arriving && !self.characters.contains_key(&character) {
                        log::debug!("Dropping command for absent character {}", character);
                        continue;
                    }
                    self.commands.entry(character).or_default().push_back(command);
                }
                MapInbound::SaveComplete(done) => self.on_save_complete(done),
            }
        }
    }

    fn on_save_complete(&mut self, done: SaveCompletion) {
        let Some(guid) = self.player_guid(done.character_id) else {
            log::debug!(
                "Save of character {} completed after it left {}",
                done.character_id,
                self.info
            );
            return;
        };
        self.apply(guid, |e| e.on_save_complete(done.follow_up));
        if done.follow_up == SaveFollowUp::RemoveFromMap {
            self.dismiss_pets(guid);
            self.enqueue_remove(guid);
        }
    }

    fn submit_save(&mut self, snapshot: PlayerSnapshot, follow_up: SaveFollowUp) {
        let character_id = snapshot.character_id();
        let reply = self.reply.clone();
        let request = SaveRequest::new(snapshot, follow_up, move |done| {
            let _ = reply.send(MapInbound::SaveComplete(done));
        });
        if let Err(err) = self.ctx.saves.submit(request) {
            log::error!("Failed to queue save of character {}: {}", character_id, err);
            // Unblock the player rather than leave it suspended forever
            self.on_save_complete(SaveCompletion {
                character_id,
                follow_up,
            });
        }
    }

    // ---- Commands ----

    fn process_commands(&mut self) {
        let ready: Vec<(CharacterId, EntityId)> = self
            .characters
            .iter()
            .filter(|(character, _)| self.commands.get(*character).is_some_and(|q| !q.is_empty()))
            .map(|(&character, &guid)| (character, guid))
            .collect();

        for (character, guid) in ready {
            loop {
                let open = self
                    .entities
                    .get(&guid)
                    .and_then(|e| e.player())
                    .is_some_and(|p| p.can_process_commands());
                if !open {
                    break;
                }
                let Some(command) = self.commands.get_mut(&character).and_then(|q| q.pop_front())
                else {
                    break;
                };
                if let Err(err) = self.apply_command(guid, command) {
                    self.fault(err);
                }
                self.flush(guid);
            }
        }
    }

    fn apply_command(&mut self, guid: EntityId, command: PlayerCommand) -> ViolationResult<()> {
        let ctx = Arc::clone(&self.ctx);
        match command {
            PlayerCommand::Teleport {
                destination,
                position,
                reason,
            } => {
                let _ = self.teleport_to(guid, destination, position, reason);
                return Ok(());
            }
            PlayerCommand::DismissPets => {
                self.dismiss_pets(guid);
                return Ok(());
            }
            _ => {}
        }

        let Some(entity) = self.entities.get_mut(&guid) else {
            return Ok(());
        };
        match command {
            PlayerCommand::Move(position) => entity.relocate(position),
            PlayerCommand::CastSpell(params) => {
                let result = entity.cast_spell(params, &ctx.sim())?;
                if result != CastResult::Ok {
                    log::debug!("Entity {} cast of {} failed: {:?}", guid, params.spell_id, result);
                    if let Some(character) = entity.character_id() {
                        ctx.broadcaster.notify_visible(
                            &[character],
                            &ServerMessage::CastResult {
                                casting_id: 0,
                                result,
                            },
                        );
                    }
                }
            }
            PlayerCommand::CancelCast(casting_id) => entity.cancel_spell_cast(casting_id),
            PlayerCommand::SummonPet {
                kind,
                creature_id,
                casting_id,
                spell_base_id,
            } => {
                let display = ctx.data.creature(creature_id).map_or(0, |c| c.display_info);
                entity.summon_pet(
                    kind,
                    creature_id,
                    display,
                    casting_id,
                    spell_base_id,
                    &ctx.config,
                )?;
            }
            PlayerCommand::LogoutStart { reason, requested } => {
                entity.logout_start(ctx.config.logout_delay_secs, reason, requested)?;
            }
            PlayerCommand::LogoutCancel => entity.logout_cancel()?,
            PlayerCommand::GrantXp(xp) => entity.grant_xp(xp, ctx.data.as_ref(), &ctx.config)?,
            PlayerCommand::Resurrect => entity.resurrect(None)?,
            PlayerCommand::Teleport { .. } | PlayerCommand::DismissPets => {}
        }
        Ok(())
    }

    // ---- Teleport ----

    /// Start moving a player to another map.
    ///
    /// A refused request is reported to the player and changes nothing. An
    /// accepted one stages the player's companions, parks the request on the
    /// player and queues its removal; the manager finishes the move once the
    /// player has left.
    pub fn teleport_to(
        &mut self,
        guid: EntityId,
        destination: MapInfo,
        position: Vec3,
        reason: TeleportReason,
    ) -> Result<(), TeleportError> {
        if let Err(err) = self.check_teleport(guid, destination) {
            log::debug!("Teleport of {} to {} refused: {}", guid, destination, err);
            if let Some(character) = self.entities.get(&guid).and_then(|e| e.character_id()) {
                self.ctx
                    .broadcaster
                    .notify_visible(&[character], &ServerMessage::system(err.notice()));
            }
            return Err(err);
        }

        let Some(entity) = self.entities.get_mut(&guid) else {
            return Err(TeleportError::NotAPlayer);
        };
        let origin = TeleportOrigin {
            info: self.info,
            position: entity.position(),
        };
        let mut pending = PendingTeleport::new(destination, position, reason).with_origin(origin);
        let (vanity, combat) = match entity.player_mut() {
            Some(player) => (
                player.pets_mut().take_vanity_pet(),
                player.pets_mut().take_combat_pets(),
            ),
            None => return Err(TeleportError::NotAPlayer),
        };

        // The vanity pet is re-summoned from its template on arrival
        if let Some(vanity) = vanity {
            if let Some(pet) = self.entities.get(&vanity) {
                pending.set_vanity_pet(pet.creature_id());
            }
            self.enqueue_remove(vanity);
        }
        // Combat pets travel as they are
        for pet_guid in combat {
            self.flush(pet_guid);
            match self.entities.remove(&pet_guid) {
                Some(mut pet) => {
                    self.pending_removes.retain(|&g| g != pet_guid);
                    self.forget_hated(pet_guid);
                    pet.on_remove_from_map();
                    pet.drain_events();
                    pending.add_pet(pet);
                }
                None => self.fault(Violation::MissingCombatPet {
                    owner: guid,
                    pet: pet_guid,
                }),
            }
        }

        log::info!(
            "Teleporting {} from {} to {} ({:?})",
            guid,
            self.info,
            destination,
            reason
        );
        if let Some(player) = self.entities.get_mut(&guid).and_then(|e| e.player_mut()) {
            player.set_pending_teleport(pending);
        }
        self.enqueue_remove(guid);
        Ok(())
    }

    fn check_teleport(&self, guid: EntityId, destination: MapInfo) -> Result<(), TeleportError> {
        let player = self
            .entities
            .get(&guid)
            .and_then(|e| e.player())
            .ok_or(TeleportError::NotAPlayer)?;
        if player.pending_teleport().is_some() {
            return Err(TeleportError::AlreadyPending);
        }
        let world = destination.world;
        if self
            .ctx
            .disables
            .is_disabled(DisableKind::World, u32::from(world.0))
        {
            return Err(TeleportError::Disabled(world));
        }
        if self.ctx.data.world(world).is_none() {
            return Err(TeleportError::UnknownWorld(world));
        }
        Ok(())
    }

    /// Dismiss every combat pet of `owner`, newest first
    pub fn dismiss_pets(&mut self, owner: EntityId) {
        let pets = match self.entities.get_mut(&owner).and_then(|e| e.player_mut()) {
            Some(player) => player.pets_mut().take_combat_pets(),
            None => return,
        };
        for pet in pets.into_iter().rev() {
            let casting_id = self
                .entities
                .get(&pet)
                .and_then(|p| p.companion_state())
                .map(|c| c.casting_id());
            let Some(casting_id) = casting_id else {
                self.fault(Violation::MissingCombatPet { owner, pet });
                continue;
            };
            let observers = self.observers(owner, true);
            self.ctx
                .broadcaster
                .notify_visible(&observers, &ServerMessage::SpellFinish { casting_id });
            self.enqueue_remove(pet);
        }
    }

    // ---- Combat ----

    /// Resolve one hit of `attacker` on `victim`.
    ///
    /// The victim gains threat against the attacker and the attacker gets a
    /// zero-threat entry against a surviving victim.
    pub fn deal_damage(
        &mut self,
        attacker: EntityId,
        victim: EntityId,
        damage: &DamageDescription,
    ) -> MapResult<()> {
        let source = self
            .entities
            .get(&attacker)
            .map(|e| Attacker {
                guid: attacker,
                is_player: e.is_player(),
                is_alive: e.is_alive(),
            })
            .ok_or(Violation::UnknownEntity(attacker))?;
        let target = self
            .entities
            .get_mut(&victim)
            .ok_or(Violation::UnknownEntity(victim))?;
        let victim_is_player = target.is_player();

        target.take_damage(source, damage)?;
        let survived = target.is_alive();

        if survived && source.is_alive {
            if let Some(entity) = self.entities.get_mut(&attacker) {
                if entity.is_unit() && entity.threat_against(victim).is_none() {
                    entity.adjust_threat(victim, victim_is_player, 0)?;
                }
            }
        }
        self.flush(victim);
        self.flush(attacker);
        Ok(())
    }

    fn on_killed(&mut self, victim: EntityId, killer: Option<EntityId>) {
        let dead = self.entities.get(&victim);
        let credit = match (dead, killer.and_then(|k| self.entities.get(&k))) {
            (Some(dead), Some(killer)) if dead.kind() == EntityKind::NonPlayer => {
                killer.character_id().map(|c| (c, dead.creature_id()))
            }
            _ => None,
        };
        if let Some((character, creature)) = credit {
            for objective in QuestObjectiveType::KILL {
                self.ctx
                    .quests
                    .objective_update(character, objective, creature, 1);
            }
        }
        self.forget_hated(victim);
    }

    // ---- Tick ----

    /// Advance the map by `delta` seconds
    pub fn update(&mut self, delta: f64) {
        self.process_inbound();
        self.process_removes();
        self.process_adds();
        self.process_commands();

        let ctx = Arc::clone(&self.ctx);
        let sim = ctx.sim();
        let guids: Vec<EntityId> = self.entities.keys().copied().collect();
        for guid in guids {
            let Some(entity) = self.entities.get_mut(&guid) else {
                continue;
            };
            let result = entity.update(delta, &sim).and_then(|()| {
                let finish = entity.player().is_some_and(|p| {
                    !p.is_logged_out() && p.logout().is_some_and(|l| l.ready_to_logout())
                });
                if finish {
                    entity.logout_finish()
                } else {
                    Ok(())
                }
            });
            if let Err(err) = result {
                self.fault(err);
            }
            self.flush(guid);
        }
        self.ticks += 1;
    }

    fn fault(&mut self, err: Violation) {
        log::error!("{}: {}", self.info, err);
        self.faults += 1;
    }

    // ---- Effects ----

    /// Dispatch everything `source` queued, including effects of effects
    fn flush(&mut self, source: EntityId) {
        let mut queue: VecDeque<(EntityId, EntityEvent)> = VecDeque::new();
        self.collect_events(source, &mut queue);
        while let Some((from, event)) = queue.pop_front() {
            for touched in self.dispatch(from, event) {
                self.collect_events(touched, &mut queue);
            }
        }
    }

    fn collect_events(&mut self, guid: EntityId, queue: &mut VecDeque<(EntityId, EntityEvent)>) {
        if let Some(entity) = self.entities.get_mut(&guid) {
            queue.extend(entity.drain_events().into_iter().map(|e| (guid, e)));
        }
    }

    /// Apply one effect; returns entities that may have queued new effects
    fn dispatch(&mut self, source: EntityId, event: EntityEvent) -> Vec<EntityId> {
        match event {
            EntityEvent::Broadcast {
                message,
                include_self,
            } => {
                let observers = self.observers(source, include_self);
                self.ctx.broadcaster.notify_visible(&observers, &message);
            }
            EntityEvent::Send(message) => {
                if let Some(character) = self.entities.get(&source).and_then(|e| e.character_id()) {
                    self.ctx.broadcaster.notify_visible(&[character], &message);
                }
            }
            EntityEvent::DeathStateChanged(state) => {
                log::trace!("Entity {} death state {}", source, state.name());
            }
            EntityEvent::CombatStateChanged(in_combat) => {
                log::trace!("Entity {} in combat: {}", source, in_combat);
            }
            EntityEvent::Killed { killer } => self.on_killed(source, killer),
            EntityEvent::Spawn { entity, position } => self.enqueue_add(*entity, position),
            EntityEvent::Remove(guid) => self.enqueue_remove(guid),
            EntityEvent::Relocate { entity, position } => {
                if let Some(target) = self.entities.get_mut(&entity) {
                    target.relocate(position);
                    return vec![entity];
                }
            }
            EntityEvent::FollowOwner { owner } => return self.follow_owner(source, owner),
            EntityEvent::Save {
                snapshot,
                follow_up,
            } => self.submit_save(*snapshot, follow_up),
        }
        Vec::new()
    }

    /// Characters that can see `source`
    fn observers(&self, source: EntityId, include_self: bool) -> Vec<CharacterId> {
        let Some(entity) = self.entities.get(&source) else {
            return Vec::new();
        };
        let position = entity.position();
        let controller = entity.controller();
        let range = self.ctx.config.vision_range;
        self.entities
            .values()
            .filter(|e| e.is_player())
            .filter(|e| include_self || (e.guid() != source && Some(e.guid()) != controller))
            .filter(|e| e.position().distance(position) <= range)
            .filter_map(|e| e.character_id())
            .collect()
    }

    fn notify_owner(&self, owner: EntityId, message: ServerMessage) {
        if let Some(character) = self.entities.get(&owner).and_then(|e| e.character_id()) {
            self.ctx.broadcaster.notify_visible(&[character], &message);
        }
    }

    fn follow_owner(&mut self, pet: EntityId, owner: EntityId) -> Vec<EntityId> {
        let Some(owner_position) = self.entities.get(&owner).map(|o| o.position()) else {
            log::error!("Pet {} lost its owner {} on {}", pet, owner, self.info);
            self.enqueue_remove(pet);
            return Vec::new();
        };
        let pet_config = &self.ctx.config.pet;
        let recalculate = pet_config.follow_recalculate_distance;
        let distance = pet_config.follow_distance;
        let Some(entity) = self.entities.get_mut(&pet) else {
            return Vec::new();
        };
        let offset = entity.position() - owner_position;
        if offset.length() <= recalculate {
            return Vec::new();
        }
        entity.relocate(owner_position + offset.normalize_or_zero() * distance);
        vec![pet]
    }
}

impl std::fmt::Debug for Map {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Map")
            .field("info", &self.info)
            .field("entities", &self.entities.len())
            .field("ticks", &self.ticks)
            .field("faults", &self.faults)
            .finish()
    }
}

/// A map behind its own lock, reachable from any thread through its inbound channel
pub struct MapCell {
    world: WorldId,
    residence_id: Option<u64>,
    inbound: Sender<MapInbound>,
    map: Mutex<Map>,
}

impl MapCell {
    pub fn new(info: MapInfo, ctx: Arc<WorldContext>) -> Arc<Self> {
        let map = Map::new(info, ctx);
        Arc::new(Self {
            world: info.world,
            residence_id: info.residence_id,
            inbound: map.sender(),
            map: Mutex::new(map),
        })
    }

    pub fn world(&self) -> WorldId {
        self.world
    }

    pub fn residence_id(&self) -> Option<u64> {
        self.residence_id
    }

    pub fn info(&self) -> MapInfo {
        self.map.lock().info()
    }

    /// Exclusive access to the map; never hold across ticks of another map
    pub fn lock(&self) -> MutexGuard<'_, Map> {
        self.map.lock()
    }

    pub fn send(&self, message: MapInbound) -> MapResult<()> {
        self.inbound
            .send(message)
            .map_err(|_| MapError::MapClosed(self.world))
    }

    /// Queue an entity for addition at this map's next tick
    pub fn enqueue_add(&self, entity: Entity, position: Vec3) -> MapResult<()> {
        self.send(MapInbound::Add {
            entity: Box::new(entity),
            position,
        })
    }

    pub fn submit_command(&self, character: CharacterId, command: PlayerCommand) -> MapResult<()> {
        self.send(MapInbound::Command { character, command })
    }

    pub fn update(&self, delta: f64) {
        self.map.lock().update(delta);
    }
}

impl std::fmt::Debug for MapCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapCell")
            .field("world", &self.world)
            .field("residence_id", &self.residence_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{RecordingBroadcast, RecordingQuests, RecordingSessions, SessionEvent};
    use realm_core::{CreatureEntry, DisableList, StaticTables, WorldConfig, WorldEntry, WorldKind};
    use realm_entity::{CharacterRecord, DamageType, EntityTemplate};
    use realm_persist::{MemoryPersistence, PersistConfig, SaveQueue};

    const OPEN: WorldId = WorldId(870);
    const DUNGEON: WorldId = WorldId(1229);
    const VANITY_CREATURE: u32 = 5;

    struct Harness {
        map: Map,
        broadcast: Arc<RecordingBroadcast>,
        sessions: Arc<RecordingSessions>,
        quests: Arc<RecordingQuests>,
        disables: Arc<DisableList>,
    }

    fn harness() -> Harness {
        let tables = StaticTables::new()
            .with_world(WorldEntry {
                id: OPEN,
                name: "Thayd".into(),
                kind: WorldKind::Open,
            })
            .with_world(WorldEntry {
                id: DUNGEON,
                name: "Stormtalon's Lair".into(),
                kind: WorldKind::Instance,
            })
            .with_creature(CreatureEntry {
                id: VANITY_CREATURE,
                name: "Squirg".into(),
                display_info: 77,
                hit_radius: 1.0,
                model_scale: 1.0,
            });
        let store = Arc::new(MemoryPersistence::new());
        let saves = Arc::new(SaveQueue::start(&PersistConfig::testing(), store).unwrap());
        let broadcast = Arc::new(RecordingBroadcast::new());
        let sessions = Arc::new(RecordingSessions::default());
        let quests = Arc::new(RecordingQuests::default());
        let disables = Arc::new(DisableList::new());
        let ctx = WorldContext::new(
            WorldConfig::testing(),
            Arc::new(tables),
            disables.clone(),
            broadcast.clone(),
            saves,
        )
        .with_sessions(sessions.clone())
        .with_quests(quests.clone());

        Harness {
            map: Map::new(MapInfo::world(OPEN), Arc::new(ctx)),
            broadcast,
            sessions,
            quests,
            disables,
        }
    }

    fn add_player(map: &mut Map, id: u64, position: Vec3) -> EntityId {
        let record = CharacterRecord::new(CharacterId(id), "Avra", OPEN);
        let entity = Entity::from_character(&record, &map.ctx.config, map.ctx.data.as_ref());
        map.enqueue_add(entity, position);
        map.update(0.0);
        map.player_guid(CharacterId(id)).unwrap()
    }

    fn add_creature(map: &mut Map, health: u32, position: Vec3) -> EntityId {
        let template = EntityTemplate {
            creature_id: 3001,
            health,
            ..Default::default()
        };
        let entity = Entity::non_player(&template, &map.ctx.config);
        map.enqueue_add(entity, position);
        map.update(0.0);
        map.entities()
            .filter(|e| e.creature_id() == 3001)
            .map(|e| e.guid())
            .max()
            .unwrap()
    }

    #[test]
    fn test_added_player_enters_world_with_control() {
        let mut h = harness();
        let guid = add_player(&mut h.map, 1, Vec3::ZERO);

        let received = h.broadcast.received_by(CharacterId(1));
        assert!(received.contains(&ServerMessage::ChangeWorld {
            world: OPEN,
            position: Vec3::ZERO
        }));
        assert!(received.contains(&ServerMessage::MovementControl { unit: guid }));
        assert_eq!(h.map.entity(guid).unwrap().controller(), Some(guid));
        assert_eq!(
            h.sessions.events(),
            vec![SessionEvent::EnteredWorld(CharacterId(1), MapInfo::world(OPEN))]
        );
    }

    #[test]
    fn test_teleport_while_pending_is_rejected() {
        let mut h = harness();
        let guid = add_player(&mut h.map, 1, Vec3::ZERO);
        let dungeon = MapInfo::world(DUNGEON);

        h.map
            .teleport_to(guid, dungeon, Vec3::ONE, TeleportReason::Spell)
            .unwrap();
        let second = h.map.teleport_to(
            guid,
            MapInfo::world(OPEN),
            Vec3::ZERO,
            TeleportReason::Command,
        );
        assert_eq!(second, Err(TeleportError::AlreadyPending));

        let pending = h.map.entity(guid).unwrap().player().unwrap().pending_teleport().unwrap();
        assert_eq!(pending.destination(), dungeon);
        assert_eq!(pending.reason(), TeleportReason::Spell);
        assert!(h
            .broadcast
            .received_by(CharacterId(1))
            .contains(&ServerMessage::system(TeleportError::AlreadyPending.notice())));
    }

    #[test]
    fn test_teleport_to_disabled_world_changes_nothing() {
        let mut h = harness();
        let guid = add_player(&mut h.map, 1, Vec3::ZERO);
        h.disables.disable(DisableKind::World, u32::from(DUNGEON.0));

        let dungeon = MapInfo::world(DUNGEON);
        let result = h.map.teleport_to(guid, dungeon, Vec3::ONE, TeleportReason::Spell);
        assert_eq!(result, Err(TeleportError::Disabled(DUNGEON)));
        assert!(h.map.entity(guid).unwrap().player().unwrap().pending_teleport().is_none());

        h.map.update(0.0);
        assert_eq!(h.map.player_guid(CharacterId(1)), Some(guid));
        assert!(h.map.take_transfers().is_empty());
    }

    #[test]
    fn test_teleport_to_unknown_world_is_rejected() {
        let mut h = harness();
        let guid = add_player(&mut h.map, 1, Vec3::ZERO);
        let unknown = MapInfo::world(WorldId(9));
        let result = h.map.teleport_to(guid, unknown, Vec3::ONE, TeleportReason::Spell);
        assert_eq!(result, Err(TeleportError::UnknownWorld(WorldId(9))));
    }

    #[test]
    fn test_accepted_teleport_stages_transfer() {
        let mut h = harness();
        let guid = add_player(&mut h.map, 1, Vec3::new(4.0, 0.0, 4.0));
        h.map
            .teleport_to(guid, MapInfo::world(DUNGEON), Vec3::ONE, TeleportReason::Spell)
            .unwrap();
        h.map.update(0.0);

        assert_eq!(h.map.player_guid(CharacterId(1)), None);
        let transfers = h.map.take_transfers();
        assert_eq!(transfers.len(), 1);
        let pending = transfers[0].player().unwrap().pending_teleport().unwrap();
        let origin = pending.origin().unwrap();
        assert_eq!(origin.info, MapInfo::world(OPEN));
        assert_eq!(origin.position, Vec3::new(4.0, 0.0, 4.0));
        // Leaving through a teleport is not a logout
        assert!(!h.sessions.events().contains(&SessionEvent::LoggedOut(CharacterId(1))));
    }

    #[test]
    fn test_teleport_stages_companions() {
        let mut h = harness();
        let guid = add_player(&mut h.map, 1, Vec3::ZERO);
        let config = h.map.ctx.config.clone();
        h.map.apply(guid, |e| {
            e.summon_pet(PetKind::Vanity, VANITY_CREATURE, 77, 0, 0, &config).unwrap();
            e.summon_pet(PetKind::Combat, 40, 0, 11, 400, &config).unwrap();
        });
        h.map.update(0.0);
        assert_eq!(h.map.entity_count(), 3);

        h.map
            .teleport_to(guid, MapInfo::world(DUNGEON), Vec3::ONE, TeleportReason::Spell)
            .unwrap();
        // Combat pets leave with the owner right away
        assert_eq!(h.map.entity_count(), 2);
        h.map.update(0.0);
        assert_eq!(h.map.entity_count(), 0);

        let transfers = h.map.take_transfers();
        let pending = transfers[0].player().unwrap().pending_teleport().unwrap();
        assert_eq!(pending.vanity_pet_creature(), Some(VANITY_CREATURE));
        assert_eq!(pending.pets().len(), 1);
        assert_eq!(pending.pets()[0].creature_id(), 40);
    }

    #[test]
    fn test_second_vanity_pet_replaces_first() {
        let mut h = harness();
        let guid = add_player(&mut h.map, 1, Vec3::ZERO);
        let config = h.map.ctx.config.clone();

        h.map.apply(guid, |e| e.summon_pet(PetKind::Vanity, VANITY_CREATURE, 77, 0, 0, &config));
        h.map.update(0.0);
        let first = h.map.entity(guid).unwrap().player().unwrap().pets().vanity_pet().unwrap();

        h.map.apply(guid, |e| e.summon_pet(PetKind::Vanity, VANITY_CREATURE, 77, 0, 0, &config));
        assert_eq!(h.map.entity(guid).unwrap().player().unwrap().pets().vanity_pet(), None);
        h.map.update(0.0);

        let second = h.map.entity(guid).unwrap().player().unwrap().pets().vanity_pet().unwrap();
        assert_ne!(first, second);
        assert!(h.map.entity(first).is_none());
        assert!(h.map.entity(second).is_some());
        assert_eq!(h.map.faults(), 0);
    }

    #[test]
    fn test_dismiss_pets_newest_first() {
        let mut h = harness();
        let guid = add_player(&mut h.map, 1, Vec3::ZERO);
        let config = h.map.ctx.config.clone();
        h.map.apply(guid, |e| {
            e.summon_pet(PetKind::Combat, 40, 0, 11, 400, &config).unwrap();
            e.summon_pet(PetKind::Combat, 41, 0, 12, 401, &config).unwrap();
        });
        h.map.update(0.0);
        assert_eq!(
            h.map.entity(guid).unwrap().player().unwrap().pets().combat_pets().len(),
            2
        );
        h.broadcast.clear();

        h.map.dismiss_pets(guid);
        let finished: Vec<u32> = h
            .broadcast
            .received_by(CharacterId(1))
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::SpellFinish { casting_id } => Some(casting_id),
                _ => None,
            })
            .collect();
        assert_eq!(finished, vec![12, 11]);

        h.map.update(0.0);
        assert_eq!(h.map.entity_count(), 1);
    }

    #[test]
    fn test_pet_without_owner_is_not_added() {
        let mut h = harness();
        let config = h.map.ctx.config.clone();
        let pet = Entity::companion(PetKind::Combat, EntityId::new(999), 40, 0, 1, 1, &config);
        h.map.enqueue_add(pet, Vec3::ZERO);
        h.map.update(0.0);
        assert_eq!(h.map.entity_count(), 0);
    }

    #[test]
    fn test_damage_builds_threat_both_ways() {
        let mut h = harness();
        let player = add_player(&mut h.map, 1, Vec3::ZERO);
        let creature = add_creature(&mut h.map, 500, Vec3::new(2.0, 0.0, 0.0));

        h.map
            .deal_damage(player, creature, &DamageDescription::new(10, DamageType::Physical))
            .unwrap();
        assert_eq!(h.map.entity(creature).unwrap().threat_against(player), Some(10));
        assert_eq!(h.map.entity(player).unwrap().threat_against(creature), Some(0));
        assert_eq!(h.map.entity(creature).unwrap().target(), Some(player));
    }

    #[test]
    fn test_kill_credits_quests_and_clears_threat() {
        let mut h = harness();
        let player = add_player(&mut h.map, 1, Vec3::ZERO);
        let creature = add_creature(&mut h.map, 100, Vec3::new(2.0, 0.0, 0.0));

        h.map
            .deal_damage(player, creature, &DamageDescription::new(10, DamageType::Physical))
            .unwrap();
        h.map
            .deal_damage(player, creature, &DamageDescription::new(500, DamageType::Physical))
            .unwrap();

        let updates = h.quests.updates();
        assert_eq!(updates.len(), 4);
        assert!(updates
            .iter()
            .all(|&(c, _, data, progress)| c == CharacterId(1) && data == 3001 && progress == 1));
        assert_eq!(h.map.entity(player).unwrap().threat_against(creature), None);
        assert!(!h.map.entity(player).unwrap().in_combat());
    }

    #[test]
    fn test_broadcast_reaches_only_players_in_range() {
        let mut h = harness();
        add_player(&mut h.map, 1, Vec3::ZERO);
        add_player(&mut h.map, 2, Vec3::new(1000.0, 0.0, 0.0));
        let creature = add_creature(&mut h.map, 100, Vec3::new(5.0, 0.0, 0.0));
        h.broadcast.clear();

        h.map.apply(creature, |e| e.set_display_info(12, 0));
        let update = ServerMessage::VisualUpdate {
            unit: creature,
            display_info: 12,
            outfit_info: 0,
            slots: Vec::new(),
        };
        assert!(h.broadcast.received_by(CharacterId(1)).contains(&update));
        assert!(h.broadcast.received_by(CharacterId(2)).is_empty());
    }

    #[test]
    fn test_commands_for_absent_characters_are_dropped() {
        let mut h = harness();
        h.map
            .sender()
            .send(MapInbound::Command {
                character: CharacterId(77),
                command: PlayerCommand::Resurrect,
            })
            .unwrap();
        h.map.update(0.0);
        assert!(h.map.commands.is_empty());
        assert_eq!(h.map.faults(), 0);
    }
}
