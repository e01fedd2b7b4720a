//! The simulated world of one match
//!
//! Everything a match mutates lives here and is passed by `&mut` to the
//! gameplay modules, so there is exactly one owner and no shared state.

use std::collections::{BTreeMap, HashMap, HashSet};

use glam::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use crate::config::MatchSettings;
use crate::ws::protocol::GameEvent;

use super::ai;
use super::combat::{self, Projectile};
use super::entity::{CollisionChannel, ControllableEntity, ControllerId, EntityId, EntityTemplate};
use super::lifecycle;
use super::physics::KinematicsSystem;
use super::possession::{self, Controller, ControllerKind};
use super::scheduler::Scheduler;
use super::score::MatchState;
use super::spawner::{self, EnemySpawner, SpawnerId};

/// Work the scheduler hands back to the world when a timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// One second of match time passed
    IncrementTimeElapsed,
    /// A spawner's delay ran out
    Spawn(SpawnerId),
    /// Attack cadence of a character
    FireShot(EntityId),
    /// Periodic stand-up attempt of a downed character
    GetUp(EntityId),
    /// Enemies look around
    Sense,
}

/// Anything that can take part in an overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyRef {
    Entity(EntityId),
    Projectile(Uuid),
}

/// A body started overlapping a character this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapEvent {
    pub target: EntityId,
    pub other: BodyRef,
}

/// World state of a match
pub struct GameWorld {
    pub settings: MatchSettings,
    pub scheduler: Scheduler<TimerEvent>,
    pub rng: ChaCha8Rng,
    pub score: MatchState,
    pub controllers: HashMap<ControllerId, Controller>,
    /// The human player's controller
    pub player: Option<ControllerId>,
    pub projectiles: Vec<Projectile>,
    pub spawners: Vec<EnemySpawner>,
    /// Events since the last snapshot
    pub events: Vec<GameEvent>,
    entities: BTreeMap<EntityId, ControllableEntity>,
    next_entity_id: u64,
    overlapping: HashSet<(EntityId, BodyRef)>,
}

impl GameWorld {
    pub fn new(settings: MatchSettings, seed: u64) -> Self {
        Self {
            settings,
            scheduler: Scheduler::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            score: MatchState::new(),
            controllers: HashMap::new(),
            player: None,
            projectiles: Vec::new(),
            spawners: Vec::new(),
            events: Vec::new(),
            entities: BTreeMap::new(),
            next_entity_id: 1,
            overlapping: HashSet::new(),
        }
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Create an entity from a template at the given transform
    pub fn spawn_entity(&mut self, template: EntityTemplate, location: Vec3, yaw: f32) -> EntityId {
        let id = EntityId(self.next_entity_id);
        self.next_entity_id += 1;
        self.entities
            .insert(id, ControllableEntity::from_template(id, template, location, yaw));

        self.events.push(GameEvent::Spawned {
            entity: id,
            template,
            x: location.x,
            y: location.y,
            z: location.z,
            yaw,
        });
        id
    }

    /// Remove an entity, releasing its controller and cancelling its timers
    pub fn remove_entity(&mut self, id: EntityId) -> Option<ControllableEntity> {
        if let Some(controller) = self.entity(id).and_then(|e| e.controller) {
            possession::unpossess(self, controller);
        }

        let mut entity = self.entities.remove(&id)?;
        if let Some(character) = entity.character_mut() {
            self.scheduler.clear_timer(&mut character.shoot_timer);
            self.scheduler.clear_timer(&mut character.recovery_timer);
        }
        self.overlapping.retain(|(target, other)| {
            *target != id && *other != BodyRef::Entity(id)
        });
        for controller in self.controllers.values_mut() {
            if controller.focus == Some(id) {
                controller.focus = None;
            }
        }

        self.events.push(GameEvent::Removed { entity: id });
        Some(entity)
    }

    pub fn entity(&self, id: EntityId) -> Option<&ControllableEntity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut ControllableEntity> {
        self.entities.get_mut(&id)
    }

    /// All entities in spawn order
    pub fn entities(&self) -> impl Iterator<Item = &ControllableEntity> {
        self.entities.values()
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // ------------------------------------------------------------------
    // Controllers
    // ------------------------------------------------------------------

    pub fn add_controller(&mut self, kind: ControllerKind) -> ControllerId {
        let id = ControllerId::new_v4();
        self.add_controller_with_id(id, kind);
        id
    }

    pub fn add_controller_with_id(&mut self, id: ControllerId, kind: ControllerKind) {
        self.controllers.insert(id, Controller::new(id, kind));
        if kind == ControllerKind::Player {
            self.player = Some(id);
        }
    }

    pub fn controller(&self, id: ControllerId) -> Option<&Controller> {
        self.controllers.get(&id)
    }

    pub fn controller_mut(&mut self, id: ControllerId) -> Option<&mut Controller> {
        self.controllers.get_mut(&id)
    }

    /// Entity the human player currently possesses
    pub fn player_pawn(&self) -> Option<EntityId> {
        self.player
            .and_then(|id| self.controllers.get(&id))
            .and_then(|c| c.pawn)
    }

    pub fn is_player_pawn(&self, entity: EntityId) -> bool {
        self.player_pawn() == Some(entity)
    }

    /// Yaw and pitch of whoever controls `entity`
    pub fn control_rotation(&self, entity: EntityId) -> Option<(f32, f32)> {
        let controller = self.entity(entity)?.controller?;
        self.controllers
            .get(&controller)
            .map(|c| (c.control_yaw, c.control_pitch))
    }

    // ------------------------------------------------------------------
    // Bodies and overlaps
    // ------------------------------------------------------------------

    pub fn body_velocity(&self, body: BodyRef) -> Option<Vec3> {
        match body {
            BodyRef::Entity(id) => self.entity(id).map(|e| match e.character() {
                Some(c) if c.ragdoll.simulating => c.ragdoll.linear_velocity,
                _ => e.velocity,
            }),
            BodyRef::Projectile(id) => self
                .projectiles
                .iter()
                .find(|p| p.id == id)
                .map(|p| p.velocity),
        }
    }

    /// Entities whose bodies touch a sphere of `radius` around `entity`, in
    /// spawn order. The entity itself is included; callers filter it.
    pub fn overlapping(&self, entity: EntityId, radius: f32) -> Vec<EntityId> {
        let Some(center) = self.entity(entity).map(|e| e.collision_center()) else {
            return Vec::new();
        };
        self.entities
            .values()
            .filter(|other| {
                KinematicsSystem::spheres_overlap(center, radius, other.collision_center(), other.radius)
            })
            .map(|other| other.id)
            .collect()
    }

    /// Find bodies that started overlapping a character this tick.
    ///
    /// A pair keeps overlapping silently until it separates. Channels a
    /// character ignores produce no events and drop out of the pair set, so
    /// blocking a channel again while still touching fires a fresh event.
    pub fn detect_overlaps(&mut self) -> Vec<OverlapEvent> {
        let mut current = HashSet::new();

        for target in self.entities.values() {
            let Some(character) = target.character() else {
                continue;
            };
            let center = target.collision_center();

            for other in self.entities.values() {
                if other.id == target.id || character.ignores(other.channel) {
                    continue;
                }
                if KinematicsSystem::spheres_overlap(center, target.radius, other.collision_center(), other.radius) {
                    current.insert((target.id, BodyRef::Entity(other.id)));
                }
            }

            if character.ignores(CollisionChannel::Projectile) {
                continue;
            }
            for projectile in &self.projectiles {
                if projectile.owner == target.id {
                    continue;
                }
                if KinematicsSystem::spheres_overlap(center, target.radius, projectile.location, projectile.radius) {
                    current.insert((target.id, BodyRef::Projectile(projectile.id)));
                }
            }
        }

        let mut began: Vec<OverlapEvent> = current
            .difference(&self.overlapping)
            .map(|(target, other)| OverlapEvent {
                target: *target,
                other: *other,
            })
            .collect();
        // deterministic handling order
        began.sort_by_key(|event| (event.target, body_sort_key(event.other)));

        self.overlapping = current;
        began
    }

    // ------------------------------------------------------------------
    // Simulation steps
    // ------------------------------------------------------------------

    /// Fire every due timer, handling each before looking for the next
    pub fn run_timers(&mut self) {
        while let Some((_, event)) = self.scheduler.pop_due() {
            match event {
                TimerEvent::IncrementTimeElapsed => self.score.increment_time_elapsed(),
                TimerEvent::Spawn(spawner) => {
                    spawner::spawn_enemy(self, spawner);
                }
                TimerEvent::FireShot(entity) => {
                    combat::fire_shot(self, entity);
                }
                TimerEvent::GetUp(entity) => {
                    lifecycle::get_up(self, entity);
                }
                TimerEvent::Sense => ai::sense(self),
            }
        }
    }

    /// Move every entity and projectile forward by `dt`
    pub fn step_kinematics(&mut self, dt: f32) {
        let ids = self.entity_ids();
        for id in ids {
            let control_yaw = self.control_rotation(id).map(|(yaw, _)| yaw);
            if let Some(entity) = self.entities.get_mut(&id) {
                KinematicsSystem::step(entity, control_yaw, dt);
            }
        }

        self.projectiles.retain_mut(|projectile| projectile.update(dt));
    }

    /// Deliver this tick's begin-overlap events to the lifecycle machine
    pub fn resolve_overlaps(&mut self) {
        for event in self.detect_overlaps() {
            lifecycle::on_overlap(self, event.target, Some(event.other));
        }
    }

    /// Events accumulated since the last call
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }
}

fn body_sort_key(body: BodyRef) -> (u8, u64, Uuid) {
    match body {
        BodyRef::Entity(id) => (0, id.0, Uuid::nil()),
        BodyRef::Projectile(id) => (1, 0, id),
    }
}
