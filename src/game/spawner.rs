//! Enemy spawners

use glam::Vec3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use super::entity::{EntityId, EntityTemplate};
use super::possession::{self, ControllerKind};
use super::scheduler::{TimerHandle, MIN_REPEAT_INTERVAL};
use super::world::{GameWorld, TimerEvent};

/// Spawner identity, index-like and stable for the life of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpawnerId(pub u32);

/// Axis aligned box enemies appear in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnVolume {
    pub origin: Vec3,
    /// Half size along each axis
    pub extent: Vec3,
}

impl SpawnVolume {
    /// Uniform point inside the box
    pub fn random_point(&self, rng: &mut ChaCha8Rng) -> Vec3 {
        let extent = self.extent.abs();
        let mut axis = |half: f32| {
            if half > 0.0 {
                rng.gen_range(-half..=half)
            } else {
                0.0
            }
        };
        self.origin + Vec3::new(axis(extent.x), axis(extent.y), axis(extent.z))
    }
}

#[derive(Debug, Clone)]
pub struct EnemySpawner {
    pub id: SpawnerId,
    pub volume: SpawnVolume,
    /// Nothing is spawned while unset
    pub template: Option<EntityTemplate>,
    pub min_spawn_delay: f32,
    pub max_spawn_delay: f32,
    pub spawn_timer: Option<TimerHandle>,
    /// Delay drawn for the pending spawn
    pub last_delay: Option<f32>,
}

impl EnemySpawner {
    pub fn new(id: SpawnerId, volume: SpawnVolume, template: Option<EntityTemplate>) -> Self {
        Self {
            id,
            volume,
            template,
            min_spawn_delay: 2.5,
            max_spawn_delay: 5.0,
            spawn_timer: None,
            last_delay: None,
        }
    }

    pub fn with_delays(mut self, min: f32, max: f32) -> Self {
        self.min_spawn_delay = min;
        self.max_spawn_delay = max;
        self
    }
}

/// Uniform delay in `[min, max]`. Reversed bounds are swapped, negative or
/// NaN ones clamp to zero and an infinite upper bound collapses onto the
/// lower one.
pub fn draw_delay(rng: &mut ChaCha8Rng, min: f32, max: f32) -> f32 {
    let clean = |v: f32| if v.is_nan() { 0.0 } else { v.max(0.0) };
    let (min, max) = (clean(min), clean(max));
    let (low, high) = if min <= max { (min, max) } else { (max, min) };
    if !low.is_finite() {
        return 0.0;
    }
    if high.is_finite() && high > low {
        rng.gen_range(low..=high)
    } else {
        low
    }
}

/// Register a spawner with the world and return its id
pub fn add_spawner(
    world: &mut GameWorld,
    volume: SpawnVolume,
    template: Option<EntityTemplate>,
) -> SpawnerId {
    let id = SpawnerId(world.spawners.len() as u32);
    let spawner = EnemySpawner::new(id, volume, template)
        .with_delays(world.settings.spawn_min_delay, world.settings.spawn_max_delay);
    world.spawners.push(spawner);
    id
}

/// Start or stop a spawner's timer
pub fn set_spawning_active(world: &mut GameWorld, id: SpawnerId, active: bool) {
    let Some(index) = world.spawners.iter().position(|s| s.id == id) else {
        debug!(spawner = id.0, "set_spawning_active: unknown spawner");
        return;
    };
    if active {
        arm(world, index);
    } else {
        let spawner = &mut world.spawners[index];
        world.scheduler.clear_timer(&mut spawner.spawn_timer);
        spawner.last_delay = None;
    }
}

/// Spawn timer callback: place an enemy and schedule the next one.
///
/// A spawner without a template does nothing and is not re-armed.
pub fn spawn_enemy(world: &mut GameWorld, id: SpawnerId) -> Option<EntityId> {
    let index = world.spawners.iter().position(|s| s.id == id)?;
    let spawner = &world.spawners[index];
    let Some(template) = spawner.template else {
        debug!(spawner = id.0, "spawner has no template");
        return None;
    };
    let volume = spawner.volume;

    let location = volume.random_point(&mut world.rng);
    let yaw = world.rng.gen_range(0.0..360.0);
    let entity = world.spawn_entity(template, location, yaw);

    if template == EntityTemplate::Character {
        let brain = world.add_controller(ControllerKind::Ai);
        possession::possess(world, brain, entity);
    }
    info!(spawner = id.0, %entity, x = location.x, y = location.y, "Enemy spawned");

    arm(world, index);
    Some(entity)
}

fn arm(world: &mut GameWorld, index: usize) {
    let spawner = &mut world.spawners[index];
    // a zero delay would re-fire within the same timer drain forever
    let delay = draw_delay(&mut world.rng, spawner.min_spawn_delay, spawner.max_spawn_delay)
        .max(MIN_REPEAT_INTERVAL as f32);
    spawner.last_delay = Some(delay);
    world
        .scheduler
        .set_timer(&mut spawner.spawn_timer, delay, false, TimerEvent::Spawn(spawner.id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchSettings;
    use rand::SeedableRng;

    fn volume() -> SpawnVolume {
        SpawnVolume {
            origin: Vec3::new(1000.0, 0.0, 96.0),
            extent: Vec3::new(200.0, 300.0, 0.0),
        }
    }

    #[test]
    fn drawn_delays_stay_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..1000 {
            let delay = draw_delay(&mut rng, 2.5, 5.0);
            assert!((2.5..=5.0).contains(&delay), "delay {delay}");
        }
        assert_eq!(draw_delay(&mut rng, 3.0, 3.0), 3.0);
        let swapped = draw_delay(&mut rng, 5.0, 2.5);
        assert!((2.5..=5.0).contains(&swapped));
    }

    #[test]
    fn unbounded_or_missing_delays_never_panic() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        assert_eq!(draw_delay(&mut rng, 2.5, f32::INFINITY), 2.5);
        assert_eq!(draw_delay(&mut rng, f32::NAN, 0.0), 0.0);
        assert_eq!(draw_delay(&mut rng, f32::INFINITY, f32::INFINITY), 0.0);
        let delay = draw_delay(&mut rng, f32::NAN, 1.0);
        assert!((0.0..=1.0).contains(&delay));
    }

    #[test]
    fn infinite_max_delay_still_arms_the_spawner() {
        let settings = MatchSettings {
            spawn_min_delay: 1.0,
            spawn_max_delay: f32::INFINITY,
            ..MatchSettings::default()
        };
        let mut world = GameWorld::new(settings, 21);
        let id = add_spawner(&mut world, volume(), Some(EntityTemplate::Character));
        set_spawning_active(&mut world, id, true);
        assert_eq!(world.spawners[0].last_delay, Some(1.0));

        world.scheduler.advance(1.0);
        world.run_timers();
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn zero_delays_spawn_once_per_drain() {
        let settings = MatchSettings {
            spawn_min_delay: 0.0,
            spawn_max_delay: 0.0,
            ..MatchSettings::default()
        };
        let mut world = GameWorld::new(settings, 21);
        let id = add_spawner(&mut world, volume(), Some(EntityTemplate::Sedan));
        set_spawning_active(&mut world, id, true);

        world.scheduler.advance(0.01);
        world.run_timers();
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn random_points_land_inside_the_volume() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let volume = volume();
        for _ in 0..200 {
            let p = volume.random_point(&mut rng);
            assert!((800.0..=1200.0).contains(&p.x));
            assert!((-300.0..=300.0).contains(&p.y));
            assert_eq!(p.z, 96.0);
        }
    }

    #[test]
    fn spawner_keeps_respawning_within_delay_bounds() {
        let mut world = GameWorld::new(MatchSettings::default(), 21);
        let id = add_spawner(&mut world, volume(), Some(EntityTemplate::Character));
        set_spawning_active(&mut world, id, true);

        let mut spawned = 0;
        let mut waited = 0.0;
        for _ in 0..5 {
            let delay = world.spawners[0].last_delay.expect("armed");
            assert!((2.5..=5.0).contains(&delay));
            waited += delay;
            world.scheduler.advance(delay);
            let before = world.entity_count();
            world.run_timers();
            spawned += world.entity_count() - before;
        }
        assert_eq!(spawned, 5);
        assert!(waited >= 12.5);

        // every enemy is possessed by its own AI controller
        assert!(world.entities().all(|e| e.controller.is_some()));
        assert_eq!(world.controllers.len(), 5);
    }

    #[test]
    fn spawner_without_template_is_a_no_op() {
        let mut world = GameWorld::new(MatchSettings::default(), 21);
        let id = add_spawner(&mut world, volume(), None);
        set_spawning_active(&mut world, id, true);

        world.scheduler.advance(10.0);
        world.run_timers();
        assert_eq!(world.entity_count(), 0);
        assert!(!world.scheduler.is_timer_active(&world.spawners[0].spawn_timer));

        // firing again by hand stays harmless
        assert!(spawn_enemy(&mut world, id).is_none());
        assert!(spawn_enemy(&mut world, SpawnerId(42)).is_none());
    }

    #[test]
    fn deactivated_spawner_stops() {
        let mut world = GameWorld::new(MatchSettings::default(), 21);
        let id = add_spawner(&mut world, volume(), Some(EntityTemplate::Sedan));
        set_spawning_active(&mut world, id, true);
        set_spawning_active(&mut world, id, false);

        world.scheduler.advance(10.0);
        world.run_timers();
        assert_eq!(world.entity_count(), 0);
    }
}
