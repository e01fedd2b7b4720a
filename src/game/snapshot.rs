//! Snapshot building

use crate::ws::protocol::{
    CharacterSnapshot, EntitySnapshot, GameEvent, HudSnapshot, ServerMsg, VehicleSnapshot,
};

use super::entity::ControllableEntity;
use super::world::GameWorld;

/// Builds snapshots for network transmission
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used for important events)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Build a snapshot message
    pub fn build(&self, tick: u64, world: &GameWorld, events: Vec<GameEvent>) -> ServerMsg {
        let player_pawn = world.player_pawn();
        let entities = world
            .entities()
            .map(|e| entity_snapshot(e, player_pawn == Some(e.id)))
            .collect();

        ServerMsg::Snapshot {
            tick,
            hud: hud(world),
            entities,
            events,
        }
    }
}

/// Current HUD readout of a world
pub fn hud(world: &GameWorld) -> HudSnapshot {
    HudSnapshot {
        kill_count: world.score.kill_count(),
        time_elapsed: world.score.time_elapsed(),
        ended: world.score.has_ended(),
    }
}

fn entity_snapshot(entity: &ControllableEntity, player_controlled: bool) -> EntitySnapshot {
    let character = entity.character().map(|c| CharacterSnapshot {
        lifecycle: c.lifecycle,
        pov: c.pov,
        aiming: c.aiming,
        attacking: c.attacking,
        ragdoll: c
            .ragdoll
            .simulating
            .then(|| c.ragdoll.location.to_array()),
    });
    let vehicle = entity.vehicle().map(|v| VehicleSnapshot {
        speed: v.speed_display(),
        gear: v.gear_display(),
        in_car_camera: v.in_car_camera,
    });

    EntitySnapshot {
        entity: entity.id,
        template: entity.template,
        x: entity.location.x,
        y: entity.location.y,
        z: entity.location.z,
        yaw: entity.yaw,
        vel_x: entity.velocity.x,
        vel_y: entity.velocity.y,
        vel_z: entity.velocity.z,
        player_controlled,
        character,
        vehicle,
    }
}

/// Snapshot size stats for debugging
#[derive(Debug, Default)]
pub struct SnapshotStats {
    pub total_snapshots: u64,
    pub total_bytes: u64,
    pub avg_entities_per_snapshot: f32,
}

impl SnapshotStats {
    pub fn record(&mut self, entity_count: usize, bytes: usize) {
        self.total_snapshots += 1;
        self.total_bytes += bytes as u64;

        // Running average
        let n = self.total_snapshots as f32;
        self.avg_entities_per_snapshot =
            self.avg_entities_per_snapshot * ((n - 1.0) / n) + (entity_count as f32 / n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchSettings;
    use crate::game::entity::EntityTemplate;
    use crate::game::possession::{self, ControllerKind};
    use glam::Vec3;

    #[test]
    fn snapshots_follow_the_interval() {
        let mut builder = SnapshotBuilder::new(3);
        let sent: Vec<bool> = (0..6).map(|_| builder.should_send()).collect();
        assert_eq!(sent, vec![false, false, true, false, false, true]);

        builder.force_next();
        assert!(builder.should_send());
    }

    #[test]
    fn snapshot_marks_the_player_pawn() {
        let mut world = GameWorld::new(MatchSettings::default(), 1);
        let player = world.add_controller(ControllerKind::Player);
        let hero = world.spawn_entity(EntityTemplate::Character, Vec3::ZERO, 0.0);
        world.spawn_entity(EntityTemplate::Sedan, Vec3::X * 500.0, 0.0);
        possession::possess(&mut world, player, hero);

        let ServerMsg::Snapshot { hud, entities, .. } = SnapshotBuilder::new(1).build(7, &world, Vec::new())
        else {
            panic!("expected a snapshot");
        };
        assert_eq!(hud.time_elapsed, "00:00");
        assert_eq!(entities.len(), 2);
        assert!(entities[0].player_controlled);
        assert!(entities[0].character.is_some());
        assert_eq!(
            entities[1].vehicle.as_ref().map(|v| v.gear.as_str()),
            Some("N")
        );
    }

    #[test]
    fn stats_keep_a_running_average() {
        let mut stats = SnapshotStats::default();
        stats.record(2, 100);
        stats.record(4, 300);
        assert_eq!(stats.total_bytes, 400);
        assert!((stats.avg_entities_per_snapshot - 3.0).abs() < 1e-5);
    }
}
