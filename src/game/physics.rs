//! Minimal kinematics for characters, ragdolls and vehicles
//!
//! This is not a physics engine. It integrates positions and decays
//! velocities just enough for the lifecycle state machine to have something
//! to observe: walking, jumping, a ragdoll coming to rest, a car rolling.

use glam::Vec3;

use super::entity::{
    forward_from_yaw, ControllableEntity, EntityBody, RotationMode, VehicleState, MESH_OFFSET,
};

/// Downward acceleration (units/s^2)
pub const GRAVITY: f32 = 980.0;
/// Initial vertical velocity of a jump
pub const JUMP_Z_VELOCITY: f32 = 600.0;
/// How fast a character turns toward its desired facing (degrees/s)
pub const ROTATION_RATE: f32 = 540.0;
/// Fraction of ragdoll velocity lost per second
pub const RAGDOLL_DAMPING: f32 = 3.0;
/// Below this speed a ragdoll goes to sleep and its velocity is exactly zero
pub const RAGDOLL_SLEEP_SPEED: f32 = 5.0;
/// Share of the impacting body's velocity handed to a fresh ragdoll
pub const IMPACT_TRANSFER: f32 = 0.5;

/// Handling constants of the sedan
#[derive(Debug, Clone, Copy)]
pub struct VehicleStats {
    /// Maximum forward speed
    pub max_speed: f32,
    /// Maximum reverse speed
    pub max_reverse_speed: f32,
    /// Acceleration rate at full throttle
    pub acceleration: f32,
    /// Velocity kept per tick without throttle
    pub drag: f32,
    /// Deceleration while the handbrake is held
    pub handbrake_decel: f32,
    /// Turn rate at full steering lock (degrees/s)
    pub turn_rate: f32,
    /// Speed covered by each forward gear
    pub gear_span: f32,
    pub top_gear: i32,
}

impl Default for VehicleStats {
    fn default() -> Self {
        Self {
            max_speed: 2800.0,
            max_reverse_speed: 800.0,
            acceleration: 900.0,
            drag: 0.985,
            handbrake_decel: 2500.0,
            turn_rate: 70.0,
            gear_span: 600.0,
            top_gear: 5,
        }
    }
}

/// Integrates entity motion
pub struct KinematicsSystem;

impl KinematicsSystem {
    /// Advance one entity by `dt`. `control_yaw` is the possessing
    /// controller's yaw, used as the frame for movement input.
    pub fn step(entity: &mut ControllableEntity, control_yaw: Option<f32>, dt: f32) {
        match entity.body {
            EntityBody::Character(_) => Self::step_character(entity, control_yaw, dt),
            EntityBody::Vehicle(_) => Self::step_vehicle(entity, &VehicleStats::default(), dt),
        }
    }

    fn step_character(entity: &mut ControllableEntity, control_yaw: Option<f32>, dt: f32) {
        let frame_yaw = control_yaw.unwrap_or(entity.yaw);
        let EntityBody::Character(character) = &mut entity.body else {
            return;
        };

        if character.ragdoll.simulating {
            let ragdoll = &mut character.ragdoll;
            ragdoll.location += ragdoll.linear_velocity * dt;

            let floor = character.ground_z + MESH_OFFSET.z;
            if ragdoll.location.z <= floor {
                ragdoll.location.z = floor;
                ragdoll.linear_velocity.z = ragdoll.linear_velocity.z.max(0.0);
            } else {
                ragdoll.linear_velocity.z -= GRAVITY * dt;
            }

            ragdoll.linear_velocity *= (1.0 - RAGDOLL_DAMPING * dt).max(0.0);
            if ragdoll.linear_velocity.length() < RAGDOLL_SLEEP_SPEED
                && ragdoll.location.z <= floor
            {
                ragdoll.linear_velocity = Vec3::ZERO;
            }

            entity.velocity = Vec3::ZERO;
            return;
        }

        let on_ground = entity.location.z <= character.ground_z;

        let mut horizontal = Vec3::ZERO;
        if character.movement_enabled {
            let input = character.move_input.clamp_length_max(1.0);
            let forward = forward_from_yaw(frame_yaw);
            let right = forward_from_yaw(frame_yaw + 90.0);
            horizontal = (forward * input.x + right * input.y) * character.max_walk_speed;

            if character.jump_requested && on_ground {
                entity.velocity.z = JUMP_Z_VELOCITY;
            }
        }

        let mut vertical = entity.velocity.z;
        if !on_ground || vertical > 0.0 {
            vertical -= GRAVITY * dt;
        }

        entity.velocity = Vec3::new(horizontal.x, horizontal.y, vertical);
        entity.location += entity.velocity * dt;
        if entity.location.z <= character.ground_z {
            entity.location.z = character.ground_z;
            entity.velocity.z = 0.0;
        }

        let desired_yaw = match character.rotation_mode {
            RotationMode::ControllerDesired => Some(frame_yaw),
            RotationMode::OrientToMovement if horizontal.length_squared() > 1.0 => {
                Some(horizontal.y.atan2(horizontal.x).to_degrees())
            }
            RotationMode::OrientToMovement => None,
        };
        if let Some(target) = desired_yaw {
            entity.yaw = approach_yaw(entity.yaw, target, ROTATION_RATE * dt);
        }

        // the mesh rides along with the capsule while not simulating
        character.ragdoll.location = entity.location + MESH_OFFSET;
    }

    /// Advance a vehicle with its own throttle, steering and handbrake
    pub fn step_vehicle(entity: &mut ControllableEntity, stats: &VehicleStats, dt: f32) {
        let EntityBody::Vehicle(vehicle) = &mut entity.body else {
            return;
        };

        let throttle = vehicle.throttle.clamp(-1.0, 1.0);
        let steering = vehicle.steering.clamp(-1.0, 1.0);
        let mut speed = vehicle.forward_speed;

        speed += throttle * stats.acceleration * dt;
        if vehicle.handbrake {
            let brake = stats.handbrake_decel * dt;
            speed = if speed.abs() <= brake {
                0.0
            } else {
                speed - brake * speed.signum()
            };
        }
        if throttle == 0.0 {
            speed *= stats.drag;
            if speed.abs() < 1.0 {
                speed = 0.0;
            }
        }
        speed = speed.clamp(-stats.max_reverse_speed, stats.max_speed);

        // steering authority grows with speed and flips in reverse
        let authority = (speed / stats.max_speed).clamp(-1.0, 1.0);
        entity.yaw = normalize_yaw(entity.yaw + steering * stats.turn_rate * authority.signum() * authority.abs().sqrt() * dt);

        vehicle.forward_speed = speed;
        vehicle.gear = gear_for_speed(vehicle, stats);

        entity.velocity = forward_from_yaw(entity.yaw) * speed;
        entity.location += entity.velocity * dt;
    }

    /// Check overlap between two spheres
    pub fn spheres_overlap(a: Vec3, radius_a: f32, b: Vec3, radius_b: f32) -> bool {
        let combined = radius_a + radius_b;
        a.distance_squared(b) <= combined * combined
    }
}

fn gear_for_speed(vehicle: &VehicleState, stats: &VehicleStats) -> i32 {
    let speed = vehicle.forward_speed;
    if speed < -10.0 || (speed <= 0.0 && vehicle.throttle < 0.0) {
        -1
    } else if speed.abs() < 10.0 && vehicle.throttle == 0.0 {
        0
    } else {
        (1 + (speed / stats.gear_span) as i32).clamp(1, stats.top_gear)
    }
}

/// Wrap a yaw into (-180, 180]
pub fn normalize_yaw(yaw: f32) -> f32 {
    let wrapped = (yaw + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 {
        180.0
    } else {
        wrapped
    }
}

/// Yaw (degrees) of the direction from `from` to `to`, ignoring height
pub fn yaw_towards(from: Vec3, to: Vec3) -> f32 {
    let delta = to - from;
    delta.y.atan2(delta.x).to_degrees()
}

/// Turn `current` toward `target` by at most `max_step` degrees
pub fn approach_yaw(current: f32, target: f32, max_step: f32) -> f32 {
    let diff = normalize_yaw(target - current);
    if diff.abs() <= max_step {
        normalize_yaw(target)
    } else {
        normalize_yaw(current + max_step * diff.signum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::{EntityId, LifecycleState};
    use glam::Vec2;

    const DT: f32 = 1.0 / 30.0;

    #[test]
    fn ragdoll_comes_to_exact_rest() {
        let mut entity = ControllableEntity::new_character(EntityId(1), Vec3::new(0.0, 0.0, 96.0), 0.0);
        {
            let character = entity.character_mut().expect("character");
            character.lifecycle = LifecycleState::Downed;
            character.ragdoll.simulating = true;
            character.ragdoll.linear_velocity = Vec3::new(800.0, 0.0, 200.0);
        }

        for _ in 0..(30 * 4) {
            KinematicsSystem::step(&mut entity, None, DT);
        }

        let ragdoll = &entity.character().expect("character").ragdoll;
        assert_eq!(ragdoll.linear_velocity, Vec3::ZERO);
        assert!(ragdoll.location.x > 0.0);
        assert_eq!(entity.velocity, Vec3::ZERO);
    }

    #[test]
    fn walking_follows_control_yaw() {
        let mut entity = ControllableEntity::new_character(EntityId(1), Vec3::new(0.0, 0.0, 96.0), 0.0);
        entity.character_mut().expect("character").move_input = Vec2::new(1.0, 0.0);

        KinematicsSystem::step(&mut entity, Some(90.0), DT);

        assert!(entity.location.y > 0.0);
        assert!(entity.location.x.abs() < 1e-3);
        assert!((entity.velocity.length() - 1200.0).abs() < 1.0);
    }

    #[test]
    fn disabled_movement_ignores_input() {
        let mut entity = ControllableEntity::new_character(EntityId(1), Vec3::new(0.0, 0.0, 96.0), 0.0);
        {
            let character = entity.character_mut().expect("character");
            character.move_input = Vec2::new(1.0, 1.0);
            character.movement_enabled = false;
        }
        KinematicsSystem::step(&mut entity, None, DT);
        assert_eq!(entity.location, Vec3::new(0.0, 0.0, 96.0));
    }

    #[test]
    fn jump_leaves_the_ground_and_lands() {
        let mut entity = ControllableEntity::new_character(EntityId(1), Vec3::new(0.0, 0.0, 96.0), 0.0);
        entity.character_mut().expect("character").jump_requested = true;
        KinematicsSystem::step(&mut entity, None, DT);
        assert!(entity.location.z > 96.0);

        entity.character_mut().expect("character").jump_requested = false;
        for _ in 0..60 {
            KinematicsSystem::step(&mut entity, None, DT);
        }
        assert_eq!(entity.location.z, 96.0);
    }

    #[test]
    fn vehicle_accelerates_shifts_and_reverses() {
        let mut entity = ControllableEntity::new_sedan(EntityId(1), Vec3::ZERO, 0.0);
        entity.vehicle_mut().expect("vehicle").throttle = 1.0;
        for _ in 0..90 {
            KinematicsSystem::step(&mut entity, None, DT);
        }
        let vehicle = entity.vehicle().expect("vehicle");
        assert!(vehicle.forward_speed > 0.0);
        assert!(vehicle.gear >= 1);
        assert!(entity.location.x > 0.0);

        let mut parked = ControllableEntity::new_sedan(EntityId(2), Vec3::ZERO, 0.0);
        parked.vehicle_mut().expect("vehicle").throttle = -1.0;
        KinematicsSystem::step(&mut parked, None, DT);
        assert!(parked.vehicle().expect("vehicle").in_reverse());
    }

    #[test]
    fn handbrake_stops_the_car() {
        let mut entity = ControllableEntity::new_sedan(EntityId(1), Vec3::ZERO, 0.0);
        {
            let vehicle = entity.vehicle_mut().expect("vehicle");
            vehicle.forward_speed = 1000.0;
            vehicle.handbrake = true;
        }
        for _ in 0..30 {
            KinematicsSystem::step(&mut entity, None, DT);
        }
        let vehicle = entity.vehicle().expect("vehicle");
        assert_eq!(vehicle.forward_speed, 0.0);
        assert_eq!(vehicle.gear, 0);
    }

    #[test]
    fn yaw_helpers_wrap() {
        assert_eq!(normalize_yaw(270.0), -90.0);
        assert_eq!(normalize_yaw(-180.0), 180.0);
        assert_eq!(approach_yaw(170.0, -170.0, 30.0), -170.0);
        assert_eq!(approach_yaw(0.0, 90.0, 10.0), 10.0);
        let yaw = yaw_towards(Vec3::ZERO, Vec3::new(0.0, 10.0, 5.0));
        assert!((yaw - 90.0).abs() < 1e-4);
    }

    #[test]
    fn sphere_overlap() {
        assert!(KinematicsSystem::spheres_overlap(Vec3::ZERO, 1.0, Vec3::new(1.5, 0.0, 0.0), 1.0));
        assert!(!KinematicsSystem::spheres_overlap(Vec3::ZERO, 1.0, Vec3::new(3.0, 0.0, 0.0), 1.0));
    }
}
