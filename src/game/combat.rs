//! Combat system - attack cadence and projectiles

use glam::Vec3;
use tracing::debug;
use uuid::Uuid;

use crate::ws::protocol::GameEvent;

use super::entity::{rotate_yaw, CameraPov, Capabilities, EntityId, RotationMode, MUZZLE_SOCKET};
use super::world::{GameWorld, TimerEvent};

/// Muzzle offset from the hand socket, in the aim frame
pub const MUZZLE_OFFSET: Vec3 = Vec3::new(50.0, 0.0, 0.0);

/// Projectile stats of the character weapon
#[derive(Debug, Clone, Copy)]
pub struct WeaponStats {
    /// Projectile speed
    pub projectile_speed: f32,
    /// Projectile lifetime (seconds)
    pub projectile_lifetime: f32,
    /// Projectile hitbox radius
    pub projectile_radius: f32,
}

impl Default for WeaponStats {
    fn default() -> Self {
        Self {
            projectile_speed: 3000.0,
            projectile_lifetime: 3.0,
            projectile_radius: 8.0,
        }
    }
}

/// Active projectile in the game
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: Uuid,
    pub owner: EntityId,
    pub location: Vec3,
    pub velocity: Vec3,
    pub radius: f32,
    pub lifetime_remaining: f32,
}

impl Projectile {
    pub fn new(owner: EntityId, location: Vec3, direction: Vec3, stats: &WeaponStats) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            location,
            velocity: direction.normalize_or_zero() * stats.projectile_speed,
            radius: stats.projectile_radius,
            lifetime_remaining: stats.projectile_lifetime,
        }
    }

    /// Update projectile position, returns false if expired
    pub fn update(&mut self, dt: f32) -> bool {
        self.location += self.velocity * dt;
        self.lifetime_remaining -= dt;
        self.lifetime_remaining > 0.0
    }
}

/// Unit aim vector for a yaw and pitch in degrees
pub fn aim_direction(yaw: f32, pitch: f32) -> Vec3 {
    let (sin_yaw, cos_yaw) = yaw.to_radians().sin_cos();
    let (sin_pitch, cos_pitch) = pitch.to_radians().sin_cos();
    Vec3::new(cos_pitch * cos_yaw, cos_pitch * sin_yaw, sin_pitch)
}

/// Begin the attack cadence: the first shot goes out one fire interval
/// from now, then one every interval for as long as intent holds.
pub fn start_attacking(world: &mut GameWorld, entity: EntityId) -> bool {
    let fire_rate = world.settings.fire_rate;
    let Some(target) = world.entity_mut(entity) else {
        return false;
    };
    if !target.capabilities.contains(Capabilities::CAN_SHOOT) {
        return false;
    }
    let Some(character) = target.character_mut() else {
        return false;
    };
    if character.is_downed() {
        debug!(%entity, "start_attacking ignored while downed");
        return false;
    }

    character.attacking = true;
    character.rotation_mode = RotationMode::ControllerDesired;
    let mut slot = character.shoot_timer;
    world
        .scheduler
        .set_timer(&mut slot, fire_rate, true, TimerEvent::FireShot(entity));
    if let Some(character) = world.entity_mut(entity).and_then(|e| e.character_mut()) {
        character.shoot_timer = slot;
    }
    true
}

/// Drop attack intent. The cadence timer notices on its next firing.
pub fn stop_attacking(world: &mut GameWorld, entity: EntityId) {
    if let Some(character) = world.entity_mut(entity).and_then(|e| e.character_mut()) {
        character.attacking = false;
    }
}

/// One beat of the attack cadence.
///
/// Shoots unless the character is downed, then stops the cadence if intent
/// was dropped since the last beat. A stop between two beats therefore
/// still lets exactly one more shot out.
pub fn fire_shot(world: &mut GameWorld, entity: EntityId) -> Option<Uuid> {
    let (aim_yaw, aim_pitch) = match world.control_rotation(entity) {
        Some(rotation) => rotation,
        None => (world.entity(entity)?.yaw, 0.0),
    };
    let shooter = world.entity(entity)?;
    let character = shooter.character()?;

    let mut fired = None;
    if !character.is_downed() {
        if let Some(hand) = shooter.socket_location(MUZZLE_SOCKET) {
            let muzzle = hand + rotate_yaw(MUZZLE_OFFSET, aim_yaw);
            let projectile = Projectile::new(
                entity,
                muzzle,
                aim_direction(aim_yaw, aim_pitch),
                &WeaponStats::default(),
            );
            world.events.push(GameEvent::Shot {
                entity,
                projectile: projectile.id,
                x: muzzle.x,
                y: muzzle.y,
                z: muzzle.z,
                yaw: aim_yaw,
            });
            fired = Some(projectile.id);
            world.projectiles.push(projectile);
        }
    }

    let character = world.entity_mut(entity)?.character_mut()?;
    if !character.attacking {
        let mut slot = character.shoot_timer.take();
        if character.pov == CameraPov::ThirdPerson {
            character.rotation_mode = RotationMode::OrientToMovement;
        }
        world.scheduler.clear_timer(&mut slot);
    }
    fired
}
