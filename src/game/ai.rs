//! Enemy brains: pawn sensing, chasing and shooting

use glam::Vec2;

use super::combat;
use super::entity::{forward_from_yaw, EntityId, LifecycleState};
use super::physics::{normalize_yaw, yaw_towards};
use super::possession::ControllerKind;
use super::scheduler::TimerHandle;
use super::world::{GameWorld, TimerEvent};

/// Seconds between sensing sweeps
pub const SENSING_INTERVAL: f32 = 0.5;
/// Half of the view cone, in degrees
pub const PERIPHERAL_VISION_ANGLE: f32 = 90.0;
/// Chasers stop this close to their target
pub const ACCEPTANCE_RADIUS: f32 = 300.0;

/// Arm the repeating sensing sweep
pub fn start_sensing(world: &mut GameWorld) -> TimerHandle {
    world
        .scheduler
        .schedule(SENSING_INTERVAL, true, TimerEvent::Sense)
}

/// True when `target` is inside the view cone and sight radius of `viewer`
pub fn can_see(world: &GameWorld, viewer: EntityId, target: EntityId) -> bool {
    let (Some(viewer), Some(target)) = (world.entity(viewer), world.entity(target)) else {
        return false;
    };
    let eye = viewer.collision_center();
    let to_target = target.collision_center() - eye;
    let distance = to_target.length();
    if distance > world.settings.sight_radius {
        return false;
    }
    if distance <= f32::EPSILON {
        return true;
    }
    let facing = forward_from_yaw(viewer.yaw);
    let cos = facing.dot(to_target / distance).clamp(-1.0, 1.0);
    cos.acos().to_degrees() <= PERIPHERAL_VISION_ANGLE
}

/// Sensing sweep: every standing enemy that sees the player's pawn focuses
/// it and opens fire.
pub fn sense(world: &mut GameWorld) {
    let Some(target) = world.player_pawn() else {
        return;
    };

    let watchers: Vec<_> = world
        .controllers
        .values()
        .filter(|c| c.kind == ControllerKind::Ai)
        .filter_map(|c| c.pawn.map(|pawn| (c.id, pawn)))
        .collect();

    for (brain, pawn) in watchers {
        let standing = world
            .entity(pawn)
            .and_then(|e| e.lifecycle())
            .map(|state| state == LifecycleState::Active)
            .unwrap_or(false);
        if !standing || !can_see(world, pawn, target) {
            continue;
        }

        if let Some(controller) = world.controller_mut(brain) {
            controller.focus = Some(target);
        }
        let already_attacking = world
            .entity(pawn)
            .and_then(|e| e.character())
            .map(|c| c.attacking)
            .unwrap_or(false);
        if !already_attacking {
            combat::start_attacking(world, pawn);
        }
    }
}

/// Per tick steering: turn toward the focus and walk up to it
pub fn update_ai(world: &mut GameWorld) {
    let brains: Vec<_> = world
        .controllers
        .values()
        .filter(|c| c.kind == ControllerKind::Ai)
        .filter_map(|c| c.pawn.map(|pawn| (c.id, pawn, c.focus)))
        .collect();

    for (brain, pawn, focus) in brains {
        let Some(origin) = world.entity(pawn).map(|e| e.location) else {
            continue;
        };
        let goal = focus.and_then(|f| world.entity(f)).map(|e| e.collision_center());

        let mut input = Vec2::ZERO;
        if let Some(goal) = goal {
            let yaw = normalize_yaw(yaw_towards(origin, goal));
            if let Some(controller) = world.controller_mut(brain) {
                controller.control_yaw = yaw;
            }
            if origin.truncate().distance(goal.truncate()) > ACCEPTANCE_RADIUS {
                input = Vec2::X;
            }
        } else if let Some(controller) = world.controller_mut(brain) {
            controller.focus = None;
        }

        if let Some(character) = world.entity_mut(pawn).and_then(|e| e.character_mut()) {
            if character.movement_enabled {
                character.move_input = input;
            }
        }
    }
}
