//! Controllers and the possession switch protocol

use glam::Vec2;
use tracing::debug;

use crate::ws::protocol::GameEvent;

use super::entity::{ControllerId, EntityBody, EntityId, PossessHook};
use super::lifecycle;
use super::world::GameWorld;

/// Who drives a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    /// The connected human
    Player,
    /// Enemy brain
    Ai,
}

/// An agent that possesses at most one entity at a time
#[derive(Debug, Clone)]
pub struct Controller {
    pub id: ControllerId,
    pub kind: ControllerKind,
    pub pawn: Option<EntityId>,
    /// Aim rotation in degrees
    pub control_yaw: f32,
    pub control_pitch: f32,
    /// Entity an AI controller is looking at
    pub focus: Option<EntityId>,
}

impl Controller {
    pub fn new(id: ControllerId, kind: ControllerKind) -> Self {
        Self {
            id,
            kind,
            pawn: None,
            control_yaw: 0.0,
            control_pitch: 0.0,
            focus: None,
        }
    }
}

/// Attach `controller` to `entity`.
///
/// The controller's current pawn is released before the new one is
/// acquired. An entity held by another controller is taken away from it.
/// Post-possession hooks are not run here.
pub fn possess(world: &mut GameWorld, controller: ControllerId, entity: EntityId) -> bool {
    if world.controller(controller).is_none() {
        debug!(%controller, "possess: unknown controller");
        return false;
    }
    let (previous_owner, yaw) = match world.entity(entity) {
        Some(target) if target.is_controllable() => (target.controller, target.yaw),
        _ => {
            debug!(%controller, %entity, "possess: entity missing or not controllable");
            return false;
        }
    };

    if previous_owner == Some(controller) {
        return true;
    }
    unpossess(world, controller);
    if let Some(owner) = previous_owner {
        unpossess(world, owner);
    }

    if let Some(target) = world.entity_mut(entity) {
        target.controller = Some(controller);
    }
    if let Some(agent) = world.controller_mut(controller) {
        agent.pawn = Some(entity);
        agent.control_yaw = yaw;
        agent.control_pitch = 0.0;
    }
    world.events.push(GameEvent::Possessed { controller, entity });
    true
}

/// Detach `controller` from its pawn, zeroing any pending input on it
pub fn unpossess(world: &mut GameWorld, controller: ControllerId) -> Option<EntityId> {
    let pawn = world.controller_mut(controller)?.pawn.take()?;

    if let Some(entity) = world.entity_mut(pawn) {
        entity.controller = None;
        match &mut entity.body {
            EntityBody::Character(character) => {
                character.move_input = Vec2::ZERO;
                character.jump_requested = false;
            }
            EntityBody::Vehicle(vehicle) => {
                vehicle.throttle = 0.0;
                vehicle.steering = 0.0;
            }
        }
    }
    world.events.push(GameEvent::Released {
        controller,
        entity: pawn,
    });
    Some(pawn)
}

/// Switch `controller` to the first controllable entity inside the sensor
/// sphere around its pawn.
///
/// Candidates are taken in overlap order with no distance sort. The winner's
/// post-possession hooks always run; a stand-up hook still checks on its own
/// whether the body has come to rest.
pub fn try_switch_possession(world: &mut GameWorld, controller: ControllerId, sensor_radius: f32) -> bool {
    let Some(current) = world.controller(controller).and_then(|c| c.pawn) else {
        debug!(%controller, "switch: no pawn to sense from");
        return false;
    };

    let candidate = world.overlapping(current, sensor_radius).into_iter().find(|id| {
        *id != current
            && world
                .entity(*id)
                .map(|e| e.is_controllable())
                .unwrap_or(false)
    });
    let Some(candidate) = candidate else {
        debug!(%controller, %current, "switch: nothing to possess");
        return false;
    };

    if !possess(world, controller, candidate) {
        return false;
    }
    run_possess_hooks(world, candidate);
    true
}

fn run_possess_hooks(world: &mut GameWorld, entity: EntityId) {
    let hooks = match world.entity(entity) {
        Some(e) => e.hooks.clone(),
        None => return,
    };
    for hook in hooks {
        match hook {
            PossessHook::StandUp => {
                lifecycle::get_up(world, entity);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchSettings;
    use crate::game::entity::{Capabilities, EntityTemplate, LifecycleState};
    use glam::Vec3;

    fn world_with_player() -> (GameWorld, ControllerId, EntityId) {
        let mut world = GameWorld::new(MatchSettings::default(), 1);
        let player = world.add_controller(ControllerKind::Player);
        let pawn = world.spawn_entity(EntityTemplate::Character, Vec3::ZERO, 0.0);
        assert!(possess(&mut world, player, pawn));
        (world, player, pawn)
    }

    #[test]
    fn possess_releases_old_pawn_first() {
        let (mut world, player, first) = world_with_player();
        let second = world.spawn_entity(EntityTemplate::Sedan, Vec3::X * 100.0, 45.0);
        world.take_events();

        assert!(possess(&mut world, player, second));
        assert_eq!(world.entity(first).and_then(|e| e.controller), None);
        assert_eq!(world.entity(second).and_then(|e| e.controller), Some(player));
        assert_eq!(world.controller(player).map(|c| c.control_yaw), Some(45.0));

        let events = world.take_events();
        assert!(matches!(events[0], GameEvent::Released { entity, .. } if entity == first));
        assert!(matches!(events[1], GameEvent::Possessed { entity, .. } if entity == second));
    }

    #[test]
    fn possess_takes_entity_from_previous_owner() {
        let (mut world, player, pawn) = world_with_player();
        let ai = world.add_controller(ControllerKind::Ai);

        assert!(possess(&mut world, ai, pawn));
        assert_eq!(world.controller(player).and_then(|c| c.pawn), None);
        assert_eq!(world.controller(ai).and_then(|c| c.pawn), Some(pawn));
    }

    #[test]
    fn scenery_cannot_be_possessed() {
        let (mut world, player, pawn) = world_with_player();
        let prop = world.spawn_entity(EntityTemplate::Sedan, Vec3::X * 100.0, 0.0);
        world.entity_mut(prop).expect("prop").capabilities = Capabilities::empty();

        assert!(!possess(&mut world, player, prop));
        assert!(!try_switch_possession(&mut world, player, 500.0));
        assert_eq!(world.player_pawn(), Some(pawn));
    }

    #[test]
    fn switch_without_candidate_keeps_possession() {
        let (mut world, player, pawn) = world_with_player();
        world.spawn_entity(EntityTemplate::Sedan, Vec3::X * 5000.0, 0.0);

        assert!(!try_switch_possession(&mut world, player, 250.0));
        assert_eq!(world.player_pawn(), Some(pawn));
    }

    #[test]
    fn switch_takes_first_candidate_in_overlap_order() {
        let (mut world, player, _) = world_with_player();
        let farther = world.spawn_entity(EntityTemplate::Character, Vec3::X * 200.0, 0.0);
        let _closer = world.spawn_entity(EntityTemplate::Character, Vec3::X * 60.0, 0.0);

        assert!(try_switch_possession(&mut world, player, 250.0));
        assert_eq!(world.player_pawn(), Some(farther));
    }

    #[test]
    fn switch_to_downed_candidate_runs_stand_up() {
        let (mut world, player, _) = world_with_player();
        let sleeper = world.spawn_entity(EntityTemplate::Character, Vec3::X * 150.0, 0.0);
        {
            let character = world
                .entity_mut(sleeper)
                .and_then(|e| e.character_mut())
                .expect("character");
            character.lifecycle = LifecycleState::Downed;
            character.movement_enabled = false;
            character.ragdoll.simulating = true;
            character.ragdoll.linear_velocity = Vec3::ZERO;
        }

        assert!(try_switch_possession(&mut world, player, 250.0));
        assert_eq!(world.player_pawn(), Some(sleeper));
        let entity = world.entity(sleeper).expect("entity");
        assert_eq!(entity.lifecycle(), Some(LifecycleState::Active));
        assert!(!entity.character().expect("character").ragdoll.simulating);
    }

    #[test]
    fn switch_to_moving_downed_candidate_stays_downed() {
        let (mut world, player, _) = world_with_player();
        let tumbling = world.spawn_entity(EntityTemplate::Character, Vec3::X * 150.0, 0.0);
        {
            let character = world
                .entity_mut(tumbling)
                .and_then(|e| e.character_mut())
                .expect("character");
            character.lifecycle = LifecycleState::Downed;
            character.ragdoll.simulating = true;
            character.ragdoll.linear_velocity = Vec3::new(0.0, 0.0, 0.01);
        }

        assert!(try_switch_possession(&mut world, player, 250.0));
        assert_eq!(world.player_pawn(), Some(tumbling));
        assert_eq!(
            world.entity(tumbling).and_then(|e| e.lifecycle()),
            Some(LifecycleState::Downed)
        );
    }
}
