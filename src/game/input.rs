//! Named input actions and axes, dispatched by what the controller drives

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::combat;
use super::entity::{
    CameraPov, Capabilities, CharacterState, ControllerId, RotationMode, SPRINT_SPEED, WALK_SPEED,
};
use super::physics::normalize_yaw;
use super::possession;
use super::world::GameWorld;

/// Degrees per second at full deflection of a rate axis
pub const BASE_TURN_RATE: f32 = 45.0;
pub const BASE_LOOK_UP_RATE: f32 = 45.0;
/// Controller pitch limit (degrees)
pub const MAX_PITCH: f32 = 89.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionName {
    Jump,
    Sprint,
    Shoot,
    Aim,
    SwitchCamera,
    SwitchPawns,
    Handbrake,
    ResetVR,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AxisName {
    HumanMoveForward,
    HumanMoveRight,
    Turn,
    TurnRate,
    LookUp,
    LookUpRate,
    VehicleMoveForward,
    VehicleMoveRight,
    LookRight,
}

/// Latest value of every axis a client has reported.
///
/// Axes are levels, not impulses: a value holds until the client sends a
/// new one, and is re-applied every tick like a polled input device.
#[derive(Debug, Clone, Default)]
pub struct AxisLatch {
    values: BTreeMap<AxisName, f32>,
}

impl AxisLatch {
    pub fn set(&mut self, axis: AxisName, value: f32) {
        let value = match axis {
            _ if !value.is_finite() => 0.0,
            // mouse style deltas are not bounded
            AxisName::Turn | AxisName::LookUp | AxisName::LookRight => value,
            _ => value.clamp(-1.0, 1.0),
        };
        if value == 0.0 {
            self.values.remove(&axis);
        } else {
            self.values.insert(axis, value);
        }
    }

    pub fn get(&self, axis: AxisName) -> f32 {
        self.values.get(&axis).copied().unwrap_or(0.0)
    }

    /// Feed every axis to the controller's pawn for one tick. Movement axes
    /// are applied even at zero so releasing a key stops the pawn.
    pub fn apply(&self, world: &mut GameWorld, controller: ControllerId, dt: f32) {
        for axis in [
            AxisName::HumanMoveForward,
            AxisName::HumanMoveRight,
            AxisName::VehicleMoveForward,
            AxisName::VehicleMoveRight,
        ] {
            apply_axis(world, controller, axis, self.get(axis), dt);
        }
        for (&axis, &value) in &self.values {
            if !is_level_axis(axis) {
                apply_axis(world, controller, axis, value, dt);
            }
        }
    }
}

fn is_level_axis(axis: AxisName) -> bool {
    matches!(
        axis,
        AxisName::HumanMoveForward
            | AxisName::HumanMoveRight
            | AxisName::VehicleMoveForward
            | AxisName::VehicleMoveRight
    )
}

/// Dispatch a button press or release. Returns false when nothing in the
/// pawn's binding table handles it. Drivers get the vehicle table, everyone
/// else the character table.
pub fn apply_action(world: &mut GameWorld, controller: ControllerId, action: ActionName, pressed: bool) -> bool {
    let Some(pawn) = world.controller(controller).and_then(|c| c.pawn) else {
        return false;
    };
    let capabilities = match world.entity(pawn) {
        Some(entity) => entity.capabilities,
        None => return false,
    };

    // bound on both kinds
    match (action, pressed) {
        (ActionName::SwitchPawns, true) => {
            let radius = world.settings.sensor_radius;
            return possession::try_switch_possession(world, controller, radius);
        }
        (ActionName::SwitchPawns, false) => return false,
        (ActionName::ResetVR, _) => {
            debug!(%controller, "ResetVR has no effect on a headless server");
            return false;
        }
        _ => {}
    }

    if capabilities.contains(Capabilities::CAN_DRIVE) {
        let Some(vehicle) = world.entity_mut(pawn).and_then(|e| e.vehicle_mut()) else {
            return false;
        };
        return match action {
            ActionName::Handbrake => {
                vehicle.handbrake = pressed;
                true
            }
            ActionName::SwitchCamera if pressed => {
                vehicle.in_car_camera = !vehicle.in_car_camera;
                true
            }
            _ => false,
        };
    }

    match action {
        ActionName::Shoot if !capabilities.contains(Capabilities::CAN_SHOOT) => false,
        ActionName::Shoot if pressed => combat::start_attacking(world, pawn),
        ActionName::Shoot => {
            combat::stop_attacking(world, pawn);
            true
        }
        _ => {
            let Some(character) = world.entity_mut(pawn).and_then(|e| e.character_mut()) else {
                return false;
            };
            character_action(character, action, pressed)
        }
    }
}

fn character_action(character: &mut CharacterState, action: ActionName, pressed: bool) -> bool {
    match (action, pressed) {
        (ActionName::Jump, true) => {
            if character.movement_enabled {
                character.jump_requested = true;
            }
            character.movement_enabled
        }
        (ActionName::Jump, false) => {
            character.jump_requested = false;
            true
        }
        (ActionName::Sprint, true) => {
            character.max_walk_speed = SPRINT_SPEED;
            true
        }
        (ActionName::Sprint, false) => {
            character.max_walk_speed = WALK_SPEED;
            true
        }
        (ActionName::Aim, true) => {
            set_over_shoulder_pov(character);
            true
        }
        (ActionName::Aim, false) => {
            set_third_person_pov(character);
            true
        }
        (ActionName::SwitchCamera, true) => {
            change_pov(character);
            true
        }
        _ => false,
    }
}

/// Apply one axis value for one tick. Returns false when unbound.
pub fn apply_axis(world: &mut GameWorld, controller: ControllerId, axis: AxisName, value: f32, dt: f32) -> bool {
    let Some(pawn) = world.controller(controller).and_then(|c| c.pawn) else {
        return false;
    };
    let drives = match world.entity(pawn) {
        Some(entity) => entity.capabilities.contains(Capabilities::CAN_DRIVE),
        None => return false,
    };

    if !drives {
        match axis {
            AxisName::Turn => return add_control_rotation(world, controller, value, 0.0),
            AxisName::TurnRate => {
                return add_control_rotation(world, controller, value * BASE_TURN_RATE * dt, 0.0)
            }
            AxisName::LookUp => return add_control_rotation(world, controller, 0.0, value),
            AxisName::LookUpRate => {
                return add_control_rotation(world, controller, 0.0, value * BASE_LOOK_UP_RATE * dt)
            }
            _ => {}
        }
    }

    let Some(entity) = world.entity_mut(pawn) else {
        return false;
    };
    if drives {
        let Some(vehicle) = entity.vehicle_mut() else {
            return false;
        };
        match axis {
            AxisName::VehicleMoveForward => {
                vehicle.throttle = value;
                true
            }
            AxisName::VehicleMoveRight => {
                vehicle.steering = value;
                true
            }
            AxisName::LookUp if vehicle.in_car_camera => {
                vehicle.head_pitch = (vehicle.head_pitch + value).clamp(-MAX_PITCH, MAX_PITCH);
                true
            }
            AxisName::LookRight if vehicle.in_car_camera => {
                vehicle.head_yaw += value;
                true
            }
            _ => false,
        }
    } else {
        let Some(character) = entity.character_mut() else {
            return false;
        };
        if !character.movement_enabled {
            return false;
        }
        match axis {
            AxisName::HumanMoveForward => character.move_input.x = value,
            AxisName::HumanMoveRight => character.move_input.y = value,
            _ => return false,
        }
        true
    }
}

fn add_control_rotation(world: &mut GameWorld, controller: ControllerId, yaw: f32, pitch: f32) -> bool {
    let Some(controller) = world.controller_mut(controller) else {
        return false;
    };
    controller.control_yaw = normalize_yaw(controller.control_yaw + yaw);
    controller.control_pitch = (controller.control_pitch + pitch).clamp(-MAX_PITCH, MAX_PITCH);
    true
}

/// Toggle between the follow camera and the over-shoulder camera
pub fn change_pov(character: &mut CharacterState) {
    match character.pov {
        CameraPov::OverShoulder => {
            character.pov = CameraPov::ThirdPerson;
            if !character.attacking {
                character.rotation_mode = RotationMode::OrientToMovement;
            }
        }
        CameraPov::ThirdPerson => {
            character.pov = CameraPov::OverShoulder;
            character.rotation_mode = RotationMode::ControllerDesired;
        }
    }
}

/// Aim pressed: switch to over-shoulder if the follow camera is live
pub fn set_over_shoulder_pov(character: &mut CharacterState) {
    if character.pov == CameraPov::ThirdPerson {
        character.aiming = true;
        change_pov(character);
    }
}

/// Aim released: back to the follow camera if over-shoulder is live
pub fn set_third_person_pov(character: &mut CharacterState) {
    if character.pov == CameraPov::OverShoulder {
        character.aiming = false;
        change_pov(character);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchSettings;
    use crate::game::entity::{EntityId, EntityTemplate, LifecycleState};
    use crate::game::possession::ControllerKind;
    use glam::{Vec2, Vec3};

    const DT: f32 = 1.0 / 30.0;

    fn world() -> (GameWorld, ControllerId, EntityId, EntityId) {
        let mut world = GameWorld::new(MatchSettings::default(), 2);
        let player = world.add_controller(ControllerKind::Player);
        let hero = world.spawn_entity(EntityTemplate::Character, Vec3::ZERO, 0.0);
        let sedan = world.spawn_entity(EntityTemplate::Sedan, Vec3::new(200.0, 0.0, 0.0), 0.0);
        possession::possess(&mut world, player, hero);
        (world, player, hero, sedan)
    }

    fn character(world: &GameWorld, id: EntityId) -> &CharacterState {
        world.entity(id).and_then(|e| e.character()).expect("character")
    }

    #[test]
    fn action_names_use_binding_names_on_the_wire() {
        let action: ActionName = serde_json::from_str("\"SwitchPawns\"").expect("action");
        assert_eq!(action, ActionName::SwitchPawns);
        let axis: AxisName = serde_json::from_str("\"HumanMoveForward\"").expect("axis");
        assert_eq!(axis, AxisName::HumanMoveForward);
    }

    #[test]
    fn aim_toggles_over_shoulder_camera() {
        let (mut world, player, hero, _) = world();

        assert!(apply_action(&mut world, player, ActionName::Aim, true));
        let state = character(&world, hero);
        assert_eq!(state.pov, CameraPov::OverShoulder);
        assert!(state.aiming);
        assert_eq!(state.rotation_mode, RotationMode::ControllerDesired);

        apply_action(&mut world, player, ActionName::Aim, false);
        let state = character(&world, hero);
        assert_eq!(state.pov, CameraPov::ThirdPerson);
        assert!(!state.aiming);
        assert_eq!(state.rotation_mode, RotationMode::OrientToMovement);
    }

    #[test]
    fn leaving_over_shoulder_while_shooting_keeps_desired_rotation() {
        let (mut world, player, hero, _) = world();
        apply_action(&mut world, player, ActionName::SwitchCamera, true);
        apply_action(&mut world, player, ActionName::Shoot, true);
        apply_action(&mut world, player, ActionName::SwitchCamera, true);

        let state = character(&world, hero);
        assert_eq!(state.pov, CameraPov::ThirdPerson);
        assert_eq!(state.rotation_mode, RotationMode::ControllerDesired);
    }

    #[test]
    fn sprint_changes_walk_speed() {
        let (mut world, player, hero, _) = world();
        apply_action(&mut world, player, ActionName::Sprint, true);
        assert_eq!(character(&world, hero).max_walk_speed, SPRINT_SPEED);
        apply_action(&mut world, player, ActionName::Sprint, false);
        assert_eq!(character(&world, hero).max_walk_speed, WALK_SPEED);
    }

    #[test]
    fn downed_character_ignores_movement_and_attack() {
        let (mut world, player, hero, _) = world();
        {
            let state = world
                .entity_mut(hero)
                .and_then(|e| e.character_mut())
                .expect("character");
            state.lifecycle = LifecycleState::Downed;
            state.movement_enabled = false;
        }

        assert!(!apply_axis(&mut world, player, AxisName::HumanMoveForward, 1.0, DT));
        assert!(!apply_action(&mut world, player, ActionName::Jump, true));
        assert!(!apply_action(&mut world, player, ActionName::Shoot, true));
        let state = character(&world, hero);
        assert_eq!(state.move_input, Vec2::ZERO);
        assert!(!state.attacking);
        assert!(!state.jump_requested);
    }

    #[test]
    fn turn_rate_scales_with_tick() {
        let (mut world, player, hero, _) = world();
        let mut latch = AxisLatch::default();
        latch.set(AxisName::TurnRate, 1.0);
        for _ in 0..30 {
            latch.apply(&mut world, player, DT);
        }
        let (yaw, _) = world.control_rotation(hero).expect("rotation");
        assert!((yaw - BASE_TURN_RATE).abs() < 0.01, "yaw {yaw}");
    }

    #[test]
    fn released_movement_axis_stops_the_pawn() {
        let (mut world, player, hero, _) = world();
        let mut latch = AxisLatch::default();
        latch.set(AxisName::HumanMoveForward, 1.0);
        latch.apply(&mut world, player, DT);
        assert_eq!(character(&world, hero).move_input, Vec2::X);

        latch.set(AxisName::HumanMoveForward, 0.0);
        latch.apply(&mut world, player, DT);
        assert_eq!(character(&world, hero).move_input, Vec2::ZERO);
    }

    #[test]
    fn vehicle_bindings_drive_the_car() {
        let (mut world, player, _, sedan) = world();
        assert!(apply_action(&mut world, player, ActionName::SwitchPawns, true));
        assert_eq!(world.player_pawn(), Some(sedan));

        assert!(apply_axis(&mut world, player, AxisName::VehicleMoveForward, 1.0, DT));
        assert!(apply_action(&mut world, player, ActionName::Handbrake, true));
        // character-only bindings do nothing in a car
        assert!(!apply_action(&mut world, player, ActionName::Shoot, true));
        assert!(!apply_axis(&mut world, player, AxisName::HumanMoveForward, 1.0, DT));
        // head look only in the in-car view
        assert!(!apply_axis(&mut world, player, AxisName::LookRight, 5.0, DT));
        assert!(apply_action(&mut world, player, ActionName::SwitchCamera, true));
        assert!(apply_axis(&mut world, player, AxisName::LookRight, 5.0, DT));

        let vehicle = world.entity(sedan).and_then(|e| e.vehicle()).expect("vehicle");
        assert_eq!(vehicle.throttle, 1.0);
        assert!(vehicle.handbrake);
        assert!(vehicle.in_car_camera);
        assert_eq!(vehicle.head_yaw, 5.0);
    }

    #[test]
    fn reset_vr_is_ignored() {
        let (mut world, player, _, _) = world();
        assert!(!apply_action(&mut world, player, ActionName::ResetVR, true));
    }

    #[test]
    fn bindings_follow_capabilities() {
        let (mut world, player, hero, sedan) = world();

        world.entity_mut(hero).expect("hero").capabilities.remove(Capabilities::CAN_SHOOT);
        assert!(!apply_action(&mut world, player, ActionName::Shoot, true));
        assert!(!character(&world, hero).attacking);

        possession::possess(&mut world, player, sedan);
        world.entity_mut(sedan).expect("sedan").capabilities.remove(Capabilities::CAN_DRIVE);
        assert!(!apply_action(&mut world, player, ActionName::Handbrake, true));
        assert!(!apply_axis(&mut world, player, AxisName::VehicleMoveForward, 1.0, DT));
        let vehicle = world.entity(sedan).and_then(|e| e.vehicle()).expect("vehicle");
        assert!(!vehicle.handbrake);
        assert_eq!(vehicle.throttle, 0.0);
    }
}
