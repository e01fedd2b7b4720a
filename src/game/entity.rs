//! Controllable entities: characters and vehicles
//!
//! An entity is a plain record. Behaviour that differs between kinds is
//! expressed through its capability set, its possession hook table and the
//! `body` variant, never through downcasting.

use std::collections::HashMap;
use std::fmt;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scheduler::TimerHandle;

/// Capsule half height of a character
pub const CAPSULE_HALF_HEIGHT: f32 = 96.0;
/// Capsule radius of a character
pub const CAPSULE_RADIUS: f32 = 42.0;
/// Collision radius of a vehicle body
pub const VEHICLE_RADIUS: f32 = 220.0;
/// Where the mesh sits relative to the capsule center
pub const MESH_OFFSET: Vec3 = Vec3::new(0.0, 0.0, -90.0);
/// Mesh yaw (degrees) relative to the capsule in the standing pose
pub const MESH_RECOVERY_YAW: f32 = -90.0;
/// Max walk speed while walking / sprinting
pub const WALK_SPEED: f32 = 1200.0;
pub const SPRINT_SPEED: f32 = 2400.0;
/// Socket projectiles are fired from
pub const MUZZLE_SOCKET: &str = "hand_l";

/// Entity identity, unique within a world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity-{}", self.0)
    }
}

/// Controller identity. Player controllers reuse the connection's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControllerId(pub Uuid);

impl ControllerId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

bitflags::bitflags! {
    /// Set of behaviours an entity supports
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        const CAN_SHOOT    = 1 << 0;
        const CAN_DRIVE    = 1 << 1;
        const TAKES_DAMAGE = 1 << 2;
    }
}

/// Hooks an entity runs right after a controller takes it over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PossessHook {
    /// Try to get up from a ragdoll
    StandUp,
}

/// Object channel a body collides on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionChannel {
    Pawn,
    Vehicle,
    Projectile,
}

/// Lifecycle of a character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    Downed,
    Recovering,
}

/// Which character camera is live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraPov {
    /// Follow camera on a boom behind the character
    ThirdPerson,
    /// Close camera used while aiming
    OverShoulder,
}

/// How a character's facing is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationMode {
    /// Face the direction of movement
    OrientToMovement,
    /// Face the controller's yaw
    ControllerDesired,
}

/// Physically simulated mesh of a downed character
#[derive(Debug, Clone, PartialEq)]
pub struct RagdollBody {
    pub simulating: bool,
    pub linear_velocity: Vec3,
    /// World location of the mesh
    pub location: Vec3,
    /// Mesh yaw relative to the capsule (degrees)
    pub yaw: f32,
}

/// State carried by character bodies
#[derive(Debug, Clone)]
pub struct CharacterState {
    pub lifecycle: LifecycleState,
    /// Set on the first knockdown and never cleared; kills count once
    pub ever_downed: bool,
    /// Attack intent; the cadence timer notices it going false one shot late
    pub attacking: bool,
    pub aiming: bool,
    pub pov: CameraPov,
    pub rotation_mode: RotationMode,
    pub movement_enabled: bool,
    pub max_walk_speed: f32,
    pub ignored_channels: Vec<CollisionChannel>,
    pub ragdoll: RagdollBody,
    /// Socket offsets relative to the capsule, in the capsule's frame
    pub sockets: HashMap<String, Vec3>,
    /// Movement axes for this tick (x forward, y right)
    pub move_input: Vec2,
    pub jump_requested: bool,
    /// Z of the floor the capsule rests on
    pub ground_z: f32,
    pub shoot_timer: Option<TimerHandle>,
    pub recovery_timer: Option<TimerHandle>,
}

impl CharacterState {
    pub fn new(location: Vec3) -> Self {
        let mut sockets = HashMap::new();
        sockets.insert(MUZZLE_SOCKET.to_string(), Vec3::new(20.0, -35.0, 40.0));

        Self {
            lifecycle: LifecycleState::Active,
            ever_downed: false,
            attacking: false,
            aiming: false,
            pov: CameraPov::ThirdPerson,
            rotation_mode: RotationMode::OrientToMovement,
            movement_enabled: true,
            max_walk_speed: WALK_SPEED,
            ignored_channels: Vec::new(),
            ragdoll: RagdollBody {
                simulating: false,
                linear_velocity: Vec3::ZERO,
                location: location + MESH_OFFSET,
                yaw: MESH_RECOVERY_YAW,
            },
            sockets,
            move_input: Vec2::ZERO,
            jump_requested: false,
            ground_z: location.z,
            shoot_timer: None,
            recovery_timer: None,
        }
    }

    pub fn is_downed(&self) -> bool {
        self.lifecycle == LifecycleState::Downed
    }

    pub fn ignores(&self, channel: CollisionChannel) -> bool {
        self.ignored_channels.contains(&channel)
    }

    pub fn ignore_channel(&mut self, channel: CollisionChannel) {
        if !self.ignores(channel) {
            self.ignored_channels.push(channel);
        }
    }

    pub fn block_channel(&mut self, channel: CollisionChannel) {
        self.ignored_channels.retain(|c| *c != channel);
    }
}

/// State carried by vehicle bodies
#[derive(Debug, Clone, Default)]
pub struct VehicleState {
    /// -1.0 full reverse .. 1.0 full forward
    pub throttle: f32,
    /// -1.0 full left .. 1.0 full right
    pub steering: f32,
    pub handbrake: bool,
    pub in_car_camera: bool,
    /// Negative is reverse, zero is neutral
    pub gear: i32,
    /// Signed speed along the vehicle's forward axis (units/s)
    pub forward_speed: f32,
    /// Head rotation of the in-car camera (degrees)
    pub head_pitch: f32,
    pub head_yaw: f32,
}

impl VehicleState {
    pub fn in_reverse(&self) -> bool {
        self.gear < 0
    }

    /// Speed readout for the in-car display
    pub fn speed_display(&self) -> String {
        let kph = (self.forward_speed.abs() * 0.036).floor() as i32;
        format!("{} km/h", kph)
    }

    /// Gear readout for the in-car display
    pub fn gear_display(&self) -> String {
        if self.in_reverse() {
            "R".to_string()
        } else if self.gear == 0 {
            "N".to_string()
        } else {
            self.gear.to_string()
        }
    }
}

/// Kind-specific part of an entity
#[derive(Debug, Clone)]
pub enum EntityBody {
    Character(CharacterState),
    Vehicle(VehicleState),
}

/// What to build when spawning an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityTemplate {
    Character,
    Sedan,
}

/// An entity a controller can possess
#[derive(Debug, Clone)]
pub struct ControllableEntity {
    pub id: EntityId,
    pub template: EntityTemplate,
    pub capabilities: Capabilities,
    pub hooks: Vec<PossessHook>,
    pub controller: Option<ControllerId>,
    /// Capsule / chassis center
    pub location: Vec3,
    /// Facing in degrees
    pub yaw: f32,
    pub velocity: Vec3,
    pub channel: CollisionChannel,
    pub radius: f32,
    pub body: EntityBody,
}

impl ControllableEntity {
    pub fn from_template(id: EntityId, template: EntityTemplate, location: Vec3, yaw: f32) -> Self {
        match template {
            EntityTemplate::Character => Self::new_character(id, location, yaw),
            EntityTemplate::Sedan => Self::new_sedan(id, location, yaw),
        }
    }

    pub fn new_character(id: EntityId, location: Vec3, yaw: f32) -> Self {
        Self {
            id,
            template: EntityTemplate::Character,
            capabilities: Capabilities::CAN_SHOOT | Capabilities::TAKES_DAMAGE,
            hooks: vec![PossessHook::StandUp],
            controller: None,
            location,
            yaw,
            velocity: Vec3::ZERO,
            channel: CollisionChannel::Pawn,
            radius: CAPSULE_RADIUS,
            body: EntityBody::Character(CharacterState::new(location)),
        }
    }

    pub fn new_sedan(id: EntityId, location: Vec3, yaw: f32) -> Self {
        Self {
            id,
            template: EntityTemplate::Sedan,
            capabilities: Capabilities::CAN_DRIVE,
            hooks: Vec::new(),
            controller: None,
            location,
            yaw,
            velocity: Vec3::ZERO,
            channel: CollisionChannel::Vehicle,
            radius: VEHICLE_RADIUS,
            body: EntityBody::Vehicle(VehicleState::default()),
        }
    }

    /// Entities without any capability are scenery and cannot be possessed
    pub fn is_controllable(&self) -> bool {
        !self.capabilities.is_empty()
    }

    pub fn character(&self) -> Option<&CharacterState> {
        match &self.body {
            EntityBody::Character(state) => Some(state),
            EntityBody::Vehicle(_) => None,
        }
    }

    pub fn character_mut(&mut self) -> Option<&mut CharacterState> {
        match &mut self.body {
            EntityBody::Character(state) => Some(state),
            EntityBody::Vehicle(_) => None,
        }
    }

    pub fn vehicle(&self) -> Option<&VehicleState> {
        match &self.body {
            EntityBody::Vehicle(state) => Some(state),
            EntityBody::Character(_) => None,
        }
    }

    pub fn vehicle_mut(&mut self) -> Option<&mut VehicleState> {
        match &mut self.body {
            EntityBody::Vehicle(state) => Some(state),
            EntityBody::Character(_) => None,
        }
    }

    pub fn lifecycle(&self) -> Option<LifecycleState> {
        self.character().map(|c| c.lifecycle)
    }

    /// Center used for overlap tests
    pub fn collision_center(&self) -> Vec3 {
        match &self.body {
            EntityBody::Character(c) if c.ragdoll.simulating => c.ragdoll.location - MESH_OFFSET,
            _ => self.location,
        }
    }

    /// World location of a named socket, if the entity has it
    pub fn socket_location(&self, socket: &str) -> Option<Vec3> {
        let character = self.character()?;
        let offset = character.sockets.get(socket)?;
        Some(self.collision_center() + rotate_yaw(*offset, self.yaw))
    }
}

/// Rotate a vector about +Z by `yaw_degrees`
pub fn rotate_yaw(v: Vec3, yaw_degrees: f32) -> Vec3 {
    let (sin, cos) = yaw_degrees.to_radians().sin_cos();
    Vec3::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos, v.z)
}

/// Unit forward vector for a yaw in degrees
pub fn forward_from_yaw(yaw_degrees: f32) -> Vec3 {
    rotate_yaw(Vec3::X, yaw_degrees)
}
