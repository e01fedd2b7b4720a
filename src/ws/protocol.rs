//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::entity::{CameraPov, ControllerId, EntityId, EntityTemplate, LifecycleState};
use crate::game::input::{ActionName, AxisName};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Button pressed or released
    Action {
        /// Binding name, e.g. "SwitchPawns"
        name: ActionName,
        pressed: bool,
    },

    /// Axis moved; the value holds until the next update
    Axis {
        /// Binding name, e.g. "HumanMoveForward"
        name: AxisName,
        value: f32,
    },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave current match
    LeaveMatch,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        user_id: Uuid,
        server_time: u64,
    },

    /// The connection's match is running
    MatchStarted {
        match_id: Uuid,
        /// Seed for deterministic random generation
        seed: u64,
        tick: u64,
        /// Pawn the player starts in
        pawn: EntityId,
    },

    /// Game state snapshot (sent at regular intervals)
    Snapshot {
        /// Server tick number
        tick: u64,
        hud: HudSnapshot,
        entities: Vec<EntitySnapshot>,
        /// Events that occurred since last snapshot
        events: Vec<GameEvent>,
    },

    /// The player's pawn went down
    MatchEnded {
        kill_count: u32,
        time_elapsed: String,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Match HUD readout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HudSnapshot {
    pub kill_count: u32,
    /// `MM:SS`
    pub time_elapsed: String,
    pub ended: bool,
}

/// Entity state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity: EntityId,
    pub template: EntityTemplate,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Facing in degrees
    pub yaw: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub vel_z: f32,
    /// Possessed by the connected player
    pub player_controlled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character: Option<CharacterSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<VehicleSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub lifecycle: LifecycleState,
    pub pov: CameraPov,
    pub aiming: bool,
    pub attacking: bool,
    /// Ragdoll mesh location while downed
    pub ragdoll: Option<[f32; 3]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    /// e.g. "39 km/h"
    pub speed: String,
    /// "R", "N" or the gear number
    pub gear: String,
    pub in_car_camera: bool,
}

/// Game events (spawns, shots, knockdowns, etc.)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum GameEvent {
    Spawned {
        entity: EntityId,
        template: EntityTemplate,
        x: f32,
        y: f32,
        z: f32,
        yaw: f32,
    },

    Removed {
        entity: EntityId,
    },

    Possessed {
        controller: ControllerId,
        entity: EntityId,
    },

    Released {
        controller: ControllerId,
        entity: EntityId,
    },

    /// Projectile fired
    Shot {
        entity: EntityId,
        projectile: Uuid,
        x: f32,
        y: f32,
        z: f32,
        yaw: f32,
    },

    /// Character knocked down
    Downed {
        entity: EntityId,
    },

    /// Character stood back up
    Recovered {
        entity: EntityId,
    },

    /// First knockdown of an enemy
    Kill {
        entity: EntityId,
        kill_count: u32,
    },
}
