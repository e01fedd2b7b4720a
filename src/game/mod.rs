//! Game simulation modules

pub mod ai;
pub mod combat;
pub mod entity;
pub mod input;
pub mod lifecycle;
pub mod r#match;
pub mod physics;
pub mod possession;
pub mod scheduler;
pub mod score;
pub mod snapshot;
pub mod spawner;
pub mod world;

pub use entity::ControllerId;
pub use r#match::{create_match, MatchRegistry, StartedMatch};

use crate::ws::protocol::ClientMsg;

/// Player input received from WebSocket
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub controller: ControllerId,
    pub msg: ClientMsg,
    pub received_at: u64,
}
