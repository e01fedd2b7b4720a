//! Knockdown and recovery of characters

use glam::{Vec2, Vec3};
use tracing::{debug, info};

use crate::ws::protocol::GameEvent;

use super::combat;
use super::entity::{
    Capabilities, CollisionChannel, EntityId, LifecycleState, MESH_OFFSET, MESH_RECOVERY_YAW,
};
use super::physics::IMPACT_TRANSFER;
use super::world::{BodyRef, GameWorld, TimerEvent};

/// What a begin-overlap did to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapOutcome {
    /// Nothing happened
    Ignored,
    Downed {
        /// A kill was credited by this knockdown
        kill_counted: bool,
        /// The player's pawn went down
        ended_match: bool,
    },
}

/// Handle a body starting to overlap `target`.
///
/// Null and self overlaps are ignored, as is anything not faster than the
/// knockdown speed. A knockdown of an already downed character re-applies
/// the ragdoll impulse but never credits another kill.
pub fn on_overlap(world: &mut GameWorld, target: EntityId, other: Option<BodyRef>) -> OverlapOutcome {
    let Some(other) = other else {
        return OverlapOutcome::Ignored;
    };
    if other == BodyRef::Entity(target) {
        return OverlapOutcome::Ignored;
    }
    let Some(other_velocity) = world.body_velocity(other) else {
        debug!(entity = %target, ?other, "overlap with a body that no longer exists");
        return OverlapOutcome::Ignored;
    };
    if other_velocity.length() <= world.settings.knockdown_speed {
        return OverlapOutcome::Ignored;
    }
    match world.entity(target) {
        Some(e) if e.character().is_some() && e.capabilities.contains(Capabilities::TAKES_DAMAGE) => {}
        _ => return OverlapOutcome::Ignored,
    }

    combat::stop_attacking(world, target);

    let is_player = world.is_player_pawn(target);
    let recover_ai = world.settings.recover_ai_characters;
    let Some(entity) = world.entity_mut(target) else {
        return OverlapOutcome::Ignored;
    };
    let capsule = entity.location;
    entity.velocity = Vec3::ZERO;
    let Some(character) = entity.character_mut() else {
        return OverlapOutcome::Ignored;
    };

    character.movement_enabled = false;
    character.move_input = Vec2::ZERO;
    character.jump_requested = false;
    character.ignore_channel(CollisionChannel::Pawn);
    character.ignore_channel(CollisionChannel::Vehicle);
    if !character.ragdoll.simulating {
        character.ragdoll.simulating = true;
        character.ragdoll.location = capsule + MESH_OFFSET;
        character.ragdoll.linear_velocity = Vec3::ZERO;
    }
    character.ragdoll.linear_velocity += other_velocity * IMPACT_TRANSFER;
    character.lifecycle = LifecycleState::Downed;

    let first_downing = !character.ever_downed;
    character.ever_downed = true;
    let mut recovery_timer = character.recovery_timer;

    world.events.push(GameEvent::Downed { entity: target });

    let mut kill_counted = false;
    if is_player || recover_ai {
        world.scheduler.set_timer(
            &mut recovery_timer,
            world.settings.recovery_interval,
            true,
            TimerEvent::GetUp(target),
        );
        if let Some(character) = world.entity_mut(target).and_then(|e| e.character_mut()) {
            character.recovery_timer = recovery_timer;
        }
    }
    if is_player {
        if !world.score.has_ended() {
            info!(entity = %target, "Player pawn knocked down");
        }
        world.score.end_game(&mut world.scheduler);
    } else if first_downing {
        world.score.increment_kill_count(1);
        kill_counted = true;
        world.events.push(GameEvent::Kill {
            entity: target,
            kill_count: world.score.kill_count(),
        });
    }

    OverlapOutcome::Downed {
        kill_counted,
        ended_match: is_player,
    }
}

/// Try to stand a downed character back up.
///
/// Succeeds only while the ragdoll is simulating and its linear velocity is
/// exactly zero. The character passes through `Recovering` and ends
/// `Active` within this call.
pub fn get_up(world: &mut GameWorld, target: EntityId) -> bool {
    let Some(entity) = world.entity_mut(target) else {
        return false;
    };
    let Some(character) = entity.character_mut() else {
        return false;
    };
    if !character.ragdoll.simulating || character.ragdoll.linear_velocity != Vec3::ZERO {
        return false;
    }

    character.lifecycle = LifecycleState::Recovering;
    character.ragdoll.simulating = false;
    character.ragdoll.yaw = MESH_RECOVERY_YAW;
    let resting = character.ragdoll.location;
    character.block_channel(CollisionChannel::Pawn);
    character.block_channel(CollisionChannel::Vehicle);
    character.movement_enabled = true;
    let mut recovery_timer = character.recovery_timer.take();

    entity.location = resting - MESH_OFFSET;
    entity.velocity = Vec3::ZERO;

    world.scheduler.clear_timer(&mut recovery_timer);
    if let Some(character) = world.entity_mut(target).and_then(|e| e.character_mut()) {
        character.lifecycle = LifecycleState::Active;
    }

    debug!(entity = %target, "Character recovered");
    world.events.push(GameEvent::Recovered { entity: target });
    true
}
