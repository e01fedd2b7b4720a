//! Match setup and authoritative tick loop

use dashmap::DashMap;
use glam::Vec3;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MatchSettings;
use crate::util::time::{tick_delta, unix_millis, Stopwatch, SIMULATION_TPS, SNAPSHOT_TPS};
use crate::ws::protocol::{ClientMsg, HudSnapshot, ServerMsg};

use super::ai;
use super::entity::{ControllerId, EntityId, EntityTemplate, CAPSULE_HALF_HEIGHT};
use super::input::{self, ActionName, AxisLatch};
use super::possession::{self, ControllerKind};
use super::snapshot::{self, SnapshotBuilder, SnapshotStats};
use super::spawner::{self, SpawnVolume};
use super::world::GameWorld;
use super::PlayerInput;

/// Where the player's first pawn stands
pub const PLAYER_START: Vec3 = Vec3::new(0.0, 0.0, CAPSULE_HALF_HEIGHT);
/// A car parked within reach of the player start
pub const SEDAN_START: Vec3 = Vec3::new(300.0, 300.0, 60.0);
/// Inputs older than this when the tick picks them up are logged
const INPUT_LATENCY_WARN_MS: u64 = 250;

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub seed: u64,
    pub input_tx: mpsc::Sender<PlayerInput>,
    pub snapshot_tx: broadcast::Sender<ServerMsg>,
    pub hud_rx: watch::Receiver<HudSnapshot>,
    pub player_count: Arc<AtomicUsize>,
}

impl MatchHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    /// Latest published HUD
    pub fn hud(&self) -> HudSnapshot {
        self.hud_rx.borrow().clone()
    }
}

/// Registry of all active matches
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, handle: MatchHandle) {
        self.matches.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.remove(id).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_players(&self) -> usize {
        self.matches
            .iter()
            .map(|m| m.value().player_count())
            .sum()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A freshly created match, as seen by the connection that owns it
pub struct StartedMatch {
    pub handle: MatchHandle,
    /// The player's first pawn
    pub pawn: EntityId,
    /// Subscribed before the first tick, so the opening snapshot is never missed
    pub snapshots: broadcast::Receiver<ServerMsg>,
}

/// Create a single-player match for `player`, register it and spawn its
/// tick loop. The match leaves the registry when the loop finishes, even if
/// it panicked.
pub fn create_match(
    registry: &Arc<MatchRegistry>,
    settings: &MatchSettings,
    player: ControllerId,
) -> StartedMatch {
    let match_id = Uuid::new_v4();
    let seed = settings.seed.unwrap_or_else(rand::random::<u64>);

    let (mut game_match, handle) = GameMatch::new(match_id, seed, settings.clone());
    let pawn = game_match.begin_play(player);
    let snapshots = handle.snapshot_tx.subscribe();
    registry.insert(handle.clone());

    info!(match_id = %match_id, seed, %player, "Created new match");

    let registry = registry.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::spawn(game_match.run()).await {
            error!(match_id = %match_id, error = %e, "Match task failed");
        }

        // Cleanup after match ends
        registry.remove(&match_id);
        info!(match_id = %match_id, "Match removed from registry");
    });

    StartedMatch {
        handle,
        pawn,
        snapshots,
    }
}

/// The authoritative game match
pub struct GameMatch {
    id: Uuid,
    tick: u64,
    world: GameWorld,
    input_rx: mpsc::Receiver<PlayerInput>,
    snapshot_tx: broadcast::Sender<ServerMsg>,
    hud_tx: watch::Sender<HudSnapshot>,
    snapshot_builder: SnapshotBuilder,
    snapshot_stats: SnapshotStats,
    axes: HashMap<ControllerId, AxisLatch>,
    player_count: Arc<AtomicUsize>,
    /// Tick on which the player's pawn went down
    ended_at: Option<u64>,
    player_left: bool,
}

impl GameMatch {
    /// Create a new match
    pub fn new(id: Uuid, seed: u64, settings: MatchSettings) -> (Self, MatchHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (snapshot_tx, _) = broadcast::channel(64);
        let (hud_tx, hud_rx) = watch::channel(HudSnapshot {
            time_elapsed: "00:00".to_string(),
            ..HudSnapshot::default()
        });
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = MatchHandle {
            id,
            seed,
            input_tx,
            snapshot_tx: snapshot_tx.clone(),
            hud_rx,
            player_count: player_count.clone(),
        };

        let snapshot_interval = SIMULATION_TPS / SNAPSHOT_TPS;
        let game_match = Self {
            id,
            tick: 0,
            world: GameWorld::new(settings, seed),
            input_rx,
            snapshot_tx,
            hud_tx,
            snapshot_builder: SnapshotBuilder::new(snapshot_interval),
            snapshot_stats: SnapshotStats::default(),
            axes: HashMap::new(),
            player_count,
            ended_at: None,
            player_left: false,
        };

        (game_match, handle)
    }

    #[cfg(test)]
    pub fn world(&self) -> &GameWorld {
        &self.world
    }

    #[cfg(test)]
    pub fn world_mut(&mut self) -> &mut GameWorld {
        &mut self.world
    }

    /// Lay out the default level and start the match clock: the player's
    /// pawn, a parked sedan and two enemy spawners.
    pub fn begin_play(&mut self, player: ControllerId) -> EntityId {
        let world = &mut self.world;

        world.add_controller_with_id(player, ControllerKind::Player);
        let pawn = world.spawn_entity(EntityTemplate::Character, PLAYER_START, 0.0);
        possession::possess(world, player, pawn);
        world.spawn_entity(EntityTemplate::Sedan, SEDAN_START, 90.0);

        for y in [1500.0, -1500.0] {
            let origin = Vec3::new(3000.0, y, CAPSULE_HALF_HEIGHT);
            let volume = SpawnVolume {
                origin,
                extent: Vec3::new(500.0, 500.0, 0.0),
            };
            let id = spawner::add_spawner(world, volume, Some(EntityTemplate::Character));
            spawner::set_spawning_active(world, id, true);
        }

        world.score.start(&mut world.scheduler);
        ai::start_sensing(world);

        self.axes.insert(player, AxisLatch::default());
        self.player_count.store(1, Ordering::Relaxed);
        self.snapshot_builder.force_next();

        info!(match_id = %self.id, %player, pawn = %pawn, "Match begun");
        pawn
    }

    /// Run the authoritative tick loop
    pub async fn run(mut self) {
        info!(match_id = %self.id, "Match started");

        let tick_duration = Duration::from_micros(1_000_000 / SIMULATION_TPS as u64);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;
            let stopwatch = Stopwatch::start();

            if !self.step() {
                break;
            }

            if stopwatch.overran_tick() {
                warn!(
                    match_id = %self.id,
                    tick = self.tick,
                    micros = stopwatch.elapsed_micros(),
                    "Tick overran its budget"
                );
            }
        }

        info!(
            match_id = %self.id,
            kill_count = self.world.score.kill_count(),
            time_elapsed = %self.world.score.time_elapsed(),
            snapshots = self.snapshot_stats.total_snapshots,
            "Match finished"
        );
    }

    /// Advance the match by one tick. Returns false once the match is over.
    pub fn step(&mut self) -> bool {
        self.process_inputs();
        self.run_tick();
        self.publish();

        if self.player_left {
            info!(match_id = %self.id, "Player left, ending match");
            return false;
        }
        if let Some(ended_at) = self.ended_at {
            let linger = (self.world.settings.post_match_linger_secs.max(0.0) * SIMULATION_TPS as f32) as u64;
            if self.tick.saturating_sub(ended_at) >= linger {
                return false;
            }
        }
        true
    }

    /// Process all pending inputs from players
    fn process_inputs(&mut self) {
        loop {
            let input = match self.input_rx.try_recv() {
                Ok(input) => input,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.handle_leave(None);
                    break;
                }
            };

            if !self.axes.contains_key(&input.controller) {
                warn!(match_id = %self.id, controller = %input.controller, "Input from a stranger");
                continue;
            }

            let latency_ms = unix_millis().saturating_sub(input.received_at);
            if latency_ms > INPUT_LATENCY_WARN_MS {
                warn!(match_id = %self.id, controller = %input.controller, latency_ms, "Input queued too long");
            }

            match input.msg {
                ClientMsg::Action { name, pressed } => {
                    let handled = input::apply_action(&mut self.world, input.controller, name, pressed);
                    if name == ActionName::SwitchPawns && handled {
                        self.snapshot_builder.force_next();
                    }
                    if !handled {
                        debug!(controller = %input.controller, ?name, pressed, "Unbound action");
                    }
                }
                ClientMsg::Axis { name, value } => {
                    if let Some(latch) = self.axes.get_mut(&input.controller) {
                        latch.set(name, value);
                    }
                }
                ClientMsg::Ping { t } => {
                    let _ = self.snapshot_tx.send(ServerMsg::Pong { t });
                }
                ClientMsg::LeaveMatch => {
                    self.handle_leave(Some(input.controller));
                }
            }
        }
    }

    fn handle_leave(&mut self, controller: Option<ControllerId>) {
        if let Some(controller) = controller.or(self.world.player) {
            // the departing player's pawn leaves the world with them
            if let Some(pawn) = self.world.controller(controller).and_then(|c| c.pawn) {
                self.world.remove_entity(pawn);
            }
            self.axes.remove(&controller);
            self.snapshot_builder.force_next();
        }
        self.player_count.store(0, Ordering::Relaxed);
        self.player_left = true;
    }

    /// Run one simulation step
    fn run_tick(&mut self) {
        let dt = tick_delta();
        self.tick += 1;

        for (controller, latch) in &self.axes {
            latch.apply(&mut self.world, *controller, dt);
        }

        self.world.scheduler.advance(dt);
        self.world.run_timers();
        ai::update_ai(&mut self.world);
        self.world.step_kinematics(dt);
        self.world.resolve_overlaps();

        if self.ended_at.is_none() && self.world.score.has_ended() {
            self.ended_at = Some(self.tick);
            info!(
                match_id = %self.id,
                tick = self.tick,
                kill_count = self.world.score.kill_count(),
                time_elapsed = %self.world.score.time_elapsed(),
                "Match ended"
            );
            let _ = self.snapshot_tx.send(ServerMsg::MatchEnded {
                kill_count: self.world.score.kill_count(),
                time_elapsed: self.world.score.time_elapsed(),
            });
            self.snapshot_builder.force_next();
        }
    }

    /// Push the HUD and, when due, a snapshot
    fn publish(&mut self) {
        let hud = snapshot::hud(&self.world);
        self.hud_tx.send_if_modified(|current| {
            if *current != hud {
                *current = hud;
                true
            } else {
                false
            }
        });

        if self.snapshot_builder.should_send() {
            let events = self.world.take_events();
            let snapshot = self.snapshot_builder.build(self.tick, &self.world, events);
            if let Ok(bytes) = serde_json::to_vec(&snapshot) {
                self.snapshot_stats.record(self.world.entity_count(), bytes.len());
            }

            // Broadcast to all connected clients
            let _ = self.snapshot_tx.send(snapshot);
        }
    }
}
