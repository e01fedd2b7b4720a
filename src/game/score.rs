//! Kill count and match clock

use tracing::info;

use super::scheduler::{Scheduler, TimerHandle};
use super::world::TimerEvent;

/// Counters of a running match. Both only ever go up.
#[derive(Debug, Default)]
pub struct MatchState {
    kill_count: u32,
    time_elapsed: u32,
    elapsed_timer: Option<TimerHandle>,
    ended: bool,
}

impl MatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the one-second match clock
    pub fn start(&mut self, scheduler: &mut Scheduler<TimerEvent>) {
        if self.ended {
            return;
        }
        scheduler.set_timer(
            &mut self.elapsed_timer,
            1.0,
            true,
            TimerEvent::IncrementTimeElapsed,
        );
    }

    pub fn increment_kill_count(&mut self, amount: u32) {
        self.kill_count = self.kill_count.saturating_add(amount);
    }

    pub fn increment_time_elapsed(&mut self) {
        self.time_elapsed = self.time_elapsed.saturating_add(1);
    }

    pub fn kill_count(&self) -> u32 {
        self.kill_count
    }

    /// Elapsed match time as `MM:SS`
    pub fn time_elapsed(&self) -> String {
        format_time_elapsed(self.time_elapsed)
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// Stop the match clock. Safe to call more than once.
    pub fn end_game(&mut self, scheduler: &mut Scheduler<TimerEvent>) {
        scheduler.clear_timer(&mut self.elapsed_timer);
        if !self.ended {
            self.ended = true;
            info!(
                kill_count = self.kill_count,
                time_elapsed = %self.time_elapsed(),
                "Game over"
            );
        }
    }
}

/// Format seconds as minutes and seconds, each zero padded to two digits.
/// Minutes keep counting past 99.
pub fn format_time_elapsed(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
