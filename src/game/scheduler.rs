//! Timed events driven by the simulation clock
//!
//! The scheduler never runs callbacks itself. The match loop advances the
//! clock once per tick and then drains due events one at a time with
//! [`Scheduler::pop_due`], handling each before asking for the next. A
//! handler is therefore free to schedule, replace or cancel any timer,
//! including the one that just fired, and a timer cancelled by an earlier
//! handler in the same drain never fires.

use std::collections::HashMap;

/// Shortest allowed period of a repeating timer (seconds)
pub const MIN_REPEAT_INTERVAL: f64 = 0.001;

/// Identity of a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone)]
struct TimerEntry<E> {
    due: f64,
    interval: f64,
    repeating: bool,
    /// Tie breaker so timers due at the same instant fire in schedule order
    seq: u64,
    event: E,
}

/// A set of one-shot and repeating timers
#[derive(Debug)]
pub struct Scheduler<E> {
    now: f64,
    next_id: u64,
    next_seq: u64,
    timers: HashMap<TimerHandle, TimerEntry<E>>,
}

impl<E: Clone> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            now: 0.0,
            next_id: 1,
            next_seq: 0,
            timers: HashMap::new(),
        }
    }

    /// Current simulation time in seconds
    #[cfg(test)]
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Number of live timers
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Schedule `event` to fire after `delay` seconds, every `delay` seconds
    /// when `repeating`. Negative or non-finite delays are treated as zero.
    pub fn schedule(&mut self, delay: f32, repeating: bool, event: E) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.insert(handle, delay, repeating, event);
        handle
    }

    /// Cancel a timer. Returns false when it had already fired or been
    /// cancelled, which is not an error.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.timers.remove(&handle).is_some()
    }

    #[cfg(test)]
    pub fn is_active(&self, handle: TimerHandle) -> bool {
        self.timers.contains_key(&handle)
    }

    /// Arm the timer stored in `slot`, replacing whatever it held before.
    /// The slot keeps its handle identity across re-arming.
    pub fn set_timer(
        &mut self,
        slot: &mut Option<TimerHandle>,
        delay: f32,
        repeating: bool,
        event: E,
    ) -> TimerHandle {
        match *slot {
            Some(handle) => {
                self.timers.remove(&handle);
                self.insert(handle, delay, repeating, event);
                handle
            }
            None => {
                let handle = self.schedule(delay, repeating, event);
                *slot = Some(handle);
                handle
            }
        }
    }

    /// Cancel the timer stored in `slot` (if any) and empty the slot
    pub fn clear_timer(&mut self, slot: &mut Option<TimerHandle>) {
        if let Some(handle) = slot.take() {
            self.cancel(handle);
        }
    }

    /// True when `slot` holds a timer that is still pending
    #[cfg(test)]
    pub fn is_timer_active(&self, slot: &Option<TimerHandle>) -> bool {
        slot.map(|handle| self.is_active(handle)).unwrap_or(false)
    }

    /// Move the clock forward. Due timers are collected with [`pop_due`].
    ///
    /// [`pop_due`]: Scheduler::pop_due
    pub fn advance(&mut self, dt: f32) {
        if dt.is_finite() && dt > 0.0 {
            self.now += dt as f64;
        }
    }

    /// Take the earliest timer that is due at the current time.
    ///
    /// One-shot timers are removed. Repeating timers are re-armed one period
    /// later before being returned, so a repeating timer that fell several
    /// periods behind fires once per missed period.
    pub fn pop_due(&mut self) -> Option<(TimerHandle, E)> {
        let handle = self
            .timers
            .iter()
            .filter(|(_, entry)| entry.due <= self.now)
            .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.seq.cmp(&b.seq)))
            .map(|(handle, _)| *handle)?;

        let entry = self.timers.get_mut(&handle)?;
        if entry.repeating {
            entry.due += entry.interval;
            entry.seq = self.next_seq;
            self.next_seq += 1;
            Some((handle, entry.event.clone()))
        } else {
            self.timers.remove(&handle).map(|entry| (handle, entry.event))
        }
    }

    fn insert(&mut self, handle: TimerHandle, delay: f32, repeating: bool, event: E) {
        let delay = if delay.is_finite() { delay.max(0.0) as f64 } else { 0.0 };
        let interval = if repeating {
            delay.max(MIN_REPEAT_INTERVAL)
        } else {
            delay
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.insert(
            handle,
            TimerEntry {
                due: self.now + interval,
                interval,
                repeating,
                seq,
                event,
            },
        );
    }
}

impl<E: Clone> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(scheduler: &mut Scheduler<&'static str>) -> Vec<&'static str> {
        let mut fired = Vec::new();
        while let Some((_, event)) = scheduler.pop_due() {
            fired.push(event);
        }
        fired
    }

    #[test]
    fn one_shot_fires_exactly_once() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule(1.0, false, "once");

        scheduler.advance(0.5);
        assert!(drain(&mut scheduler).is_empty());

        scheduler.advance(0.5);
        assert_eq!(drain(&mut scheduler), vec!["once"]);
        assert!(!scheduler.is_active(handle));

        scheduler.advance(5.0);
        assert!(drain(&mut scheduler).is_empty());
    }

    #[test]
    fn repeating_fires_every_interval_until_cancelled() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule(1.0, true, "tick");

        for _ in 0..3 {
            scheduler.advance(1.0);
            assert_eq!(drain(&mut scheduler), vec!["tick"]);
        }

        assert!(scheduler.cancel(handle));
        scheduler.advance(1.0);
        assert!(drain(&mut scheduler).is_empty());
    }

    #[test]
    fn repeating_catches_up_missed_periods() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(0.25, true, "tick");
        scheduler.advance(1.0);
        assert_eq!(drain(&mut scheduler).len(), 4);
    }

    #[test]
    fn double_cancel_is_a_no_op() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule(1.0, false, "never");

        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));

        scheduler.advance(2.0);
        assert!(drain(&mut scheduler).is_empty());
        assert!(!scheduler.cancel(handle));
    }

    #[test]
    fn cancelling_a_fired_one_shot_is_a_no_op() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule(0.1, false, "done");
        scheduler.advance(0.2);
        assert_eq!(drain(&mut scheduler), vec!["done"]);
        assert!(!scheduler.cancel(handle));
    }

    #[test]
    fn set_timer_replaces_and_keeps_identity() {
        let mut scheduler = Scheduler::new();
        let mut slot = None;

        let first = scheduler.set_timer(&mut slot, 1.0, false, "old");
        let second = scheduler.set_timer(&mut slot, 3.0, false, "new");
        assert_eq!(first, second);
        assert_eq!(scheduler.len(), 1);

        scheduler.advance(1.5);
        assert!(drain(&mut scheduler).is_empty());
        scheduler.advance(1.5);
        assert_eq!(drain(&mut scheduler), vec!["new"]);
    }

    #[test]
    fn clear_timer_empties_the_slot() {
        let mut scheduler = Scheduler::new();
        let mut slot = None;
        scheduler.set_timer(&mut slot, 1.0, true, "tick");
        assert!(scheduler.is_timer_active(&slot));

        scheduler.clear_timer(&mut slot);
        assert!(slot.is_none());
        assert!(!scheduler.is_timer_active(&slot));

        // clearing an empty slot is fine
        scheduler.clear_timer(&mut slot);
        scheduler.advance(2.0);
        assert!(drain(&mut scheduler).is_empty());
    }

    #[test]
    fn handler_can_cancel_a_timer_due_in_the_same_drain() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(1.0, false, "first");
        let victim = scheduler.schedule(1.0, false, "second");

        scheduler.advance(1.0);
        let (_, event) = scheduler.pop_due().expect("first is due");
        assert_eq!(event, "first");
        scheduler.cancel(victim);
        assert!(scheduler.pop_due().is_none());
    }

    #[test]
    fn handler_can_cancel_its_own_repeating_timer() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(0.5, true, "shot");
        scheduler.advance(1.0);

        let (handle, _) = scheduler.pop_due().expect("due");
        scheduler.cancel(handle);
        assert!(scheduler.pop_due().is_none());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn handler_can_reschedule_itself_with_a_new_delay() {
        let mut scheduler = Scheduler::new();
        let mut slot = None;
        scheduler.set_timer(&mut slot, 1.0, false, "spawn");

        scheduler.advance(1.0);
        let (_, event) = scheduler.pop_due().expect("due");
        assert_eq!(event, "spawn");
        scheduler.set_timer(&mut slot, 2.0, false, "spawn");
        assert!(scheduler.pop_due().is_none());

        scheduler.advance(2.0);
        assert_eq!(drain(&mut scheduler), vec!["spawn"]);
    }

    #[test]
    fn same_instant_timers_fire_in_schedule_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(1.0, false, "a");
        scheduler.schedule(1.0, false, "b");
        scheduler.schedule(0.5, false, "early");
        scheduler.advance(1.0);
        assert_eq!(drain(&mut scheduler), vec!["early", "a", "b"]);
    }

    #[test]
    fn zero_interval_repeat_does_not_spin_forever() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(0.0, true, "spin");
        scheduler.advance(0.01);
        let fired = drain(&mut scheduler).len();
        assert!(fired >= 1 && fired <= 11, "fired {fired} times");
    }

    #[test]
    fn invalid_delays_are_treated_as_zero() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(-3.0, false, "neg");
        scheduler.schedule(f32::NAN, false, "nan");
        assert_eq!(drain(&mut scheduler), vec!["neg", "nan"]);
    }
}
