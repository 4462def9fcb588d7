//! Interrupt time state machine that stretches one short hardware period
//! into an arbitrarily long logical period.
//!
//! The runner keeps the part of `full_ticks` that has not been handed to the
//! hardware yet. Every compare match either loads the next chunk or, once the
//! whole period has elapsed, fires the callback and starts the next period.

use crate::{CompareTimer, TimerError, TimerResult};

/// How many callbacks a channel still owes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Repeat {
    #[default]
    Forever,
    Times(u32),
}

impl Repeat {
    /// Number of whole periods of `frequency` that fit in `duration_ms`. Zero means forever.
    pub fn from_duration(frequency: f32, duration_ms: u32) -> TimerResult<Self> {
        if duration_ms == 0 {
            return Ok(Repeat::Forever);
        }
        let runs = frequency as f64 * duration_ms as f64 / 1000.0;
        if !(runs >= 1.0) {
            return Err(TimerError::DurationTooShort);
        }
        Ok(Repeat::Times(runs as u32))
    }

    pub fn is_exhausted(&self) -> bool {
        *self == Repeat::Times(0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunnerState {
    /// A chunk is loaded and `remaining_ticks` still holds part of the period.
    ArmedWaiting,
    /// The chunk in flight is the last of the period.
    PeriodComplete,
    Exhausted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Chained,
    Fired,
    /// Fired and used up the last repeat, the interrupt is now disabled.
    FiredLast,
    /// Event arrived after exhaustion and was ignored.
    Exhausted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntervalRunner {
    counter_max: u32,
    full_ticks: u32,
    remaining_ticks: u32,
    done: bool,
    repeat: Repeat,
    exhausted: bool,
}

impl IntervalRunner {
    pub fn new(counter_max: u32) -> Self {
        Self {
            counter_max: counter_max.max(1),
            full_ticks: 0,
            remaining_ticks: 0,
            done: false,
            repeat: Repeat::Forever,
            exhausted: false,
        }
    }

    pub fn counter_max(&self) -> u32 { self.counter_max }
    pub fn full_ticks(&self) -> u32 { self.full_ticks }
    pub fn remaining_ticks(&self) -> u32 { self.remaining_ticks }
    pub fn done(&self) -> bool { self.done }
    pub fn repeat(&self) -> Repeat { self.repeat }

    pub fn set_repeat(&mut self, repeat: Repeat) {
        self.repeat = repeat;
        self.exhausted = repeat.is_exhausted();
    }

    pub fn state(&self) -> RunnerState {
        if self.exhausted {
            RunnerState::Exhausted
        } else if self.done {
            RunnerState::PeriodComplete
        } else {
            RunnerState::ArmedWaiting
        }
    }

    fn take_chunk(&mut self) -> u32 {
        let chunk = self.counter_max.min(self.remaining_ticks);
        self.remaining_ticks -= chunk;
        self.done = self.remaining_ticks == 0;
        chunk
    }

    /// Seed a new period of `full_ticks`. Returns the first chunk for the compare register.
    pub fn load(&mut self, full_ticks: u32, repeat: Repeat) -> u32 {
        self.full_ticks = full_ticks;
        self.rewind(repeat)
    }

    /// Start over from the beginning of the period with the same `full_ticks`.
    pub fn rewind(&mut self, repeat: Repeat) -> u32 {
        self.set_repeat(repeat);
        self.remaining_ticks = self.full_ticks;
        self.take_chunk()
    }

    /// Handle one compare match. `fire` runs at most once, only when a full
    /// period has elapsed.
    pub fn on_compare_match<H, F>(&mut self, hw: &mut H, fire: F) -> TickOutcome
    where
        H: CompareTimer,
        F: FnOnce(),
    {
        if self.exhausted || self.repeat.is_exhausted() {
            self.exhausted = true;
            hw.disable_interrupt();
            return TickOutcome::Exhausted;
        }

        if !self.done {
            let chunk = self.take_chunk();
            hw.arm_next_chunk(chunk);
            return TickOutcome::Chained;
        }

        fire();
        self.remaining_ticks = self.full_ticks;
        let chunk = self.take_chunk();

        if let Repeat::Times(left) = self.repeat {
            let left = left - 1;
            self.repeat = Repeat::Times(left);
            if left == 0 {
                self.exhausted = true;
                hw.disable_interrupt();
                return TickOutcome::FiredLast;
            }
        }

        hw.arm_next_chunk(chunk);
        hw.enable_interrupt();
        TickOutcome::Fired
    }
}

#[cfg(test)]
mod tests {
    use crate::hardware::mock::{MockTimer, Op};
    use crate::{map_frequency, TimerSpec, MAX_COUNT_16BIT, MAX_COUNT_8BIT};
    use super::*;

    fn arm(runner: &mut IntervalRunner, hw: &mut MockTimer, full: u32, repeat: Repeat) {
        let first = runner.load(full, repeat);
        hw.configure(1, first);
        hw.enable_interrupt();
        hw.clear_log();
    }

    /// Drive events until something other than a chained reload happens.
    fn run_period(runner: &mut IntervalRunner, hw: &mut MockTimer, fired: &mut u32) -> (u32, TickOutcome) {
        let mut events = 0;
        loop {
            events += 1;
            let outcome = runner.on_compare_match(hw, || *fired += 1);
            if outcome != TickOutcome::Chained {
                return (events, outcome);
            }
        }
    }

    #[test]
    fn repeat_from_duration() {
        assert_eq!(Repeat::from_duration(10.0, 0), Ok(Repeat::Forever));
        assert_eq!(Repeat::from_duration(10.0, 1000), Ok(Repeat::Times(10)));
        assert_eq!(Repeat::from_duration(1.0, 2500), Ok(Repeat::Times(2)));
        assert_eq!(Repeat::from_duration(1.0, 999), Err(TimerError::DurationTooShort));
        assert_eq!(Repeat::from_duration(f32::NAN, 1000), Err(TimerError::DurationTooShort));
    }

    #[test]
    fn short_period_fires_every_event() {
        let mut hw = MockTimer::default();
        let mut runner = IntervalRunner::new(MAX_COUNT_16BIT);
        arm(&mut runner, &mut hw, 15_999, Repeat::Forever);
        assert_eq!(runner.state(), RunnerState::PeriodComplete);

        let mut fired = 0;
        for _ in 0..5 {
            assert_eq!(runner.on_compare_match(&mut hw, || fired += 1), TickOutcome::Fired);
        }
        assert_eq!(fired, 5);
        assert_eq!(hw.arms().all(|c| c == 15_999), true);
    }

    #[test]
    fn one_hz_chains_chunks() {
        let plan = map_frequency(1.0, &TimerSpec::avr_16bit(16_000_000)).unwrap();
        let mut hw = MockTimer::default();
        let mut runner = IntervalRunner::new(MAX_COUNT_16BIT);
        let first = runner.load(plan.full_ticks, Repeat::Forever);
        assert_eq!(first, MAX_COUNT_16BIT);
        assert_eq!(runner.remaining_ticks(), plan.full_ticks - MAX_COUNT_16BIT);

        let mut fired = 0;
        let (events, outcome) = run_period(&mut runner, &mut hw, &mut fired);
        assert_eq!(outcome, TickOutcome::Fired);
        assert_eq!(fired, 1);
        assert_eq!(events, plan.chunks_per_period(MAX_COUNT_16BIT));
        // 244 reloads chained after the first chunk, then the callback
        assert_eq!(hw.ops.iter().filter(|op| matches!(op, Op::Arm(_))).count(), 245);
    }

    #[test]
    fn chained_reloads_only_move_compare() {
        let mut hw = MockTimer::default();
        let mut runner = IntervalRunner::new(MAX_COUNT_16BIT);
        runner.load(16_000_000, Repeat::Forever);
        let mut fired = 0;
        for _ in 1..runner.full_ticks().div_ceil(MAX_COUNT_16BIT) {
            assert_eq!(runner.on_compare_match(&mut hw, || fired += 1), TickOutcome::Chained);
        }
        assert_eq!(fired, 0);
        // the counter keeps the ticks it gathered before the handler ran
        assert!(hw.ops.iter().all(|op| matches!(op, Op::Arm(_))));
        assert_eq!(hw.ops.len(), 244);
    }

    #[test]
    fn chunks_sum_to_full_ticks() {
        for (counter_max, full) in [(MAX_COUNT_16BIT, 15_999_999u32), (MAX_COUNT_8BIT, 15_999), (MAX_COUNT_8BIT, 510), (MAX_COUNT_16BIT, 1), (MAX_COUNT_16BIT, 0)] {
            let mut hw = MockTimer::default();
            let mut runner = IntervalRunner::new(counter_max);
            runner.load(full, Repeat::Forever);
            let mut fired = 0;
            run_period(&mut runner, &mut hw, &mut fired);

            // from here on the callback arms the first chunk of the next
            // period, so the chunks armed between two callbacks cover one period
            hw.clear_log();
            run_period(&mut runner, &mut hw, &mut fired);
            let total: u64 = hw.arms().map(|c| c as u64).sum();
            assert_eq!(total, full as u64);
            assert_eq!(hw.arms().all(|c| c <= counter_max), true);
            assert_eq!(runner.remaining_ticks() <= runner.full_ticks(), true);
        }
    }

    #[test]
    fn finite_repeats_disable_after_last() {
        let mut hw = MockTimer::default();
        let mut runner = IntervalRunner::new(MAX_COUNT_8BIT);
        arm(&mut runner, &mut hw, 1000, Repeat::Times(3));

        let mut fired = 0;
        assert_eq!(run_period(&mut runner, &mut hw, &mut fired).1, TickOutcome::Fired);
        assert_eq!(run_period(&mut runner, &mut hw, &mut fired).1, TickOutcome::Fired);
        assert_eq!(runner.repeat(), Repeat::Times(1));
        assert_eq!(run_period(&mut runner, &mut hw, &mut fired).1, TickOutcome::FiredLast);
        assert_eq!(fired, 3);
        assert_eq!(hw.interrupt_enabled, false);
        assert_eq!(runner.state(), RunnerState::Exhausted);

        // a stray pending event does nothing
        assert_eq!(runner.on_compare_match(&mut hw, || fired += 1), TickOutcome::Exhausted);
        assert_eq!(fired, 3);
    }

    #[test]
    fn zero_repeats_is_exhausted_immediately() {
        let mut hw = MockTimer::default();
        let mut runner = IntervalRunner::new(MAX_COUNT_8BIT);
        arm(&mut runner, &mut hw, 10, Repeat::Times(0));
        let mut fired = 0;
        assert_eq!(runner.on_compare_match(&mut hw, || fired += 1), TickOutcome::Exhausted);
        assert_eq!(fired, 0);
        assert_eq!(hw.ops.as_slice(), &[Op::Disable]);
    }

    #[test]
    fn forever_never_exhausts() {
        let mut hw = MockTimer::default();
        let mut runner = IntervalRunner::new(MAX_COUNT_8BIT);
        arm(&mut runner, &mut hw, 700, Repeat::Forever);
        let mut fired = 0;
        for _ in 0..100 {
            assert_eq!(run_period(&mut runner, &mut hw, &mut fired).1, TickOutcome::Fired);
            hw.clear_log();
        }
        assert_eq!(fired, 100);
        assert_ne!(runner.state(), RunnerState::Exhausted);
    }

    #[test]
    fn rewind_restores_full_period() {
        let mut hw = MockTimer::default();
        let mut runner = IntervalRunner::new(MAX_COUNT_8BIT);
        arm(&mut runner, &mut hw, 1000, Repeat::Times(1));
        runner.on_compare_match(&mut hw, || {});
        runner.on_compare_match(&mut hw, || {});
        assert_eq!(runner.remaining_ticks(), 1000 - 3 * 255);

        assert_eq!(runner.rewind(Repeat::Times(2)), 255);
        assert_eq!(runner.remaining_ticks(), 1000 - 255);
        assert_eq!(runner.state(), RunnerState::ArmedWaiting);
        assert_eq!(runner.repeat(), Repeat::Times(2));
    }
}
