use crate::frequency::{interval_to_frequency, map_frequency, TickPlan, TimerSpec};
use crate::runner::{IntervalRunner, Repeat, RunnerState, TickOutcome};
use crate::{CompareTimer, TimerError, TimerResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChannelId(pub u8);

/// What to run when a logical period completes. Runs in interrupt context.
#[derive(Clone, Copy, Debug)]
pub enum Callback {
    Plain(fn()),
    WithArg(fn(u32), u32),
}

impl Callback {
    pub fn invoke(&self) {
        match *self {
            Callback::Plain(f) => f(),
            Callback::WithArg(f, arg) => f(arg),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Free,
    Running,
    /// Clock gated, tick position kept.
    Paused,
    /// Interrupt off, binding kept.
    Detached,
    /// Ran out of repeats. Counts as free but can be restarted.
    Exhausted,
}

fn millihertz(frequency: f32) -> u32 {
    (frequency * 1000.0) as u32
}

pub struct Channel<H: CompareTimer> {
    id: ChannelId,
    spec: TimerSpec,
    hw: H,
    callback: Option<Callback>,
    frequency: f32,
    plan: TickPlan,
    runner: IntervalRunner,
    state: ChannelState,
}

impl<H: CompareTimer> Channel<H> {
    pub fn new(id: ChannelId, hw: H, spec: TimerSpec) -> Self {
        Self {
            id,
            spec,
            hw,
            callback: None,
            frequency: 0.0,
            plan: TickPlan::default(),
            runner: IntervalRunner::new(spec.counter_max),
            state: ChannelState::Free,
        }
    }

    pub fn id(&self) -> ChannelId { self.id }
    pub fn spec(&self) -> &TimerSpec { &self.spec }
    pub fn state(&self) -> ChannelState { self.state }
    pub fn frequency(&self) -> f32 { self.frequency }
    pub fn divider(&self) -> u16 { self.plan.divider }
    pub fn full_ticks(&self) -> u32 { self.plan.full_ticks }
    pub fn remaining_ticks(&self) -> u32 { self.runner.remaining_ticks() }
    pub fn runner_state(&self) -> RunnerState { self.runner.state() }
    pub fn hardware(&self) -> &H { &self.hw }

    pub fn is_free(&self) -> bool {
        matches!(self.state, ChannelState::Free | ChannelState::Exhausted)
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.state, ChannelState::Running | ChannelState::Paused)
    }

    /// Callbacks still owed before the channel exhausts itself.
    pub fn count(&self) -> Repeat { self.runner.repeat() }

    pub fn set_count(&mut self, repeat: Repeat) {
        self.runner.set_repeat(repeat);
    }

    fn plan_for(&self, frequency: f32) -> TimerResult<TickPlan> {
        let plan = map_frequency(frequency, &self.spec).map_err(|e| {
            log_warn!("ch {} rejected {} mHz", self.id.0, millihertz(frequency));
            e
        })?;
        log_info!("ch {} divider {} ticks {}", self.id.0, plan.divider, plan.full_ticks);
        Ok(plan)
    }

    fn require_bound(&self) -> TimerResult<Callback> {
        match (self.callback, self.state) {
            (Some(callback), state) if state != ChannelState::Free => Ok(callback),
            _ => Err(TimerError::InvalidChannel),
        }
    }

    fn commit(&mut self, frequency: f32, plan: TickPlan, repeat: Repeat) {
        let paused = self.state == ChannelState::Paused;
        self.hw.disable_interrupt();
        let first = self.runner.load(plan.full_ticks, repeat);
        self.hw.configure(plan.divider, first);
        self.hw.clear_pending_flag();
        self.frequency = frequency;
        self.plan = plan;

        if self.runner.state() == RunnerState::Exhausted {
            self.hw.pause_clock();
            self.state = ChannelState::Exhausted;
            return;
        }
        self.hw.enable_interrupt();
        if paused {
            self.hw.pause_clock();
        } else {
            self.state = ChannelState::Running;
        }
    }

    /// Bind `callback` to fire at `frequency` Hz. Nothing changes on failure.
    pub fn bind_raw(&mut self, frequency: f32, callback: Option<Callback>, repeat: Repeat) -> TimerResult<()> {
        let Some(callback) = callback else {
            log_warn!("ch {} no callback", self.id.0);
            return Err(TimerError::RejectedFrequency);
        };
        let plan = self.plan_for(frequency)?;
        self.bind_planned(frequency, callback, plan, repeat)
    }

    fn bind_planned(&mut self, frequency: f32, callback: Callback, plan: TickPlan, repeat: Repeat) -> TimerResult<()> {
        if repeat.is_exhausted() {
            return Err(TimerError::DurationTooShort);
        }
        self.callback = Some(callback);
        self.state = ChannelState::Free;
        self.commit(frequency, plan, repeat);
        log_info!("ch {} bound at {} mHz", self.id.0, millihertz(frequency));
        Ok(())
    }

    pub fn bind(&mut self, frequency: f32, callback: Callback, repeat: Repeat) -> TimerResult<()> {
        self.bind_raw(frequency, Some(callback), repeat)
    }

    pub fn bind_interval(&mut self, interval_ms: u32, callback: Callback, repeat: Repeat) -> TimerResult<()> {
        self.bind(interval_to_frequency(interval_ms), callback, repeat)
    }

    /// Run for `duration_ms`, 0 runs forever.
    pub fn bind_for(&mut self, frequency: f32, callback: Callback, duration_ms: u32) -> TimerResult<()> {
        // a rejected frequency wins over a too short duration
        let plan = self.plan_for(frequency)?;
        let repeat = Repeat::from_duration(frequency, duration_ms)?;
        self.bind_planned(frequency, callback, plan, repeat)
    }

    /// Turn the interrupt off but keep the binding for a later `restart`.
    pub fn detach(&mut self) -> TimerResult<()> {
        self.require_bound()?;
        self.hw.disable_interrupt();
        self.hw.clear_pending_flag();
        if self.state != ChannelState::Exhausted {
            self.state = ChannelState::Detached;
        }
        log_info!("ch {} detached", self.id.0);
        Ok(())
    }

    /// Release the channel, losing the callback and tick position.
    pub fn stop(&mut self) {
        self.hw.disable_interrupt();
        self.hw.clear_pending_flag();
        self.hw.pause_clock();
        self.callback = None;
        self.state = ChannelState::Free;
        log_info!("ch {} stopped", self.id.0);
    }

    pub fn pause(&mut self) -> TimerResult<()> {
        self.require_bound()?;
        self.hw.pause_clock();
        if self.state == ChannelState::Running {
            self.state = ChannelState::Paused;
        }
        log_info!("ch {} paused, {} ticks left", self.id.0, self.runner.remaining_ticks());
        Ok(())
    }

    pub fn resume(&mut self) -> TimerResult<()> {
        self.require_bound()?;
        self.hw.resume_clock();
        if self.state == ChannelState::Paused {
            self.state = ChannelState::Running;
        }
        log_info!("ch {} resumed", self.id.0);
        Ok(())
    }

    /// Start the current period over. `duration_ms` resets the repeat count, 0 runs forever.
    pub fn restart(&mut self, duration_ms: u32) -> TimerResult<()> {
        self.require_bound()?;
        let repeat = Repeat::from_duration(self.frequency, duration_ms)?;
        self.hw.disable_interrupt();
        let first = self.runner.rewind(repeat);
        self.hw.configure(self.plan.divider, first);
        self.hw.clear_pending_flag();
        self.hw.enable_interrupt();
        self.state = ChannelState::Running;
        log_info!("ch {} restarted", self.id.0);
        Ok(())
    }

    /// Remap to a new frequency keeping the callback and the repeat count.
    pub fn change_frequency(&mut self, frequency: f32) -> TimerResult<()> {
        self.require_bound()?;
        let plan = self.plan_for(frequency)?;
        let repeat = self.runner.repeat();
        self.commit(frequency, plan, repeat);
        Ok(())
    }

    pub fn change_interval(&mut self, interval_ms: u32) -> TimerResult<()> {
        self.change_frequency(interval_to_frequency(interval_ms))
    }

    /// Compare match entry point, called from the channel's interrupt vector.
    pub fn on_interrupt(&mut self) -> TickOutcome {
        let Some(callback) = self.callback else {
            self.hw.disable_interrupt();
            return TickOutcome::Exhausted;
        };
        let outcome = self.runner.on_compare_match(&mut self.hw, || callback.invoke());
        match outcome {
            TickOutcome::Chained => {}
            TickOutcome::Fired => log_debug!("ch {} reload {}", self.id.0, self.plan.full_ticks),
            TickOutcome::FiredLast | TickOutcome::Exhausted => {
                if self.state != ChannelState::Exhausted {
                    log_warn!("ch {} done", self.id.0);
                }
                self.state = ChannelState::Exhausted;
            }
        }
        outcome
    }
}
