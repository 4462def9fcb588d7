//! Millisecond timers multiplexed on one periodic tick.
//!
//! `run` is expected to be called from a hardware channel callback with the
//! current millisecond count. A timer that is late by several periods fires
//! once and skips the missed periods instead of bursting.

use arrayvec::ArrayVec;

use crate::{Callback, Repeat, TimerError, TimerResult};

pub const MAX_SOFT_TIMERS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotId(pub u8);

#[derive(Clone, Copy, Debug)]
struct Slot {
    callback: Callback,
    delay_ms: u32,
    prev_ms: u32,
    repeat: Repeat,
    enabled: bool,
}

pub struct SoftTimers<const N: usize = MAX_SOFT_TIMERS> {
    slots: [Option<Slot>; N],
}

impl<const N: usize> Default for SoftTimers<N> {
    fn default() -> Self { Self::new() }
}

impl<const N: usize> SoftTimers<N> {
    pub const fn new() -> Self {
        Self { slots: [None; N] }
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    fn slot(&self, id: SlotId) -> TimerResult<&Slot> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref()).ok_or(TimerError::InvalidChannel)
    }

    fn slot_mut(&mut self, id: SlotId) -> TimerResult<&mut Slot> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.as_mut()).ok_or(TimerError::InvalidChannel)
    }

    /// Schedule `callback` every `delay_ms`, `repeat` times.
    pub fn set_timer(&mut self, delay_ms: u32, callback: Callback, repeat: Repeat, now_ms: u32) -> TimerResult<SlotId> {
        if delay_ms == 0 {
            return Err(TimerError::InvalidInterval);
        }
        if repeat.is_exhausted() {
            return Err(TimerError::DurationTooShort);
        }
        let Some(index) = self.slots.iter().position(|s| s.is_none()) else {
            log_warn!("soft timers full");
            return Err(TimerError::NoFreeChannel);
        };
        self.slots[index] = Some(Slot { callback, delay_ms, prev_ms: now_ms, repeat, enabled: true });
        Ok(SlotId(index as u8))
    }

    pub fn set_interval(&mut self, delay_ms: u32, callback: Callback, now_ms: u32) -> TimerResult<SlotId> {
        self.set_timer(delay_ms, callback, Repeat::Forever, now_ms)
    }

    pub fn set_timeout(&mut self, delay_ms: u32, callback: Callback, now_ms: u32) -> TimerResult<SlotId> {
        self.set_timer(delay_ms, callback, Repeat::Times(1), now_ms)
    }

    /// Fire every due timer. Returns how many callbacks ran.
    pub fn run(&mut self, now_ms: u32) -> usize {
        // (slot, delete after the call)
        let mut due: ArrayVec<(usize, bool), N> = ArrayVec::new();
        for (index, entry) in self.slots.iter_mut().enumerate() {
            let Some(slot) = entry else { continue };
            let elapsed = now_ms.wrapping_sub(slot.prev_ms);
            if elapsed < slot.delay_ms {
                continue;
            }
            let skipped = elapsed / slot.delay_ms;
            slot.prev_ms = slot.prev_ms.wrapping_add(slot.delay_ms.wrapping_mul(skipped));
            if !slot.enabled {
                continue;
            }
            match slot.repeat {
                Repeat::Forever => due.push((index, false)),
                Repeat::Times(left) => {
                    slot.repeat = Repeat::Times(left - 1);
                    due.push((index, left == 1));
                }
            }
        }

        for &(index, delete) in &due {
            if let Some(slot) = self.slots[index] {
                slot.callback.invoke();
            }
            if delete {
                self.slots[index] = None;
            }
        }
        due.len()
    }

    pub fn change_interval(&mut self, id: SlotId, delay_ms: u32, now_ms: u32) -> TimerResult<()> {
        if delay_ms == 0 {
            return Err(TimerError::InvalidInterval);
        }
        let slot = self.slot_mut(id)?;
        slot.delay_ms = delay_ms;
        slot.prev_ms = now_ms;
        Ok(())
    }

    pub fn delete(&mut self, id: SlotId) -> TimerResult<()> {
        self.slot(id)?;
        self.slots[id.0 as usize] = None;
        Ok(())
    }

    /// Count the current period from `now_ms`.
    pub fn restart(&mut self, id: SlotId, now_ms: u32) -> TimerResult<()> {
        self.slot_mut(id)?.prev_ms = now_ms;
        Ok(())
    }

    pub fn is_enabled(&self, id: SlotId) -> bool {
        self.slot(id).map(|s| s.enabled).unwrap_or(false)
    }

    pub fn enable(&mut self, id: SlotId) -> TimerResult<()> {
        self.slot_mut(id)?.enabled = true;
        Ok(())
    }

    pub fn disable(&mut self, id: SlotId) -> TimerResult<()> {
        self.slot_mut(id)?.enabled = false;
        Ok(())
    }

    pub fn toggle(&mut self, id: SlotId) -> TimerResult<()> {
        let slot = self.slot_mut(id)?;
        slot.enabled = !slot.enabled;
        Ok(())
    }

    // Only forever timers, a finite timer keeps whatever state it was given.
    pub fn enable_all(&mut self) {
        self.set_all_forever(true);
    }

    pub fn disable_all(&mut self) {
        self.set_all_forever(false);
    }

    fn set_all_forever(&mut self, enabled: bool) {
        for slot in self.slots.iter_mut().flatten() {
            if slot.repeat == Repeat::Forever {
                slot.enabled = enabled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicU32, Ordering};
    use super::*;

    fn noop() -> Callback { Callback::Plain(|| {}) }

    #[test]
    fn interval_fires_each_period() {
        static FIRED: AtomicU32 = AtomicU32::new(0);
        fn tick() { FIRED.fetch_add(1, Ordering::Relaxed); }

        let mut timers = SoftTimers::<4>::new();
        let id = timers.set_interval(100, Callback::Plain(tick), 0).unwrap();
        assert_eq!(id, SlotId(0));
        assert_eq!(timers.run(99), 0);
        assert_eq!(timers.run(100), 1);
        assert_eq!(timers.run(150), 0);
        assert_eq!(timers.run(200), 1);
        assert_eq!(FIRED.load(Ordering::Relaxed), 2);
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn late_run_skips_missed_periods() {
        let mut timers = SoftTimers::<4>::new();
        timers.set_interval(100, noop(), 0).unwrap();
        assert_eq!(timers.run(450), 1);
        // next due time is 500, not 200
        assert_eq!(timers.run(499), 0);
        assert_eq!(timers.run(500), 1);
    }

    #[test]
    fn millis_wraparound() {
        let mut timers = SoftTimers::<4>::new();
        timers.set_interval(10, noop(), u32::MAX - 5).unwrap();
        assert_eq!(timers.run(u32::MAX), 0);
        assert_eq!(timers.run(4), 1);
        assert_eq!(timers.run(13), 0);
        assert_eq!(timers.run(14), 1);
    }

    #[test]
    fn finite_timer_deleted_after_last_run() {
        static FIRED: AtomicU32 = AtomicU32::new(0);
        fn tick(step: u32) { FIRED.fetch_add(step, Ordering::Relaxed); }

        let mut timers = SoftTimers::<4>::new();
        let id = timers.set_timer(10, Callback::WithArg(tick, 5), Repeat::Times(3), 0).unwrap();
        for now in [10, 20, 30, 40, 50] {
            timers.run(now);
        }
        assert_eq!(FIRED.load(Ordering::Relaxed), 15);
        assert_eq!(timers.is_empty(), true);
        assert_eq!(timers.enable(id), Err(TimerError::InvalidChannel));

        timers.set_timeout(10, noop(), 0).unwrap();
        assert_eq!(timers.run(10), 1);
        assert_eq!(timers.len(), 0);
    }

    #[test]
    fn disabled_timer_keeps_time_but_does_not_fire() {
        let mut timers = SoftTimers::<4>::new();
        let id = timers.set_timer(10, noop(), Repeat::Times(2), 0).unwrap();
        timers.disable(id).unwrap();
        assert_eq!(timers.is_enabled(id), false);
        assert_eq!(timers.run(10), 0);
        assert_eq!(timers.run(20), 0);

        timers.toggle(id).unwrap();
        assert_eq!(timers.run(25), 0);
        assert_eq!(timers.run(30), 1);
        assert_eq!(timers.run(40), 1);
        assert_eq!(timers.len(), 0);
    }

    #[test]
    fn full_table_and_bad_input() {
        let mut timers = SoftTimers::<2>::new();
        assert_eq!(timers.set_interval(0, noop(), 0), Err(TimerError::InvalidInterval));
        assert_eq!(timers.set_timer(5, noop(), Repeat::Times(0), 0), Err(TimerError::DurationTooShort));
        timers.set_interval(5, noop(), 0).unwrap();
        let second = timers.set_interval(5, noop(), 0).unwrap();
        assert_eq!(timers.set_interval(5, noop(), 0), Err(TimerError::NoFreeChannel));

        timers.delete(second).unwrap();
        assert_eq!(timers.delete(second), Err(TimerError::InvalidChannel));
        assert_eq!(timers.set_interval(5, noop(), 0), Ok(second));
        assert_eq!(timers.is_enabled(SlotId(9)), false);
    }

    #[test]
    fn change_interval_and_restart_measure_from_now() {
        let mut timers = SoftTimers::<4>::new();
        let id = timers.set_interval(100, noop(), 0).unwrap();
        timers.change_interval(id, 30, 80).unwrap();
        assert_eq!(timers.run(100), 0);
        assert_eq!(timers.run(110), 1);

        timers.restart(id, 135).unwrap();
        assert_eq!(timers.run(140), 0);
        assert_eq!(timers.run(165), 1);
        assert_eq!(timers.change_interval(id, 0, 0), Err(TimerError::InvalidInterval));
    }

    #[test]
    fn enable_all_only_touches_forever_timers() {
        let mut timers = SoftTimers::<4>::new();
        let forever = timers.set_interval(10, noop(), 0).unwrap();
        let finite = timers.set_timer(10, noop(), Repeat::Times(5), 0).unwrap();
        timers.disable(finite).unwrap();

        timers.disable_all();
        assert_eq!(timers.is_enabled(forever), false);
        timers.enable_all();
        assert_eq!(timers.is_enabled(forever), true);
        assert_eq!(timers.is_enabled(finite), false);
    }
}
