//! Fixed set of hardware channels indexed by channel id.
//!
//! `SharedBank` is the form the firmware keeps in a static: the interrupt
//! vectors and the application both reach the channels through
//! `critical_section::with`, so an update from call context is never observed
//! half done by a handler.

use core::cell::RefCell;
use critical_section::Mutex;

use crate::frequency::interval_to_frequency;
use crate::{Callback, Channel, ChannelId, CompareTimer, Repeat, TickOutcome, TimerError, TimerResult, TimerSpec};

pub struct TimerBank<H: CompareTimer, const N: usize> {
    channels: [Channel<H>; N],
}

impl<H: CompareTimer, const N: usize> TimerBank<H, N> {
    /// Channel ids are the positions in `timers`.
    pub fn new(timers: [(H, TimerSpec); N]) -> Self {
        let mut index = 0u8;
        let channels = timers.map(|(hw, spec)| {
            let channel = Channel::new(ChannelId(index), hw, spec);
            index += 1;
            channel
        });
        Self { channels }
    }

    pub fn len(&self) -> usize { N }

    pub fn channel(&self, id: ChannelId) -> TimerResult<&Channel<H>> {
        self.channels.get(id.0 as usize).ok_or(TimerError::InvalidChannel)
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> TimerResult<&mut Channel<H>> {
        self.channels.get_mut(id.0 as usize).ok_or(TimerError::InvalidChannel)
    }

    pub fn free_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_free()).count()
    }

    /// Bind on the first free channel that can realize `frequency`.
    pub fn bind_any(&mut self, frequency: f32, callback: Callback, repeat: Repeat) -> TimerResult<ChannelId> {
        let mut last_error = TimerError::NoFreeChannel;
        for channel in self.channels.iter_mut().filter(|c| c.is_free()) {
            match channel.bind(frequency, callback, repeat) {
                Ok(()) => return Ok(channel.id()),
                Err(e) => last_error = e,
            }
        }
        if last_error == TimerError::NoFreeChannel {
            log_warn!("no free channel");
        }
        Err(last_error)
    }

    pub fn bind_interval_any(&mut self, interval_ms: u32, callback: Callback, repeat: Repeat) -> TimerResult<ChannelId> {
        self.bind_any(interval_to_frequency(interval_ms), callback, repeat)
    }

    pub fn stop(&mut self, id: ChannelId) -> TimerResult<()> {
        self.channel_mut(id)?.stop();
        Ok(())
    }

    /// Ids that do not exist are ignored, there is nobody to report to.
    pub fn on_interrupt(&mut self, id: ChannelId) -> Option<TickOutcome> {
        self.channels.get_mut(id.0 as usize).map(|c| c.on_interrupt())
    }
}

pub struct SharedBank<H: CompareTimer, const N: usize> {
    inner: Mutex<RefCell<Option<TimerBank<H, N>>>>,
}

impl<H: CompareTimer, const N: usize> SharedBank<H, N> {
    pub const fn new() -> Self {
        Self { inner: Mutex::new(RefCell::new(None)) }
    }

    pub fn install(&self, bank: TimerBank<H, N>) {
        critical_section::with(|cs| {
            self.inner.borrow(cs).replace(Some(bank));
        });
    }

    pub fn is_installed(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow(cs).borrow().is_some())
    }

    /// Run `f` with interrupts masked. Fails with `InvalidChannel` before
    /// `install`, or when called again from inside a callback.
    pub fn with<R>(&self, f: impl FnOnce(&mut TimerBank<H, N>) -> TimerResult<R>) -> TimerResult<R> {
        critical_section::with(|cs| {
            let mut guard = self.inner.borrow(cs).try_borrow_mut().map_err(|_| TimerError::InvalidChannel)?;
            let bank = guard.as_mut().ok_or(TimerError::InvalidChannel)?;
            f(bank)
        })
    }

    pub fn with_channel<R>(&self, id: ChannelId, f: impl FnOnce(&mut Channel<H>) -> TimerResult<R>) -> TimerResult<R> {
        self.with(|bank| f(bank.channel_mut(id)?))
    }

    /// Interrupt vector entry point.
    pub fn on_interrupt(&self, id: ChannelId) -> Option<TickOutcome> {
        self.with(|bank| Ok(bank.on_interrupt(id))).ok().flatten()
    }
}
