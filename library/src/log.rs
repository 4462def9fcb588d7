//! Leveled diagnostics.
//!
//! A single sink is installed for the whole program. Records are formatted
//! with `ufmt` into a small stack buffer and handed to the sink, so nothing
//! here allocates. With no sink installed every record is dropped before it
//! is formatted.

use core::cell::{Cell, RefCell};
use arrayvec::ArrayVec;
use critical_section::Mutex;
use str_buf::StrBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error = 1,
    Warn,
    Info,
    Debug,
}

impl Level {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "E",
            Level::Warn => "W",
            Level::Info => "I",
            Level::Debug => "D",
        }
    }
}

pub trait LogSink {
    fn write(&self, level: Level, message: &str);
}

/// Longer records are truncated.
pub type LogBuffer = StrBuf<64>;

#[derive(Clone, Copy)]
struct Logger {
    sink: Option<&'static (dyn LogSink + Sync)>,
    max_level: Level,
}

static LOGGER: Mutex<Cell<Logger>> = Mutex::new(Cell::new(Logger { sink: None, max_level: Level::Error }));

pub fn set_sink(sink: &'static (dyn LogSink + Sync), max_level: Level) {
    critical_section::with(|cs| LOGGER.borrow(cs).set(Logger { sink: Some(sink), max_level }));
}

pub fn clear_sink() {
    critical_section::with(|cs| LOGGER.borrow(cs).set(Logger { sink: None, max_level: Level::Error }));
}

fn current() -> Logger {
    critical_section::with(|cs| LOGGER.borrow(cs).get())
}

pub fn enabled(level: Level) -> bool {
    let logger = current();
    logger.sink.is_some() && level <= logger.max_level
}

pub fn emit(level: Level, message: &str) {
    let logger = current();
    if let Some(sink) = logger.sink {
        if level <= logger.max_level {
            sink.write(level, message);
        }
    }
}

struct Pending<const N: usize> {
    records: ArrayVec<(Level, LogBuffer), N>,
    dropped: u16,
}

/// A sink that only stores records, for use from interrupt context.
///
/// `write` copies the record into a fixed queue and returns. A slow output
/// such as a UART is fed later by `drain` from the main loop, so interrupts
/// are only masked for the copy. When the queue is full the new record is
/// dropped and counted.
pub struct LogQueue<const N: usize> {
    pending: Mutex<RefCell<Pending<N>>>,
}

impl<const N: usize> LogQueue<N> {
    pub const fn new() -> Self {
        Self { pending: Mutex::new(RefCell::new(Pending { records: ArrayVec::new_const(), dropped: 0 })) }
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.pending.borrow(cs).borrow().records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand queued records to `out` oldest first, then report and reset the
    /// number dropped since the last drain. `out` runs with interrupts enabled.
    pub fn drain(&self, mut out: impl FnMut(Level, &str)) -> u16 {
        loop {
            let next = critical_section::with(|cs| self.pending.borrow(cs).borrow_mut().records.pop_at(0));
            match next {
                Some((level, message)) => out(level, message.as_str()),
                None => break,
            }
        }
        critical_section::with(|cs| core::mem::take(&mut self.pending.borrow(cs).borrow_mut().dropped))
    }
}

impl<const N: usize> Default for LogQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> LogSink for LogQueue<N> {
    fn write(&self, level: Level, message: &str) {
        let mut buffer = LogBuffer::new();
        let _ = ufmt::uwrite!(&mut buffer, "{}", message);
        critical_section::with(|cs| {
            let mut pending = self.pending.borrow(cs).borrow_mut();
            if pending.records.try_push((level, buffer)).is_err() {
                pending.dropped = pending.dropped.saturating_add(1);
            }
        });
    }
}

/// Callers need `ufmt` in scope, `uwrite!` expands to `ufmt::` paths.
#[macro_export]
macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {{
        let level = $level;
        if $crate::log::enabled(level) {
            let mut buffer = $crate::log::LogBuffer::new();
            // a full buffer only truncates the record
            let _ = ufmt::uwrite!(&mut buffer, $($arg)+);
            $crate::log::emit(level, buffer.as_str());
        }
    }};
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => { $crate::log_at!($crate::log::Level::Error, $($arg)+) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)+) => { $crate::log_at!($crate::log::Level::Warn, $($arg)+) };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => { $crate::log_at!($crate::log::Level::Info, $($arg)+) };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => { $crate::log_at!($crate::log::Level::Debug, $($arg)+) };
}
