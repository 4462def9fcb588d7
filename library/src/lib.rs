#![no_std]

#[macro_use]
pub mod log;

pub mod bank;
pub mod channel;
pub mod error;
pub mod frequency;
pub mod hardware;
pub mod runner;
pub mod soft_timer;

pub use bank::{SharedBank, TimerBank};
pub use channel::{Callback, Channel, ChannelId, ChannelState};
pub use error::{TimerError, TimerResult};
pub use frequency::{
    interval_to_frequency, map_frequency, DividerSearch, DividerStep, TcbClock, TickPlan, TimerSpec,
    FREQUENCY_LIMIT_FACTOR, MAX_CHAIN_LENGTH, MAX_COUNT_16BIT, MAX_COUNT_8BIT,
};
pub use hardware::{compare_already_passed, CompareTimer};
pub use runner::{IntervalRunner, Repeat, RunnerState, TickOutcome};
pub use soft_timer::{SlotId, SoftTimers, MAX_SOFT_TIMERS};
