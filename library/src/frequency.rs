//! Frequency to compare register mapping.
//!
//! A compare-match timer can only count up to its register width, so long
//! periods are expressed as a large `full_ticks` value that the interrupt
//! handler feeds to the hardware in register sized chunks. The mapping picks
//! the smallest clock divider that keeps the number of chunks per period
//! bounded.

use crate::{TimerError, TimerResult};

pub const MAX_COUNT_8BIT: u32 = 255;
pub const MAX_COUNT_16BIT: u32 = 65535;

/// `frequency * FREQUENCY_LIMIT_FACTOR` must be at least one. Anything slower
/// overflows the 32 bit tick accumulator even at the slowest start divider.
pub const FREQUENCY_LIMIT_FACTOR: f32 = 17179.840;

/// Upper bound (exclusive) on `full_ticks / counter_max` before trying the
/// next divider.
pub const MAX_CHAIN_LENGTH: u32 = 16384;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DividerStep {
    pub divider: u16,
    /// The scan may start at this divider once the frequency limit exceeds this.
    pub start_above: f32,
}

const fn step(divider: u16, start_above: f32) -> DividerStep {
    DividerStep { divider, start_above }
}

// ╔═════════╦══════════════════════╗
// ║ DIVIDER ║ START WHEN LIMIT >   ║
// ╠═════════╬══════════════════════╣
// ║       1 ║                   64 ║
// ║       8 ║                    8 ║
// ║      64 ║               always ║
// ║     256 ║          (scan only) ║
// ║    1024 ║          (scan only) ║
// ╚═════════╩══════════════════════╝
pub const AVR_16BIT_DIVIDERS: [DividerStep; 5] = [
    step(1, 64.0),
    step(8, 8.0),
    step(64, 0.0),
    step(256, 0.0),
    step(1024, 0.0),
];

// Timer2 has the extra 32 and 128 taps.
pub const AVR_TIMER2_DIVIDERS: [DividerStep; 7] = [
    step(1, 64.0),
    step(8, 8.0),
    step(32, 2.0),
    step(64, 0.0),
    step(128, 0.0),
    step(256, 0.0),
    step(1024, 0.0),
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DividerSearch {
    /// Ordered divider table scanned per request.
    Scan(&'static [DividerStep]),
    /// One prescaled clock shared by every channel, no per channel choice.
    Fixed(u16),
}

/// Clock source of a megaAVR TCB peripheral.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TcbClock {
    Div1,
    Div2,
    /// Clocked from TCA, which runs at CLK_PER / 64.
    Tca,
}

impl TcbClock {
    pub const fn prescale(self) -> u16 {
        match self {
            TcbClock::Div1 => 1,
            TcbClock::Div2 => 2,
            TcbClock::Tca => 64,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimerSpec {
    pub clock_hz: u32,
    pub counter_max: u32,
    pub dividers: DividerSearch,
}

impl TimerSpec {
    /// Timer1, 3, 4 and 5 on the ATmega family.
    pub const fn avr_16bit(clock_hz: u32) -> Self {
        Self { clock_hz, counter_max: MAX_COUNT_16BIT, dividers: DividerSearch::Scan(&AVR_16BIT_DIVIDERS) }
    }

    pub const fn avr_8bit_timer2(clock_hz: u32) -> Self {
        Self { clock_hz, counter_max: MAX_COUNT_8BIT, dividers: DividerSearch::Scan(&AVR_TIMER2_DIVIDERS) }
    }

    pub const fn tcb(clock_hz: u32, clock: TcbClock) -> Self {
        Self { clock_hz, counter_max: MAX_COUNT_16BIT, dividers: DividerSearch::Fixed(clock.prescale()) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TickPlan {
    pub divider: u16,
    pub full_ticks: u32,
}

impl TickPlan {
    // a zero `counter_max` is treated like the runner does, as 1
    pub fn chain_length(&self, counter_max: u32) -> u32 {
        self.full_ticks / counter_max.max(1)
    }

    /// Hardware interrupts between two callbacks.
    pub fn chunks_per_period(&self, counter_max: u32) -> u32 {
        self.full_ticks.div_ceil(counter_max.max(1)).max(1)
    }
}

pub fn frequency_limit(frequency: f32) -> f32 {
    frequency * FREQUENCY_LIMIT_FACTOR
}

pub fn interval_to_frequency(interval_ms: u32) -> f32 {
    1000.0 / interval_ms as f32
}

// Negative results clamp to zero, `as` saturates at u32::MAX.
fn ticks_for(clock_hz: u32, frequency: f32, divider: u16, offset: f64) -> u32 {
    let ticks = clock_hz as f64 / (frequency as f64 * divider as f64) - offset;
    if ticks <= 0.0 { 0 } else { ticks as u32 }
}

pub fn map_frequency(frequency: f32, spec: &TimerSpec) -> TimerResult<TickPlan> {
    if !frequency.is_finite() || frequency <= 0.0 || frequency_limit(frequency) < 1.0 {
        return Err(TimerError::RejectedFrequency);
    }
    let limit = frequency_limit(frequency);
    match spec.dividers {
        DividerSearch::Fixed(prescale) => Ok(TickPlan {
            divider: prescale,
            full_ticks: ticks_for(spec.clock_hz, frequency, prescale, 0.0),
        }),
        DividerSearch::Scan(steps) => {
            let Some(last) = steps.last() else {
                return Err(TimerError::RejectedFrequency);
            };
            let start = steps.iter().position(|s| limit > s.start_above).unwrap_or(steps.len() - 1);
            for s in &steps[start..] {
                let plan = TickPlan { divider: s.divider, full_ticks: ticks_for(spec.clock_hz, frequency, s.divider, 1.0) };
                if plan.chain_length(spec.counter_max) < MAX_CHAIN_LENGTH {
                    return Ok(plan);
                }
            }
            // nothing keeps the chain short, take the slowest clock anyway
            Ok(TickPlan { divider: last.divider, full_ticks: ticks_for(spec.clock_hz, frequency, last.divider, 1.0) })
        }
    }
}
