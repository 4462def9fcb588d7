#![no_std]
#![no_main]
#![feature(abi_avr_interrupt)]

mod my_clock;
mod pins;
mod timers;

use avr_timer_core::log::{self, Level};
use avr_timer_core::{interval_to_frequency, log_error, log_info, Callback, Repeat, TimerResult};
use panic_halt as _;
use portable_atomic::{AtomicBool, Ordering};

use my_clock::{millis, millis_init};
use pins::{flush_log, init_static_pins, toggle_led, BAUD_RATE, UART_LOG};
use timers::{run_soft_timers, timers_init, with_soft_timers, CH_TC1, CH_TC3, CH_TC4, TIMERS};

static HEARTBEAT: AtomicBool = AtomicBool::new(false);
static PAUSE_LED: AtomicBool = AtomicBool::new(false);
static RESUME_LED: AtomicBool = AtomicBool::new(false);

fn blink() {
    toggle_led();
}

fn long_tick() {
    log_info!("long interval at {} ms", millis());
}

fn counted(batch: u32) {
    log_info!("batch {} tick", batch);
}

fn report(what: &str, result: TimerResult<()>) {
    if let Err(e) = result {
        log_error!("{}: {}", what, e);
    }
}

fn setup() -> TimerResult<()> {
    TIMERS.with_channel(CH_TC1, |ch| ch.bind(1.0, Callback::Plain(blink), Repeat::Forever))?;
    // four runs of 30 s, then the channel shuts itself off
    TIMERS.with_channel(CH_TC3, |ch| ch.bind_for(interval_to_frequency(30_000), Callback::Plain(long_tick), 120_000))?;
    TIMERS.with_channel(CH_TC4, |ch| ch.bind_interval(10, Callback::Plain(run_soft_timers), Repeat::Forever))?;
    let id = TIMERS.with(|bank| bank.bind_interval_any(250, Callback::WithArg(counted, 7), Repeat::Times(8)))?;
    log_info!("batch on channel {}", id.0);

    let now = millis();
    with_soft_timers(|soft| {
        soft.set_interval(2000, Callback::Plain(|| HEARTBEAT.store(true, Ordering::Relaxed)), now)?;
        soft.set_timeout(10_000, Callback::Plain(|| PAUSE_LED.store(true, Ordering::Relaxed)), now)?;
        soft.set_timeout(15_000, Callback::Plain(|| RESUME_LED.store(true, Ordering::Relaxed)), now)?;
        Ok(())
    })
}

#[arduino_hal::entry]
fn main() -> ! {
    let dp = arduino_hal::Peripherals::take().unwrap();
    let pins = arduino_hal::pins!(dp);
    let serial = arduino_hal::default_serial!(dp, pins, BAUD_RATE);
    unsafe { init_static_pins(pins.d13.into_output(), serial) };
    log::set_sink(&UART_LOG, Level::Info);

    millis_init(dp.TC0);
    timers_init(dp.TC1, dp.TC2, dp.TC3, dp.TC4, dp.TC5);
    unsafe { avr_device::interrupt::enable(); }

    log_info!("Startup");
    flush_log();
    report("setup", setup());
    flush_log();

    loop {
        if HEARTBEAT.swap(false, Ordering::Relaxed) {
            let status = TIMERS.with_channel(CH_TC3, |ch| Ok((ch.remaining_ticks(), ch.count())));
            match status {
                Ok((remaining, Repeat::Times(left))) => log_info!("tc3 {} ticks, {} runs left", remaining, left),
                Ok((remaining, Repeat::Forever)) => log_info!("tc3 {} ticks", remaining),
                Err(e) => log_error!("status: {}", e),
            }
        }
        if PAUSE_LED.swap(false, Ordering::Relaxed) {
            report("pause", TIMERS.with_channel(CH_TC1, |ch| ch.pause()));
        }
        if RESUME_LED.swap(false, Ordering::Relaxed) {
            report("resume", TIMERS.with_channel(CH_TC1, |ch| ch.resume()));
        }
        flush_log();
        arduino_hal::delay_ms(1);
    }
}
