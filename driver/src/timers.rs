use core::cell::RefCell;
use arduino_hal::pac::{TC1, TC2, TC3, TC4, TC5};
use avr_timer_core::{compare_already_passed, ChannelId, CompareTimer, SharedBank, SoftTimers, TimerBank, TimerError, TimerResult, TimerSpec};
use critical_section::Mutex;

// spec sheet: https://ww1.microchip.com/downloads/en/DeviceDoc/doc7799.pdf

pub const CPU_FREQUENCY_HZ: u32 = 16_000_000;

// `bind_any` takes the first free channel, so the 8 bit TC2 goes last. Its
// small counter chains an interrupt every 256 clocks on short dividers.
pub const CH_TC1: ChannelId = ChannelId(0);
pub const CH_TC3: ChannelId = ChannelId(1);
pub const CH_TC4: ChannelId = ChannelId(2);
pub const CH_TC5: ChannelId = ChannelId(3);
pub const CH_TC2: ChannelId = ChannelId(4);

pub const CHANNELS: usize = 5;

/// Register level operations of one timer block, compare unit A in CTC mode.
trait CompareRegisters {
    fn stop_clock(&self);
    fn start_clock(&self, divider: u16);
    fn set_compare(&self, compare: u32);
    fn reset_counter(&self);
    fn counter(&self) -> u32;
    fn set_interrupt(&self, enabled: bool);
    fn clear_flag(&self);
}

// Timer 1, 3, 4 and 5 share a layout, only the register names differ.
// WGMn3:0 = 0b0100 is CTC with OCRnA as top, the upper two bits live in TCCRnB.
macro_rules! compare_registers_16bit {
    ($tc:ty, $tccra:ident, $tccrb:ident, $tcnt:ident, $ocra:ident, $timsk:ident, $tifr:ident, $wgm:ident, $cs:ident, $ocie:ident, $ocf:ident) => {
        impl CompareRegisters for $tc {
            fn stop_clock(&self) {
                self.$tccrb.modify(|_, w| w.$cs().no_clock());
            }

            fn start_clock(&self, divider: u16) {
                self.$tccra.write(|w| w.$wgm().bits(0b00));
                self.$tccrb.write(|w| {
                    let w = w.$wgm().bits(0b01);
                    match divider {
                        1 => w.$cs().direct(),
                        8 => w.$cs().prescale_8(),
                        64 => w.$cs().prescale_64(),
                        256 => w.$cs().prescale_256(),
                        _ => w.$cs().prescale_1024(),
                    }
                });
            }

            fn set_compare(&self, compare: u32) {
                self.$ocra.write(|w| unsafe { w.bits(compare as u16) });
            }

            fn reset_counter(&self) {
                self.$tcnt.write(|w| unsafe { w.bits(0) });
            }

            fn counter(&self) -> u32 {
                self.$tcnt.read().bits() as u32
            }

            fn set_interrupt(&self, enabled: bool) {
                self.$timsk.modify(|_, w| w.$ocie().bit(enabled));
            }

            fn clear_flag(&self) {
                // flags clear by writing a one
                self.$tifr.write(|w| w.$ocf().set_bit());
            }
        }
    };
}

compare_registers_16bit!(TC1, tccr1a, tccr1b, tcnt1, ocr1a, timsk1, tifr1, wgm1, cs1, ocie1a, ocf1a);
compare_registers_16bit!(TC3, tccr3a, tccr3b, tcnt3, ocr3a, timsk3, tifr3, wgm3, cs3, ocie3a, ocf3a);
compare_registers_16bit!(TC4, tccr4a, tccr4b, tcnt4, ocr4a, timsk4, tifr4, wgm4, cs4, ocie4a, ocf4a);
compare_registers_16bit!(TC5, tccr5a, tccr5b, tcnt5, ocr5a, timsk5, tifr5, wgm5, cs5, ocie5a, ocf5a);

// Timer 2 is 8 bit with its own prescaler taps.
impl CompareRegisters for TC2 {
    fn stop_clock(&self) {
        self.tccr2b.modify(|_, w| w.cs2().no_clock());
    }

    fn start_clock(&self, divider: u16) {
        self.tccr2a.write(|w| w.wgm2().ctc());
        self.tccr2b.write(|w| match divider {
            1 => w.cs2().direct(),
            8 => w.cs2().prescale_8(),
            32 => w.cs2().prescale_32(),
            64 => w.cs2().prescale_64(),
            128 => w.cs2().prescale_128(),
            256 => w.cs2().prescale_256(),
            _ => w.cs2().prescale_1024(),
        });
    }

    fn set_compare(&self, compare: u32) {
        self.ocr2a.write(|w| unsafe { w.bits(compare as u8) });
    }

    fn reset_counter(&self) {
        self.tcnt2.write(|w| unsafe { w.bits(0) });
    }

    fn counter(&self) -> u32 {
        self.tcnt2.read().bits() as u32
    }

    fn set_interrupt(&self, enabled: bool) {
        self.timsk2.modify(|_, w| w.ocie2a().bit(enabled));
    }

    fn clear_flag(&self) {
        self.tifr2.write(|w| w.ocf2a().set_bit());
    }
}

pub enum Tc {
    T1(TC1),
    T2(TC2),
    T3(TC3),
    T4(TC4),
    T5(TC5),
}

pub struct AvrTimer {
    tc: Tc,
    divider: u16,
}

impl AvrTimer {
    pub fn new(tc: Tc) -> Self {
        Self { tc, divider: 0 }
    }

    fn regs(&self) -> &dyn CompareRegisters {
        match &self.tc {
            Tc::T1(tc) => tc,
            Tc::T2(tc) => tc,
            Tc::T3(tc) => tc,
            Tc::T4(tc) => tc,
            Tc::T5(tc) => tc,
        }
    }
}

impl CompareTimer for AvrTimer {
    fn configure(&mut self, divider: u16, compare: u32) {
        self.divider = divider;
        let regs = self.regs();
        regs.stop_clock();
        regs.reset_counter();
        regs.set_compare(compare);
        regs.start_clock(divider);
    }

    fn arm_next_chunk(&mut self, compare: u32) {
        let regs = self.regs();
        regs.set_compare(compare);
        // CTC already cleared the counter at the match, only a chunk shorter
        // than the handler latency needs a fresh start
        if compare_already_passed(compare, regs.counter()) {
            regs.reset_counter();
        }
    }

    fn enable_interrupt(&mut self) { self.regs().set_interrupt(true) }
    fn disable_interrupt(&mut self) { self.regs().set_interrupt(false) }
    fn clear_pending_flag(&mut self) { self.regs().clear_flag() }
    fn pause_clock(&mut self) { self.regs().stop_clock() }

    fn resume_clock(&mut self) {
        if self.divider != 0 {
            self.regs().start_clock(self.divider);
        }
    }
}

pub static TIMERS: SharedBank<AvrTimer, CHANNELS> = SharedBank::new();

static SOFT_TIMERS: Mutex<RefCell<SoftTimers>> = Mutex::new(RefCell::new(SoftTimers::new()));

pub fn timers_init(tc1: TC1, tc2: TC2, tc3: TC3, tc4: TC4, tc5: TC5) {
    let t16 = TimerSpec::avr_16bit(CPU_FREQUENCY_HZ);
    TIMERS.install(TimerBank::new([
        (AvrTimer::new(Tc::T1(tc1)), t16),
        (AvrTimer::new(Tc::T3(tc3)), t16),
        (AvrTimer::new(Tc::T4(tc4)), t16),
        (AvrTimer::new(Tc::T5(tc5)), t16),
        (AvrTimer::new(Tc::T2(tc2)), TimerSpec::avr_8bit_timer2(CPU_FREQUENCY_HZ)),
    ]));
}

/// Access the soft timers. Refused from inside a soft timer callback.
pub fn with_soft_timers<R>(f: impl FnOnce(&mut SoftTimers) -> TimerResult<R>) -> TimerResult<R> {
    critical_section::with(|cs| {
        let mut timers = SOFT_TIMERS.borrow(cs).try_borrow_mut().map_err(|_| TimerError::InvalidChannel)?;
        f(&mut timers)
    })
}

/// Bound to a hardware channel as the soft timer tick.
pub fn run_soft_timers() {
    let now = crate::my_clock::millis();
    let _ = with_soft_timers(|timers| Ok(timers.run(now)));
}

#[avr_device::interrupt(atmega2560)]
fn TIMER1_COMPA() {
    TIMERS.on_interrupt(CH_TC1);
}

#[avr_device::interrupt(atmega2560)]
fn TIMER2_COMPA() {
    TIMERS.on_interrupt(CH_TC2);
}

#[avr_device::interrupt(atmega2560)]
fn TIMER3_COMPA() {
    TIMERS.on_interrupt(CH_TC3);
}

#[avr_device::interrupt(atmega2560)]
fn TIMER4_COMPA() {
    TIMERS.on_interrupt(CH_TC4);
}

#[avr_device::interrupt(atmega2560)]
fn TIMER5_COMPA() {
    TIMERS.on_interrupt(CH_TC5);
}
