use core::mem::MaybeUninit;
use arduino_hal::{clock::MHz16, hal::{port::{PB7, PE0, PE1}, Atmega}, pac::USART0, port::mode::{Input, Output}};
use avr_hal_generic::usart::UsartWriter;
use avr_timer_core::log::{LogBuffer, LogQueue};
use embedded_hal::serial::Write;

pub const BAUD_RATE: u32 = 57600;

pub type Serial = arduino_hal::hal::usart::Usart0<MHz16>;

// Arduino mega, the on board LED is D13 (PB7).
pub static mut LED: MaybeUninit<arduino_hal::port::Pin<Output, PB7>> = MaybeUninit::uninit();

pub static mut WRITER: MaybeUninit<UsartWriter<Atmega, USART0, arduino_hal::port::Pin<Input, PE0>, arduino_hal::port::Pin<Output, PE1>, MHz16>> = MaybeUninit::uninit();

pub fn write_uart(source: &str) {
    write_uart_u8(source.as_bytes());
}

/// Blocks until every byte is out, main loop only.
pub fn write_uart_u8(source: &[u8]) {
    #[allow(static_mut_refs)]
    let writer = unsafe { WRITER.assume_init_mut() };
    let mut to_send = source.iter();
    let mut n = to_send.next();
    while let Some(b) = n {
        let _ = writer.write(*b).map(|()| n = to_send.next());
    }
}

/// Must run once, before interrupts are enabled.
pub unsafe fn init_static_pins(led: arduino_hal::port::Pin<Output, PB7>, serial: Serial) {
    let (_reader, writer) = serial.split();
    #[allow(static_mut_refs)]
    unsafe {
        WRITER.write(writer);
        LED.write(led);
    }
}

pub fn toggle_led() {
    critical_section::with(|_| {
        #[allow(static_mut_refs)]
        unsafe { LED.assume_init_mut() }.toggle();
    })
}

// Records from interrupt handlers wait here until the main loop sends them.
pub static UART_LOG: LogQueue<16> = LogQueue::new();

pub fn flush_log() {
    let dropped = UART_LOG.drain(|level, message| {
        write_uart("[TISR] ");
        write_uart(level.as_str());
        write_uart(" ");
        write_uart(message);
        write_uart("\n");
    });
    if dropped > 0 {
        let mut line = LogBuffer::new();
        let _ = ufmt::uwrite!(&mut line, "[TISR] W {} records dropped\n", dropped);
        write_uart(line.as_str());
    }
}
