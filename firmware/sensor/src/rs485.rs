//! USART1 on the RS485 transceiver.
//!
//! Reception lives entirely in the USART1 interrupt: RXNE feeds the frame
//! collector, the receiver-timeout flag (RTOF) marks the end of a frame.
//! Transmission is a bounded busy-wait from the main loop with the driver
//! enable line held high for the whole reply.

use core::cell::RefCell;

use defmt::*;
use embassy_stm32::gpio::Output;
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::mode::Blocking;
use embassy_stm32::pac;
use embassy_stm32::usart::Uart;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::Instant;
use flowbridge_link::{BusWriter, RxPath, TxError};

use crate::config::{LINE_TIMING, TX_TIMEOUT};

static RX_PATH: Mutex<CriticalSectionRawMutex, RefCell<Option<RxPath<'static>>>> =
    Mutex::new(RefCell::new(None));

/// Hands the receive path to the interrupt and unmasks it. Must be called
/// after the USART has been configured by the HAL.
pub fn start_receiver(rx: RxPath<'static>) {
    let regs = pac::USART1;
    RX_PATH.lock(|cell| cell.replace(Some(rx)));

    // RTOEN may only change while the USART is disabled.
    regs.cr1().modify(|w| w.set_ue(false));
    regs.rtor().write(|w| w.set_rto(LINE_TIMING.idle_timeout_bits()));
    regs.cr2().modify(|w| w.set_rtoen(true));
    regs.cr3().modify(|w| w.set_eie(true));
    regs.cr1().modify(|w| {
        w.set_rtoie(true);
        w.set_rxneie(true);
        w.set_ue(true);
    });
    clear_flags();

    interrupt::USART1.set_priority(Priority::P0);
    // SAFETY: the handler below only touches RX_PATH through its mutex.
    unsafe { interrupt::USART1.enable() };

    info!(
        "rs485: receiver armed, idle timeout {} bits ({} us)",
        LINE_TIMING.idle_timeout_bits(),
        LINE_TIMING.idle_timeout_us()
    );
}

fn clear_flags() {
    pac::USART1.icr().write(|w| {
        w.set_rtof(true);
        w.set_ore(true);
        w.set_fe(true);
        w.set_ne(true);
    });
}

#[interrupt]
fn USART1() {
    let regs = pac::USART1;
    let isr = regs.isr().read();
    let line_error = isr.ore() || isr.fe() || isr.ne();

    RX_PATH.lock(|cell| {
        let mut cell = cell.borrow_mut();
        let Some(rx) = cell.as_mut() else {
            // Not armed yet: drain and drop.
            let _ = regs.rdr().read();
            clear_flags();
            return;
        };

        if isr.rxne() {
            rx.on_byte(regs.rdr().read().dr() as u8);
            // A fresh byte restarts the quiet period.
            regs.icr().write(|w| w.set_rtof(true));
        } else if isr.rtof() {
            regs.icr().write(|w| w.set_rtof(true));
            // Outcomes are counted in LinkStats; nothing is logged from here.
            let _ = rx.on_idle();
        }

        if line_error {
            regs.icr().write(|w| {
                w.set_ore(true);
                w.set_fe(true);
                w.set_ne(true);
            });
            rx.on_line_error();
        }
    });
}

pub struct Rs485Tx {
    de: Output<'static>,
    // Owns the peripheral clock and pin configuration.
    _uart: Uart<'static, Blocking>,
}

impl Rs485Tx {
    pub fn new(uart: Uart<'static, Blocking>, mut de: Output<'static>) -> Self {
        de.set_low();
        Self { de, _uart: uart }
    }
}

impl BusWriter for Rs485Tx {
    fn write_reply(&mut self, bytes: &[u8]) -> Result<(), TxError> {
        let deadline = Instant::now() + TX_TIMEOUT;
        self.de.set_high();
        let result = send(bytes, deadline);
        self.de.set_low();
        result
    }
}

fn send(bytes: &[u8], deadline: Instant) -> Result<(), TxError> {
    let regs = pac::USART1;
    for &byte in bytes {
        wait_until(deadline, || regs.isr().read().txe())?;
        regs.tdr().write(|w| w.set_dr(u16::from(byte)));
    }
    // DE must stay up until the last stop bit has left the shifter.
    wait_until(deadline, || regs.isr().read().tc())
}

fn wait_until(deadline: Instant, mut ready: impl FnMut() -> bool) -> Result<(), TxError> {
    while !ready() {
        if Instant::now() >= deadline {
            return Err(TxError::Timeout);
        }
    }
    Ok(())
}
