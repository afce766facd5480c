//! Serial port (MC6850 ACIA) wired to the terminal.
//!
//! Transmit never blocks: bytes go to the terminal sink, or to the
//! printer redirection channel while output is routed to the graphical
//! screen. Receive polls the terminal input queue; the receive interrupt
//! fires when enabled by control register bit 7.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::signals::{Notify, SignalHub};
use crate::terminal::TerminalLink;

// Status register bits.
const STATUS_RDRF: u8 = 0x01;
const STATUS_TDRE: u8 = 0x02;
const STATUS_IRQ: u8 = 0x80;

// Control register bits.
const CONTROL_RX_IRQ_ENABLE: u8 = 0x80;
const CONTROL_MASTER_RESET: u8 = 0x03;

pub struct Acia {
    control: u8,
    terminal: TerminalLink,
    /// Printer sink used while output is routed to the graphical screen.
    redirect: Option<Sender<u8>>,
    /// True = bytes go to the terminal (the `terminal` command).
    route_terminal: Arc<AtomicBool>,
    hub: Arc<SignalHub>,
}

impl Acia {
    pub fn new(terminal: TerminalLink, route_terminal: Arc<AtomicBool>, hub: Arc<SignalHub>) -> Self {
        Self { control: 0, terminal, redirect: None, route_terminal, hub }
    }

    pub fn reset(&mut self) {
        self.control = 0;
    }

    /// Install the printer redirection sink.
    pub fn set_redirect(&mut self, sink: Sender<u8>) {
        self.redirect = Some(sink);
    }

    pub fn read(&mut self, offset: u16) -> u8 {
        match offset & 0x01 {
            0 => {
                let mut status = STATUS_TDRE;
                if self.terminal.has_input() {
                    status |= STATUS_RDRF;
                    if self.control & CONTROL_RX_IRQ_ENABLE != 0 {
                        status |= STATUS_IRQ;
                    }
                }
                status
            }
            _ => self.terminal.read_input().unwrap_or(0),
        }
    }

    pub fn write(&mut self, offset: u16, value: u8) {
        match offset & 0x01 {
            0 => {
                if value & CONTROL_MASTER_RESET == CONTROL_MASTER_RESET {
                    self.control = 0;
                } else {
                    self.control = value;
                }
            }
            _ => {
                if self.route_terminal.load(Ordering::Relaxed) {
                    self.terminal.write_output(value);
                } else if let Some(sink) = &self.redirect {
                    let _ = sink.send(value);
                } else {
                    self.terminal.write_output(value);
                }
            }
        }
    }

    /// Poll for terminal readiness; raises the receive interrupt when a
    /// byte is waiting and the interrupt is enabled.
    pub fn poll(&mut self) {
        if self.control & CONTROL_RX_IRQ_ENABLE != 0 && self.terminal.has_input() {
            self.hub.notify(Notify::SetIrq);
        }
    }
}
