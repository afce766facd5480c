//! Keyboard adapter (PIA1).
//!
//! The UI thread feeds cooked keystrokes into a mutex-guarded FIFO via a
//! cloned [`KeyboardQueue`]; the guest reads them from PIA1 port A. Port B
//! carries the modifier mask plus a bit-7 "key pending" hint. The first
//! read request of the key register publishes a one-shot notification used
//! to prime serial redirection.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::signals::{Notify, SignalHub};

use super::pia::PiaPorts;

pub const SHIFT_KEY: u8 = 0x01;
pub const CONTROL_KEY: u8 = 0x02;

#[derive(Default)]
struct QueueInner {
    fifo: VecDeque<u8>,
    modifiers: u8,
}

/// Clonable handle to the shared key FIFO. One side lives in the UI
/// thread, the other inside [`KeyboardPorts`].
#[derive(Clone, Default)]
pub struct KeyboardQueue {
    inner: Arc<Mutex<QueueInner>>,
}

impl KeyboardQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue one keystroke. The caller must also post an
    /// active-transition command to the scheduler so CA1 rises.
    pub fn push(&self, key: u8) {
        self.inner.lock().unwrap().fifo.push_back(key);
    }

    pub fn pop(&self) -> Option<u8> {
        self.inner.lock().unwrap().fifo.pop_front()
    }

    pub fn has_key(&self) -> bool {
        !self.inner.lock().unwrap().fifo.is_empty()
    }

    pub fn set_modifiers(&self, mask: u8) {
        self.inner.lock().unwrap().modifiers = mask;
    }

    pub fn modifiers(&self) -> u8 {
        self.inner.lock().unwrap().modifiers
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.fifo.clear();
        inner.modifiers = 0;
    }
}

pub struct KeyboardPorts {
    queue: KeyboardQueue,
    hub: Arc<SignalHub>,
    first_request_seen: bool,
    last_key: u8,
    /// Set when a CA1 transition must follow the current register access;
    /// the bus applies it once the PIA borrow is released.
    pending_ca1: bool,
}

impl KeyboardPorts {
    pub fn new(queue: KeyboardQueue, hub: Arc<SignalHub>) -> Self {
        Self { queue, hub, first_request_seen: false, last_key: 0, pending_ca1: false }
    }

    pub fn reset(&mut self) {
        self.first_request_seen = false;
        self.last_key = 0;
        self.pending_ca1 = false;
        self.queue.clear();
    }

    pub fn take_pending_ca1(&mut self) -> bool {
        std::mem::take(&mut self.pending_ca1)
    }
}

impl PiaPorts for KeyboardPorts {
    fn request_input_a(&mut self) {
        if !self.first_request_seen {
            self.first_request_seen = true;
            self.hub.notify(Notify::FirstKeyboardRequest);
        }
        if self.queue.has_key() {
            self.pending_ca1 = true;
        }
    }

    fn input_a(&mut self) -> u8 {
        if let Some(key) = self.queue.pop() {
            self.last_key = key;
            // More keys waiting: strobe again so the guest keeps reading.
            if self.queue.has_key() {
                self.pending_ca1 = true;
            }
        }
        self.last_key
    }

    fn input_b(&mut self) -> u8 {
        let hint = if self.queue.has_key() { 0x80 } else { 0 };
        self.queue.modifiers() | hint
    }

    fn irq_a(&mut self) {
        self.hub.notify(Notify::SetIrq);
    }

    fn irq_b(&mut self) {
        self.hub.notify(Notify::SetIrq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::pia::{ControlLine, Pia};

    fn keyboard_pia() -> (Pia<KeyboardPorts>, KeyboardQueue, Arc<SignalHub>) {
        let queue = KeyboardQueue::new();
        let hub = Arc::new(SignalHub::new());
        let pia = Pia::new(KeyboardPorts::new(queue.clone(), hub.clone()));
        (pia, queue, hub)
    }

    #[test]
    fn keys_come_out_in_fifo_order() {
        let (mut pia, queue, _hub) = keyboard_pia();
        pia.write(1, 0x04); // CRA: data register access
        queue.push(b'A');
        queue.push(b'B');
        assert_eq!(pia.read(0), b'A');
        assert_eq!(pia.read(0), b'B');
        // Queue drained: the last key is latched.
        assert_eq!(pia.read(0), b'B');
    }

    #[test]
    fn first_request_emits_notification_once() {
        let (mut pia, _queue, hub) = keyboard_pia();
        let rx = hub.subscribe(Notify::FirstKeyboardRequest);
        pia.write(1, 0x04);
        pia.read(0);
        pia.read(0);
        assert_eq!(rx.try_recv(), Ok(Notify::FirstKeyboardRequest));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn pending_key_requests_ca1_strobe() {
        let (mut pia, queue, _hub) = keyboard_pia();
        pia.write(1, 0x04);
        queue.push(0x0D);
        pia.read(0);
        assert!(pia.ports.take_pending_ca1());
        assert!(!pia.ports.take_pending_ca1());
    }

    #[test]
    fn enabled_ca1_transition_raises_irq() {
        let (mut pia, _queue, hub) = keyboard_pia();
        let rx = hub.subscribe(Notify::SetIrq);
        pia.write(1, 0x04 | 0x01); // data access + IRQ1 enable
        pia.active_transition(ControlLine::Ca1);
        assert_eq!(rx.try_recv(), Ok(Notify::SetIrq));
    }

    #[test]
    fn port_b_mixes_modifiers_and_hint() {
        let (mut pia, queue, _hub) = keyboard_pia();
        pia.write(3, 0x04);
        queue.set_modifiers(SHIFT_KEY);
        assert_eq!(pia.read(2), SHIFT_KEY);
        queue.push(b'x');
        assert_eq!(pia.read(2), SHIFT_KEY | 0x80);
    }
}
