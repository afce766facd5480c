//! Joystick / bell adapter (PIA2).
//!
//! Port B mixes the mouse buttons (with SHIFT/CTRL remapping), and the
//! emulation of the analog joystick: with no pointer movement a middle
//! frequency of ~6.4 kHz toggles port bits 0 (horizontal) and 7
//! (vertical); pointer movement shifts the period through a lookup table
//! clamped to ±15 pixels. Bit 6 of a port B write activates the bell.

use std::sync::{Arc, Mutex};

use crate::signals::{Notify, SignalHub};

use super::keyboard::{KeyboardQueue, CONTROL_KEY, SHIFT_KEY};
use super::pia::PiaPorts;

pub const LEFT_BUTTON: u8 = 0x01;
pub const MIDDLE_BUTTON: u8 = 0x02;
pub const RIGHT_BUTTON: u8 = 0x04;

const TAB_OFFSET: i32 = 15;

/// Oscillator period (CPU cycles, ×16 fixed point applied on use) per
/// clamped mouse delta. Index 15 is "no movement".
const PERIOD_FROM_MOUSE: [i32; (TAB_OFFSET * 2 + 1) as usize] = [
    8000, 7084, 6272, 5554, 4918, 4354, 3856, 3414, 3023, 2677, 2370, 2099, 1858, 1645, 1457,
    1290, 1142, 1011, 896, 793, 702, 622, 550, 487, 432, 382, 338, 300, 265, 235, 208,
];

#[derive(Default)]
struct MouseInner {
    delta_x: i32,
    delta_y: i32,
    buttons: u8,
    new_values: bool,
}

/// Shared mouse state: the UI thread writes deltas and buttons, the CPU
/// thread reads and clears them on PIA2 port B access.
#[derive(Clone, Default)]
pub struct MouseHandle {
    inner: Arc<Mutex<MouseInner>>,
}

impl MouseHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, delta_x: i32, delta_y: i32, buttons: u8) {
        let mut inner = self.inner.lock().unwrap();
        inner.delta_x = delta_x;
        inner.delta_y = delta_y;
        inner.buttons = buttons;
        inner.new_values = true;
    }

    /// Read and consume the "new values" marker.
    fn get(&self) -> (i32, i32, u8, bool) {
        let mut inner = self.inner.lock().unwrap();
        let fresh = std::mem::take(&mut inner.new_values);
        (inner.delta_x, inner.delta_y, inner.buttons, fresh)
    }
}

pub struct JoystickPorts {
    mouse: MouseHandle,
    keyboard: KeyboardQueue,
    hub: Arc<SignalHub>,

    /// Port B latch: oscillator bits 0/7 and bell bit 6 survive reads.
    orb: u8,

    /// CPU cycle stamp, pushed in by the bus before each access.
    cycles: u64,
    prev_cycles: u64,

    reads_since_move: u32,
    period_x: i32,
    period_y: i32,
    acc_x: i32,
    acc_y: i32,
}

impl JoystickPorts {
    pub fn new(mouse: MouseHandle, keyboard: KeyboardQueue, hub: Arc<SignalHub>) -> Self {
        let mid = PERIOD_FROM_MOUSE[TAB_OFFSET as usize];
        Self {
            mouse,
            keyboard,
            hub,
            orb: 0,
            cycles: 0,
            prev_cycles: 0,
            reads_since_move: 0,
            period_x: mid,
            period_y: mid,
            acc_x: 0,
            acc_y: 0,
        }
    }

    pub fn reset(&mut self) {
        let mid = PERIOD_FROM_MOUSE[TAB_OFFSET as usize];
        self.orb = 0;
        self.cycles = 0;
        self.prev_cycles = 0;
        self.reads_since_move = 0;
        self.period_x = mid;
        self.period_y = mid;
        self.acc_x = 0;
        self.acc_y = 0;
    }

    /// Update the cycle stamp before dispatching a register access.
    pub fn sync_cycles(&mut self, cycles: u64) {
        self.cycles = cycles;
    }

    fn clamp(delta: i32) -> i32 {
        delta.clamp(-TAB_OFFSET, TAB_OFFSET)
    }
}

impl PiaPorts for JoystickPorts {
    fn input_b(&mut self) -> u8 {
        let (delta_x, delta_y, buttons, fresh) = self.mouse.get();
        let keys = self.keyboard.modifiers();

        // Keep oscillator and bell bits, rebuild the button bits.
        self.orb &= 0xC1;

        if buttons & LEFT_BUTTON != 0 {
            if keys & SHIFT_KEY != 0 {
                self.orb |= 0x20;
            } else {
                self.orb |= 0x02;
            }
        }
        if buttons & MIDDLE_BUTTON != 0 {
            if keys & SHIFT_KEY != 0 {
                self.orb |= 0x08;
            } else if keys & CONTROL_KEY != 0 {
                self.orb |= 0x10;
            } else {
                self.orb |= 0x20;
            }
        }
        if buttons & RIGHT_BUTTON != 0 {
            if keys & SHIFT_KEY != 0 {
                self.orb |= 0x20;
            } else {
                self.orb |= 0x04;
            }
        }

        self.reads_since_move += 1;
        if fresh {
            self.reads_since_move = 0;
        }

        // Stale deltas decay to center after ~300 polls.
        let (dx, dy) = if self.reads_since_move < 300 {
            (Self::clamp(delta_x), Self::clamp(delta_y))
        } else {
            (0, 0)
        };

        let diff = self.cycles.wrapping_sub(self.prev_cycles);
        self.prev_cycles = self.cycles;

        if diff > 100 {
            // Long gap since the last poll: restart the measurement.
            self.period_x = PERIOD_FROM_MOUSE[(dx + TAB_OFFSET) as usize];
            self.period_y = PERIOD_FROM_MOUSE[(dy + TAB_OFFSET) as usize];
            self.acc_x = 0;
            self.acc_y = 0;
        } else {
            let step = (diff as i32) << 4;

            self.acc_x += step;
            if self.acc_x >= self.period_x {
                self.acc_x -= self.period_x;
                self.period_x = PERIOD_FROM_MOUSE[(dx + TAB_OFFSET) as usize];
                self.orb ^= 0x01;
            }

            self.acc_y += step;
            if self.acc_y >= self.period_y {
                self.acc_y -= self.period_y;
                self.period_y = PERIOD_FROM_MOUSE[(dy + TAB_OFFSET) as usize];
                self.orb ^= 0x80;
            }
        }

        self.orb
    }

    fn output_b(&mut self, value: u8) {
        if value & 0x40 != 0 {
            self.hub.notify(Notify::Bell);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::pia::Pia;

    fn joystick_pia() -> (Pia<JoystickPorts>, MouseHandle, KeyboardQueue, Arc<SignalHub>) {
        let mouse = MouseHandle::new();
        let keyboard = KeyboardQueue::new();
        let hub = Arc::new(SignalHub::new());
        let ports = JoystickPorts::new(mouse.clone(), keyboard.clone(), hub.clone());
        let mut pia = Pia::new(ports);
        pia.write(1, 0x04);
        pia.write(3, 0x04);
        (pia, mouse, keyboard, hub)
    }

    #[test]
    fn left_button_maps_to_bit1() {
        let (mut pia, mouse, _kbd, _hub) = joystick_pia();
        mouse.set(0, 0, LEFT_BUTTON);
        assert_ne!(pia.read(2) & 0x02, 0);
    }

    #[test]
    fn shifted_left_button_acts_as_middle() {
        let (mut pia, mouse, kbd, _hub) = joystick_pia();
        kbd.set_modifiers(SHIFT_KEY);
        mouse.set(0, 0, LEFT_BUTTON);
        let value = pia.read(2);
        assert_ne!(value & 0x20, 0);
        assert_eq!(value & 0x02, 0);
    }

    #[test]
    fn bell_on_bit6_write() {
        let (mut pia, _mouse, _kbd, hub) = joystick_pia();
        let rx = hub.subscribe(Notify::Bell);
        pia.write(2, 0x40);
        assert_eq!(rx.try_recv(), Ok(Notify::Bell));
    }

    #[test]
    fn oscillator_toggles_bit0_at_center_period() {
        let (mut pia, _mouse, _kbd, _hub) = joystick_pia();
        // Poll every 50 cycles: accumulator grows by 800 (50<<4) per
        // read against the 6272-cycle center period.
        let mut toggles = 0;
        let mut last = pia.read(2) & 0x01;
        for step in 1..200u64 {
            pia.ports.sync_cycles(step * 50);
            let bit = pia.read(2) & 0x01;
            if bit != last {
                toggles += 1;
                last = bit;
            }
        }
        assert!(toggles > 10, "oscillator never toggled");
    }

    #[test]
    fn large_poll_gap_restarts_measurement() {
        let (mut pia, mouse, _kbd, _hub) = joystick_pia();
        mouse.set(TAB_OFFSET, 0, 0);
        pia.ports.sync_cycles(10_000);
        pia.read(2);
        assert_eq!(pia.ports.period_x, PERIOD_FROM_MOUSE[(2 * TAB_OFFSET) as usize]);
        assert_eq!(pia.ports.acc_x, 0);
    }
}
