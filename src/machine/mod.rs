//! The emulated machine: MC6809 CPU wired to the memory bus and its
//! peripherals.

pub mod acia;
pub mod bus;
pub mod command;
pub mod cpu;
pub mod joystick;
pub mod keyboard;
pub mod mmu;
pub mod pia;
pub mod rom;
pub mod rtc;

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::errors::Result;
use crate::scheduler::SchedulerState;
use crate::signals::SignalHub;
use crate::terminal::TerminalLink;

use bus::Bus;
use cpu::Mc6809;
use joystick::MouseHandle;
use keyboard::KeyboardQueue;
use pia::ControlLine;

pub struct Machine {
    pub cpu: Mc6809,
    pub bus: Bus,
}

impl Machine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        himem: bool,
        use_undocumented: bool,
        hub: Arc<SignalHub>,
        keyboard: KeyboardQueue,
        mouse: MouseHandle,
        terminal: TerminalLink,
        route_terminal: Arc<AtomicBool>,
        sched: Arc<SchedulerState>,
    ) -> Result<Self> {
        let bus = Bus::new(himem, hub, keyboard, mouse, terminal, route_terminal, sched)?;
        let mut cpu = Mc6809::new();
        cpu.use_undocumented = use_undocumented;
        Ok(Self { cpu, bus })
    }

    pub fn load_rom(&mut self, path: &Path) -> Result<()> {
        self.bus.load_rom_file(path)
    }

    /// Execute one instruction (or service one interrupt).
    pub fn step(&mut self) -> u32 {
        self.bus.cycle_stamp = self.cpu.cycles;
        self.cpu.step(&mut self.bus)
    }

    /// Power-on style reset: peripherals first, then the CPU latches
    /// its reset and restarts through the vector.
    pub fn reset(&mut self) {
        self.bus.reset();
        self.cpu.request_reset();
    }

    /// A keystroke was queued from the UI thread; strobe CA1.
    pub fn key_transition(&mut self) {
        self.bus.pia1.active_transition(ControlLine::Ca1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::cpu::BusIo;

    fn machine() -> Machine {
        Machine::new(
            true,
            false,
            Arc::new(SignalHub::new()),
            KeyboardQueue::new(),
            MouseHandle::new(),
            TerminalLink::new(),
            Arc::new(AtomicBool::new(true)),
            Arc::new(SchedulerState::new(false)),
        )
        .unwrap()
    }

    #[test]
    fn reset_boots_through_the_vector() {
        let mut machine = machine();
        machine.bus.write_rom(0xFFFE, 0xF0);
        machine.bus.write_rom(0xFFFF, 0x1E);
        machine.bus.write_rom(0xF01E, 0x12); // NOP
        machine.reset();
        machine.step();
        assert_eq!(machine.cpu.pc, 0xF01E);
        machine.step();
        assert_eq!(machine.cpu.pc, 0xF01F);
    }

    #[test]
    fn boot_from_directory_disk() {
        // End-to-end: a directory with a 256-byte boot file whose first
        // instruction jumps to the monitor warm start.
        let dir = tempfile::TempDir::new().unwrap();
        let mut boot = vec![0u8; 256];
        boot[0] = 0x7E; // JMP $F02D
        boot[1] = 0xF0;
        boot[2] = 0x2D;
        std::fs::write(dir.path().join("boot"), &boot).unwrap();

        let mut machine = machine();
        machine.bus.fdc.mount(dir.path(), 0, false).unwrap();

        // Monitor stub at $F01E: read boot sector to $0100 via the
        // controller, then jump to it. Hand-rolled here: the test reads
        // the sector through the FDC registers like the ROM would.
        machine.bus.write_byte(bus::IO_BASE + 0xFB, 0x01); // select drive 0
        machine.bus.write_byte(bus::IO_BASE + 0xFE, 1); // sector 1
        machine.bus.write_byte(bus::IO_BASE + 0xFC, 0x80); // read sector
        for i in 0..256u16 {
            let byte = machine.bus.read_byte(bus::IO_BASE + 0xFF);
            machine.bus.write_byte(0x0100 + i, byte);
        }

        // Execute from $0100: the loaded JMP must land on $F02D.
        machine.bus.write_rom(0xFFFE, 0x01);
        machine.bus.write_rom(0xFFFF, 0x00);
        machine.reset();
        machine.step(); // reset latch
        machine.step(); // JMP $F02D
        assert_eq!(machine.cpu.pc, 0xF02D);
    }

    #[test]
    fn keyboard_to_cpu_interrupt_path() {
        let hub = Arc::new(SignalHub::new());
        let keyboard = KeyboardQueue::new();
        let mut machine = Machine::new(
            true,
            false,
            hub.clone(),
            keyboard.clone(),
            MouseHandle::new(),
            TerminalLink::new(),
            Arc::new(AtomicBool::new(true)),
            Arc::new(SchedulerState::new(false)),
        )
        .unwrap();

        let irq_rx = hub.subscribe(crate::signals::Notify::SetIrq);

        // Enable the PIA1 CA1 interrupt, data-register access.
        machine.bus.write_byte(bus::IO_BASE + 0xF1, 0x05);
        keyboard.push(b'A');
        machine.key_transition();
        assert_eq!(irq_rx.try_recv(), Ok(crate::signals::Notify::SetIrq));

        // The guest reads the key back from port A.
        assert_eq!(machine.bus.read_byte(bus::IO_BASE + 0xF0), b'A');
    }
}
