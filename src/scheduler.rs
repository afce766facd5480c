//! CPU worker: drives the machine at a requested clock frequency,
//! executes cross-thread commands at instruction boundaries and fans
//! interrupt notifications into the CPU.
//!
//! Two threads share a [`SchedulerState`]: the UI/main thread posts
//! state transitions and commands, the worker owns the [`Machine`] and
//! runs it. Synchronous commands block their poster until the worker
//! has run them between two instructions (or cancels them on exit).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::errors::EmuError;
use crate::machine::cpu::BusIo;
use crate::machine::Machine;
use crate::signals::{Notify, SignalHub};
use crate::terminal::Terminal;

/// Default CPU clock of the emulated machine.
pub const DEFAULT_FREQUENCY_MHZ: f64 = 1.3396;

/// Wall-clock window for frequency regulation.
const SAMPLE_WINDOW: Duration = Duration::from_millis(20);
/// Nap taken when the worker runs ahead of the target frequency.
const AHEAD_NAP: Duration = Duration::from_millis(1);
/// Instructions executed per loop turn before the bookkeeping runs.
const BATCH_INSTRUCTIONS: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Run,
    Stop,
    /// Reset the machine, then continue running.
    ResetRun,
    /// Halted on an invalid instruction.
    Invalid,
    Exit,
}

/// A closure executed on the CPU thread between two instructions.
pub type Command = Box<dyn FnOnce(&mut Machine) + Send>;

struct Envelope {
    run: Command,
    /// Present for synchronous commands; dropped on cancellation,
    /// which unblocks the poster with an error.
    done: Option<Sender<()>>,
}

/// State shared between the worker and every other thread.
pub struct SchedulerState {
    state: Mutex<RunState>,
    target_mhz: Mutex<f64>,
    realized_mhz: Mutex<f64>,
    total_cycles: AtomicU64,
    halt_on_invalid: bool,
}

impl SchedulerState {
    pub fn new(halt_on_invalid: bool) -> Self {
        Self {
            state: Mutex::new(RunState::Run),
            target_mhz: Mutex::new(DEFAULT_FREQUENCY_MHZ),
            realized_mhz: Mutex::new(0.0),
            total_cycles: AtomicU64::new(0),
            halt_on_invalid,
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn target_frequency(&self) -> f64 {
        *self.target_mhz.lock().unwrap()
    }

    /// Target frequency in MHz; zero runs unthrottled.
    pub fn set_target_frequency(&self, mhz: f64) {
        *self.target_mhz.lock().unwrap() = mhz.max(0.0);
    }

    pub fn realized_frequency(&self) -> f64 {
        *self.realized_mhz.lock().unwrap()
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles.load(Ordering::Relaxed)
    }
}

/// Clonable posting side of the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    pub shared: Arc<SchedulerState>,
    commands: Sender<Envelope>,
}

impl SchedulerHandle {
    /// Post a command without waiting for it.
    pub fn post(&self, run: Command) {
        let _ = self.commands.send(Envelope { run, done: None });
    }

    /// Post a command and block until the CPU thread has executed it.
    /// Returns false when the scheduler exited before running it.
    pub fn sync_exec(&self, run: Command) -> bool {
        let (tx, rx) = bounded(1);
        if self
            .commands
            .send(Envelope { run, done: Some(tx) })
            .is_err()
        {
            return false;
        }
        rx.recv().is_ok()
    }

    pub fn request_exit(&self) {
        self.shared.set_state(RunState::Exit);
    }
}

pub struct Scheduler {
    machine: Machine,
    shared: Arc<SchedulerState>,
    commands: Receiver<Envelope>,
    terminal: Terminal,

    irq_rx: Receiver<Notify>,
    firq_rx: Receiver<Notify>,
    nmi_rx: Receiver<Notify>,
}

impl Scheduler {
    pub fn new(
        machine: Machine,
        hub: &SignalHub,
        terminal: Terminal,
        shared: Arc<SchedulerState>,
    ) -> (Self, SchedulerHandle) {
        let (tx, rx) = unbounded();

        let scheduler = Self {
            machine,
            shared: shared.clone(),
            commands: rx,
            terminal,
            irq_rx: hub.subscribe(Notify::SetIrq),
            firq_rx: hub.subscribe(Notify::SetFirq),
            nmi_rx: hub.subscribe(Notify::SetNmi),
        };
        (scheduler, SchedulerHandle { shared, commands: tx })
    }

    /// The CPU loop. Returns when the state becomes `Exit`.
    pub fn run(mut self) {
        let mut window_start = Instant::now();
        let mut window_cycles: u64 = 0;
        let mut last_second = Instant::now();

        loop {
            match self.shared.state() {
                RunState::Exit => break,
                RunState::Stop | RunState::Invalid => {
                    // Parked: only commands are served.
                    if let Ok(envelope) = self.commands.recv_timeout(Duration::from_millis(10)) {
                        self.execute(envelope);
                    }
                    window_start = Instant::now();
                    window_cycles = 0;
                    continue;
                }
                RunState::ResetRun => {
                    self.machine.reset();
                    self.shared.set_state(RunState::Run);
                }
                RunState::Run => {}
            }

            self.drain_commands();
            self.drain_interrupts();
            self.machine.bus.acia.poll();

            if self.machine.cpu.is_waiting() {
                // SYNC/CWAI with nothing pending: block until any
                // command arrives instead of spinning on idle steps.
                if let Ok(envelope) = self.commands.recv_timeout(Duration::from_millis(1)) {
                    self.execute(envelope);
                }
                // Let the wait itself consume a little time.
                window_cycles += u64::from(self.machine.step());
                self.publish_cycles();
                continue;
            }

            for _ in 0..BATCH_INSTRUCTIONS {
                window_cycles += u64::from(self.machine.step());
                if let Some(pc) = self.machine.cpu.take_invalid() {
                    if self.shared.halt_on_invalid {
                        let opcode = self.machine.bus.read_byte(pc);
                        log::error!("halting: {}", EmuError::InvalidInstruction { opcode, pc });
                        self.shared.set_state(RunState::Invalid);
                        break;
                    }
                }
                if self.machine.cpu.is_waiting() {
                    break;
                }
            }
            self.publish_cycles();

            if last_second.elapsed() >= Duration::from_secs(1) {
                last_second += Duration::from_secs(1);
                self.machine.bus.rtc.update_1_second();
            }

            // Frequency regulation over 20 ms windows.
            let target = self.shared.target_frequency();
            if target > 0.0 {
                let budget = (target * 1_000_000.0 * SAMPLE_WINDOW.as_secs_f64()) as u64;
                if window_cycles >= budget {
                    while window_start.elapsed() < SAMPLE_WINDOW {
                        std::thread::sleep(AHEAD_NAP);
                    }
                }
            }

            let elapsed = window_start.elapsed();
            if elapsed >= SAMPLE_WINDOW {
                let mhz = window_cycles as f64 / elapsed.as_secs_f64() / 1_000_000.0;
                *self.shared.realized_mhz.lock().unwrap() = mhz;
                window_start = Instant::now();
                window_cycles = 0;
            }
        }

        // Cancel whatever is still queued; posters unblock with an error.
        while let Ok(envelope) = self.commands.try_recv() {
            drop(envelope);
        }
        log::info!("scheduler exited after {} cycles", self.shared.total_cycles());
    }

    fn execute(&mut self, envelope: Envelope) {
        (envelope.run)(&mut self.machine);
        if let Some(done) = envelope.done {
            let _ = done.try_send(());
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(envelope) = self.commands.try_recv() {
            self.execute(envelope);
        }
    }

    fn drain_interrupts(&mut self) {
        while self.irq_rx.try_recv().is_ok() {
            self.machine.cpu.raise_irq();
        }
        while self.firq_rx.try_recv().is_ok() {
            self.machine.cpu.raise_firq();
        }
        while self.nmi_rx.try_recv().is_ok() {
            self.machine.cpu.raise_nmi();
        }
        for notify in self.terminal.drain_signals() {
            match notify {
                Notify::SetIrq => self.machine.cpu.raise_irq(),
                Notify::SetFirq => self.machine.cpu.raise_firq(),
                Notify::SetNmi => self.machine.cpu.raise_nmi(),
                _ => {}
            }
        }
    }

    fn publish_cycles(&self) {
        self.shared
            .total_cycles
            .store(self.machine.cpu.cycles, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transitions() {
        let state = SchedulerState::new(false);
        assert_eq!(state.state(), RunState::Run);
        state.set_state(RunState::Stop);
        assert_eq!(state.state(), RunState::Stop);
        state.set_state(RunState::Exit);
        assert_eq!(state.state(), RunState::Exit);
    }

    #[test]
    fn negative_frequency_is_clamped() {
        let state = SchedulerState::new(false);
        state.set_target_frequency(-2.0);
        assert_eq!(state.target_frequency(), 0.0);
        state.set_target_frequency(1.5);
        assert_eq!(state.target_frequency(), 1.5);
    }

    #[test]
    fn regulation_budget_matches_window() {
        // 1 MHz over 20 ms is exactly 20000 cycles.
        let budget = (1.0 * 1_000_000.0 * SAMPLE_WINDOW.as_secs_f64()) as u64;
        assert_eq!(budget, 20_000);
    }
}
