//! Terminal-mode entry point.
//!
//! Builds the machine from the saved configuration plus command line
//! overrides, runs the CPU worker thread, and serves the controlling
//! terminal as the guest's serial console until the guest (or a
//! command-channel `exit`) shuts the scheduler down.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use filament::config::Config;
use filament::disk::geometry::Geometry;
use filament::errors::{EmuError, Result};
use filament::machine::joystick::MouseHandle;
use filament::machine::keyboard::KeyboardQueue;
use filament::machine::Machine;
use filament::scheduler::{Scheduler, SchedulerState};
use filament::signals::SignalHub;
use filament::terminal::{Terminal, TerminalLink};

const USAGE: &str = "usage: filament [options]
  -m <file>      monitor ROM (Intel HEX or Motorola S-record)
  -0..-3 <path>  mount disk image or directory on drive 0..3
  -f <mhz>       target frequency (0 = unthrottled)
  -u             enable undocumented instructions
  -i             halt on invalid instruction
  -t <n> -s <n>  default geometry for directory disks
  -S             save the resulting options as defaults
  -h             this help";

fn main() -> ExitCode {
    env_logger::init();

    let mut config = Config::load();
    let mut save_config = false;
    match apply_args(&mut config, &mut save_config) {
        Ok(true) => {}
        Ok(false) => return ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    }
    if save_config {
        config.save();
    }

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("filament: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Fold command line arguments into the configuration.
/// Returns Ok(false) when only help was requested.
fn apply_args(config: &mut Config, save_config: &mut bool) -> std::result::Result<bool, String> {
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next().ok_or_else(|| format!("missing argument for {name}"))
        };
        match arg.as_str() {
            "-m" => config.rom_path = Some(PathBuf::from(value("-m")?)),
            "-0" | "-1" | "-2" | "-3" => {
                let drive = arg[1..].parse::<usize>().unwrap();
                config.drive_paths[drive] = Some(PathBuf::from(value(&arg)?));
            }
            "-f" => {
                config.frequency_mhz = value("-f")?
                    .parse::<f64>()
                    .ok()
                    .filter(|f| *f >= 0.0)
                    .ok_or("invalid frequency")?;
            }
            "-u" => config.use_undocumented = true,
            "-i" => config.halt_on_invalid = true,
            "-t" => {
                config.default_tracks =
                    value("-t")?.parse().map_err(|_| "invalid track count")?;
            }
            "-s" => {
                config.default_sectors =
                    value("-s")?.parse().map_err(|_| "invalid sector count")?;
            }
            "-S" => *save_config = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(false);
            }
            other => return Err(format!("unknown option {other}")),
        }
    }
    Ok(true)
}

fn run(config: Config) -> Result<()> {
    let hub = Arc::new(SignalHub::new());
    let keyboard = KeyboardQueue::new();
    let mouse = MouseHandle::new();
    let link = TerminalLink::new();
    let route_terminal = Arc::new(AtomicBool::new(true));
    let shared = Arc::new(SchedulerState::new(config.halt_on_invalid));
    shared.set_target_frequency(config.frequency_mhz);

    let mut machine = Machine::new(
        config.himem,
        config.use_undocumented,
        hub.clone(),
        keyboard,
        mouse,
        link.clone(),
        route_terminal,
        shared.clone(),
    )?;
    machine.bus.fdc.default_geometry =
        Geometry::new(config.default_tracks, config.default_sectors);

    if let Some(rom) = &config.rom_path {
        machine.load_rom(rom)?;
    }
    for (drive, path) in config.drive_paths.iter().enumerate() {
        if let Some(path) = path {
            machine.bus.fdc.mount(path, drive, false)?;
        }
    }
    machine.reset();

    let terminal = Terminal::attach(link.clone()).unwrap_or_else(|e| {
        log::warn!("no controlling terminal ({e}); running detached");
        link.set_echo_stdout(true);
        Terminal::detached(link)
    });

    let (worker, _handle) = Scheduler::new(machine, &hub, terminal, shared);
    let cpu_thread = std::thread::Builder::new()
        .name("cpu".into())
        .spawn(move || worker.run())
        .map_err(|e| EmuError::io("spawn cpu thread", e))?;

    cpu_thread
        .join()
        .map_err(|_| EmuError::io("cpu thread", std::io::Error::other("panicked")))?;
    Ok(())
}
