//! Text command channel on a dedicated I/O port.
//!
//! The guest writes command bytes that accumulate until NUL, then the
//! line is tokenized on spaces and executed. The reply is read back one
//! byte at a time, NUL-terminated; newlines leave the port as carriage
//! returns so FLEX prints them correctly.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::disk::fdc::{Fdc, DRIVE_COUNT};
use crate::scheduler::{RunState, SchedulerState};
use crate::signals::{Notify, SignalHub};

const MAX_COMMAND: usize = 128;

const ERR_UNKNOWN: &str = "Unknown command";
const ERR_PARAM: &str = "Parameter invalid";
const ERR_UNABLE_MOUNT: &str = "Unable to mount drive";
const ERR_UNABLE_UMOUNT: &str = "Unable to umount drive";
const ERR_UNABLE_UPDATE: &str = "Unable to update drive. There are open files";
const ERR_CANT_CHANGE_GRAPHIC: &str = "Unable to change to graphic mode";
const ERR_UNABLE_FORMAT: &str = "Unable to format disk";

pub struct CommandChannel {
    command: Vec<u8>,
    answer: Vec<u8>,
    answer_pos: usize,
    sched: Arc<SchedulerState>,
    hub: Arc<SignalHub>,
    /// True while serial output goes to the text terminal.
    route_terminal: Arc<AtomicBool>,
    /// A graphical front end is attached (never, in terminal builds).
    gui_available: bool,
}

impl CommandChannel {
    pub fn new(
        sched: Arc<SchedulerState>,
        hub: Arc<SignalHub>,
        route_terminal: Arc<AtomicBool>,
    ) -> Self {
        Self {
            command: Vec::new(),
            answer: Vec::new(),
            answer_pos: 0,
            sched,
            hub,
            route_terminal,
            gui_available: false,
        }
    }

    pub fn reset(&mut self) {
        self.command.clear();
        self.answer.clear();
        self.answer_pos = 0;
    }

    /// Read the next reply byte; 0x00 terminates the reply.
    pub fn read_io(&mut self) -> u8 {
        if self.answer_pos < self.answer.len() {
            let byte = self.answer[self.answer_pos];
            self.answer_pos += 1;
            if byte == b'\n' {
                0x0D
            } else {
                byte
            }
        } else {
            self.answer.clear();
            self.answer_pos = 0;
            0x00
        }
    }

    /// Accumulate one command byte; NUL executes the line.
    pub fn write_io(&mut self, value: u8, fdc: &mut Fdc) {
        self.answer.clear();
        self.answer_pos = 0;

        if value != 0 {
            if self.command.len() < MAX_COMMAND - 1 {
                self.command.push(value);
            }
            return;
        }

        let line = String::from_utf8_lossy(&self.command).to_string();
        self.command.clear();
        log::debug!("command: {line}");
        self.execute(&line, fdc);
    }

    fn answer(&mut self, text: &str) {
        self.answer = text.as_bytes().to_vec();
        self.answer_pos = 0;
    }

    /// Strip an optional drive prefix (`0.`) and file extension from
    /// the command word, so `1.mount.cmd` executes as `mount`.
    fn strip_command_token(token: &str) -> &str {
        let bytes = token.as_bytes();
        let token = if bytes.len() > 2 && bytes[0].is_ascii_digit() && bytes[1] == b'.' {
            &token[2..]
        } else {
            token
        };
        token.split('.').next().unwrap_or(token)
    }

    fn parse_drive(token: &str) -> Option<usize> {
        let number: usize = token.parse().ok()?;
        (number < DRIVE_COUNT).then_some(number)
    }

    fn execute(&mut self, line: &str, fdc: &mut Fdc) {
        let args: Vec<&str> = line.split(' ').filter(|t| !t.is_empty()).collect();
        let Some(&first) = args.first() else {
            self.answer(ERR_UNKNOWN);
            return;
        };
        let keyword = Self::strip_command_token(first).to_ascii_lowercase();

        match (keyword.as_str(), args.len()) {
            ("exit", 1) => self.sched.set_state(RunState::Exit),
            ("irq", 1) => self.hub.notify(Notify::SetIrq),
            ("firq", 1) => self.hub.notify(Notify::SetFirq),
            ("nmi", 1) => self.hub.notify(Notify::SetNmi),
            ("terminal", 1) => self.route_terminal.store(true, Ordering::Relaxed),
            ("graphic", 1) => {
                if self.gui_available {
                    self.route_terminal.store(false, Ordering::Relaxed);
                } else {
                    self.answer(ERR_CANT_CHANGE_GRAPHIC);
                }
            }
            ("freq", 1) => {
                let text = format!("{:.2} MHz", self.sched.realized_frequency());
                self.answer(&text);
            }
            ("freq", 2) => match args[1].parse::<f64>() {
                Ok(mhz) if mhz >= 0.0 => self.sched.set_target_frequency(mhz),
                _ => self.answer(ERR_PARAM),
            },
            ("cycles", 1) => {
                let text = format!("{} cycles", self.sched.total_cycles());
                self.answer(&text);
            }
            ("info", 1) => {
                let mut text = String::new();
                for drive in 0..DRIVE_COUNT {
                    text.push_str(&fdc.drive_info_string(drive));
                }
                self.answer(&text);
            }
            ("info", 2) => match Self::parse_drive(args[1]) {
                Some(drive) => {
                    let text = fdc.drive_info_string(drive);
                    self.answer(&text);
                }
                None => self.answer(ERR_PARAM),
            },
            ("update", 1) => {
                if fdc.sync_all().is_err() {
                    self.answer(ERR_UNABLE_UPDATE);
                }
            }
            ("update", 2) => match Self::parse_drive(args[1]) {
                Some(drive) => {
                    if fdc.sync_drive(drive).is_err() {
                        self.answer(ERR_UNABLE_UPDATE);
                    }
                }
                None => self.answer(ERR_PARAM),
            },
            ("umount", 2) => match Self::parse_drive(args[1]) {
                Some(drive) => {
                    if fdc.unmount(drive).is_err() {
                        self.answer(ERR_UNABLE_UMOUNT);
                    }
                }
                None => self.answer(ERR_PARAM),
            },
            ("mount", 3) | ("rmount", 3) => match Self::parse_drive(args[2]) {
                Some(drive) => {
                    let read_only = keyword == "rmount";
                    if let Err(e) = fdc.mount(Path::new(args[1]), drive, read_only) {
                        log::warn!("mount failed: {e}");
                        self.answer(ERR_UNABLE_MOUNT);
                    }
                }
                None => self.answer(ERR_PARAM),
            },
            ("format", 4) => {
                let tracks = args[2].parse::<u16>();
                let sectors = args[3].parse::<u16>();
                match (tracks, sectors) {
                    (Ok(tracks), Ok(sectors)) if tracks >= 2 && sectors >= 5 => {
                        if let Err(e) = Fdc::format_disk(Path::new(args[1]), tracks, sectors) {
                            log::warn!("format failed: {e}");
                            self.answer(ERR_UNABLE_FORMAT);
                        }
                    }
                    _ => self.answer(ERR_PARAM),
                }
            }
            _ => self.answer(ERR_UNKNOWN),
        }
    }
}
