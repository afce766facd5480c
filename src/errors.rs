//! Error kinds surfaced by the emulator core.
//!
//! Peripheral state machines recover locally and never return these;
//! they latch faults into guest-visible status registers instead.
//! Mount, format, load and host-I/O paths propagate `EmuError` with `?`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmuError {
    #[error("invalid instruction {opcode:02X} at {pc:04X}")]
    InvalidInstruction { opcode: u8, pc: u16 },

    #[error("I/O device registration at {base:04X}+{size} outside the I/O window")]
    IoAddressInvalid { base: u16, size: u16 },

    #[error("unable to mount {path}: {reason}")]
    DiskMountFailed { path: PathBuf, reason: String },

    #[error("unable to format disk: {0}")]
    DiskFormatFailed(String),

    #[error("no free sectors left on disk")]
    DiskFull,

    #[error("disk is write protected")]
    DiskWriteProtected,

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("allocation of {0} bytes failed")]
    AllocationFailed(usize),
}

impl EmuError {
    /// Wrap a host I/O error with the operation that produced it.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, EmuError>;
