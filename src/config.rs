// Persistent emulator options: clock frequency, ROM image, drive paths.
// Stored as JSON in <config_dir>/filament/config.json; command line
// arguments override the stored values for one session.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::scheduler::DEFAULT_FREQUENCY_MHZ;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target CPU frequency in MHz; 0 runs unthrottled.
    pub frequency_mhz: f64,
    /// Monitor ROM image (Intel HEX or Motorola S-record).
    pub rom_path: Option<PathBuf>,
    /// Disk image files or directories mounted at startup.
    pub drive_paths: [Option<PathBuf>; 4],
    /// Execute undocumented MC6809 opcodes instead of trapping them.
    pub use_undocumented: bool,
    /// Full 768 KiB video RAM extension.
    pub himem: bool,
    /// Stop the scheduler when an invalid opcode is hit.
    pub halt_on_invalid: bool,
    /// Geometry for directory mounts without a `.flexdiskrc`.
    pub default_tracks: u16,
    pub default_sectors: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frequency_mhz: DEFAULT_FREQUENCY_MHZ,
            rom_path: None,
            drive_paths: [None, None, None, None],
            use_undocumented: false,
            himem: true,
            halt_on_invalid: false,
            default_tracks: 80,
            default_sectors: 18,
        }
    }
}

impl Config {
    fn config_dir() -> Option<PathBuf> {
        if let Ok(dir) = env::var("XDG_CONFIG_HOME") {
            if !dir.is_empty() {
                return Some(PathBuf::from(dir).join("filament"));
            }
        }
        env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".config").join("filament"))
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("config.json"))
    }

    /// Load from disk; missing or unreadable files yield the defaults.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                log::warn!("config {} is invalid: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) {
        let Some(path) = Self::config_path() else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    log::warn!("cannot save config: {e}");
                }
            }
            Err(e) => log::warn!("cannot serialize config: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.frequency_mhz, DEFAULT_FREQUENCY_MHZ);
        assert_eq!(config.default_tracks, 80);
        assert_eq!(config.default_sectors, 18);
        assert!(!config.use_undocumented);
    }

    #[test]
    fn json_round_trip() {
        let config = Config {
            frequency_mhz: 2.0,
            rom_path: Some(PathBuf::from("/roms/monitor.hex")),
            ..Config::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.frequency_mhz, 2.0);
        assert_eq!(back.rom_path, config.rom_path);
    }

    #[test]
    fn unknown_and_missing_fields_fall_back_to_defaults() {
        let config: Config =
            serde_json::from_str("{\"frequency_mhz\": 1.0, \"future_key\": true}").unwrap();
        assert_eq!(config.frequency_mhz, 1.0);
        assert_eq!(config.default_tracks, 80);
    }
}
