//! The `.flexdiskrc` sidecar: per-directory geometry overrides.
//!
//! Plain `key=value` lines; recognized keys are `tracks` and `sectors`.
//! When the file is missing the mount writes the effective defaults
//! back, so the directory keeps its geometry on later mounts.

use std::fs;
use std::path::{Path, PathBuf};

use crate::disk::geometry::{MAX_SECTORS, MAX_TRACKS, MIN_SECTORS, MIN_TRACKS};

use super::filename::OPTIONS_FILE;

pub struct DirDiskOptions {
    path: PathBuf,
    pub tracks: u16,
    pub sectors: u16,
}

impl DirDiskOptions {
    pub fn new(directory: &Path, tracks: u16, sectors: u16) -> Self {
        Self { path: directory.join(OPTIONS_FILE), tracks, sectors }
    }

    /// Read the sidecar; returns false when absent or unreadable.
    pub fn read(&mut self) -> bool {
        let Ok(text) = fs::read_to_string(&self.path) else {
            return false;
        };

        let mut seen = false;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let Ok(value) = value.trim().parse::<u16>() else {
                continue;
            };
            match key.trim() {
                "tracks" if (MIN_TRACKS..=MAX_TRACKS).contains(&value) => {
                    self.tracks = value;
                    seen = true;
                }
                "sectors" if (MIN_SECTORS..=MAX_SECTORS).contains(&value) => {
                    self.sectors = value;
                    seen = true;
                }
                _ => {}
            }
        }
        seen
    }

    /// Persist the current geometry. Failures are logged, not fatal:
    /// read-only directories simply keep using the defaults.
    pub fn write(&self) {
        let text = format!("tracks={}\nsectors={}\n", self.tracks, self.sectors);
        if let Err(e) = fs::write(&self.path, text) {
            log::debug!("cannot write {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let mut opts = DirDiskOptions::new(dir.path(), 80, 18);
        assert!(!opts.read());
        assert_eq!((opts.tracks, opts.sectors), (80, 18));
    }

    #[test]
    fn sidecar_overrides_geometry() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(OPTIONS_FILE), "tracks=35\nsectors=10\n").unwrap();
        let mut opts = DirDiskOptions::new(dir.path(), 80, 18);
        assert!(opts.read());
        assert_eq!((opts.tracks, opts.sectors), (35, 10));
    }

    #[test]
    fn out_of_range_values_are_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(OPTIONS_FILE), "tracks=1\nsectors=300\n").unwrap();
        let mut opts = DirDiskOptions::new(dir.path(), 80, 18);
        assert!(!opts.read());
        assert_eq!((opts.tracks, opts.sectors), (80, 18));
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        DirDiskOptions::new(dir.path(), 40, 16).write();
        let mut opts = DirDiskOptions::new(dir.path(), 80, 18);
        assert!(opts.read());
        assert_eq!((opts.tracks, opts.sectors), (40, 16));
    }
}
