//! WD1793-compatible floppy controller with a four-drive bay.
//!
//! Four registers: command/status, track, sector, data. Commands decode
//! by their top nibble; sector transfers buffer one full sector and hand
//! it out (or collect it) one byte at a time through the data register
//! with DRQ signalling. Write-track runs a small state machine over the
//! format byte stream and commits each collected sector. Controller
//! timing is not cycle-modelled: commands complete as fast as the guest
//! polls, which is what the FLEX driver loops require.

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::errors::{EmuError, Result};
use crate::signals::SignalHub;

use super::geometry::{DiskStatus, DriveInfo, Geometry, SectorDisk, SECTOR_SIZE};
use super::image::DiskImage;
use super::nafs::NafsDirectory;

pub const DRIVE_COUNT: usize = 4;
/// Pseudo drive meaning "none selected".
const NO_DRIVE: usize = DRIVE_COUNT;

// Status bits, type I commands.
const ST_BUSY: u8 = 0x01;
const ST_TRACK0: u8 = 0x04;
const ST_SEEK_ERROR: u8 = 0x10;
const ST_HEAD_LOADED: u8 = 0x20;
const ST_PROTECTED: u8 = 0x40;
const ST_NOT_READY: u8 = 0x80;

// Status bits, type II/III commands.
const ST_DRQ: u8 = 0x02;
const ST_RECORD_NOT_FOUND: u8 = 0x10;
const ST_WRITE_PROTECT: u8 = 0x40;

/// 256-byte sectors: 128 << 1.
const SIZE_CODE: u8 = 1;

/// What the data register is currently transferring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    None,
    Read,
    Write,
    WriteTrack,
}

/// States while interpreting a write-track (format) byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteTrackState {
    Inactive,
    WaitForIdAddressMark,
    IdAddressMark,
    WaitForDataAddressMark,
    WriteData,
    WaitForCrc,
}

// Indices into the collected ID address mark.
const ID_TRACK: usize = 0;
const ID_SECTOR: usize = 2;

pub struct Fdc {
    drives: [Option<Box<dyn SectorDisk>>; DRIVE_COUNT],
    /// Head position per drive.
    head_track: [u8; DRIVE_COUNT],
    status: Arc<Mutex<[DiskStatus; DRIVE_COUNT]>>,
    selected: usize,

    track_reg: u8,
    sector_reg: u8,
    data_reg: u8,
    /// Latched error bits mixed into the status register.
    error_bits: u8,
    step_inward: bool,

    sector_buffer: [u8; 1024],
    buffer_len: usize,
    buffer_pos: usize,
    transfer: Transfer,

    write_track_state: WriteTrackState,
    id_address_mark: [u8; 4],
    id_collected: usize,

    /// Default geometry for directory mounts.
    pub default_geometry: Geometry,

    hub: Arc<SignalHub>,
}

impl Fdc {
    pub fn new(hub: Arc<SignalHub>) -> Self {
        Self {
            drives: [None, None, None, None],
            head_track: [0; DRIVE_COUNT],
            status: Arc::new(Mutex::new([DiskStatus::Empty; DRIVE_COUNT])),
            selected: NO_DRIVE,
            track_reg: 0,
            sector_reg: 0,
            data_reg: 0,
            error_bits: 0,
            step_inward: true,
            sector_buffer: [0; 1024],
            buffer_len: 0,
            buffer_pos: 0,
            transfer: Transfer::None,
            write_track_state: WriteTrackState::Inactive,
            id_address_mark: [0; 4],
            id_collected: 0,
            default_geometry: Geometry::new(80, 18),
            hub,
        }
    }

    pub fn reset(&mut self) {
        self.track_reg = 0;
        self.sector_reg = 0;
        self.data_reg = 0;
        self.error_bits = 0;
        self.transfer = Transfer::None;
        self.write_track_state = WriteTrackState::Inactive;
        self.buffer_len = 0;
        self.buffer_pos = 0;
    }

    /// Shared handle on the per-drive status array (UI side).
    pub fn status_handle(&self) -> Arc<Mutex<[DiskStatus; DRIVE_COUNT]>> {
        self.status.clone()
    }

    // ── Drive bay ─────────────────────────────────────────────

    /// Mount a disk image file or a directory on `drive`.
    pub fn mount(&mut self, path: &Path, drive: usize, read_only: bool) -> Result<()> {
        if drive >= DRIVE_COUNT {
            return Err(EmuError::ParseError(format!("drive {drive} out of range")));
        }

        let meta = std::fs::metadata(path).map_err(|_| EmuError::DiskMountFailed {
            path: path.to_path_buf(),
            reason: "nonexistent path".into(),
        })?;

        let disk: Box<dyn SectorDisk> = if meta.is_dir() {
            Box::new(NafsDirectory::open(
                path,
                self.default_geometry.tracks,
                self.default_geometry.sectors,
                read_only,
            )?)
        } else {
            Box::new(DiskImage::open(path, read_only)?)
        };

        self.drives[drive] = Some(disk);
        self.head_track[drive] = 0;
        self.status.lock().unwrap()[drive] = DiskStatus::Inactive;
        self.hub.notify(crate::signals::Notify::DiskStatusChanged);
        Ok(())
    }

    pub fn unmount(&mut self, drive: usize) -> Result<()> {
        if drive >= DRIVE_COUNT || self.drives[drive].is_none() {
            return Err(EmuError::ParseError(format!("no disk in drive {drive}")));
        }
        self.drives[drive] = None;
        self.status.lock().unwrap()[drive] = DiskStatus::Empty;
        self.hub.notify(crate::signals::Notify::DiskStatusChanged);
        Ok(())
    }

    pub fn sync_drive(&mut self, drive: usize) -> Result<()> {
        match self.drives.get_mut(drive).and_then(|d| d.as_mut()) {
            Some(disk) => disk.sync(),
            None => Ok(()),
        }
    }

    pub fn sync_all(&mut self) -> Result<()> {
        for drive in 0..DRIVE_COUNT {
            self.sync_drive(drive)?;
        }
        Ok(())
    }

    pub fn drive_info(&self, drive: usize) -> Option<DriveInfo> {
        self.drives.get(drive)?.as_ref().map(|d| d.info())
    }

    pub fn drive_info_string(&self, drive: usize) -> String {
        match self.drive_info(drive) {
            Some(info) => format!("drive #{drive}:\n{info}"),
            None => format!("drive #{drive}: not ready\n"),
        }
    }

    /// Create a fresh formatted disk image.
    pub fn format_disk(path: &Path, tracks: u16, sectors: u16) -> Result<()> {
        DiskImage::create(path, tracks, sectors).map(|_| ())
    }

    /// Drive-select port: one bit per drive, zero deselects.
    pub fn select_drive(&mut self, value: u8) {
        self.selected = match value & 0x0F {
            0x01 => 0,
            0x02 => 1,
            0x04 => 2,
            0x08 => 3,
            _ => NO_DRIVE,
        };
        if self.selected < DRIVE_COUNT {
            self.track_reg = self.head_track[self.selected];
            if self.drives[self.selected].is_some() {
                self.status.lock().unwrap()[self.selected] = DiskStatus::Active;
            }
        }
    }

    pub fn selected_drive(&self) -> Option<usize> {
        (self.selected < DRIVE_COUNT).then_some(self.selected)
    }

    fn current_disk(&mut self) -> Option<&mut Box<dyn SectorDisk>> {
        self.drives.get_mut(self.selected)?.as_mut()
    }

    // ── Register file ─────────────────────────────────────────

    pub fn read(&mut self, offset: u16) -> u8 {
        match offset & 0x03 {
            0 => self.read_status(),
            1 => self.track_reg,
            2 => self.sector_reg,
            _ => self.read_data(),
        }
    }

    pub fn write(&mut self, offset: u16, value: u8) {
        match offset & 0x03 {
            0 => self.start_command(value),
            1 => self.track_reg = value,
            2 => self.sector_reg = value,
            _ => self.write_data(value),
        }
    }

    fn read_status(&mut self) -> u8 {
        let Some(selected) = self.selected_drive() else {
            return ST_NOT_READY;
        };
        if self.drives[selected].is_none() {
            return ST_NOT_READY;
        }

        if self.transfer != Transfer::None {
            return ST_BUSY | ST_DRQ | self.error_bits;
        }

        let mut status = ST_HEAD_LOADED | self.error_bits;
        if self.track_reg == 0 {
            status |= ST_TRACK0;
        }
        if self.drives[selected]
            .as_ref()
            .map(|d| d.is_write_protected())
            .unwrap_or(false)
        {
            status |= ST_PROTECTED;
        }
        status
    }

    fn start_command(&mut self, command: u8) {
        self.error_bits = 0;
        match command >> 4 {
            0x0 => {
                // Restore
                self.track_reg = 0;
                self.sync_head();
            }
            0x1 => {
                // Seek to the track in the data register.
                let target = self.data_reg;
                if self.is_seek_error(target) {
                    self.error_bits |= ST_SEEK_ERROR;
                } else {
                    self.track_reg = target;
                    self.sync_head();
                }
            }
            0x2 | 0x3 => {
                let inward = self.step_inward;
                self.step(inward);
            }
            0x4 | 0x5 => self.step(true),
            0x6 | 0x7 => self.step(false),
            0x8 | 0x9 => self.begin_read_sector(),
            0xA | 0xB => self.begin_write_sector(),
            0xC => self.begin_read_address(),
            0xD => {
                // Force interrupt: abort whatever is in flight.
                self.transfer = Transfer::None;
                self.write_track_state = WriteTrackState::Inactive;
                self.buffer_len = 0;
                self.buffer_pos = 0;
            }
            0xE => self.begin_read_track(),
            _ => self.begin_write_track(),
        }
    }

    fn sync_head(&mut self) {
        if let Some(drive) = self.selected_drive() {
            self.head_track[drive] = self.track_reg;
        }
    }

    fn is_seek_error(&mut self, target: u8) -> bool {
        match self.current_disk() {
            Some(disk) => !disk.geometry().is_track_valid(target),
            None => true,
        }
    }

    fn step(&mut self, inward: bool) {
        self.step_inward = inward;
        if inward {
            let max = self
                .current_disk()
                .map(|d| (d.geometry().tracks - 1) as u8)
                .unwrap_or(u8::MAX);
            if self.track_reg < max {
                self.track_reg += 1;
            }
        } else if self.track_reg > 0 {
            self.track_reg -= 1;
        }
        self.sync_head();
    }

    fn begin_read_sector(&mut self) {
        let track = self.track_reg;
        let sector = self.sector_reg;
        let mut buffer = [0u8; SECTOR_SIZE];

        let ok = match self.current_disk() {
            Some(disk) => disk.read_sector(&mut buffer, track, sector),
            None => false,
        };

        if ok {
            self.sector_buffer[..SECTOR_SIZE].copy_from_slice(&buffer);
            self.buffer_len = SECTOR_SIZE;
            self.buffer_pos = 0;
            self.transfer = Transfer::Read;
        } else {
            self.error_bits |= ST_RECORD_NOT_FOUND;
        }
    }

    fn begin_write_sector(&mut self) {
        let protected = self
            .current_disk()
            .map(|d| d.is_write_protected())
            .unwrap_or(true);
        if protected {
            self.error_bits |= ST_WRITE_PROTECT;
            return;
        }
        self.buffer_len = SECTOR_SIZE;
        self.buffer_pos = 0;
        self.transfer = Transfer::Write;
    }

    fn begin_read_address(&mut self) {
        let id = [
            self.track_reg,
            0,
            self.sector_reg.max(1),
            SIZE_CODE,
            0,
            0,
        ];
        self.sector_buffer[..6].copy_from_slice(&id);
        self.buffer_len = 6;
        self.buffer_pos = 0;
        self.transfer = Transfer::Read;
    }

    fn begin_read_track(&mut self) {
        // A raw track dump is never parsed by FLEX; serve zeros.
        let len = self
            .current_disk()
            .map(|d| usize::from(d.geometry().sectors) * SECTOR_SIZE)
            .unwrap_or(0)
            .min(self.sector_buffer.len());
        if len == 0 {
            self.error_bits |= ST_RECORD_NOT_FOUND;
            return;
        }
        self.sector_buffer[..len].fill(0);
        self.buffer_len = len;
        self.buffer_pos = 0;
        self.transfer = Transfer::Read;
    }

    fn begin_write_track(&mut self) {
        let protected = self
            .current_disk()
            .map(|d| d.is_write_protected())
            .unwrap_or(true);
        if protected {
            self.error_bits |= ST_WRITE_PROTECT;
            return;
        }
        self.transfer = Transfer::WriteTrack;
        self.write_track_state = WriteTrackState::WaitForIdAddressMark;
        self.id_collected = 0;
    }

    fn read_data(&mut self) -> u8 {
        if self.transfer != Transfer::Read {
            return self.data_reg;
        }
        let byte = self.sector_buffer[self.buffer_pos];
        self.buffer_pos += 1;
        if self.buffer_pos >= self.buffer_len {
            self.transfer = Transfer::None;
        }
        byte
    }

    fn write_data(&mut self, value: u8) {
        match self.transfer {
            Transfer::Write => {
                self.sector_buffer[self.buffer_pos] = value;
                self.buffer_pos += 1;
                if self.buffer_pos >= self.buffer_len {
                    self.commit_sector_write();
                }
            }
            Transfer::WriteTrack => self.write_track_byte(value),
            _ => self.data_reg = value,
        }
    }

    fn commit_sector_write(&mut self) {
        let track = self.track_reg;
        let sector = self.sector_reg;
        let mut buffer = [0u8; SECTOR_SIZE];
        buffer.copy_from_slice(&self.sector_buffer[..SECTOR_SIZE]);

        let ok = match self.current_disk() {
            Some(disk) => disk.write_sector(&buffer, track, sector),
            None => false,
        };
        if !ok {
            self.error_bits |= ST_RECORD_NOT_FOUND;
        }
        self.transfer = Transfer::None;
    }

    /// One byte of the format stream. 0xFE opens the ID field, 0xFB the
    /// data field, 0xF7 stands for the CRC.
    fn write_track_byte(&mut self, value: u8) {
        match self.write_track_state {
            WriteTrackState::Inactive => {}
            WriteTrackState::WaitForIdAddressMark => {
                if value == 0xFE {
                    self.write_track_state = WriteTrackState::IdAddressMark;
                    self.id_collected = 0;
                }
            }
            WriteTrackState::IdAddressMark => {
                self.id_address_mark[self.id_collected] = value;
                self.id_collected += 1;
                if self.id_collected == self.id_address_mark.len() {
                    self.write_track_state = WriteTrackState::WaitForDataAddressMark;
                }
            }
            WriteTrackState::WaitForDataAddressMark => {
                if value == 0xFB {
                    self.write_track_state = WriteTrackState::WriteData;
                    self.buffer_pos = 0;
                }
            }
            WriteTrackState::WriteData => {
                self.sector_buffer[self.buffer_pos] = value;
                self.buffer_pos += 1;
                if self.buffer_pos >= SECTOR_SIZE {
                    self.commit_formatted_sector();
                    self.write_track_state = WriteTrackState::WaitForCrc;
                }
            }
            WriteTrackState::WaitForCrc => {
                if value == 0xF7 {
                    self.write_track_state = WriteTrackState::WaitForIdAddressMark;
                }
            }
        }
    }

    fn commit_formatted_sector(&mut self) {
        let track = self.id_address_mark[ID_TRACK];
        let sector = self.id_address_mark[ID_SECTOR];
        let mut buffer = [0u8; SECTOR_SIZE];
        buffer.copy_from_slice(&self.sector_buffer[..SECTOR_SIZE]);

        let ok = match self.current_disk() {
            Some(disk) => disk.format_sector(&buffer, track, sector),
            None => false,
        };
        if !ok {
            log::debug!("format of {track:02X}-{sector:02X} refused");
            self.error_bits |= ST_WRITE_PROTECT;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fdc_with_image(dir: &TempDir) -> Fdc {
        let path = dir.path().join("test.dsk");
        DiskImage::create(&path, 35, 10).unwrap();
        let mut fdc = Fdc::new(Arc::new(SignalHub::new()));
        fdc.mount(&path, 0, false).unwrap();
        fdc.select_drive(0x01);
        fdc
    }

    fn read_full_sector(fdc: &mut Fdc) -> Vec<u8> {
        let mut out = Vec::new();
        fdc.write(0, 0x80); // read sector
        while fdc.read(0) & ST_BUSY != 0 {
            out.push(fdc.read(3));
        }
        out
    }

    #[test]
    fn unselected_controller_is_not_ready() {
        let mut fdc = Fdc::new(Arc::new(SignalHub::new()));
        assert_ne!(fdc.read(0) & ST_NOT_READY, 0);
    }

    #[test]
    fn restore_homes_to_track_zero() {
        let dir = TempDir::new().unwrap();
        let mut fdc = fdc_with_image(&dir);
        fdc.write(1, 7);
        fdc.write(0, 0x00);
        assert_eq!(fdc.read(1), 0);
        assert_ne!(fdc.read(0) & ST_TRACK0, 0);
    }

    #[test]
    fn seek_uses_data_register() {
        let dir = TempDir::new().unwrap();
        let mut fdc = fdc_with_image(&dir);
        fdc.write(3, 12);
        fdc.write(0, 0x10);
        assert_eq!(fdc.read(1), 12);
        assert_eq!(fdc.read(0) & ST_SEEK_ERROR, 0);

        fdc.write(3, 77); // beyond 35 tracks
        fdc.write(0, 0x10);
        assert_ne!(fdc.read(0) & ST_SEEK_ERROR, 0);
        assert_eq!(fdc.read(1), 12);
    }

    #[test]
    fn step_in_and_out_move_the_head() {
        let dir = TempDir::new().unwrap();
        let mut fdc = fdc_with_image(&dir);
        fdc.write(0, 0x40); // step in
        fdc.write(0, 0x40);
        assert_eq!(fdc.read(1), 2);
        fdc.write(0, 0x60); // step out
        assert_eq!(fdc.read(1), 1);
        fdc.write(0, 0x20); // step repeats the last direction (out)
        assert_eq!(fdc.read(1), 0);
    }

    #[test]
    fn sector_read_streams_256_bytes() {
        let dir = TempDir::new().unwrap();
        let mut fdc = fdc_with_image(&dir);
        fdc.write(1, 0);
        fdc.write(2, 3); // system info sector
        let bytes = read_full_sector(&mut fdc);
        assert_eq!(bytes.len(), SECTOR_SIZE);
        // Disk name starts 16 bytes in.
        assert_eq!(&bytes[16..20], b"TEST");
    }

    #[test]
    fn sector_write_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut fdc = fdc_with_image(&dir);
        fdc.write(1, 2);
        fdc.write(2, 5);

        fdc.write(0, 0xA0); // write sector
        assert_ne!(fdc.read(0) & ST_DRQ, 0);
        for i in 0..SECTOR_SIZE {
            fdc.write(3, (i % 256) as u8);
        }
        assert_eq!(fdc.read(0) & ST_BUSY, 0);

        let bytes = read_full_sector(&mut fdc);
        for (i, byte) in bytes.iter().enumerate() {
            assert_eq!(*byte, (i % 256) as u8);
        }
    }

    #[test]
    fn missing_sector_sets_record_not_found() {
        let dir = TempDir::new().unwrap();
        let mut fdc = fdc_with_image(&dir);
        fdc.write(1, 0);
        fdc.write(2, 77);
        fdc.write(0, 0x80);
        assert_ne!(fdc.read(0) & ST_RECORD_NOT_FOUND, 0);
    }

    #[test]
    fn write_on_protected_disk_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ro.dsk");
        DiskImage::create(&path, 35, 10).unwrap();
        let mut fdc = Fdc::new(Arc::new(SignalHub::new()));
        fdc.mount(&path, 0, true).unwrap();
        fdc.select_drive(0x01);

        fdc.write(0, 0xA0);
        assert_ne!(fdc.read(0) & ST_WRITE_PROTECT, 0);
        assert_eq!(fdc.read(0) & ST_BUSY, 0);
    }

    #[test]
    fn read_address_returns_id_field() {
        let dir = TempDir::new().unwrap();
        let mut fdc = fdc_with_image(&dir);
        fdc.write(1, 3);
        fdc.write(2, 7);
        fdc.write(0, 0xC0);
        let mut id = Vec::new();
        while fdc.read(0) & ST_BUSY != 0 {
            id.push(fdc.read(3));
        }
        assert_eq!(id, vec![3, 0, 7, SIZE_CODE, 0, 0]);
    }

    #[test]
    fn write_track_formats_a_sector() {
        let dir = TempDir::new().unwrap();
        let mut fdc = fdc_with_image(&dir);
        fdc.write(1, 4);
        fdc.write(0, 0xF0); // write track

        // Gap, ID mark for 4-2, gap, data mark, payload, CRC.
        for _ in 0..8 {
            fdc.write(3, 0x4E);
        }
        fdc.write(3, 0xFE);
        for byte in [4u8, 0, 2, SIZE_CODE] {
            fdc.write(3, byte);
        }
        fdc.write(3, 0xF7);
        for _ in 0..6 {
            fdc.write(3, 0x4E);
        }
        fdc.write(3, 0xFB);
        for _ in 0..SECTOR_SIZE {
            fdc.write(3, 0xE5);
        }
        fdc.write(3, 0xF7);
        fdc.write(0, 0xD0); // force interrupt ends formatting

        fdc.write(2, 2);
        let bytes = read_full_sector(&mut fdc);
        assert!(bytes.iter().all(|&b| b == 0xE5));
    }

    #[test]
    fn force_interrupt_aborts_transfer() {
        let dir = TempDir::new().unwrap();
        let mut fdc = fdc_with_image(&dir);
        fdc.write(2, 1);
        fdc.write(0, 0x80);
        assert_ne!(fdc.read(0) & ST_BUSY, 0);
        fdc.write(0, 0xD0);
        assert_eq!(fdc.read(0) & ST_BUSY, 0);
    }

    #[test]
    fn mount_and_info_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut fdc = fdc_with_image(&dir);
        let info = fdc.drive_info(0).unwrap();
        assert_eq!(info.tracks, 35);
        assert_eq!(info.sectors, 10);
        assert!(fdc.drive_info(1).is_none());
        assert!(fdc.drive_info_string(1).contains("not ready"));

        assert!(fdc.unmount(0).is_ok());
        assert!(fdc.unmount(0).is_err());
    }

    #[test]
    fn status_array_tracks_mounts() {
        let dir = TempDir::new().unwrap();
        let fdc = fdc_with_image(&dir);
        let handle = fdc.status_handle();
        let status = handle.lock().unwrap();
        assert_eq!(status[0], DiskStatus::Active);
        assert_eq!(status[1], DiskStatus::Empty);
    }

    #[test]
    fn mount_missing_path_fails() {
        let mut fdc = Fdc::new(Arc::new(SignalHub::new()));
        let err = fdc.mount(Path::new("/nonexistent/xyz"), 0, false);
        assert!(matches!(err, Err(EmuError::DiskMountFailed { .. })));
    }
}
