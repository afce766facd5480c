//! Disk image containers: raw DSK, FLX (headered) and JVC.
//!
//! A raw image carries no header; its geometry is recovered from the
//! system-information record on track 0. FLX puts geometry into a
//! 256-byte header in front of the sector data. JVC prefixes a header of
//! 1–5 bytes whose length is the file size modulo the sector size.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local};

use crate::errors::{EmuError, Result};

use super::geometry::{
    DriveInfo, Geometry, SectorDisk, TrackSector, MAX_SECTORS, MAX_TRACKS, MIN_SECTORS,
    MIN_TRACKS, SECTOR_SIZE,
};
use super::nafs::filename::flex_disk_name;

pub const FLX_MAGIC: [u8; 4] = *b"FLX\x1A";
const FLX_HEADER_SIZE: u64 = SECTOR_SIZE as u64;

/// Offset of the system information record inside sector 0/3.
const SIR_OFFSET: u64 = 2 * SECTOR_SIZE as u64 + 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageKind {
    Dsk,
    Flx,
    Jvc,
}

pub struct DiskImage {
    file: File,
    path: PathBuf,
    geometry: Geometry,
    data_offset: u64,
    write_protected: bool,
    kind: ImageKind,
}

impl DiskImage {
    /// Open an existing image, sniffing the container kind.
    pub fn open(path: &Path, read_only: bool) -> Result<Self> {
        let mount_err = |reason: &str| EmuError::DiskMountFailed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let mut write_protected = read_only;
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(f) if !read_only => f,
            _ => {
                write_protected = true;
                OpenOptions::new()
                    .read(true)
                    .open(path)
                    .map_err(|e| EmuError::io(format!("open {}", path.display()), e))?
            }
        };

        let size = file
            .metadata()
            .map_err(|e| EmuError::io("stat disk image", e))?
            .len();
        if size < SECTOR_SIZE as u64 {
            return Err(mount_err("file too small for a disk image"));
        }

        let mut image = Self {
            file,
            path: path.to_path_buf(),
            geometry: Geometry::new(0, 0),
            data_offset: 0,
            write_protected,
            kind: ImageKind::Dsk,
        };

        let mut magic = [0u8; 4];
        image.read_at(0, &mut magic)?;

        if magic == FLX_MAGIC {
            image.kind = ImageKind::Flx;
            image.data_offset = FLX_HEADER_SIZE;
            let mut header = [0u8; 10];
            image.read_at(0, &mut header)?;
            if header[4] != 0 {
                image.write_protected = true;
            }
            let tracks = u16::from_le_bytes([header[5], header[6]]);
            let sectors = u16::from_le_bytes([header[7], header[8]]);
            image.geometry = Geometry::new(tracks, sectors);
        } else if size % SECTOR_SIZE as u64 != 0 {
            image.kind = ImageKind::Jvc;
            let header_len = size % SECTOR_SIZE as u64;
            if header_len > 5 {
                return Err(mount_err("JVC header longer than five bytes"));
            }
            let mut header = [18u8, 1, 1, 1, 0];
            image.read_at(0, &mut header[..header_len as usize])?;
            let sectors = u16::from(header[0]) * u16::from(header[1].max(1));
            if sectors == 0 {
                return Err(mount_err("JVC header has zero sectors"));
            }
            let tracks = (size - header_len) / (u64::from(sectors) * SECTOR_SIZE as u64);
            image.data_offset = header_len;
            image.geometry = Geometry::new(tracks as u16, sectors);
        } else {
            // Raw image: geometry lives in the system info record.
            let mut sir_tail = [0u8; 24];
            image.read_at(SIR_OFFSET, &mut sir_tail)?;
            let tracks = u16::from(sir_tail[22]) + 1;
            let sectors = u16::from(sir_tail[23]);
            image.geometry = Geometry::new(tracks, sectors);
        }

        if image.geometry.tracks < MIN_TRACKS
            || image.geometry.sectors < MIN_SECTORS
            || image.geometry.tracks > MAX_TRACKS
            || image.geometry.sectors > MAX_SECTORS
        {
            return Err(mount_err("implausible geometry"));
        }
        if image.data_offset + image.geometry.size_bytes() > size {
            return Err(mount_err("file shorter than its geometry"));
        }

        log::info!(
            "mounted {} as {:?} image, {} tracks x {} sectors",
            path.display(),
            image.kind,
            image.geometry.tracks,
            image.geometry.sectors
        );
        Ok(image)
    }

    /// Create and format a fresh raw image. The file must not exist.
    pub fn create(path: &Path, tracks: u16, sectors: u16) -> Result<Self> {
        if tracks < MIN_TRACKS || sectors < MIN_SECTORS {
            return Err(EmuError::DiskFormatFailed(format!(
                "geometry {tracks}x{sectors} below minimum {MIN_TRACKS}x{MIN_SECTORS}"
            )));
        }
        if tracks > MAX_TRACKS || sectors > MAX_SECTORS {
            return Err(EmuError::DiskFormatFailed(format!(
                "geometry {tracks}x{sectors} above maximum {MAX_TRACKS}x{MAX_SECTORS}"
            )));
        }
        if path.exists() {
            return Err(EmuError::DiskFormatFailed(format!(
                "{} already exists",
                path.display()
            )));
        }

        let geometry = Geometry::new(tracks, sectors);
        let image = build_flex_image(path, geometry);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| EmuError::io(format!("create {}", path.display()), e))?;
        file.write_all(&image)
            .map_err(|e| EmuError::io("write new disk image", e))?;

        log::info!("formatted {} ({tracks}x{sectors})", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
            geometry,
            data_offset: 0,
            write_protected: false,
            kind: ImageKind::Dsk,
        })
    }

    fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.read_exact(buffer))
            .map_err(|e| EmuError::io(format!("read {}", self.path.display()), e))
    }

    fn sector_offset(&self, track: u8, sector: u8) -> Option<u64> {
        let index = self.geometry.sector_index(TrackSector::new(track, sector))?;
        Some(self.data_offset + (index * SECTOR_SIZE) as u64)
    }
}

impl SectorDisk for DiskImage {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn read_sector(&mut self, buffer: &mut [u8], track: u8, sector: u8) -> bool {
        let Some(offset) = self.sector_offset(track, sector) else {
            return false;
        };
        self.read_at(offset, &mut buffer[..SECTOR_SIZE]).is_ok()
    }

    fn write_sector(&mut self, buffer: &[u8], track: u8, sector: u8) -> bool {
        if self.write_protected {
            return false;
        }
        let Some(offset) = self.sector_offset(track, sector) else {
            return false;
        };
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(&buffer[..SECTOR_SIZE]))
            .is_ok()
    }

    fn format_sector(&mut self, buffer: &[u8], track: u8, sector: u8) -> bool {
        self.write_sector(buffer, track, sector)
    }

    fn is_write_protected(&self) -> bool {
        self.write_protected
    }

    fn info(&self) -> DriveInfo {
        let mut info = DriveInfo {
            path: self.path.clone(),
            tracks: self.geometry.tracks,
            sectors: self.geometry.sectors,
            total_bytes: self.geometry.size_bytes(),
            write_protected: self.write_protected,
            is_flex_format: true,
            ..DriveInfo::default()
        };

        // Best effort: the SIR may be absent on foreign images.
        let mut sir = [0u8; 24];
        let mut file = &self.file;
        if file
            .seek(SeekFrom::Start(self.data_offset + SIR_OFFSET))
            .and_then(|_| file.read_exact(&mut sir))
            .is_ok()
        {
            info.name = String::from_utf8_lossy(&sir[..8])
                .trim_end_matches('\0')
                .to_string();
            info.number = u16::from_be_bytes([sir[11], sir[12]]);
            info.free_bytes =
                u64::from(u16::from_be_bytes([sir[17], sir[18]])) * SECTOR_SIZE as u64;
            info.date = (sir[20], sir[19], sir[21]);
        }
        info
    }

    fn sync(&mut self) -> Result<()> {
        self.file
            .flush()
            .map_err(|e| EmuError::io("flush disk image", e))
    }
}

/// Lay out a freshly formatted FLEX filesystem in memory.
fn build_flex_image(path: &Path, geometry: Geometry) -> Vec<u8> {
    let mut image = vec![0u8; geometry.size_bytes() as usize];
    let sectors = geometry.sectors;
    let now = Local::now();

    let sector = |image: &mut Vec<u8>, ts: TrackSector| -> std::ops::Range<usize> {
        let index = geometry.sector_index(ts).unwrap();
        index * SECTOR_SIZE..(index + 1) * SECTOR_SIZE
    };

    // Directory: track 0, sectors 5.., linked forward, last points to 0/0.
    for s in 5..=sectors {
        let range = sector(&mut image, TrackSector::new(0, s as u8));
        if s < sectors {
            image[range.start] = 0;
            image[range.start + 1] = (s + 1) as u8;
        }
    }

    // Free chain: every sector from track 1 on, linked in ascending order.
    let first_free = geometry.sector_index(TrackSector::new(1, 1)).unwrap();
    let last = geometry.total_sectors() as usize - 1;
    for index in first_free..=last {
        let ts = geometry.track_sector(index);
        let range = sector(&mut image, ts);
        if index < last {
            let next = geometry.track_sector(index + 1);
            image[range.start] = next.track;
            image[range.start + 1] = next.sector;
        }
    }

    // System info record, identical in sectors 3 and 4.
    let name = flex_disk_name(path);
    let free = (last - first_free + 1) as u16;
    let mut sir = [0u8; 24];
    sir[..name.len()].copy_from_slice(name.as_bytes());
    // disk_number defaults to 1
    sir[12] = 1;
    sir[13] = 1; // fc_start
    sir[14] = 1;
    sir[15] = (geometry.tracks - 1) as u8; // fc_end
    sir[16] = sectors as u8;
    sir[17..19].copy_from_slice(&free.to_be_bytes());
    sir[19] = now.month() as u8;
    sir[20] = now.day() as u8;
    sir[21] = (now.year() % 100) as u8;
    sir[22] = (geometry.tracks - 1) as u8;
    sir[23] = sectors as u8;

    for s in [3u8, 4u8] {
        let range = sector(&mut image, TrackSector::new(0, s));
        image[range.start + 16..range.start + 16 + 24].copy_from_slice(&sir);
    }

    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_rejects_small_geometry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tiny.dsk");
        assert!(matches!(
            DiskImage::create(&path, 1, 10),
            Err(EmuError::DiskFormatFailed(_))
        ));
        assert!(matches!(
            DiskImage::create(&path, 35, 4),
            Err(EmuError::DiskFormatFailed(_))
        ));
    }

    #[test]
    fn create_rejects_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("twice.dsk");
        DiskImage::create(&path, 35, 10).unwrap();
        assert!(DiskImage::create(&path, 35, 10).is_err());
    }

    #[test]
    fn fresh_image_reopens_with_same_geometry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new.dsk");
        DiskImage::create(&path, 40, 18).unwrap();

        let image = DiskImage::open(&path, false).unwrap();
        assert_eq!(image.geometry(), Geometry::new(40, 18));
        assert!(!image.is_write_protected());
    }

    #[test]
    fn fresh_image_has_consistent_free_chain() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chain.dsk");
        let mut image = DiskImage::create(&path, 35, 10).unwrap();

        let mut sir = vec![0u8; SECTOR_SIZE];
        assert!(image.read_sector(&mut sir, 0, 3));
        let fc_start = TrackSector::new(sir[16 + 13], sir[16 + 14]);
        let free = u16::from_be_bytes([sir[16 + 17], sir[16 + 18]]);
        assert_eq!(fc_start, TrackSector::new(1, 1));
        assert_eq!(free, 34 * 10);

        // Walk the chain to its terminator and count.
        let mut count = 0u16;
        let mut ts = fc_start;
        let mut buffer = vec![0u8; SECTOR_SIZE];
        while !ts.is_none() {
            assert!(image.read_sector(&mut buffer, ts.track, ts.sector));
            count += 1;
            ts = TrackSector::new(buffer[0], buffer[1]);
        }
        assert_eq!(count, free);
    }

    #[test]
    fn sector_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rw.dsk");
        let mut image = DiskImage::create(&path, 35, 10).unwrap();

        let payload: Vec<u8> = (0..=255u8).collect();
        assert!(image.write_sector(&payload, 3, 7));
        let mut readback = vec![0u8; SECTOR_SIZE];
        assert!(image.read_sector(&mut readback, 3, 7));
        assert_eq!(readback, payload);

        assert!(!image.write_sector(&payload, 40, 1));
        assert!(!image.read_sector(&mut readback, 3, 11));
    }

    #[test]
    fn jvc_header_is_honored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("disk.jvc");
        // 2-byte header: 10 sectors, 1 side; then 4 tracks of data.
        let mut data = vec![10u8, 1];
        data.extend(std::iter::repeat(0u8).take(4 * 10 * SECTOR_SIZE));
        std::fs::write(&path, &data).unwrap();

        let mut image = DiskImage::open(&path, false).unwrap();
        assert_eq!(image.geometry(), Geometry::new(4, 10));
        let payload = vec![0x5Au8; SECTOR_SIZE];
        assert!(image.write_sector(&payload, 0, 1));
        let on_disk = std::fs::read(&path).unwrap();
        // Sector 0/1 lands right after the header.
        assert_eq!(&on_disk[2..2 + SECTOR_SIZE], payload.as_slice());
    }

    #[test]
    fn flx_header_geometry_and_write_protect() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("disk.flx");
        let mut data = vec![0u8; SECTOR_SIZE + 2 * 5 * SECTOR_SIZE];
        data[..4].copy_from_slice(&FLX_MAGIC);
        data[4] = 1; // write protect
        data[5..7].copy_from_slice(&2u16.to_le_bytes());
        data[7..9].copy_from_slice(&5u16.to_le_bytes());
        std::fs::write(&path, &data).unwrap();

        let image = DiskImage::open(&path, false).unwrap();
        assert_eq!(image.geometry(), Geometry::new(2, 5));
        assert!(image.is_write_protected());
    }

    #[test]
    fn short_file_fails_to_mount() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.dsk");
        std::fs::write(&path, vec![0u8; 3 * SECTOR_SIZE]).unwrap();
        assert!(DiskImage::open(&path, false).is_err());
    }
}
