//! Native file system disk: a host directory emulated as a FLEX floppy.
//!
//! The guest sees a fully formatted disk; reads and writes of single
//! sectors are translated into host file operations. Boot, system-info
//! and directory sectors are synthesized at mount time from the
//! directory contents; a link table tracks what every sector currently
//! is. Writing into the free chain opens an anonymous `tmpNN` host file
//! which is renamed once the matching directory entry appears.
//!
//! Only files with valid FLEX names are emulated; everything else in
//! the directory is invisible to the guest. While a directory is
//! mounted its files should not be touched from the host side.

pub mod filename;
pub mod layout;
pub mod options;

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{DateTime, Datelike, Local, Timelike};
use walkdir::WalkDir;

use crate::errors::{EmuError, Result};

use super::geometry::{
    DriveInfo, Geometry, SectorDisk, TrackSector, DATA_PER_SECTOR, SECTOR_SIZE,
};
use filename::{flex_disk_name, flex_filename, BOOT_FILE, RANDOM_FILE_LIST};
use layout::{
    DirEntry, DirSector, SysInfoSector, DIR_ENTRIES, IS_RANDOM_FILE, UNSUPPORTED_ATTRIBUTES,
    WRITE_PROTECT,
};
use options::DirDiskOptions;

/// First directory sector on track 0 (1,2 boot; 3,4 system info).
const FIRST_DIR_SECTOR: u8 = 5;

/// file_id of sectors that belong to no file.
const NO_FILE: i32 = i32::MAX;

/// Sequential disk numbers across all mounts of this process.
static NEXT_DISK_NUMBER: AtomicU16 = AtomicU16::new(0);

/// What a sector currently is, as tracked in the link table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SectorKind {
    #[default]
    Unknown,
    Boot,
    SystemInfo,
    Directory,
    FreeChain,
    File,
    NewFile,
}

impl SectorKind {
    fn describe(self) -> &'static str {
        match self {
            SectorKind::Unknown => "unknown sector",
            SectorKind::Boot => "boot sector",
            SectorKind::SystemInfo => "system info sector",
            SectorKind::Directory => "directory sector",
            SectorKind::FreeChain => "free chain",
            SectorKind::File => "sector of file",
            SectorKind::NewFile => "sector of new file",
        }
    }
}

/// Link-table entry: one per sector of the emulated disk.
#[derive(Debug, Clone, Copy)]
struct Link {
    next: TrackSector,
    record_nr: [u8; 2],
    /// Record index into the owning structure (file record, or index of
    /// the directory sector).
    f_record: u16,
    file_id: i32,
    kind: SectorKind,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            next: TrackSector::NONE,
            record_nr: [0; 2],
            f_record: 0,
            file_id: NO_FILE,
            kind: SectorKind::Unknown,
        }
    }
}

/// A file being written through the free chain, not yet named.
#[derive(Debug, Clone)]
struct NewFile {
    filename: String,
    first: TrackSector,
    next: TrackSector,
}

pub struct NafsDirectory {
    directory: PathBuf,
    geometry: Geometry,
    write_protected: bool,
    /// Mirror hour/minute between directory entries and host mtimes.
    with_file_time: bool,

    sys_info: [SysInfoSector; 2],
    dir_sectors: Vec<DirSector>,
    links: Vec<Link>,
    new_files: BTreeMap<i32, NewFile>,

    /// Track/sector a pending directory extension will land on.
    dir_extend: TrackSector,
    /// Directory slots handed out so far during the mount scan.
    next_dir_index: i32,
    init_dir_sectors: u16,
}

impl NafsDirectory {
    /// Mount `path` as a FLEX disk. Geometry comes from the
    /// `.flexdiskrc` sidecar when present, else from the arguments
    /// (and the defaults are written back).
    pub fn open(path: &Path, tracks: u16, sectors: u16, read_only: bool) -> Result<Self> {
        let meta = fs::metadata(path).map_err(|e| EmuError::DiskMountFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !meta.is_dir() {
            return Err(EmuError::DiskMountFailed {
                path: path.to_path_buf(),
                reason: "not a directory".into(),
            });
        }

        let write_protected = read_only || !is_writable(path);
        let mut opts = DirDiskOptions::new(path, tracks, sectors);
        if !opts.read() && !write_protected {
            opts.write();
        }

        let geometry = Geometry::new(opts.tracks, opts.sectors);
        let number = NEXT_DISK_NUMBER.fetch_add(1, Ordering::Relaxed);

        let mut disk = Self {
            directory: path.to_path_buf(),
            geometry,
            write_protected,
            with_file_time: false,
            sys_info: [SysInfoSector::default(), SysInfoSector::default()],
            dir_sectors: Vec::new(),
            links: Vec::new(),
            new_files: BTreeMap::new(),
            dir_extend: TrackSector::NONE,
            next_dir_index: -1,
            init_dir_sectors: 0,
        };

        disk.initialize_sys_info(number);
        disk.fill_directory();

        log::info!(
            "mounted directory {} as disk #{number} ({}x{})",
            path.display(),
            geometry.tracks,
            geometry.sectors
        );
        Ok(disk)
    }

    // ── Mount-time synthesis ──────────────────────────────────

    fn initialize_sys_info(&mut self, number: u16) {
        let name = flex_disk_name(&self.directory);
        let date = fs::metadata(&self.directory)
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Local>::from)
            .unwrap_or_else(|| Local::now());

        let sis = &mut self.sys_info[0];
        sis.set_disk_name(&name);
        sis.set_disk_number(number);
        sis.set_fc_start(TrackSector::NONE);
        sis.set_fc_end(TrackSector::NONE);
        sis.set_free(0);
        sis.set_date(date.day() as u8, date.month() as u8, (date.year() % 100) as u8);
        sis.set_last(TrackSector::new(
            (self.geometry.tracks - 1) as u8,
            self.geometry.sectors as u8,
        ));
        self.sys_info[1] = self.sys_info[0].clone();
    }

    fn initialize_directory(&mut self) {
        self.init_dir_sectors = self.geometry.sectors + 1 - u16::from(FIRST_DIR_SECTOR);
        self.next_dir_index = -1;
        self.dir_extend = TrackSector::NONE;
        self.dir_sectors.clear();

        for i in 0..self.init_dir_sectors {
            let mut sector = DirSector::default();
            let is_last = i == self.init_dir_sectors - 1;
            if !is_last {
                sector.set_next(TrackSector::new(0, FIRST_DIR_SECTOR + i as u8 + 1));
            }
            self.dir_sectors.push(sector);
        }
    }

    fn initialize_link_table(&mut self) {
        let sectors = usize::from(self.geometry.sectors);
        let total = self.geometry.total_sectors() as usize;
        let first_dir = usize::from(FIRST_DIR_SECTOR) - 1;

        self.links.clear();
        self.links.resize(total, Link::default());

        // Track 0: boot, system info, then directory to the end.
        for (i, link) in self.links.iter_mut().take(sectors).enumerate() {
            link.next = TrackSector::NONE;
            link.record_nr = [0; 2];
            link.f_record = if i < first_dir { 0 } else { (i - first_dir) as u16 };
            link.file_id = NO_FILE;
            link.kind = if i < 2 {
                SectorKind::Boot
            } else if i < first_dir {
                SectorKind::SystemInfo
            } else {
                SectorKind::Directory
            };
        }

        // All remaining tracks form the free chain, linked in order.
        for index in sectors..total {
            let next = if index == total - 1 {
                TrackSector::NONE
            } else {
                self.geometry.track_sector(index + 1)
            };
            let link = &mut self.links[index];
            link.next = next;
            link.record_nr = [0; 2];
            link.f_record = 0;
            link.file_id = NO_FILE;
            link.kind = SectorKind::FreeChain;
        }

        let free = (total - sectors) as u16;
        let fc_start = self.geometry.track_sector(sectors);
        let fc_end = TrackSector::new(
            (self.geometry.tracks - 1) as u8,
            self.geometry.sectors as u8,
        );
        for sis in &mut self.sys_info {
            sis.set_fc_start(fc_start);
            sis.set_fc_end(fc_end);
            sis.set_free(free);
        }
    }

    /// Scan the host directory and synthesize one directory entry per
    /// emulatable file, in sorted name order.
    fn fill_directory(&mut self) {
        self.initialize_directory();
        self.initialize_link_table();

        // (host name, FLEX base, FLEX extension) per emulatable file.
        let mut names: Vec<(String, String, String)> = Vec::new();
        let mut lowercase_seen: HashSet<String> = HashSet::new();
        let mut random_names: HashSet<String> = HashSet::new();

        for entry in WalkDir::new(&self.directory)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name == RANDOM_FILE_LIST || name == BOOT_FILE {
                continue;
            }
            let Some((base, extension)) = flex_filename(&name) else {
                continue;
            };
            let lowercase = name.to_ascii_lowercase();
            if !lowercase_seen.insert(lowercase) {
                continue;
            }

            let is_random = if self.write_protected {
                self.is_in_random_list(&name)
            } else {
                has_random_attribute(entry.path())
            };
            if is_random {
                random_names.insert(name.clone());
            }
            names.push((name, base, extension));
        }

        names.sort();

        for (name, base, extension) in names {
            let Some(dir_index) = self.next_free_dir_entry() else {
                break;
            };
            let path = self.directory.join(&name);
            let Ok(meta) = fs::metadata(&path) else {
                continue;
            };
            let is_random = random_names.contains(&name);

            let (begin, end) = match self.add_to_link_table(dir_index, meta.len(), is_random) {
                Ok(span) => span,
                Err(e) => {
                    log::warn!("{name} not emulated: {e}");
                    continue;
                }
            };
            let file_write_protected = !is_writable(&path);
            self.add_to_directory(
                &base,
                &extension,
                dir_index,
                is_random,
                &meta,
                begin,
                end,
                file_write_protected,
            );

            if is_random && !self.write_protected {
                self.write_sector_map(&path, meta.len(), begin);
            }
        }
    }

    /// Reserve sectors for one file, linking them off the free chain
    /// head. Returns the file's first and last sector.
    fn add_to_link_table(
        &mut self,
        dir_index: i32,
        size: u64,
        is_random: bool,
    ) -> Result<(TrackSector, TrackSector)> {
        let free = self.sys_info[0].free();
        if size == 0 {
            return Ok((TrackSector::NONE, TrackSector::NONE));
        }
        if size > u64::from(free) * DATA_PER_SECTOR as u64 {
            return Err(EmuError::DiskFull);
        }

        let records = size.div_ceil(DATA_PER_SECTOR as u64) as u16;
        let begin = self.sys_info[0].fc_start();
        let begin_index = self
            .geometry
            .sector_index(begin)
            .ok_or(EmuError::DiskFull)?;

        for i in 1..=records {
            let index = begin_index + usize::from(i) - 1;
            let link = &mut self.links[index];
            if i == records {
                link.next = TrackSector::NONE;
            }
            let record_nr = if is_random {
                if i > 2 {
                    i - 2
                } else {
                    0
                }
            } else {
                i
            };
            link.record_nr = record_nr.to_be_bytes();
            link.f_record = i - 1;
            link.file_id = dir_index;
            link.kind = SectorKind::File;
        }

        let end_index = begin_index + usize::from(records) - 1;
        let end = self.geometry.track_sector(end_index);

        let remaining = free - records;
        let sis = &mut self.sys_info[0];
        sis.set_free(remaining);
        if remaining > 0 {
            sis.set_fc_start(self.geometry.track_sector(end_index + 1));
        } else {
            sis.set_fc_start(TrackSector::NONE);
            sis.set_fc_end(TrackSector::NONE);
        }

        Ok((begin, end))
    }

    #[allow(clippy::too_many_arguments)]
    fn add_to_directory(
        &mut self,
        base: &str,
        extension: &str,
        dir_index: i32,
        is_random: bool,
        meta: &fs::Metadata,
        begin: TrackSector,
        end: TrackSector,
        file_write_protected: bool,
    ) {
        let mtime = meta
            .modified()
            .map(DateTime::<Local>::from)
            .unwrap_or_else(|_| Local::now());
        let records = meta.len().div_ceil(DATA_PER_SECTOR as u64) as u16;

        let mut entry = DirEntry::default();
        entry.set_name(base, extension);
        // A write protected file is automatically also delete protected.
        entry.attributes = if file_write_protected { WRITE_PROTECT } else { 0 };
        entry.start = begin;
        entry.end = end;
        entry.records = records;
        entry.sector_map = if is_random { IS_RANDOM_FILE } else { 0 };
        entry.month = mtime.month() as u8;
        entry.day = mtime.day() as u8;
        entry.year = (mtime.year() % 100) as u8;
        entry.hour = if self.with_file_time { mtime.hour() as u8 } else { 0 };
        entry.minute = if self.with_file_time { mtime.minute() as u8 } else { 0 };

        let slot = (dir_index as usize) % DIR_ENTRIES;
        self.dir_sectors[(dir_index as usize) / DIR_ENTRIES].set_entry(slot, &entry);
    }

    /// Index of the next free directory entry, extending the directory
    /// by one sector off the free chain when all slots are taken.
    fn next_free_dir_entry(&mut self) -> Option<i32> {
        self.next_dir_index += 1;
        let index = self.next_dir_index;

        if (index as usize) / DIR_ENTRIES < self.dir_sectors.len() {
            return Some(index);
        }

        let mut sector = DirSector::default();
        let record_nr = self.dir_sectors.len() as u16 - self.init_dir_sectors + 1;
        sector.set_record_nr(record_nr);

        let track_sector = self.sys_info[0].fc_start();
        let sec_index = self.geometry.sector_index(track_sector)?;

        if !self.extend_directory(sec_index, sector) {
            return None;
        }

        let count = self.dir_sectors.len();
        self.dir_sectors[count - 2].set_next(track_sector);

        let sis = &mut self.sys_info[0];
        let free = sis.free().saturating_sub(1);
        sis.set_free(free);
        if free == 0 {
            sis.set_fc_start(TrackSector::NONE);
            sis.set_fc_end(TrackSector::NONE);
        } else {
            let mut fc_start = sis.fc_start();
            if u16::from(fc_start.sector) == self.geometry.sectors {
                fc_start.sector = 1;
                fc_start.track += 1;
            } else {
                fc_start.sector += 1;
            }
            sis.set_fc_start(fc_start);
        }

        Some(index)
    }

    /// Turn the sector at `index` into one more directory sector.
    fn extend_directory(&mut self, index: usize, sector: DirSector) -> bool {
        let Some(link) = self.links.get_mut(index) else {
            return false;
        };
        link.f_record = self.dir_sectors.len() as u16;
        link.file_id = NO_FILE;
        link.kind = SectorKind::Directory;
        self.dir_sectors.push(sector);
        self.dir_extend = TrackSector::NONE;
        true
    }

    /// Synthesize the in-file sector map of a random file and write it
    /// into the file's first two records.
    fn write_sector_map(&self, path: &Path, size: u64, begin: TrackSector) {
        let Some(begin_index) = self.geometry.sector_index(begin) else {
            return;
        };
        if size < 2 * DATA_PER_SECTOR as u64 {
            return;
        }
        let data_size = size - 2 * DATA_PER_SECTOR as u64;
        if data_size < 2 * DATA_PER_SECTOR as u64 {
            return;
        }

        let sectors = usize::from(self.geometry.sectors);
        let mut map = [0u8; 2 * DATA_PER_SECTOR];
        let mut sec_index = begin_index + 2;
        let extent_bytes = DATA_PER_SECTOR as u64 * 255;

        let full_extents = (data_size / extent_bytes) as usize;
        for n in 0..full_extents {
            map[3 * n] = (sec_index / sectors) as u8;
            map[3 * n + 1] = ((sec_index % sectors) + 1) as u8;
            map[3 * n + 2] = 255;
            sec_index += 255;
        }

        let rest = data_size % extent_bytes;
        if rest != 0 {
            let n = full_extents;
            map[3 * n] = (sec_index / sectors) as u8;
            map[3 * n + 1] = ((sec_index % sectors) + 1) as u8;
            map[3 * n + 2] = rest.div_ceil(DATA_PER_SECTOR as u64) as u8;
        }

        if let Ok(mut file) = OpenOptions::new().write(true).open(path) {
            let _ = file.write_all(&map);
        }
    }

    fn is_in_random_list(&self, name: &str) -> bool {
        let Ok(text) = fs::read_to_string(self.directory.join(RANDOM_FILE_LIST)) else {
            return false;
        };
        text.lines().any(|line| line.trim_end() == name)
    }

    // ── Name and path lookup ──────────────────────────────────

    /// Host filename for a file id: `tmpNN` for new files, the
    /// directory entry's name otherwise. Empty when unknown.
    fn host_filename(&self, file_id: i32) -> String {
        if file_id < 0 {
            return match self.new_files.get(&file_id) {
                Some(nf) => nf.filename.clone(),
                None => format!("tmp{:02}", -1 - file_id),
            };
        }
        let sector_index = (file_id as usize) / DIR_ENTRIES;
        match self.dir_sectors.get(sector_index) {
            Some(sector) => sector.entry((file_id as usize) % DIR_ENTRIES).host_filename(),
            None => String::new(),
        }
    }

    fn path_of_file(&self, file_id: i32) -> PathBuf {
        self.directory.join(self.host_filename(file_id))
    }

    /// Start sector of FLEX.SYS, linked into the boot sector so the
    /// disk can boot.
    fn link_address(&self) -> TrackSector {
        let mut link = TrackSector::NONE;
        for sector in &self.dir_sectors {
            for i in 0..DIR_ENTRIES {
                let entry = sector.entry(i);
                if &entry.filename == b"FLEX\0\0\0\0" && &entry.extension == b"SYS" {
                    link = entry.start;
                }
            }
        }
        link
    }

    // ── New-file registry ─────────────────────────────────────

    /// Record number of a new-file sector, counted along its chain.
    fn record_nr_of_new_file(&self, new_file_id: i32, target_index: usize) -> u16 {
        let mut record_nr = 0u16;
        let mut visited = HashSet::new();
        let Some(nf) = self.new_files.get(&new_file_id) else {
            return 0;
        };
        let mut index = self.geometry.sector_index(nf.first);

        while let Some(i) = index {
            if i == target_index || !visited.insert(i) {
                break;
            }
            record_nr += 1;
            index = self.geometry.sector_index(self.links[i].next);
        }
        record_nr
    }

    /// Id of the new file that `track_sector` continues; allocates a
    /// fresh `tmpNN` when no existing chain matches.
    fn id_of_new_file(&mut self, track_sector: TrackSector) -> i32 {
        for (&id, nf) in &self.new_files {
            if track_sector == nf.next {
                return id;
            }

            let current = self.geometry.sector_index(track_sector);
            let last = self.geometry.sector_index(nf.next);
            let mut index = self.geometry.sector_index(nf.first);
            let mut visited = HashSet::new();

            while index != last {
                let Some(i) = index else { break };
                if !visited.insert(i) {
                    break;
                }
                if current == Some(i) {
                    return id;
                }
                index = self.geometry.sector_index(self.links[i].next);
            }
        }

        let mut id = -1;
        while self.new_files.contains_key(&id) {
            id -= 1;
        }
        self.new_files.insert(
            id,
            NewFile {
                filename: format!("tmp{:02}", -1 - id),
                first: track_sector,
                next: TrackSector::NONE,
            },
        );
        id
    }

    /// Relabel a whole sector chain, following `next` links while the
    /// old file id matches. Guarded against cyclic links.
    fn change_file_kind(
        &mut self,
        start: TrackSector,
        old_file_id: i32,
        new_file_id: i32,
        kind: SectorKind,
    ) {
        let mut visited = HashSet::new();
        let mut index = self.geometry.sector_index(start);

        while let Some(i) = index {
            if self.links[i].file_id != old_file_id {
                break;
            }
            self.links[i].file_id = new_file_id;
            self.links[i].kind = kind;
            index = self.geometry.sector_index(self.links[i].next);
            if let Some(n) = index {
                if !visited.insert(n) {
                    break;
                }
            }
        }
    }

    // ── Directory write pipeline ──────────────────────────────

    fn check_for_delete(&mut self, sector_index: usize, incoming: &DirSector) {
        for i in 0..DIR_ENTRIES {
            let old = self.dir_sectors[sector_index].entry(i);
            if incoming.entry(i).is_deleted() && !old.is_deleted() {
                let dir_index = (sector_index * DIR_ENTRIES + i) as i32;
                let filename = self.host_filename(dir_index);
                let path = self.directory.join(&filename);
                if let Err(e) = fs::remove_file(&path) {
                    log::warn!("cannot unlink {}: {e}", path.display());
                }
                self.change_file_kind(old.start, dir_index, 0, SectorKind::FreeChain);
                log::debug!("      delete {filename}");
                break;
            }
        }
    }

    fn check_for_new_file(&mut self, sector_index: usize, incoming: &DirSector) {
        let mut done: Vec<i32> = Vec::new();

        for i in 0..DIR_ENTRIES {
            let entry = incoming.entry(i);
            if !entry.in_use() || entry.start.is_none() {
                continue;
            }

            let matching: Vec<i32> = self
                .new_files
                .iter()
                .filter(|(_, nf)| nf.first == entry.start)
                .map(|(&id, _)| id)
                .collect();

            for id in matching {
                done.push(id);
                let dir_index = (sector_index * DIR_ENTRIES + i) as i32;
                self.change_file_kind(entry.start, id, dir_index, SectorKind::File);

                let old_path = self.directory.join(&self.new_files[&id].filename);
                if entry.is_random() {
                    set_random_attribute(&old_path);
                }

                let new_path = self.directory.join(entry.host_filename());
                if let Err(e) = fs::rename(&old_path, &new_path) {
                    log::warn!(
                        "cannot rename {} to {}: {e}",
                        old_path.display(),
                        new_path.display()
                    );
                }
                log::debug!(
                    "      new file {}, was {}",
                    new_path.display(),
                    old_path.display()
                );
                self.set_entry_file_time(&new_path, &entry);
            }
        }

        for id in done {
            self.new_files.remove(&id);
        }
    }

    fn check_for_rename(&mut self, sector_index: usize, incoming: &DirSector) {
        for i in 0..DIR_ENTRIES {
            let dir_index = (sector_index * DIR_ENTRIES + i) as i32;
            let old_filename = self.host_filename(dir_index);
            let new_filename = incoming.entry(i).host_filename();

            if !old_filename.is_empty() && !new_filename.is_empty() && old_filename != new_filename
            {
                let old_path = self.directory.join(&old_filename);
                let new_path = self.directory.join(&new_filename);
                if let Err(e) = fs::rename(&old_path, &new_path) {
                    log::warn!(
                        "cannot rename {} to {}: {e}",
                        old_path.display(),
                        new_path.display()
                    );
                }
                log::debug!("      rename {old_filename} to {new_filename}");
                break;
            }
        }
    }

    fn check_for_extend(&mut self, sector_index: usize, incoming: &DirSector) {
        let old = &self.dir_sectors[sector_index];
        if old.next().is_none() && !incoming.next().is_none() {
            self.dir_extend = incoming.next();
        }
    }

    fn check_for_changed_attributes(&mut self, sector_index: usize, incoming: &mut DirSector) {
        for i in 0..DIR_ENTRIES {
            let mut entry = incoming.entry(i);

            if entry.attributes & UNSUPPORTED_ATTRIBUTES != 0 {
                entry.attributes &= !UNSUPPORTED_ATTRIBUTES;
                incoming.set_attributes(i, entry.attributes);
            }

            if self.write_protected {
                // File write protection cannot change on a protected disk.
                incoming.set_attributes(i, entry.attributes | WRITE_PROTECT);
                continue;
            }

            let old = self.dir_sectors[sector_index].entry(i);
            if (entry.attributes ^ old.attributes) & WRITE_PROTECT != 0 {
                let dir_index = (sector_index * DIR_ENTRIES + i) as i32;
                let path = self.directory.join(self.host_filename(dir_index));
                set_host_write_protect(&path, entry.attributes & WRITE_PROTECT != 0);
                break;
            }
        }
    }

    // ── Host file time mirroring ──────────────────────────────

    fn set_entry_file_time(&self, path: &Path, entry: &DirEntry) {
        let (hour, minute) = if self.with_file_time {
            (entry.hour, entry.minute)
        } else {
            (12, 0)
        };
        set_host_file_time(path, entry.month, entry.day, entry.year, hour, minute);
    }

    /// The host changed a file's mtime by writing it; set it back to
    /// the date the guest believes in.
    fn restore_file_time(&self, path: &Path, file_id: i32) {
        if file_id < 0 {
            return;
        }
        let sector_index = (file_id as usize) / DIR_ENTRIES;
        if let Some(sector) = self.dir_sectors.get(sector_index) {
            let entry = sector.entry((file_id as usize) % DIR_ENTRIES);
            self.set_entry_file_time(path, &entry);
        }
    }

    fn is_last_of_free_chain(&self, ts: TrackSector) -> bool {
        self.sys_info[0].fc_end() == ts
    }

    /// Shared tail of the FreeChain / NewFile / File write paths.
    fn write_file_sector(&mut self, index: usize, buffer: &[u8]) -> bool {
        let file_id = self.links[index].file_id;
        let path = self.path_of_file(file_id);

        {
            let link = &mut self.links[index];
            link.next = TrackSector::new(buffer[0], buffer[1]);
            link.record_nr = [buffer[2], buffer[3]];
        }

        if file_id < 0 {
            let next = self.links[index].next;
            if let Some(nf) = self.new_files.get_mut(&file_id) {
                nf.next = next;
            }
            self.links[index].kind = SectorKind::NewFile;
            self.links[index].f_record = self.record_nr_of_new_file(file_id, index);

            if !next.is_none() {
                // The linked successor becomes part of the new file too.
                if let Some(next_index) = self.geometry.sector_index(next) {
                    self.links[next_index].kind = SectorKind::NewFile;
                    self.links[next_index].file_id = file_id;
                    self.links[next_index].f_record =
                        self.record_nr_of_new_file(file_id, next_index);
                }
            }
        }

        let f_record = self.links[index].f_record;
        let kind = self.links[index].kind;

        let Ok(mut file) = OpenOptions::new().read(true).write(true).open(&path) else {
            return false;
        };
        let offset = u64::from(f_record) * DATA_PER_SECTOR as u64;
        if file.seek(SeekFrom::Start(offset)).is_err() {
            return false;
        }
        if file.write_all(&buffer[4..SECTOR_SIZE]).is_err() {
            return false;
        }
        drop(file);

        if kind == SectorKind::File {
            self.restore_file_time(&path, self.links[index].file_id);
        }
        true
    }

    fn read_boot_sector(&self, buffer: &mut [u8], sector: u8) {
        buffer[..SECTOR_SIZE].fill(0);

        let path = self.directory.join(BOOT_FILE);
        let mut count = 0usize;
        if let Ok(mut file) = File::open(&path) {
            if sector == 2 {
                let _ = file.seek(SeekFrom::Start(SECTOR_SIZE as u64));
            }
            count = file.read(&mut buffer[..SECTOR_SIZE]).unwrap_or(0);
            if sector == 1 && count == SECTOR_SIZE {
                let boot_link = self.link_address();
                buffer[3] = boot_link.track;
                buffer[4] = boot_link.sector;
            }
        }

        if sector == 1 && count != SECTOR_SIZE {
            // No boot code: jump to the monitor's warm start entry.
            buffer[0] = 0x7E; // JMP $F02D
            buffer[1] = 0xF0;
            buffer[2] = 0x2D;
        }
    }

    fn write_boot_sector(&self, buffer: &[u8], sector: u8) -> bool {
        let path = self.directory.join(BOOT_FILE);
        let mut boot = [0u8; 2 * SECTOR_SIZE];

        if let Ok(mut file) = File::open(&path) {
            let _ = file.read(&mut boot[..]);
        }

        let offset = SECTOR_SIZE * usize::from(sector - 1);
        boot[offset..offset + SECTOR_SIZE].copy_from_slice(&buffer[..SECTOR_SIZE]);
        // The link address is synthesized on read, never stored.
        boot[3] = 0;
        boot[4] = 0;

        let keep_both = boot[SECTOR_SIZE..].iter().any(|&b| b != 0);
        let count = if keep_both { 2 * SECTOR_SIZE } else { SECTOR_SIZE };

        match File::create(&path) {
            Ok(mut file) => file.write_all(&boot[..count]).is_ok(),
            Err(_) => false,
        }
    }
}

impl SectorDisk for NafsDirectory {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn read_sector(&mut self, buffer: &mut [u8], track: u8, sector: u8) -> bool {
        let ts = TrackSector::new(track, sector);
        let Some(index) = self.geometry.sector_index(ts) else {
            log::debug!("read: {ts} *** invalid track or sector");
            return false;
        };
        let link = self.links[index];
        log::debug!("read: {ts} {}", link.kind.describe());

        match link.kind {
            SectorKind::Unknown => {
                buffer[..SECTOR_SIZE].fill(0);
                true
            }
            SectorKind::SystemInfo => {
                buffer[..SECTOR_SIZE].copy_from_slice(&self.sys_info[usize::from(sector) - 3].0);
                true
            }
            SectorKind::Boot => {
                self.read_boot_sector(buffer, sector);
                true
            }
            SectorKind::Directory => {
                let source = &self.dir_sectors[usize::from(link.f_record)];
                buffer[..SECTOR_SIZE].copy_from_slice(&source.0);
                true
            }
            SectorKind::FreeChain => {
                buffer[0] = link.next.track;
                buffer[1] = link.next.sector;
                buffer[2] = link.record_nr[0];
                buffer[3] = link.record_nr[1];
                buffer[4..SECTOR_SIZE].fill(0);
                true
            }
            SectorKind::File | SectorKind::NewFile => {
                let path = self.path_of_file(link.file_id);
                let mut ok = false;

                if let Ok(mut file) = File::open(&path) {
                    let offset = u64::from(link.f_record) * DATA_PER_SECTOR as u64;
                    if file.seek(SeekFrom::Start(offset)).is_ok() {
                        let n = file.read(&mut buffer[4..SECTOR_SIZE]).unwrap_or(0);
                        buffer[4 + n..SECTOR_SIZE].fill(0);
                        ok = true;
                    }
                    drop(file);

                    if link.kind == SectorKind::File {
                        self.restore_file_time(&path, link.file_id);
                    }
                }

                buffer[0] = link.next.track;
                buffer[1] = link.next.sector;
                buffer[2] = link.record_nr[0];
                buffer[3] = link.record_nr[1];
                ok
            }
        }
    }

    fn write_sector(&mut self, buffer: &[u8], track: u8, sector: u8) -> bool {
        let ts = TrackSector::new(track, sector);
        if self.write_protected {
            log::debug!("write: {ts} refused: {}", EmuError::DiskWriteProtected);
            return false;
        }
        let Some(index) = self.geometry.sector_index(ts) else {
            log::debug!("write: {ts} *** invalid track or sector");
            return false;
        };
        let kind = self.links[index].kind;
        log::debug!("write: {ts} {}", kind.describe());

        match kind {
            SectorKind::Unknown => true,
            SectorKind::SystemInfo => {
                self.sys_info[usize::from(sector) - 3] = SysInfoSector::from_bytes(buffer);
                true
            }
            SectorKind::Boot => self.write_boot_sector(buffer, sector),
            SectorKind::Directory => {
                let sector_index = usize::from(self.links[index].f_record);
                let mut incoming = DirSector::from_bytes(buffer);
                self.check_for_delete(sector_index, &incoming);
                self.check_for_new_file(sector_index, &incoming);
                self.check_for_rename(sector_index, &incoming);
                self.check_for_extend(sector_index, &incoming);
                self.check_for_changed_attributes(sector_index, &mut incoming);
                self.dir_sectors[sector_index] = incoming;
                true
            }
            SectorKind::FreeChain => {
                if self.dir_extend == ts {
                    log::debug!("      extend directory");
                    return self.extend_directory(index, DirSector::from_bytes(buffer));
                }

                if self.is_last_of_free_chain(ts) && (buffer[0] != 0 || buffer[1] != 0) {
                    // A deleted file's sectors were appended to the chain.
                    let link = &mut self.links[index];
                    link.next = TrackSector::new(buffer[0], buffer[1]);
                    link.record_nr = [buffer[2], buffer[3]];
                    log::debug!("      file deleted");
                    return true;
                }

                let new_file_id = self.id_of_new_file(ts);
                self.links[index].file_id = new_file_id;
                let path = self.path_of_file(new_file_id);
                if File::create(&path).is_err() {
                    log::warn!("cannot create {}", path.display());
                    return false;
                }
                self.write_file_sector(index, buffer)
            }
            SectorKind::File | SectorKind::NewFile => self.write_file_sector(index, buffer),
        }
    }

    fn is_write_protected(&self) -> bool {
        self.write_protected
    }

    fn info(&self) -> DriveInfo {
        let sis = &self.sys_info[0];
        let last = sis.last();
        DriveInfo {
            name: sis.disk_name(),
            number: sis.disk_number(),
            path: self.directory.clone(),
            tracks: self.geometry.tracks,
            sectors: self.geometry.sectors,
            free_bytes: u64::from(sis.free()) * SECTOR_SIZE as u64,
            total_bytes: u64::from(last.sector) * (u64::from(last.track) + 1) * SECTOR_SIZE as u64,
            write_protected: self.write_protected,
            is_flex_format: true,
            date: sis.date(),
        }
    }

    fn sync(&mut self) -> Result<()> {
        if self.new_files.is_empty() {
            return Ok(());
        }
        Err(EmuError::io(
            "update drive",
            std::io::Error::other("temporary files still open"),
        ))
    }
}

impl Drop for NafsDirectory {
    fn drop(&mut self) {
        for nf in self.new_files.values() {
            log::warn!(
                "temporary file left behind: {}",
                self.directory.join(&nf.filename).display()
            );
        }
    }
}

// ── Host filesystem helpers ───────────────────────────────────

#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(cpath) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(cpath.as_ptr(), libc::W_OK) == 0 }
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    !fs::metadata(path).map(|m| m.permissions().readonly()).unwrap_or(true)
}

/// Random files are marked by the executable bit (hidden attribute on
/// Windows).
#[cfg(unix)]
fn has_random_attribute(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o100 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn has_random_attribute(_path: &Path) -> bool {
    false
}

#[cfg(unix)]
fn set_random_attribute(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(path) {
        let mut perm = meta.permissions();
        perm.set_mode(perm.mode() | 0o100);
        let _ = fs::set_permissions(path, perm);
    }
}

#[cfg(not(unix))]
fn set_random_attribute(_path: &Path) {}

#[cfg(unix)]
fn set_host_write_protect(path: &Path, protect: bool) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(path) {
        let mut perm = meta.permissions();
        let mode = perm.mode();
        perm.set_mode(if protect { mode & !0o200 } else { mode | 0o200 });
        let _ = fs::set_permissions(path, perm);
        log::debug!(
            "      {} write_protect {}",
            if protect { "set" } else { "clear" },
            path.display()
        );
    }
}

#[cfg(not(unix))]
fn set_host_write_protect(path: &Path, protect: bool) {
    if let Ok(meta) = fs::metadata(path) {
        let mut perm = meta.permissions();
        perm.set_readonly(protect);
        let _ = fs::set_permissions(path, perm);
    }
}

/// Set a file's mtime to the FLEX date. Years below 75 mean 20xx.
#[cfg(unix)]
fn set_host_file_time(path: &Path, month: u8, day: u8, year: u8, hour: u8, minute: u8) {
    use chrono::TimeZone;
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let year = if year < 75 { 2000 + i32::from(year) } else { 1900 + i32::from(year) };
    let Some(datetime) = Local
        .with_ymd_and_hms(year, u32::from(month), u32::from(day), u32::from(hour), u32::from(minute), 0)
        .single()
    else {
        return;
    };

    let atime = fs::metadata(path)
        .ok()
        .and_then(|m| m.accessed().ok())
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as libc::time_t)
        .unwrap_or_else(|| datetime.timestamp() as libc::time_t);

    let Ok(cpath) = CString::new(path.as_os_str().as_bytes()) else {
        return;
    };
    let times = libc::utimbuf { actime: atime, modtime: datetime.timestamp() as libc::time_t };
    unsafe {
        libc::utime(cpath.as_ptr(), &times);
    }
}

#[cfg(not(unix))]
fn set_host_file_time(_path: &Path, _month: u8, _day: u8, _year: u8, _hour: u8, _minute: u8) {}

#[cfg(test)]
mod tests {
    use super::layout::DE_DELETED;
    use super::*;
    use tempfile::TempDir;

    fn mount(dir: &TempDir) -> NafsDirectory {
        NafsDirectory::open(dir.path(), 35, 10, false).unwrap()
    }

    fn read(disk: &mut NafsDirectory, track: u8, sector: u8) -> Vec<u8> {
        let mut buffer = vec![0u8; SECTOR_SIZE];
        assert!(disk.read_sector(&mut buffer, track, sector), "read {track}-{sector}");
        buffer
    }

    fn free_chain_length(disk: &NafsDirectory) -> u16 {
        disk.links.iter().filter(|l| l.kind == SectorKind::FreeChain).count() as u16
    }

    #[test]
    fn empty_directory_mounts_with_full_free_chain() {
        let dir = TempDir::new().unwrap();
        let mut disk = mount(&dir);

        let sis = read(&mut disk, 0, 3);
        let sis = SysInfoSector::from_bytes(&sis);
        assert_eq!(sis.fc_start(), TrackSector::new(1, 1));
        assert_eq!(sis.fc_end(), TrackSector::new(34, 10));
        assert_eq!(sis.free(), 34 * 10);
        assert_eq!(sis.last(), TrackSector::new(34, 10));
        assert_eq!(sis.free(), free_chain_length(&disk));

        // Both system info sectors match.
        assert_eq!(read(&mut disk, 0, 3), read(&mut disk, 0, 4));

        // Directory sectors are chained 5 → 6 → … → 10 → end.
        let first = DirSector::from_bytes(&read(&mut disk, 0, 5));
        assert_eq!(first.next(), TrackSector::new(0, 6));
        let last = DirSector::from_bytes(&read(&mut disk, 0, 10));
        assert!(last.next().is_none());
    }

    #[test]
    fn geometry_sidecar_overrides_mount_arguments() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".flexdiskrc"), "tracks=40\nsectors=16\n").unwrap();
        let disk = mount(&dir);
        assert_eq!(disk.geometry(), Geometry::new(40, 16));
    }

    #[test]
    fn mount_writes_default_sidecar_back() {
        let dir = TempDir::new().unwrap();
        let _disk = mount(&dir);
        let text = fs::read_to_string(dir.path().join(".flexdiskrc")).unwrap();
        assert!(text.contains("tracks=35"));
        assert!(text.contains("sectors=10"));
    }

    #[test]
    fn host_files_appear_sorted_in_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("beta.txt"), vec![1u8; 300]).unwrap();
        fs::write(dir.path().join("alpha.bin"), vec![2u8; 10]).unwrap();
        fs::write(dir.path().join("IGNORED"), b"no extension").unwrap();
        let mut disk = mount(&dir);

        let sector = DirSector::from_bytes(&read(&mut disk, 0, 5));
        let first = sector.entry(0);
        let second = sector.entry(1);
        assert_eq!(first.host_filename(), "alpha.bin");
        assert_eq!(second.host_filename(), "beta.txt");
        assert!(sector.entry(2).is_empty());

        // alpha.bin: 10 bytes → 1 sector at the chain head.
        assert_eq!(first.start, TrackSector::new(1, 1));
        assert_eq!(first.end, TrackSector::new(1, 1));
        assert_eq!(first.records, 1);
        // beta.txt: 300 bytes → 2 sectors right after.
        assert_eq!(second.start, TrackSector::new(1, 2));
        assert_eq!(second.end, TrackSector::new(1, 3));
        assert_eq!(second.records, 2);

        let sis = SysInfoSector::from_bytes(&read(&mut disk, 0, 3));
        assert_eq!(sis.free(), 34 * 10 - 3);
        assert_eq!(sis.fc_start(), TrackSector::new(1, 4));
        assert_eq!(sis.free(), free_chain_length(&disk));
    }

    #[test]
    fn file_sectors_carry_links_and_data() {
        let dir = TempDir::new().unwrap();
        let content: Vec<u8> = (0..=255u8).cycle().take(300).collect();
        fs::write(dir.path().join("data.bin"), &content).unwrap();
        let mut disk = mount(&dir);

        let first = read(&mut disk, 1, 1);
        assert_eq!(&first[..4], &[1, 2, 0, 1]); // next 1-2, record 1
        assert_eq!(&first[4..256], &content[..252]);

        let second = read(&mut disk, 1, 2);
        assert_eq!(&second[..4], &[0, 0, 0, 2]); // last sector, record 2
        assert_eq!(&second[4..4 + 48], &content[252..300]);
        assert!(second[4 + 48..].iter().all(|&b| b == 0));
    }

    #[test]
    fn free_chain_reads_link_plus_zeros() {
        let dir = TempDir::new().unwrap();
        let mut disk = mount(&dir);
        let buffer = read(&mut disk, 1, 1);
        assert_eq!(&buffer[..4], &[1, 2, 0, 0]);
        assert!(buffer[4..].iter().all(|&b| b == 0));

        let last = read(&mut disk, 34, 10);
        assert_eq!(&last[..2], &[0, 0]);
    }

    #[test]
    fn boot_sector_defaults_to_monitor_jump() {
        let dir = TempDir::new().unwrap();
        let mut disk = mount(&dir);
        let buffer = read(&mut disk, 0, 1);
        assert_eq!(&buffer[..3], &[0x7E, 0xF0, 0x2D]);
        assert!(read(&mut disk, 0, 2).iter().all(|&b| b == 0));
    }

    #[test]
    fn boot_file_is_served_with_link_address() {
        let dir = TempDir::new().unwrap();
        let mut boot = vec![0u8; SECTOR_SIZE];
        boot[0] = 0x7E;
        boot[1] = 0xF0;
        boot[2] = 0x2D;
        fs::write(dir.path().join("boot"), &boot).unwrap();
        // FLEX.SYS so the link address points somewhere.
        fs::write(dir.path().join("flex.sys"), vec![0u8; 600]).unwrap();
        let mut disk = mount(&dir);

        let buffer = read(&mut disk, 0, 1);
        assert_eq!(&buffer[..3], &[0x7E, 0xF0, 0x2D]);
        assert_eq!(TrackSector::new(buffer[3], buffer[4]), TrackSector::new(1, 1));
    }

    #[test]
    fn boot_write_persists_one_or_two_sectors() {
        let dir = TempDir::new().unwrap();
        let mut disk = mount(&dir);

        let mut sector1 = vec![0u8; SECTOR_SIZE];
        sector1[0] = 0xBD;
        sector1[3] = 0x01; // link bytes are stripped on write
        sector1[4] = 0x01;
        assert!(disk.write_sector(&sector1, 0, 1));
        let on_disk = fs::read(dir.path().join("boot")).unwrap();
        assert_eq!(on_disk.len(), SECTOR_SIZE);
        assert_eq!(on_disk[0], 0xBD);
        assert_eq!(&on_disk[3..5], &[0, 0]);

        let mut sector2 = vec![0u8; SECTOR_SIZE];
        sector2[10] = 0x5A;
        assert!(disk.write_sector(&sector2, 0, 2));
        let on_disk = fs::read(dir.path().join("boot")).unwrap();
        assert_eq!(on_disk.len(), 2 * SECTOR_SIZE);
        assert_eq!(on_disk[SECTOR_SIZE + 10], 0x5A);
    }

    #[test]
    fn new_file_write_then_directory_entry_materializes() {
        let dir = TempDir::new().unwrap();
        let mut disk = mount(&dir);

        // Write one data sector into the free chain head.
        let mut data = vec![0u8; SECTOR_SIZE];
        data[0] = 0; // no successor
        data[1] = 0;
        data[2] = 0;
        data[3] = 1; // record number 1
        for (i, byte) in data[4..].iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        assert!(disk.write_sector(&data, 1, 1));
        assert!(dir.path().join("tmp00").exists());
        assert_eq!(disk.links[10].kind, SectorKind::NewFile);

        // Now write the directory sector naming TEST.TXT at 1-1.
        let mut dir_sector = DirSector::from_bytes(&read(&mut disk, 0, 5));
        let mut entry = DirEntry::default();
        entry.set_name("TEST", "TXT");
        entry.start = TrackSector::new(1, 1);
        entry.end = TrackSector::new(1, 1);
        entry.records = 1;
        entry.month = 6;
        entry.day = 15;
        entry.year = 84;
        dir_sector.set_entry(0, &entry);
        assert!(disk.write_sector(&dir_sector.0, 0, 5));

        assert!(!dir.path().join("tmp00").exists());
        let host = fs::read(dir.path().join("test.txt")).unwrap();
        assert_eq!(host.len(), DATA_PER_SECTOR);
        assert_eq!(&host[..], &data[4..]);
        assert_eq!(disk.links[10].kind, SectorKind::File);
        assert_eq!(disk.links[10].file_id, 0);
        assert!(disk.new_files.is_empty());
        assert!(disk.sync().is_ok());

        // Re-reading the sector yields exactly what was written.
        assert_eq!(read(&mut disk, 1, 1), data);

        // The directory now lists the file.
        let listed = DirSector::from_bytes(&read(&mut disk, 0, 5));
        assert_eq!(listed.entry(0).host_filename(), "test.txt");
        assert_eq!(listed.entry(0).records, 1);
    }

    #[test]
    fn sync_fails_while_new_files_are_open() {
        let dir = TempDir::new().unwrap();
        let mut disk = mount(&dir);
        let data = vec![0u8; SECTOR_SIZE];
        assert!(disk.write_sector(&data, 1, 1));
        assert!(disk.sync().is_err());
    }

    #[test]
    fn multi_sector_new_file_chains_records() {
        let dir = TempDir::new().unwrap();
        let mut disk = mount(&dir);

        let mut first = vec![0u8; SECTOR_SIZE];
        first[0] = 1; // next 1-2
        first[1] = 2;
        first[3] = 1;
        first[4..].fill(0xAA);
        assert!(disk.write_sector(&first, 1, 1));

        let mut second = vec![0u8; SECTOR_SIZE];
        second[3] = 2;
        second[4..].fill(0xBB);
        assert!(disk.write_sector(&second, 1, 2));

        // Both sectors belong to the same tmp file.
        assert_eq!(disk.links[10].file_id, disk.links[11].file_id);
        assert_eq!(disk.links[11].f_record, 1);
        let tmp = fs::read(dir.path().join("tmp00")).unwrap();
        assert_eq!(tmp.len(), 2 * DATA_PER_SECTOR);
        assert!(tmp[..DATA_PER_SECTOR].iter().all(|&b| b == 0xAA));
        assert!(tmp[DATA_PER_SECTOR..].iter().all(|&b| b == 0xBB));
    }

    #[test]
    fn delete_unlinks_host_file_and_frees_chain() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("data.bin"), vec![7u8; 500]).unwrap();
        let mut disk = mount(&dir);
        assert_eq!(disk.links[10].kind, SectorKind::File);

        let mut dir_sector = DirSector::from_bytes(&read(&mut disk, 0, 5));
        dir_sector.0[16] = DE_DELETED;
        assert!(disk.write_sector(&dir_sector.0, 0, 5));

        assert!(!dir.path().join("data.bin").exists());
        assert_eq!(disk.links[10].kind, SectorKind::FreeChain);
        assert_eq!(disk.links[11].kind, SectorKind::FreeChain);
    }

    #[test]
    fn rename_reaches_the_host_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("old.txt"), vec![1u8; 100]).unwrap();
        let mut disk = mount(&dir);

        let mut dir_sector = DirSector::from_bytes(&read(&mut disk, 0, 5));
        let mut entry = dir_sector.entry(0);
        entry.set_name("NEW", "TXT");
        dir_sector.set_entry(0, &entry);
        assert!(disk.write_sector(&dir_sector.0, 0, 5));

        assert!(!dir.path().join("old.txt").exists());
        assert!(dir.path().join("new.txt").exists());
    }

    #[test]
    fn guest_driven_directory_extension() {
        let dir = TempDir::new().unwrap();
        let mut disk = mount(&dir);
        let dir_sector_count = disk.dir_sectors.len();

        // Last directory sector gets a next pointer into the free chain.
        let mut last_dir = DirSector::from_bytes(&read(&mut disk, 0, 10));
        last_dir.set_next(TrackSector::new(1, 1));
        assert!(disk.write_sector(&last_dir.0, 0, 10));

        // The guest then writes the new directory sector there.
        let fresh = DirSector::default();
        assert!(disk.write_sector(&fresh.0, 1, 1));
        assert_eq!(disk.links[10].kind, SectorKind::Directory);
        assert_eq!(disk.dir_sectors.len(), dir_sector_count + 1);

        // Reading it back goes through the directory array now.
        let back = read(&mut disk, 1, 1);
        assert_eq!(&back[..SECTOR_SIZE], &fresh.0[..]);
    }

    #[test]
    fn deleted_chain_folds_into_free_chain_end() {
        let dir = TempDir::new().unwrap();
        let mut disk = mount(&dir);

        let mut buffer = vec![0u8; SECTOR_SIZE];
        buffer[0] = 1; // pretend a freed chain continues at 1-1
        buffer[1] = 1;
        assert!(disk.write_sector(&buffer, 34, 10));
        assert_eq!(disk.links[349].next, TrackSector::new(1, 1));
        assert_eq!(disk.links[349].kind, SectorKind::FreeChain);
        assert!(disk.new_files.is_empty());
    }

    #[test]
    fn system_info_write_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut disk = mount(&dir);
        let mut buffer = read(&mut disk, 0, 3);
        buffer[100] = 0xAB;
        let mut sis = SysInfoSector::from_bytes(&buffer);
        sis.set_free(1234);
        assert!(disk.write_sector(&sis.0, 0, 3));
        assert_eq!(read(&mut disk, 0, 3), sis.0.to_vec());
    }

    #[cfg(unix)]
    #[test]
    fn executable_bit_marks_random_files() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rnd.dat");
        fs::write(&path, vec![3u8; 2000]).unwrap();
        let mut perm = fs::metadata(&path).unwrap().permissions();
        perm.set_mode(0o744);
        fs::set_permissions(&path, perm).unwrap();

        let mut disk = mount(&dir);
        let sector = DirSector::from_bytes(&read(&mut disk, 0, 5));
        let entry = sector.entry(0);
        assert!(entry.is_random());

        // First two records hold the synthesized sector map: data
        // starts at the third allocated sector with a 6-sector extent.
        let host = fs::read(&path).unwrap();
        assert_eq!(&host[..3], &[1, 3, 6]);

        // Map sectors carry record number 0, data sectors count from 1.
        let map_sector = read(&mut disk, 1, 1);
        assert_eq!(&map_sector[2..4], &[0, 0]);
        let data_sector = read(&mut disk, 1, 3);
        assert_eq!(&data_sector[2..4], &[0, 1]);
    }

    #[cfg(unix)]
    #[test]
    fn write_protect_attribute_chmods_host_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prot.txt");
        fs::write(&path, vec![1u8; 10]).unwrap();
        let mut disk = mount(&dir);

        let mut dir_sector = DirSector::from_bytes(&read(&mut disk, 0, 5));
        let mut entry = dir_sector.entry(0);
        entry.attributes = WRITE_PROTECT;
        dir_sector.set_entry(0, &entry);
        assert!(disk.write_sector(&dir_sector.0, 0, 5));

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o200, 0);
    }

    #[test]
    fn unsupported_attributes_are_stripped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("attr.txt"), vec![1u8; 10]).unwrap();
        let mut disk = mount(&dir);

        let mut dir_sector = DirSector::from_bytes(&read(&mut disk, 0, 5));
        let mut entry = dir_sector.entry(0);
        entry.attributes = UNSUPPORTED_ATTRIBUTES;
        dir_sector.set_entry(0, &entry);
        assert!(disk.write_sector(&dir_sector.0, 0, 5));

        let stored = DirSector::from_bytes(&read(&mut disk, 0, 5));
        assert_eq!(stored.entry(0).attributes, 0);
    }

    #[test]
    fn invalid_sector_addresses_fail() {
        let dir = TempDir::new().unwrap();
        let mut disk = mount(&dir);
        let mut buffer = vec![0u8; SECTOR_SIZE];
        assert!(!disk.read_sector(&mut buffer, 0, 0));
        assert!(!disk.read_sector(&mut buffer, 35, 1));
        assert!(!disk.read_sector(&mut buffer, 1, 11));
        assert!(!disk.write_sector(&buffer, 0, 0));
    }

    #[test]
    fn reachable_sectors_are_files_and_free_count_matches() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("one.txt"), vec![1u8; 700]).unwrap();
        fs::write(dir.path().join("two.txt"), vec![2u8; 100]).unwrap();
        let mut disk = mount(&dir);

        // Every sector reachable from a directory entry is a file
        // sector owned by that entry.
        for (sector_idx, dir_sector) in disk.dir_sectors.clone().iter().enumerate() {
            for i in 0..DIR_ENTRIES {
                let entry = dir_sector.entry(i);
                if !entry.in_use() {
                    continue;
                }
                let dir_index = (sector_idx * DIR_ENTRIES + i) as i32;
                let mut ts = entry.start;
                while let Some(index) = disk.geometry.sector_index(ts) {
                    assert_eq!(disk.links[index].kind, SectorKind::File);
                    assert_eq!(disk.links[index].file_id, dir_index);
                    ts = disk.links[index].next;
                }
            }
        }

        let sis = SysInfoSector::from_bytes(&read(&mut disk, 0, 3));
        assert_eq!(sis.free(), free_chain_length(&disk));

        // The free chain is non-branching and ends at 0-0.
        let mut ts = sis.fc_start();
        let mut count = 0;
        while let Some(index) = disk.geometry.sector_index(ts) {
            assert_eq!(disk.links[index].kind, SectorKind::FreeChain);
            ts = disk.links[index].next;
            count += 1;
        }
        assert!(ts.is_none());
        assert_eq!(count, sis.free());
    }
}
