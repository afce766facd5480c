//! FLEX filename rules.
//!
//! Base name: 1–8 characters, first a letter, rest letters, digits, `_`
//! or `-`. Extension: one dot plus 1–3 characters with the same rules.
//! On case-sensitive hosts only lower-case filenames are emulated (the
//! guest sees them upper-cased); Windows hosts accept mixed case.

use std::path::Path;

/// Host files the guest must never see as regular files.
pub const BOOT_FILE: &str = "boot";
pub const RANDOM_FILE_LIST: &str = "random";
/// Geometry sidecar.
pub const OPTIONS_FILE: &str = ".flexdiskrc";

const BASE_MAX: usize = 8;
const EXT_MAX: usize = 3;

fn is_name_start(c: char, allow_upper: bool) -> bool {
    c.is_ascii_lowercase() || (allow_upper && c.is_ascii_uppercase())
}

fn is_name_char(c: char, allow_upper: bool) -> bool {
    is_name_start(c, allow_upper) || c.is_ascii_digit() || c == '_' || c == '-'
}

fn split_valid(filename: &str, allow_upper: bool, with_extension: bool) -> Option<(&str, &str)> {
    let (base, ext) = match filename.split_once('.') {
        Some((base, ext)) => (base, ext),
        None if with_extension => return None,
        None => (filename, ""),
    };

    if base.is_empty() || base.len() > BASE_MAX {
        return None;
    }
    let mut chars = base.chars();
    if !is_name_start(chars.next().unwrap(), allow_upper) {
        return None;
    }
    if !chars.all(|c| is_name_char(c, allow_upper)) {
        return None;
    }

    if with_extension || !ext.is_empty() {
        if ext.is_empty() || ext.len() > EXT_MAX || ext.contains('.') {
            return None;
        }
        let mut chars = ext.chars();
        if !is_name_start(chars.next().unwrap(), allow_upper) {
            return None;
        }
        if !chars.all(|c| is_name_char(c, allow_upper)) {
            return None;
        }
    }

    Some((base, ext))
}

/// Validate a host filename as an emulatable FLEX file (extension
/// required). Returns the upper-cased (base, extension) pair.
pub fn flex_filename(filename: &str) -> Option<(String, String)> {
    let allow_upper = cfg!(windows);
    let (base, ext) = split_valid(filename, allow_upper, true)?;
    Some((base.to_ascii_uppercase(), ext.to_ascii_uppercase()))
}

/// Derive the FLEX disk name from a mount directory. Falls back to
/// `FLEXDISK` when the basename is no valid FLEX name.
pub fn flex_disk_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut name = stem;
    name.truncate(BASE_MAX);

    match split_valid(&name, true, false) {
        Some((base, _)) => base.to_ascii_uppercase(),
        None => "FLEXDISK".to_string(),
    }
}
