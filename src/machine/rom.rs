//! Monitor ROM loading: Intel HEX and Motorola S-record.
//!
//! The format is sniffed from the first byte (`:` vs `S`). Checksum
//! bytes are consumed but not validated; a corrupt file loads
//! best-effort rather than failing the boot.

use std::fs;
use std::path::Path;

use crate::errors::{EmuError, Result};

/// Load a ROM file, feeding every (address, byte) pair into `store`.
pub fn load_rom_file(path: &Path, store: impl FnMut(u16, u8)) -> Result<()> {
    let text = fs::read_to_string(path)
        .map_err(|e| EmuError::io(format!("read ROM {}", path.display()), e))?;
    load_rom(&text, store)
}

pub fn load_rom(text: &str, store: impl FnMut(u16, u8)) -> Result<()> {
    match text.trim_start().as_bytes().first() {
        Some(b':') => load_intel_hex(text, store),
        Some(b'S') | Some(b's') => load_motorola_srec(text, store),
        _ => Err(EmuError::ParseError("unknown ROM file format".into())),
    }
}

fn hex_byte(line: &str, pos: usize) -> Result<u8> {
    line.get(pos..pos + 2)
        .and_then(|s| u8::from_str_radix(s, 16).ok())
        .ok_or_else(|| EmuError::ParseError(format!("bad hex digits at column {pos}")))
}

fn hex_word(line: &str, pos: usize) -> Result<u16> {
    let hi = hex_byte(line, pos)?;
    let lo = hex_byte(line, pos + 2)?;
    Ok(u16::from_be_bytes([hi, lo]))
}

/// Intel HEX: `:NN AAAA TT <data> CC`. Type 0 records carry data,
/// type 1 ends the file; other record types are skipped.
fn load_intel_hex(text: &str, mut store: impl FnMut(u16, u8)) -> Result<()> {
    for line in text.lines() {
        let line = line.trim();
        let Some(line) = line.strip_prefix(':') else {
            continue;
        };

        let count = hex_byte(line, 0)?;
        let mut addr = hex_word(line, 2)?;
        let rectype = hex_byte(line, 6)?;

        match rectype {
            0x00 => {
                for i in 0..usize::from(count) {
                    let byte = hex_byte(line, 8 + 2 * i)?;
                    store(addr, byte);
                    addr = addr.wrapping_add(1);
                }
            }
            0x01 => return Ok(()),
            _ => {}
        }
    }
    Ok(())
}

/// Motorola S-record: S0 header (discarded), S1 data, S9 terminator.
fn load_motorola_srec(text: &str, mut store: impl FnMut(u16, u8)) -> Result<()> {
    for line in text.lines() {
        let line = line.trim();
        if line.len() < 2 || !line.starts_with(['S', 's']) {
            continue;
        }
        let rectype = line.as_bytes()[1];
        let line = &line[2..];
        let count = hex_byte(line, 0)?;

        match rectype {
            b'0' => {}
            b'1' => {
                let mut addr = hex_word(line, 2)?;
                // Count covers address, data and checksum.
                let data_bytes = usize::from(count).saturating_sub(3);
                for i in 0..data_bytes {
                    let byte = hex_byte(line, 6 + 2 * i)?;
                    store(addr, byte);
                    addr = addr.wrapping_add(1);
                }
            }
            b'9' => return Ok(()),
            _ => return Ok(()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(text: &str) -> Vec<(u16, u8)> {
        let mut out = Vec::new();
        load_rom(text, |addr, byte| out.push((addr, byte))).unwrap();
        out
    }

    #[test]
    fn intel_hex_data_records() {
        let text = ":03F000007EF02D72\n:00000001FF\n";
        let bytes = collect(text);
        assert_eq!(bytes, vec![(0xF000, 0x7E), (0xF001, 0xF0), (0xF002, 0x2D)]);
    }

    #[test]
    fn intel_hex_stops_at_eof_record() {
        let text = ":01000000AA55\n:00000001FF\n:01000100BB43\n";
        let bytes = collect(text);
        assert_eq!(bytes, vec![(0x0000, 0xAA)]);
    }

    #[test]
    fn intel_hex_bad_checksum_is_ignored() {
        // Checksums are consumed, never verified.
        let text = ":01000000AA00\n:00000001FF\n";
        assert_eq!(collect(text), vec![(0x0000, 0xAA)]);
    }

    #[test]
    fn srec_header_is_discarded() {
        let text = "S00600004844521B\nS105F0007EF02DXX\nS9030000FC\n";
        // 5 bytes = 2 addr + 2 data + checksum... count 05 → 2 data bytes.
        let bytes = collect(text);
        assert_eq!(bytes, vec![(0xF000, 0x7E), (0xF001, 0xF0)]);
    }

    #[test]
    fn srec_full_record() {
        let text = "S106F0007EF02D00\nS9030000FC\n";
        let bytes = collect(text);
        assert_eq!(bytes, vec![(0xF000, 0x7E), (0xF001, 0xF0), (0xF002, 0x2D)]);
    }

    #[test]
    fn unknown_format_is_a_parse_error() {
        assert!(load_rom("GARBAGE", |_, _| {}).is_err());
    }

    #[test]
    fn round_trip_through_encoder() {
        // parse(encode(bytes)) == bytes for both formats.
        let payload: Vec<u8> = (0..32u8).collect();
        let base = 0xE000u16;

        let mut intel = String::new();
        for (i, chunk) in payload.chunks(16).enumerate() {
            let addr = base + (i as u16) * 16;
            intel.push_str(&format!(":{:02X}{:04X}00", chunk.len(), addr));
            for b in chunk {
                intel.push_str(&format!("{b:02X}"));
            }
            intel.push_str("00\n");
        }
        intel.push_str(":00000001FF\n");
        let decoded = collect(&intel);
        for (i, &(addr, byte)) in decoded.iter().enumerate() {
            assert_eq!(addr, base + i as u16);
            assert_eq!(byte, payload[i]);
        }

        let mut srec = String::new();
        for (i, chunk) in payload.chunks(16).enumerate() {
            let addr = base + (i as u16) * 16;
            srec.push_str(&format!("S1{:02X}{:04X}", chunk.len() + 3, addr));
            for b in chunk {
                srec.push_str(&format!("{b:02X}"));
            }
            srec.push_str("00\n");
        }
        srec.push_str("S9030000FC\n");
        let decoded = collect(&srec);
        assert_eq!(decoded.len(), payload.len());
        for (i, &(addr, byte)) in decoded.iter().enumerate() {
            assert_eq!(addr, base + i as u16);
            assert_eq!(byte, payload[i]);
        }
    }
}
