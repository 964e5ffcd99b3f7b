//! Motorola S-record parser and installer.
//!
//! Byte addresses fold two-to-a-word: the even byte is the low 8 bits, the
//! odd byte's upper nibble must be zero and contributes the high 4 bits.

use std::collections::BTreeMap;
use std::fmt;

use pdp8_core::{mask, Cpu};

#[derive(Debug)]
pub enum LoaderError {
    InvalidCount { line: String },
    InvalidAddress { line: String },
    InvalidData { line: String },
    CountMismatch { line: String },
    IncompleteWord { byte_address: u32 },
    HighNibbleNonZero { byte_address: u32 },
    NoDataRecords,
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCount { line } => write!(f, "invalid count in record {line}"),
            Self::InvalidAddress { line } => write!(f, "invalid address in record {line}"),
            Self::InvalidData { line } => write!(f, "invalid data byte in record {line}"),
            Self::CountMismatch { line } => write!(f, "count mismatch in record {line}"),
            Self::IncompleteWord { byte_address } => {
                write!(f, "incomplete word at byte address 0x{byte_address:04x}")
            }
            Self::HighNibbleNonZero { byte_address } => write!(
                f,
                "high byte at 0x{byte_address:04x} has a non-zero upper nibble"
            ),
            Self::NoDataRecords => write!(f, "no data records found"),
        }
    }
}

impl std::error::Error for LoaderError {}

/// A parsed S-record image: word address -> masked word, plus an optional
/// start address from an S7/S8/S9 record.
pub struct SrecImage {
    pub words: Vec<(u16, u16)>,
    pub start: Option<u16>,
}

fn data_address_len(record_type: u8) -> Option<usize> {
    match record_type {
        b'1' => Some(4),
        b'2' => Some(6),
        b'3' => Some(8),
        _ => None,
    }
}

fn start_address_len(record_type: u8) -> Option<usize> {
    match record_type {
        b'7' => Some(8),
        b'8' => Some(6),
        b'9' => Some(4),
        _ => None,
    }
}

fn parse_hex(text: &str, line: &str, err: impl Fn(String) -> LoaderError) -> Result<u32, LoaderError> {
    u32::from_str_radix(text, 16).map_err(|_| err(line.to_string()))
}

/// Parse S-record text into a sparse byte map, fold it into 12-bit words,
/// and collect any start address.
pub fn parse(text: &str) -> Result<SrecImage, LoaderError> {
    let mut byte_map: BTreeMap<u32, u8> = BTreeMap::new();
    let mut start_word = None;

    for raw in text.lines() {
        let line = raw.trim();
        if !line.starts_with('S') || line.len() < 4 {
            continue;
        }
        let record_type = line.as_bytes()[1];

        if let Some(addr_len) = data_address_len(record_type) {
            let count = parse_hex(&line[2..4], line, |l| LoaderError::InvalidCount { line: l })?;
            let addr_field = &line[4..4 + addr_len];
            let data_field = &line[4 + addr_len..line.len() - 2];
            let base_address =
                parse_hex(addr_field, line, |l| LoaderError::InvalidAddress { line: l })?;

            let mut data_bytes = Vec::with_capacity(data_field.len() / 2);
            for chunk in data_field.as_bytes().chunks(2) {
                let byte_str = std::str::from_utf8(chunk).unwrap_or("");
                data_bytes.push(
                    u8::from_str_radix(byte_str, 16)
                        .map_err(|_| LoaderError::InvalidData { line: line.to_string() })?,
                );
            }

            let expected_payload = count as usize - (addr_len / 2) - 1;
            if expected_payload != data_bytes.len() {
                return Err(LoaderError::CountMismatch { line: line.to_string() });
            }

            for (offset, value) in data_bytes.into_iter().enumerate() {
                byte_map.insert(base_address + offset as u32, value);
            }
            continue;
        }

        if let Some(addr_len) = start_address_len(record_type) {
            let addr_field = &line[4..4 + addr_len];
            let start_byte =
                parse_hex(addr_field, line, |l| LoaderError::InvalidAddress { line: l })?;
            start_word = Some(mask((start_byte / 2) as u16));
        }
    }

    let mut words = Vec::new();
    for (&byte_addr, &lo) in &byte_map {
        if byte_addr % 2 != 0 {
            continue;
        }
        let hi = *byte_map
            .get(&(byte_addr + 1))
            .ok_or(LoaderError::IncompleteWord { byte_address: byte_addr })?;
        if hi & 0xf0 != 0 {
            return Err(LoaderError::HighNibbleNonZero { byte_address: byte_addr });
        }
        let word = (u16::from(hi) << 8) | u16::from(lo);
        words.push((mask((byte_addr / 2) as u16), mask(word)));
    }

    if words.is_empty() {
        return Err(LoaderError::NoDataRecords);
    }

    Ok(SrecImage {
        words,
        start: start_word,
    })
}

/// Install a parsed image's words into `cpu`'s memory. Kept separate from
/// parsing: the loader never owns the CPU.
pub fn install(image: &SrecImage, cpu: &mut Cpu) -> Result<(), pdp8_core::MemoryError> {
    for &(address, value) in &image.words {
        cpu.write_mem(address, value)?;
    }
    Ok(())
}

/// Encode a sorted set of (address, word) pairs as S1/S9 records. Provided
/// for round-trip testing against [`parse`].
#[must_use]
pub fn encode(words: &[(u16, u16)]) -> String {
    let mut out = String::new();
    for &(address, word) in words {
        let byte_addr = u32::from(address) * 2;
        let lo = (word & 0xff) as u8;
        let hi = ((word >> 8) & 0x0f) as u8;
        let count = 1 + 2 + 2; // address bytes + data bytes + checksum byte
        let mut checksum: u32 = count as u32 + (byte_addr & 0xff) + ((byte_addr >> 8) & 0xff);
        checksum += u32::from(lo) + u32::from(hi);
        let checksum_byte = (!checksum & 0xff) as u8;
        out.push_str(&format!(
            "S1{count:02X}{byte_addr:04X}{lo:02X}{hi:02X}{checksum_byte:02X}\n"
        ));
    }
    out.push_str("S9030000FC\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_word_data_record() {
        // count=05, addr=0000, data=AB 00, checksum=4F
        let text = "S1050000AB004F\n";
        let image = parse(text).unwrap();
        assert_eq!(image.words, vec![(0, 0xAB)]);
    }

    #[test]
    fn start_record_alone_yields_no_data_records_error() {
        let text = "S9030000FC\n";
        let image = parse(text);
        assert!(matches!(image, Err(LoaderError::NoDataRecords)));
    }

    #[test]
    fn rejects_incomplete_word_pair() {
        // count=04, addr=0000, a single data byte (AB) with no high-byte partner
        let text = "S1040000AB50\n";
        let result = parse(text);
        assert!(matches!(result, Err(LoaderError::IncompleteWord { .. })));
    }

    #[test]
    fn rejects_high_nibble_set_on_odd_byte() {
        // address 0, data bytes AB (lo) FF (hi, upper nibble nonzero)
        let text = "S1050000ABFF00\n";
        let result = parse(text);
        assert!(matches!(result, Err(LoaderError::HighNibbleNonZero { .. })));
    }
}
