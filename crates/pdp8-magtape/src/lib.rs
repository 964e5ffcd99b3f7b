//! Multi-unit magtape controller: per-unit record-file state machine and
//! its IOT device, reachable through device codes 0o70..=0o77 (GO, READ,
//! WRITE, SKIP, and SENSE share one low-order feature field spanning both
//! the device-code and microcode bit ranges of the instruction).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use pdp8_core::{Cpu, CpuContext, IotDevice};

/// Magtape IOT device codes occupy this whole range; GO/READ/WRITE land on
/// 0o70, SKIP on 0o71, SENSE on 0o74 — all must route to the same handler.
pub const DEVICE_CODES: [u8; 8] = [0o70, 0o71, 0o72, 0o73, 0o74, 0o75, 0o76, 0o77];

pub const MAX_UNITS: usize = 8;

const FEATURE_GO: u16 = 0x0001;
const FEATURE_READ: u16 = 0x0002;
const FEATURE_WRITE: u16 = 0x0004;
const FEATURE_SKIP: u16 = 0x0008;
const FEATURE_SENSE: u16 = 0x0020;

const STATUS_READY: u16 = 0x0001;
const STATUS_ERROR: u16 = 0x0002;
const STATUS_EOR: u16 = 0x0004;
const STATUS_EOT: u16 = 0x0008;
const STATUS_WRITE_PROTECT: u16 = 0x0010;

const SENTINEL: u16 = 0xFFFF;

/// Errors surfaced by host-facing configuration and record operations.
/// IOT-path failures never reach here — they set the unit's transient
/// error bit instead, per the failure-semantics contract.
#[derive(Debug)]
pub enum MagtapeError {
    InvalidUnit(usize),
    Io(std::io::Error),
    CorruptRecord { path: PathBuf },
}

impl fmt::Display for MagtapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MagtapeError::InvalidUnit(unit) => write!(f, "magtape unit {unit} out of range"),
            MagtapeError::Io(err) => write!(f, "magtape I/O error: {err}"),
            MagtapeError::CorruptRecord { path } => {
                write!(f, "corrupt magtape record file: {}", path.display())
            }
        }
    }
}

impl std::error::Error for MagtapeError {}

impl From<std::io::Error> for MagtapeError {
    fn from(err: std::io::Error) -> Self {
        MagtapeError::Io(err)
    }
}

pub struct UnitConfig {
    pub unit: usize,
    pub path: PathBuf,
    pub write_protected: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnitStatus {
    pub ready: bool,
    pub error: bool,
    pub end_of_record: bool,
    pub end_of_tape: bool,
    pub write_protected: bool,
}

impl UnitStatus {
    #[must_use]
    pub fn as_word(&self) -> u16 {
        let mut word = 0u16;
        if self.ready {
            word |= STATUS_READY;
        }
        if self.error {
            word |= STATUS_ERROR;
        }
        if self.end_of_record {
            word |= STATUS_EOR;
        }
        if self.end_of_tape {
            word |= STATUS_EOT;
        }
        if self.write_protected {
            word |= STATUS_WRITE_PROTECT;
        }
        word
    }
}

/// A parsed record file's words, loaded eagerly on read. Keeping a whole
/// record in memory is fine at these tape sizes and keeps cursor logic
/// trivial.
struct RecordContents {
    words: Vec<u16>,
    partial: bool,
}

fn parse_record(bytes: &[u8], path: &Path) -> Result<RecordContents, MagtapeError> {
    if bytes.len() < 2 {
        return Err(MagtapeError::CorruptRecord {
            path: path.to_path_buf(),
        });
    }
    let declared = u16::from_le_bytes([bytes[0], bytes[1]]) & 0o7777;
    let mut words = Vec::with_capacity(declared as usize);
    let mut offset = 2usize;
    for _ in 0..declared {
        if offset + 2 > bytes.len() {
            return Ok(RecordContents {
                words,
                partial: true,
            });
        }
        words.push(u16::from_le_bytes([bytes[offset], bytes[offset + 1]]) & 0o7777);
        offset += 2;
    }
    let partial = offset + 2 > bytes.len()
        || u16::from_le_bytes([bytes[offset], bytes[offset + 1]]) != SENTINEL;
    Ok(RecordContents { words, partial })
}

fn encode_record(words: &[u16]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + words.len() * 2 + 2);
    buf.extend_from_slice(&(words.len() as u16 & 0o7777).to_le_bytes());
    for &w in words {
        buf.extend_from_slice(&(w & 0o7777).to_le_bytes());
    }
    buf.extend_from_slice(&SENTINEL.to_le_bytes());
    buf
}

struct Unit {
    path: PathBuf,
    record_files: Vec<PathBuf>,
    record_index: usize,
    cursor: usize,
    current: Option<RecordContents>,
    write_protected: bool,
    error: bool,
    end_of_record: bool,
    end_of_tape: bool,
    writing: Option<Vec<u16>>,
}

impl Unit {
    fn configure(config: &UnitConfig) -> Result<Self, MagtapeError> {
        let mut record_files = Vec::new();
        if config.path.is_dir() {
            for entry in fs::read_dir(&config.path)? {
                record_files.push(entry?.path());
            }
            record_files.sort();
        }
        let end_of_tape = record_files.is_empty();
        let mut unit = Self {
            path: config.path.clone(),
            record_files,
            record_index: 0,
            cursor: 0,
            current: None,
            write_protected: config.write_protected,
            error: false,
            end_of_record: false,
            end_of_tape,
            writing: None,
        };
        if !end_of_tape {
            unit.load_current_record()?;
        }
        Ok(unit)
    }

    fn load_current_record(&mut self) -> Result<(), MagtapeError> {
        self.cursor = 0;
        self.end_of_record = false;
        if let Some(path) = self.record_files.get(self.record_index) {
            let bytes = fs::read(path)?;
            self.current = Some(parse_record(&bytes, path)?);
        } else {
            self.current = None;
        }
        Ok(())
    }

    fn status(&self) -> UnitStatus {
        UnitStatus {
            ready: !self.end_of_tape && !self.end_of_record && self.writing.is_none(),
            error: self.error,
            end_of_record: self.end_of_record,
            end_of_tape: self.end_of_tape,
            write_protected: self.write_protected,
        }
    }

    fn go(&mut self) {
        self.error = false;
        if self.end_of_record {
            self.record_index += 1;
            if self.record_index >= self.record_files.len() {
                self.end_of_tape = true;
            } else if self.load_current_record().is_err() {
                self.error = true;
            }
        }
    }

    fn read(&mut self) -> Option<u16> {
        if self.end_of_record {
            self.error = true;
            return Some(0);
        }
        let record = self.current.as_ref()?;
        let word = record.words.get(self.cursor).copied();
        match word {
            Some(value) => {
                self.cursor += 1;
                if self.cursor >= record.words.len() {
                    self.end_of_record = true;
                }
                Some(value)
            }
            None => {
                self.end_of_record = true;
                Some(0)
            }
        }
    }

    fn write(&mut self, value: u16) {
        if self.write_protected {
            self.error = true;
            return;
        }
        self.writing.get_or_insert_with(Vec::new).push(value & 0o7777);
    }

    fn force_new_record(&mut self) -> Result<(), MagtapeError> {
        let Some(words) = self.writing.take() else {
            return Ok(());
        };
        let index = self.record_files.len();
        let filename = self.path.join(format!("rec{index:04}.mt"));
        fs::write(&filename, encode_record(&words))?;
        self.record_files.push(filename);
        self.end_of_record = true;
        self.end_of_tape = false;
        Ok(())
    }
}

impl Drop for Unit {
    /// A unit dropped mid-write still finalizes its in-progress record
    /// rather than losing it: never leave a record file truncated without
    /// its sentinel.
    fn drop(&mut self) {
        if let Some(words) = self.writing.take() {
            let index = self.record_files.len();
            let filename = self.path.join(format!("rec{index:04}.mt"));
            let _ = fs::write(filename, encode_record(&words));
        }
    }
}

/// The magtape controller: up to [`MAX_UNITS`] configured units, with one
/// active at a time.
pub struct Magtape {
    units: Vec<Option<Unit>>,
    active: Option<usize>,
}

impl Magtape {
    #[must_use]
    pub fn new() -> Self {
        Self {
            units: (0..MAX_UNITS).map(|_| None).collect(),
            active: None,
        }
    }

    pub fn configure_unit(&mut self, config: UnitConfig) -> Result<(), MagtapeError> {
        if config.unit >= MAX_UNITS {
            return Err(MagtapeError::InvalidUnit(config.unit));
        }
        let unit = Unit::configure(&config)?;
        self.units[config.unit] = Some(unit);
        Ok(())
    }

    pub fn status(&self, unit: usize) -> Option<UnitStatus> {
        self.units.get(unit)?.as_ref().map(Unit::status)
    }

    pub fn force_new_record(&mut self, unit: usize) -> Result<(), MagtapeError> {
        let slot = self
            .units
            .get_mut(unit)
            .and_then(Option::as_mut)
            .ok_or(MagtapeError::InvalidUnit(unit))?;
        slot.force_new_record()
    }

    /// Register `self` against every device code in [`DEVICE_CODES`],
    /// returning the shared handle a host uses for `configure_unit`/`status`.
    pub fn attach(self, cpu: &mut Cpu) -> std::rc::Rc<std::cell::RefCell<Magtape>> {
        let shared = std::rc::Rc::new(std::cell::RefCell::new(self));
        for &code in &DEVICE_CODES {
            cpu.register_iot(code, shared.clone());
        }
        shared
    }

    fn active_unit(&mut self) -> Option<&mut Unit> {
        self.active.and_then(move |idx| self.units[idx].as_mut())
    }

    fn handle_iot(&mut self, cpu: &mut CpuContext<'_>, instruction: u16) {
        let feature = instruction & 0o77;

        if feature & FEATURE_SKIP != 0 {
            let ready = self.active_unit().is_some_and(|u| u.status().ready);
            if ready {
                cpu.request_skip();
            }
        }

        if feature & FEATURE_GO != 0 {
            let unit_index = (cpu.ac() & 0o7) as usize;
            if unit_index < MAX_UNITS && self.units[unit_index].is_some() {
                self.active = Some(unit_index);
            }
            if let Some(unit) = self.active_unit() {
                unit.go();
            }
        }

        if feature & FEATURE_READ != 0 {
            if let Some(unit) = self.active_unit() {
                if let Some(word) = unit.read() {
                    cpu.set_ac(word);
                }
            }
        }

        if feature & FEATURE_WRITE != 0 {
            let value = cpu.ac();
            if let Some(unit) = self.active_unit() {
                unit.write(value);
            }
        }

        if feature & FEATURE_SENSE != 0 {
            let status = self.active_unit().map(Unit::status).unwrap_or_default();
            cpu.set_ac(status.as_word());
        }
    }
}

impl Default for Magtape {
    fn default() -> Self {
        Self::new()
    }
}

impl IotDevice for Magtape {
    fn handle(&mut self, cpu: &mut CpuContext<'_>, instruction: u16) {
        self.handle_iot(cpu, instruction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(ac: &mut u16, halted: &mut bool, skip: &mut bool) -> CpuContext<'_> {
        pdp8_core::CpuContext::new(ac, halted, skip)
    }

    #[test]
    fn unconfigured_unit_is_not_ready_and_sense_reports_zero() {
        let mut mt = Magtape::new();
        let mut ac = 0;
        let mut halted = false;
        let mut skip = false;
        mt.handle_iot(&mut ctx(&mut ac, &mut halted, &mut skip), 0o6701); // GO unit 0
        mt.handle_iot(&mut ctx(&mut ac, &mut halted, &mut skip), 0o6740); // SENSE
        assert_eq!(ac & STATUS_READY, 0);
    }

    #[test]
    fn record_roundtrip_through_encode_and_parse() {
        let words = vec![1, 2, 0o7777, 0];
        let bytes = encode_record(&words);
        let parsed = parse_record(&bytes, Path::new("test")).unwrap();
        assert_eq!(parsed.words, words);
        assert!(!parsed.partial);
    }

    #[test]
    fn truncated_record_is_marked_partial() {
        let mut bytes = encode_record(&[1, 2, 3]);
        bytes.truncate(bytes.len() - 2); // drop the sentinel
        let parsed = parse_record(&bytes, Path::new("test")).unwrap();
        assert!(parsed.partial);
        assert_eq!(parsed.words, vec![1, 2, 3]);
    }

    #[test]
    fn write_to_protected_unit_sets_error_without_mutating() {
        let mut unit = Unit {
            path: PathBuf::new(),
            record_files: Vec::new(),
            record_index: 0,
            cursor: 0,
            current: None,
            write_protected: true,
            error: false,
            end_of_record: false,
            end_of_tape: true,
            writing: None,
        };
        unit.write(5);
        assert!(unit.error);
        assert!(unit.writing.is_none());
    }

    #[test]
    fn sense_bit_layout_matches_reference_constants() {
        let status = UnitStatus {
            ready: true,
            error: false,
            end_of_record: true,
            end_of_tape: false,
            write_protected: true,
        };
        assert_eq!(status.as_word(), STATUS_READY | STATUS_EOR | STATUS_WRITE_PROTECT);
    }
}
