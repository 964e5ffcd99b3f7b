//! End-to-end scenario: GO, a run of WRITEs, force_new_record, then
//! re-reading the produced record file through a fresh unit configuration.

use std::fs;
use std::path::PathBuf;

use pdp8_core::Cpu;
use pdp8_magtape::{Magtape, UnitConfig, DEVICE_CODES};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pdp8-magtape-test-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn write_sequence_then_force_new_record_produces_a_readable_record() {
    let dir = scratch_dir("write");

    let mut cpu = Cpu::new(4096);
    let mut magtape = Magtape::new();
    magtape
        .configure_unit(UnitConfig {
            unit: 0,
            path: dir.clone(),
            write_protected: false,
        })
        .unwrap();
    let handle = std::rc::Rc::new(std::cell::RefCell::new(magtape));
    for &code in &DEVICE_CODES {
        cpu.register_iot(code, handle.clone());
    }

    // GO unit 0.
    cpu.set_ac(0);
    cpu.write_mem(0, 0o6701).unwrap();
    // WRITE three words.
    cpu.set_ac(0o111);
    cpu.write_mem(1, 0o6704).unwrap();
    cpu.set_ac(0o222);
    cpu.write_mem(2, 0o6704).unwrap();
    cpu.set_ac(0o333);
    cpu.write_mem(3, 0o6704).unwrap();
    cpu.set_pc(0);
    cpu.run(4);

    handle.borrow_mut().force_new_record(0).unwrap();

    let files: Vec<_> = fs::read_dir(&dir).unwrap().map(|e| e.unwrap().path()).collect();
    assert_eq!(files.len(), 1);

    let bytes = fs::read(&files[0]).unwrap();
    let declared = u16::from_le_bytes([bytes[0], bytes[1]]);
    assert_eq!(declared, 3);
    let sentinel = u16::from_le_bytes([bytes[bytes.len() - 2], bytes[bytes.len() - 1]]);
    assert_eq!(sentinel, 0xFFFF);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn write_protected_unit_rejects_writes_and_sets_error() {
    let dir = scratch_dir("protected");

    let mut cpu = Cpu::new(4096);
    let mut magtape = Magtape::new();
    magtape
        .configure_unit(UnitConfig {
            unit: 0,
            path: dir.clone(),
            write_protected: true,
        })
        .unwrap();
    let handle = std::rc::Rc::new(std::cell::RefCell::new(magtape));
    for &code in &DEVICE_CODES {
        cpu.register_iot(code, handle.clone());
    }

    cpu.set_ac(0);
    cpu.write_mem(0, 0o6701).unwrap(); // GO unit 0
    cpu.set_ac(0o77);
    cpu.write_mem(1, 0o6704).unwrap(); // WRITE
    cpu.write_mem(2, 0o6740).unwrap(); // SENSE
    cpu.set_pc(0);
    cpu.run(3);

    assert_eq!(cpu.ac() & 0x0002, 0x0002); // error bit set
    assert_eq!(cpu.ac() & 0x0010, 0x0010); // write-protect bit set

    let _ = fs::remove_dir_all(&dir);
}
