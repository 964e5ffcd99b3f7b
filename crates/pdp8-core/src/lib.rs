//! 12-bit PDP-8 CPU core.
//!
//! Owns memory, the accumulator/link/PC/switch-register set, and the IOT
//! device registry. Peripheral crates (`pdp8-kl8e`, `pdp8-papertape`,
//! `pdp8-magtape`) implement [`iot::IotDevice`] and register themselves
//! against a [`cpu::Cpu`] by device code.

pub mod cpu;
pub mod iot;
pub mod memory;
pub mod word;

pub use cpu::Cpu;
pub use iot::{CpuContext, DeviceHandle, IotDevice, IotTable, DEVICE_COUNT};
pub use memory::{Memory, MemoryError};
pub use word::{add_with_carry, is_auto_increment, mask, parse_octal, WORD_MASK};
