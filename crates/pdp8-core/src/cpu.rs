//! Fetch/decode/execute engine: memory-reference, IOT, and operate
//! instructions, plus the host-facing register and control API.

use crate::iot::{CpuContext, DeviceHandle, IotTable};
use crate::memory::{Memory, MemoryError};
use crate::word::{is_auto_increment, mask};

// Opcode classes (top 3 bits of the instruction, i.e. bits 9-11).
const OP_AND: u16 = 0o0000;
const OP_TAD: u16 = 0o1000;
const OP_ISZ: u16 = 0o2000;
const OP_DCA: u16 = 0o3000;
const OP_JMS: u16 = 0o4000;
const OP_JMP: u16 = 0o5000;
const OP_IOT: u16 = 0o6000;
const OP_OPR: u16 = 0o7000;
const OPCODE_MASK: u16 = 0o7000;

const INDIRECT_BIT: u16 = 0o0400;
const PAGE_BIT: u16 = 0o0200;
const OFFSET_MASK: u16 = 0o0177;

/// ION/IOFF/SKON occupy device code 0 of the IOT space.
const IOFF_INSTR: u16 = 0o6000;
const ION_INSTR: u16 = 0o6001;
const SKON_INSTR: u16 = 0o6002;

/// The PDP-8 CPU: registers, owned memory, and the IOT device registry.
pub struct Cpu {
    memory: Memory,
    pc: u16,
    ac: u16,
    link: u8,
    switch_register: u16,
    halted: bool,
    skip: bool,
    iot: IotTable,
    interrupts_enabled: bool,
    interrupt_pending: bool,
}

impl Cpu {
    #[must_use]
    pub fn new(memory_words: usize) -> Self {
        Self {
            memory: Memory::new(memory_words),
            pc: 0,
            ac: 0,
            link: 0,
            switch_register: 0,
            halted: false,
            skip: false,
            iot: IotTable::new(),
            interrupts_enabled: false,
            interrupt_pending: false,
        }
    }

    /// Reset registers and clear the halt/skip latches. Memory is left
    /// untouched — loading a fresh image is the loader's job.
    pub fn reset(&mut self) {
        self.pc = 0;
        self.ac = 0;
        self.link = 0;
        self.halted = false;
        self.skip = false;
        self.interrupts_enabled = false;
        self.interrupt_pending = false;
    }

    #[must_use]
    pub fn read_mem(&self, address: u16) -> u16 {
        self.memory.read(address)
    }

    pub fn write_mem(&mut self, address: u16, value: u16) -> Result<(), MemoryError> {
        self.memory.write(address, value)
    }

    #[must_use]
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    #[must_use]
    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, value: u16) {
        self.pc = mask(value);
    }

    #[must_use]
    pub fn ac(&self) -> u16 {
        self.ac
    }

    pub fn set_ac(&mut self, value: u16) {
        self.ac = mask(value);
    }

    #[must_use]
    pub fn link(&self) -> u8 {
        self.link
    }

    pub fn set_link(&mut self, value: u8) {
        self.link = value & 1;
    }

    #[must_use]
    pub fn switch_register(&self) -> u16 {
        self.switch_register
    }

    pub fn set_switch_register(&mut self, value: u16) {
        self.switch_register = mask(value);
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn clear_halt(&mut self) {
        self.halted = false;
    }

    /// Set the skip latch, as an IOT handler would via `CpuContext`. Exposed
    /// on `Cpu` directly for hosts that want to simulate a skip outside of
    /// an IOT dispatch (e.g. tests).
    pub fn request_skip(&mut self) {
        self.skip = true;
    }

    /// Assert the shared interrupt-request line. Honoured at the next
    /// fetch boundary if interrupts are enabled.
    pub fn assert_interrupt(&mut self) {
        self.interrupt_pending = true;
    }

    pub fn register_iot(&mut self, device_code: u8, handler: DeviceHandle) {
        self.iot.register(device_code, handler);
    }

    pub fn deregister_iot(&mut self, device_code: u8, handler: &DeviceHandle) {
        self.iot.deregister(device_code, handler);
    }

    /// Execute exactly one instruction cycle.
    ///
    /// Returns `true` if an instruction executed, `false` if the CPU
    /// refused (halted, or zero-size memory).
    pub fn step(&mut self) -> bool {
        if self.halted || self.memory.is_empty() {
            return false;
        }

        if self.interrupts_enabled && self.interrupt_pending {
            self.interrupts_enabled = false;
            self.interrupt_pending = false;
            // Implicit JMS 0: store PC at 0, jump to 1.
            let pc = self.pc;
            let _ = self.memory.write(0, pc);
            self.pc = 1;
        }

        let instruction = self.memory.read(self.pc);
        self.pc = mask(self.pc.wrapping_add(1));

        match instruction & OPCODE_MASK {
            OP_AND | OP_TAD | OP_ISZ | OP_DCA | OP_JMS | OP_JMP => {
                self.execute_memory_reference(instruction);
            }
            OP_IOT => self.execute_iot(instruction),
            OP_OPR => self.execute_operate(instruction),
            _ => unreachable!("opcode mask only yields the eight classes above"),
        }

        if self.skip {
            self.pc = mask(self.pc.wrapping_add(1));
            self.skip = false;
        }

        true
    }

    /// Repeatedly step until halted, `max_cycles` instructions have
    /// executed, or `step` refuses. Returns the number executed.
    pub fn run(&mut self, max_cycles: u32) -> u32 {
        let mut executed = 0;
        while executed < max_cycles {
            if !self.step() {
                break;
            }
            executed += 1;
        }
        executed
    }

    fn effective_address(&mut self, instruction: u16) -> u16 {
        let page_base = if instruction & PAGE_BIT != 0 {
            self.pc & !OFFSET_MASK
        } else {
            0
        };
        let offset = instruction & OFFSET_MASK;
        let mut address = mask(page_base | offset);

        if instruction & INDIRECT_BIT != 0 {
            let pointer = self.memory.read(address);
            address = if is_auto_increment(address) {
                let incremented = mask(pointer.wrapping_add(1));
                let _ = self.memory.write(address, incremented);
                incremented
            } else {
                pointer
            };
        }

        address
    }

    fn execute_memory_reference(&mut self, instruction: u16) {
        let address = self.effective_address(instruction);

        match instruction & OPCODE_MASK {
            OP_AND => {
                self.ac = mask(self.ac & self.memory.read(address));
            }
            OP_TAD => {
                let (sum, carry) = crate::word::add_with_carry(self.ac, self.memory.read(address));
                if carry {
                    self.link ^= 1;
                }
                self.ac = sum;
            }
            OP_ISZ => {
                let incremented = mask(self.memory.read(address).wrapping_add(1));
                let _ = self.memory.write(address, incremented);
                if incremented == 0 {
                    self.skip = true;
                }
            }
            OP_DCA => {
                let _ = self.memory.write(address, self.ac);
                self.ac = 0;
            }
            OP_JMS => {
                let _ = self.memory.write(address, self.pc);
                self.pc = mask(address.wrapping_add(1));
            }
            OP_JMP => {
                self.pc = address;
            }
            _ => unreachable!(),
        }
    }

    fn execute_iot(&mut self, instruction: u16) {
        match instruction {
            IOFF_INSTR => {
                self.interrupts_enabled = false;
                return;
            }
            ION_INSTR => {
                self.interrupts_enabled = true;
                return;
            }
            SKON_INSTR => {
                if self.interrupts_enabled {
                    self.skip = true;
                }
                return;
            }
            _ => {}
        }

        let device_code = ((instruction >> 3) & 0o77) as u8;
        let mut ctx = CpuContext::new(&mut self.ac, &mut self.halted, &mut self.skip);
        self.iot.dispatch(device_code, instruction, &mut ctx);
    }

    fn execute_operate(&mut self, instruction: u16) {
        if instruction & 0o0400 == 0 {
            self.operate_group1(instruction);
        } else {
            self.operate_group2(instruction);
        }
    }

    fn operate_group1(&mut self, instruction: u16) {
        if instruction & 0o0200 != 0 {
            // CLA
            self.ac = 0;
        }
        if instruction & 0o0100 != 0 {
            // CLL
            self.link = 0;
        }
        if instruction & 0o0040 != 0 {
            // CMA
            self.ac = mask(!self.ac);
        }
        if instruction & 0o0020 != 0 {
            // CML
            self.link ^= 1;
        }

        let rotate_twice_bit = instruction & 0o0002 != 0;
        let mut rotate_right = instruction & 0o0010 != 0;
        let mut rotate_left = instruction & 0o0004 != 0;

        let mut did_swap = false;
        if rotate_twice_bit && !rotate_right && !rotate_left {
            // Byte-swap: swap low and high 6-bit halves of AC.
            let high = (self.ac & 0o0077) << 6;
            let low = (self.ac >> 6) & 0o0077;
            self.ac = high | low;
            did_swap = true;
        }

        if rotate_right && rotate_left {
            rotate_right = false;
            rotate_left = false;
        }

        if !did_swap && (rotate_right || rotate_left) {
            let rotations = if rotate_twice_bit { 2 } else { 1 };
            let mut combined = (u32::from(self.link) << 12) | u32::from(self.ac);
            for _ in 0..rotations {
                if rotate_right {
                    let carry = combined & 1;
                    combined = (combined >> 1) | (carry << 12);
                } else {
                    let carry = (combined >> 12) & 1;
                    combined = ((combined << 1) & 0o17777) | carry;
                }
            }
            self.link = ((combined >> 12) & 1) as u8;
            self.ac = mask(combined as u16);
        }

        if instruction & 0o0001 != 0 {
            // IAC
            let combined = ((u32::from(self.link) << 12) | u32::from(self.ac)) + 1;
            let combined = combined & 0o17777;
            self.link = ((combined >> 12) & 1) as u8;
            self.ac = mask(combined as u16);
        }
    }

    fn operate_group2(&mut self, instruction: u16) {
        if instruction & 0o0200 != 0 {
            // CLA
            self.ac = 0;
        }

        let sense_reversed = instruction & 0o0010 != 0;
        let sma = instruction & 0o0100 != 0 && self.ac & 0o4000 != 0;
        let sza = instruction & 0o0040 != 0 && self.ac == 0;
        let snl = instruction & 0o0020 != 0 && self.link != 0;
        let any_true = sma || sza || snl;

        if instruction & 0o0004 != 0 {
            // OSR
            self.ac = mask(self.ac | self.switch_register);
        }
        if instruction & 0o0002 != 0 {
            // HLT
            self.halted = true;
        }

        let skip = if sense_reversed { !any_true } else { any_true };
        if skip {
            self.skip = true;
        }
    }
}
