//! KL8E console: a keyboard and teleprinter pair reachable through IOT
//! device codes 0o03 (keyboard) and 0o04 (teleprinter).

use std::collections::VecDeque;
use std::io::{self, Write};

use pdp8_core::{Cpu, CpuContext, IotDevice};

/// Keyboard IOT device code.
pub const KEYBOARD_DEVICE_CODE: u8 = 0o03;
/// Teleprinter IOT device code.
pub const TELEPRINTER_DEVICE_CODE: u8 = 0o04;

const KEYBOARD_BIT_SKIP: u16 = 0o1;
const KEYBOARD_BIT_CLEAR: u16 = 0o2;
const KEYBOARD_BIT_READ: u16 = 0o4;

const TELEPRINTER_BIT_SKIP: u16 = 0o1;
const TELEPRINTER_BIT_CLEAR: u16 = 0o2;
const TELEPRINTER_BIT_LOAD: u16 = 0o4;

/// Keyboard half of the console: a single-character holding buffer plus a
/// queue of characters waiting to be promoted into it.
struct Keyboard {
    buffer: u16,
    flag: bool,
    pending: VecDeque<u16>,
}

impl Keyboard {
    fn new() -> Self {
        Self {
            buffer: 0,
            flag: false,
            pending: VecDeque::new(),
        }
    }

    fn queue(&mut self, value: u16) {
        let ch = value & 0o177;
        if !self.flag {
            self.buffer = ch;
            self.flag = true;
            return;
        }
        self.pending.push_back(ch);
    }

    fn pending_count(&self) -> usize {
        self.pending.len() + usize::from(self.flag)
    }

    fn promote_pending(&mut self) {
        if self.flag {
            return;
        }
        if let Some(ch) = self.pending.pop_front() {
            self.buffer = ch;
            self.flag = true;
        }
    }

    fn consume_current(&mut self) {
        self.flag = false;
        self.buffer = 0;
        self.promote_pending();
    }
}

/// Teleprinter half: an output-ready flag and a log of transmitted
/// characters, in case a host wants to replay rather than stream them.
struct Teleprinter {
    ready: bool,
    log: VecDeque<u16>,
}

impl Teleprinter {
    fn new() -> Self {
        Self {
            ready: true,
            log: VecDeque::new(),
        }
    }
}

/// The KL8E console device. Register both [`KEYBOARD_DEVICE_CODE`] and
/// [`TELEPRINTER_DEVICE_CODE`] against a [`pdp8_core::Cpu`] via separate
/// [`IotDevice`] facades — see [`Kl8eConsole::keyboard_device`] and
/// [`Kl8eConsole::teleprinter_device`] — since the IOT table takes one
/// handler per device code and both halves share this state.
pub struct Kl8eConsole {
    keyboard: Keyboard,
    teleprinter: Teleprinter,
}

impl Kl8eConsole {
    #[must_use]
    pub fn new() -> Self {
        Self {
            keyboard: Keyboard::new(),
            teleprinter: Teleprinter::new(),
        }
    }

    /// Queue a single 7-bit character for the keyboard.
    pub fn queue_input(&mut self, value: u16) {
        self.keyboard.queue(value);
    }

    /// Queue a string for the keyboard, one character at a time, mapping
    /// LF to CR as a real ASR-33 terminal's keyboard would.
    pub fn queue_str(&mut self, text: &str) {
        for ch in text.chars() {
            let mut byte = u16::from(ch as u32 & 0x7f);
            if byte == 0x0a {
                byte = 0x0d;
            }
            self.queue_input(byte);
        }
    }

    #[must_use]
    pub fn input_pending(&self) -> usize {
        self.keyboard.pending_count()
    }

    #[must_use]
    pub fn output_pending(&self) -> usize {
        self.teleprinter.log.len()
    }

    pub fn pop_output(&mut self) -> Option<u16> {
        self.teleprinter.log.pop_front()
    }

    /// Drain all buffered output as a `String`.
    pub fn flush(&mut self) -> String {
        let mut out = String::with_capacity(self.teleprinter.log.len());
        while let Some(ch) = self.teleprinter.log.pop_front() {
            out.push(char::from_u32(u32::from(ch)).unwrap_or('\u{fffd}'));
        }
        out
    }

    /// Drain all buffered output directly into `sink`, one character at a
    /// time, as a real ASR-33's teleprinter would stream to its platen.
    pub fn flush_to(&mut self, sink: &mut dyn Write) -> io::Result<()> {
        while let Some(ch) = self.teleprinter.log.pop_front() {
            let byte = u8::try_from(ch & 0xff).unwrap_or(b'?');
            sink.write_all(&[byte])?;
        }
        Ok(())
    }

    fn handle_keyboard(&mut self, cpu: &mut CpuContext<'_>, instruction: u16) {
        let microcode = instruction & 0o7;
        if microcode == 0 {
            self.keyboard.consume_current();
            return;
        }

        if microcode & KEYBOARD_BIT_SKIP != 0 && self.keyboard.flag {
            cpu.request_skip();
        }

        let clear_flag = microcode & KEYBOARD_BIT_CLEAR != 0;
        let read_buffer = microcode & KEYBOARD_BIT_READ != 0;
        let had_char = self.keyboard.flag;
        let current = self.keyboard.buffer;

        if clear_flag {
            cpu.set_ac(0);
        }
        if read_buffer && had_char {
            cpu.set_ac(cpu.ac() | current);
        }
        if clear_flag {
            self.keyboard.consume_current();
        }
    }

    fn handle_teleprinter(&mut self, cpu: &mut CpuContext<'_>, instruction: u16) {
        let microcode = instruction & 0o7;
        if microcode & TELEPRINTER_BIT_SKIP != 0 && self.teleprinter.ready {
            cpu.request_skip();
        }
        if microcode & TELEPRINTER_BIT_CLEAR != 0 {
            self.teleprinter.ready = false;
        }
        if microcode & TELEPRINTER_BIT_LOAD != 0 {
            let ch = cpu.ac() & 0o177;
            self.teleprinter.ready = false;
            self.teleprinter.log.push_back(ch);
            self.teleprinter.ready = true;
        }
    }
}

impl Default for Kl8eConsole {
    fn default() -> Self {
        Self::new()
    }
}

/// Device-table facade for the keyboard half. Holds the console's shared
/// state; construct via [`Kl8eConsole::into_devices`].
pub struct KeyboardDevice(std::rc::Rc<std::cell::RefCell<Kl8eConsole>>);

/// Device-table facade for the teleprinter half.
pub struct TeleprinterDevice(std::rc::Rc<std::cell::RefCell<Kl8eConsole>>);

impl IotDevice for KeyboardDevice {
    fn handle(&mut self, cpu: &mut CpuContext<'_>, instruction: u16) {
        self.0.borrow_mut().handle_keyboard(cpu, instruction);
    }
}

impl IotDevice for TeleprinterDevice {
    fn handle(&mut self, cpu: &mut CpuContext<'_>, instruction: u16) {
        self.0.borrow_mut().handle_teleprinter(cpu, instruction);
    }
}

impl Kl8eConsole {
    /// Wrap `self` in a shared handle and produce the two per-device
    /// facades a host registers against the CPU's IOT table.
    #[must_use]
    pub fn into_devices(
        self,
    ) -> (
        std::rc::Rc<std::cell::RefCell<Kl8eConsole>>,
        KeyboardDevice,
        TeleprinterDevice,
    ) {
        let shared = std::rc::Rc::new(std::cell::RefCell::new(self));
        (
            shared.clone(),
            KeyboardDevice(shared.clone()),
            TeleprinterDevice(shared),
        )
    }

    /// Register both halves against `cpu` in one call, returning the shared
    /// handle a host uses for `queue_input`/`flush`/etc.
    pub fn attach(self, cpu: &mut Cpu) -> std::rc::Rc<std::cell::RefCell<Kl8eConsole>> {
        let (shared, keyboard, teleprinter) = self.into_devices();
        cpu.register_iot(
            KEYBOARD_DEVICE_CODE,
            std::rc::Rc::new(std::cell::RefCell::new(keyboard)),
        );
        cpu.register_iot(
            TELEPRINTER_DEVICE_CODE,
            std::rc::Rc::new(std::cell::RefCell::new(teleprinter)),
        );
        shared
    }
}
