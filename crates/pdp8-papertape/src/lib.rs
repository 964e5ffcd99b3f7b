//! Paper-tape reader: a loaded image of labelled blocks, reachable through
//! IOT device code 0o67.

use pdp8_core::{Cpu, CpuContext, IotDevice};

/// Paper-tape reader IOT device code.
pub const DEVICE_CODE: u8 = 0o67;

const BIT_SKIP: u16 = 0o1;
const BIT_SELECT: u16 = 0o2;
const BIT_READ: u16 = 0o4;

/// One block of a loaded tape image: a two-letter label, an octal block
/// number, and its ordered words.
#[derive(Debug, Clone)]
pub struct Block {
    pub label: [u8; 2],
    pub number: u16,
    pub words: Vec<u16>,
}

/// Snapshot of the device's state, for host queries.
#[derive(Debug, Clone)]
pub struct PaperTapeStatus {
    pub loaded: bool,
    pub label: Option<[u8; 2]>,
    pub block_count: usize,
    pub current_block: u16,
    pub current_index: usize,
    pub current_word_count: usize,
    pub ready: bool,
}

/// The paper-tape reader. Holds a loaded image plus a selected-block and
/// intra-block cursor.
pub struct PaperTape {
    blocks: Vec<Block>,
    selected: usize,
    cursor: usize,
}

impl PaperTape {
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            selected: 0,
            cursor: 0,
        }
    }

    /// Replace the loaded image. Resets the selected-block and intra-block
    /// cursors to the start.
    pub fn load_image(&mut self, blocks: Vec<Block>) {
        self.blocks = blocks;
        self.selected = 0;
        self.cursor = 0;
    }

    /// Register `self` against `cpu`'s IOT table at [`DEVICE_CODE`], returning
    /// the shared handle a host uses for `load_image`/`status`.
    pub fn attach(self, cpu: &mut Cpu) -> std::rc::Rc<std::cell::RefCell<PaperTape>> {
        let shared = std::rc::Rc::new(std::cell::RefCell::new(self));
        cpu.register_iot(DEVICE_CODE, shared.clone());
        shared
    }

    #[must_use]
    pub fn status(&self) -> PaperTapeStatus {
        let current = self.blocks.get(self.selected);
        PaperTapeStatus {
            loaded: !self.blocks.is_empty(),
            label: current.map(|b| b.label),
            block_count: self.blocks.len(),
            current_block: current.map_or(0, |b| b.number),
            current_index: self.cursor,
            current_word_count: current.map_or(0, |b| b.words.len()),
            ready: self.ready(),
        }
    }

    fn ready(&self) -> bool {
        self.blocks
            .get(self.selected)
            .is_some_and(|b| self.cursor < b.words.len())
    }

    fn select(&mut self, block_number: u16) {
        self.cursor = 0;
        if let Some(index) = self.blocks.iter().position(|b| b.number == block_number) {
            self.selected = index;
        }
    }

    fn read(&mut self) -> Option<u16> {
        let block = self.blocks.get(self.selected)?;
        let word = *block.words.get(self.cursor)?;
        self.cursor += 1;
        Some(word)
    }

    fn handle_iot(&mut self, cpu: &mut CpuContext<'_>, instruction: u16) {
        let microcode = instruction & 0o7;

        if microcode & BIT_SELECT != 0 {
            self.select(cpu.ac());
        }

        if microcode & BIT_READ != 0 {
            if let Some(word) = self.read() {
                cpu.set_ac(word);
            }
        }

        if microcode & BIT_SKIP != 0 && self.ready() {
            cpu.request_skip();
        }
    }
}

impl Default for PaperTape {
    fn default() -> Self {
        Self::new()
    }
}

impl IotDevice for PaperTape {
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

    fn demo_tape() -> PaperTape {
        let mut tape = PaperTape::new();
        tape.load_image(vec![
            Block {
                label: *b"TP",
                number: 0,
                words: vec![1, 2, 3],
            },
            Block {
                label: *b"TP",
                number: 1,
                words: vec![4, 5],
            },
        ]);
        tape
    }

    #[test]
    fn not_ready_until_a_block_is_selected_with_content() {
        let tape = demo_tape();
        assert!(tape.status().ready);
    }

    #[test]
    fn select_read_skip_combined_microcode_orders_correctly() {
        let mut tape = demo_tape();
        let mut ac = 1; // select block 1
        let mut halted = false;
        let mut skip = false;
        tape.handle_iot(&mut ctx(&mut ac, &mut halted, &mut skip), 0o6677);
        assert_eq!(ac, 4);
        assert!(skip);
    }

    #[test]
    fn read_advances_cursor_and_exhausts_ready_at_end() {
        let mut tape = demo_tape();
        let mut ac = 0;
        let mut halted = false;
        let mut skip = false;
        for expected in [1, 2, 3] {
            tape.handle_iot(&mut ctx(&mut ac, &mut halted, &mut skip), 0o4);
            assert_eq!(ac, expected);
        }
        assert!(!tape.status().ready);
    }

    #[test]
    fn reselecting_resets_cursor() {
        let mut tape = demo_tape();
        let mut ac = 0;
        let mut halted = false;
        let mut skip = false;
        tape.handle_iot(&mut ctx(&mut ac, &mut halted, &mut skip), 0o4);
        tape.handle_iot(&mut ctx(&mut ac, &mut halted, &mut skip), 0o2); // select block 0 again
        assert_eq!(tape.status().current_index, 0);
    }

    #[test]
    fn empty_tape_is_never_ready() {
        let tape = PaperTape::new();
        assert!(!tape.status().ready);
        assert!(!tape.status().loaded);
    }
}
