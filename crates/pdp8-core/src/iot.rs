//! IOT (Input/Output Transfer) dispatch: the 64-slot device registry.

use std::cell::RefCell;
use std::rc::Rc;

/// The number of distinct IOT device codes (6 bits).
pub const DEVICE_COUNT: usize = 64;

/// Handle to a registered device handler, shared with the host so the
/// device can still be queried/mutated outside the IOT path.
pub type DeviceHandle = Rc<RefCell<dyn IotDevice>>;

/// A device reachable through the IOT instruction class.
///
/// `handle` is invoked synchronously from inside the CPU's instruction
/// cycle, between execution of the IOT and the skip-latch consumption step.
/// The handler contract (spec): it must not call `step`/`run`; it may call
/// `request_skip` zero or one time; it may read/write AC and set the halt
/// latch; it may not touch PC except via `request_skip`. `CpuContext`
/// enforces the PC restriction at the type level — there is no method to
/// set PC on it.
pub trait IotDevice {
    fn handle(&mut self, cpu: &mut CpuContext<'_>, instruction: u16);
}

/// Borrow-only facade over the executing CPU, passed to IOT handlers.
///
/// Exposes exactly the operations the handler contract permits.
pub struct CpuContext<'a> {
    ac: &'a mut u16,
    halted: &'a mut bool,
    skip: &'a mut bool,
}

impl<'a> CpuContext<'a> {
    pub(crate) fn new(ac: &'a mut u16, halted: &'a mut bool, skip: &'a mut bool) -> Self {
        Self { ac, halted, skip }
    }

    #[must_use]
    pub fn ac(&self) -> u16 {
        *self.ac
    }

    pub fn set_ac(&mut self, value: u16) {
        *self.ac = crate::word::mask(value);
    }

    pub fn set_halted(&mut self) {
        *self.halted = true;
    }

    pub fn request_skip(&mut self) {
        *self.skip = true;
    }
}

/// The 64-slot IOT device registry.
///
/// At most one handler per device code. Registering a code that already
/// has a handler replaces it. Dispatching to an unregistered code is a
/// no-op.
pub struct IotTable {
    slots: Vec<Option<DeviceHandle>>,
}

impl IotTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: (0..DEVICE_COUNT).map(|_| None).collect(),
        }
    }

    /// Register `handler` for `device_code` (0..=63), replacing any
    /// existing registration.
    ///
    /// # Panics
    /// Panics if `device_code >= DEVICE_COUNT`; callers are expected to
    /// pass a 6-bit device code extracted from an IOT instruction.
    pub fn register(&mut self, device_code: u8, handler: DeviceHandle) {
        self.slots[device_code as usize] = Some(handler);
    }

    /// Remove the registration for `device_code` only if it currently
    /// points at `handler` (compared by pointer identity), matching the
    /// "deregister clears the slot only if the current handler matches the
    /// device's own" contract devices use when torn down.
    pub fn deregister(&mut self, device_code: u8, handler: &DeviceHandle) {
        let slot = &mut self.slots[device_code as usize];
        if let Some(existing) = slot {
            if Rc::ptr_eq(existing, handler) {
                *slot = None;
            }
        }
    }

    /// Dispatch one IOT instruction. A no-op if no handler is registered
    /// for the embedded device code.
    pub fn dispatch(&self, device_code: u8, instruction: u16, ctx: &mut CpuContext<'_>) {
        if let Some(handler) = &self.slots[device_code as usize] {
            handler.borrow_mut().handle(ctx, instruction);
        }
    }
}

impl Default for IotTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    impl IotDevice for Echo {
        fn handle(&mut self, cpu: &mut CpuContext<'_>, _instruction: u16) {
            cpu.request_skip();
            cpu.set_ac(0o42);
        }
    }

    #[test]
    fn dispatch_to_unregistered_code_is_noop() {
        let table = IotTable::new();
        let mut ac = 7;
        let mut halted = false;
        let mut skip = false;
        table.dispatch(5, 0, &mut CpuContext::new(&mut ac, &mut halted, &mut skip));
        assert_eq!(ac, 7);
        assert!(!skip);
    }

    #[test]
    fn registration_replaces_prior_handler() {
        let mut table = IotTable::new();
        let first: DeviceHandle = Rc::new(RefCell::new(Echo));
        table.register(3, first);

        let mut ac = 0;
        let mut halted = false;
        let mut skip = false;
        table.dispatch(3, 0, &mut CpuContext::new(&mut ac, &mut halted, &mut skip));
        assert_eq!(ac, 0o42);
        assert!(skip);
    }

    #[test]
    fn deregister_only_clears_matching_handler() {
        let mut table = IotTable::new();
        let a: DeviceHandle = Rc::new(RefCell::new(Echo));
        let b: DeviceHandle = Rc::new(RefCell::new(Echo));
        table.register(1, a.clone());
        table.deregister(1, &b);
        assert!(table.slots[1].is_some());
        table.deregister(1, &a);
        assert!(table.slots[1].is_none());
    }
}
