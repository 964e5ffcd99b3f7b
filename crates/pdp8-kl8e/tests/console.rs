//! KL8E scenario test driven entirely through a real `Cpu`.

use pdp8_core::Cpu;
use pdp8_kl8e::{Kl8eConsole, KEYBOARD_DEVICE_CODE, TELEPRINTER_DEVICE_CODE};

#[test]
fn queue_ksf_krb_tls_sequence_echoes_a_character() {
    let mut cpu = Cpu::new(4096);
    let (console, keyboard, teleprinter) = Kl8eConsole::new().into_devices();
    cpu.register_iot(
        KEYBOARD_DEVICE_CODE,
        std::rc::Rc::new(std::cell::RefCell::new(keyboard)),
    );
    cpu.register_iot(
        TELEPRINTER_DEVICE_CODE,
        std::rc::Rc::new(std::cell::RefCell::new(teleprinter)),
    );

    console.borrow_mut().queue_input(u16::from(b'A'));

    // KSF: IOT device 3, microcode 1 (skip if flag set).
    cpu.write_mem(0, 0o6031).unwrap();
    // HLT, should be skipped.
    cpu.write_mem(1, 0o7402).unwrap();
    // KRB: microcode 6 (clear + read), lands here after the skip.
    cpu.write_mem(2, 0o6036).unwrap();
    cpu.set_pc(0);

    cpu.run(2);
    assert_eq!(cpu.ac(), u16::from(b'A'));
    assert!(!cpu.is_halted());

    // TLS: device 4, microcode 6 (clear + load) transmits AC.
    cpu.write_mem(3, 0o6046).unwrap();
    cpu.run(1);

    assert_eq!(console.borrow_mut().pop_output(), Some(u16::from(b'A')));
}
