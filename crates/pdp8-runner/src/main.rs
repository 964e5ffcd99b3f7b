//! PDP-8 host driver binary: loads an S-record image, attaches the KL8E
//! console (and, if configured, a paper-tape reader and magtape units),
//! runs to completion or a cycle budget, and reports the final state.

use std::path::PathBuf;
use std::process;

use pdp8_core::{parse_octal, Cpu};
use pdp8_kl8e::Kl8eConsole;
use pdp8_loader::{config, srec};
use pdp8_magtape::{Magtape, UnitConfig};
use pdp8_papertape::PaperTape;

const MEMORY_WORDS: usize = 4096;
const RUN_BLOCK_CYCLES: u32 = 10_000;
const DEFAULT_CYCLES: u32 = 1_000_000;

struct CliArgs {
    image: PathBuf,
    cycles: u32,
    start: Option<u16>,
    input: Option<String>,
    tape: Option<PathBuf>,
    magtape_config: Option<PathBuf>,
    quiet: bool,
}

fn parse_args() -> Result<CliArgs, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut image = None;
    let mut cycles = DEFAULT_CYCLES;
    let mut start = None;
    let mut input = None;
    let mut tape = None;
    let mut magtape_config = None;
    let mut quiet = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--cycles" => {
                i += 1;
                cycles = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .ok_or("--cycles requires a numeric argument")?;
            }
            "--start" => {
                i += 1;
                start = Some(
                    args.get(i)
                        .and_then(|s| parse_octal(s).or_else(|| s.parse().ok()))
                        .ok_or("--start requires a numeric address")?,
                );
            }
            "--input" => {
                i += 1;
                input = args.get(i).cloned();
            }
            "--tape" => {
                i += 1;
                tape = args.get(i).map(PathBuf::from);
            }
            "--magtape-config" => {
                i += 1;
                magtape_config = args.get(i).map(PathBuf::from);
            }
            "--quiet" => quiet = true,
            other if !other.starts_with("--") && image.is_none() => {
                image = Some(PathBuf::from(other));
            }
            other => return Err(format!("unrecognized argument: {other}")),
        }
        i += 1;
    }

    Ok(CliArgs {
        image: image.ok_or("missing required <image.srec> argument")?,
        cycles,
        start,
        input,
        tape,
        magtape_config,
        quiet,
    })
}

fn configure_devices(
    cpu: &mut Cpu,
    args: &CliArgs,
) -> Result<std::rc::Rc<std::cell::RefCell<Kl8eConsole>>, String> {
    let console = Kl8eConsole::new().attach(cpu);

    if let Some(tape_path) = &args.tape {
        let text = std::fs::read_to_string(tape_path)
            .map_err(|e| format!("reading tape image {}: {e}", tape_path.display()))?;
        let blocks =
            pdp8_loader::tape_text::parse(&text).map_err(|e| format!("parsing tape image: {e}"))?;
        let mut tape = PaperTape::new();
        tape.load_image(blocks);
        tape.attach(cpu);
    }

    if let Some(config_path) = &args.magtape_config {
        let text = std::fs::read_to_string(config_path)
            .map_err(|e| format!("reading magtape config {}: {e}", config_path.display()))?;
        let cfg = config::parse(&text).map_err(|e| format!("parsing magtape config: {e}"))?;
        let mut magtape = Magtape::new();
        for (unit_index, block) in cfg.devices.iter().filter(|d| d.name == "magtape").enumerate() {
            if let Some(path) = block.get("path") {
                magtape
                    .configure_unit(UnitConfig {
                        unit: unit_index,
                        path: PathBuf::from(path),
                        write_protected: block.get("write_protected") == Some("true"),
                    })
                    .map_err(|e| format!("configuring magtape unit {unit_index}: {e}"))?;
            }
        }
        magtape.attach(cpu);
    }

    Ok(console)
}

fn run_program(cpu: &mut Cpu, max_cycles: u32) -> u32 {
    let mut executed = 0;
    while executed < max_cycles && !cpu.is_halted() {
        let slice = RUN_BLOCK_CYCLES.min(max_cycles - executed);
        executed += cpu.run(slice);
    }
    executed
}

fn run(args: CliArgs) -> Result<i32, (i32, String)> {
    let text = std::fs::read_to_string(&args.image)
        .map_err(|e| (3, format!("reading {}: {e}", args.image.display())))?;
    let image = srec::parse(&text).map_err(|e| (3, format!("loading image: {e}")))?;

    let mut cpu = Cpu::new(MEMORY_WORDS);
    let console =
        configure_devices(&mut cpu, &args).map_err(|e| (1, format!("configuring devices: {e}")))?;

    srec::install(&image, &mut cpu).map_err(|e| (1, format!("installing image: {e}")))?;

    if let Some(text) = &args.input {
        console.borrow_mut().queue_str(text);
    }

    let entry = args.start.or(image.start).unwrap_or(image.words[0].0);
    cpu.set_pc(entry);

    let executed = run_program(&mut cpu, args.cycles);
    let captured = console.borrow_mut().flush();

    if args.quiet {
        if !captured.is_empty() {
            print!("{captured}");
        }
        return Ok(0);
    }

    println!();
    println!("pdp8-runner run complete.");
    println!("  Cycles executed: {executed}");
    println!("  PC: {:04o}", cpu.pc());
    println!("  AC: {:04o}", cpu.ac());
    println!("  HALT: {}", if cpu.is_halted() { "yes" } else { "no" });
    if !captured.is_empty() {
        println!("  Console output:");
        println!("{captured}");
    }

    Ok(0)
}

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("usage error: {message}");
            process::exit(2);
        }
    };

    match run(args) {
        Ok(code) => process::exit(code),
        Err((code, message)) => {
            eprintln!("error: {message}");
            process::exit(code);
        }
    }
}
