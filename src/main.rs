//! A minimal demonstration binary: loads a ROM image, resets the machine, and prints the
//! reset-vector instruction it decodes to. File I/O and argument handling beyond this thin
//! loader are out of scope for the core; this exists to show the pieces wired together.

use std::env;
use std::fs;
use std::process;

use archie_core::format::{format, FormattedInstruction};
use archie_core::options::FormatterOptions;
use archie_core::parser::disassemble;
use archie_core::{Configuration, Emulator};

const WORD_BYTES: u32 = 4;

fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let rom_path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("usage: archie <low-rom-image>");
            process::exit(2);
        }
    };

    let rom = match fs::read(&rom_path) {
        Ok(bytes) => bytes,
        Err(error) => {
            eprintln!("failed to read {}: {}", rom_path, error);
            process::exit(1);
        }
    };

    let mut emulator = Emulator::new(Configuration::default());
    if let Err(error) = emulator.load_low_rom(&rom) {
        eprintln!("failed to load {}: {}", rom_path, error);
        process::exit(1);
    }
    emulator.reset();

    let words: Vec<u32> = (0..3)
        .map(|index| emulator.read_word(index * WORD_BYTES).unwrap_or(0))
        .collect();
    let decoded = disassemble(&words, 0, &emulator.options);
    let formatted: FormattedInstruction = format(&decoded.instruction, &FormatterOptions::new(0));
    println!("reset vector @ 0x00000000: {:#010x}  {}", words[0], formatted);
}
