//! Crate root: wires the instruction codec, the MEMC/IOC/VIDC hardware model, and the shared
//! `SystemContext` clock together into one running machine.
//!
//! Module order mirrors dependency order: `binary` and `options` stand alone; the instruction
//! codec (`fields`, `instructions`, `parser`, `assembler`, `format`) depends only on `options`;
//! `system_context` is the shared clock every hardware module is built against; `address_map`
//! depends on it; `ioc`, `vidc`, and `memc` sit on top of all of the above.

pub mod address_map;
pub mod assembler;
pub mod binary;
pub mod error;
pub mod fields;
pub mod format;
pub mod instructions;
pub mod ioc;
pub mod memc;
pub mod options;
pub mod parser;
pub mod system_context;
pub mod vidc;

use std::rc::Rc;
use std::sync::mpsc::Receiver;

use log::info;

use crate::address_map::{AddressMap, ConnectionContext};
use crate::error::OperationError;
use crate::ioc::AcornKeyboardController;
use crate::memc::Memc;
use crate::options::Options;
use crate::system_context::{GuestEvent, SystemContext};

/// Everything needed to bring up one emulated machine: the instruction-codec options, the CPU
/// clock it runs at, how much RAM MEMC is given, and the fuzz-buffer seed (fixed rather than
/// time-seeded, so two sessions built from the same configuration behave identically).
#[derive(Debug, Clone, Copy)]
pub struct Configuration {
    pub options: Options,
    pub cpu_frequency: u64,
    pub ram_bytes: usize,
    pub fuzz_seed: u32,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            options: Options::default(),
            cpu_frequency: 8_000_000,
            ram_bytes: 4 * 1024 * 1024,
            fuzz_seed: 0x1234_5678,
        }
    }
}

/// One running machine: the shared clock/task-scheduler context, the MEMC hardware model (which
/// owns IOC and VIDC in turn), and the receiving end of the host-event FIFO a caller polls for
/// guest-originated notifications (KART LED changes, and so on).
pub struct Emulator {
    pub ctx: SystemContext,
    pub memc: Memc,
    pub host_events: Receiver<GuestEvent>,
    pub options: Options,
}

impl Emulator {
    /// Build a fresh machine per `config`. The keyboard controller is registered into a scratch
    /// [`ConnectionContext`] before MEMC is constructed, since MEMC's constructor wires IOC to it
    /// immediately; the scratch context is backed by a second, throwaway `SystemContext` so the
    /// real one isn't borrowed both mutably (for `Memc::new`) and immutably (for the connection)
    /// at the same time.
    pub fn new(config: Configuration) -> Emulator {
        let (mut ctx, host_events) = SystemContext::new(config.cpu_frequency, config.fuzz_seed);

        let keyboard = AcornKeyboardController::new();
        let (scratch, _scratch_events) = SystemContext::new(config.cpu_frequency, config.fuzz_seed);
        let read_map = AddressMap::new();
        let write_map = AddressMap::new();
        let mut connection = ConnectionContext::new(&scratch, &read_map, &write_map);
        connection.register_device("Keyboard Controller", Rc::clone(&keyboard));

        let memc = Memc::new(&config.options, config.ram_bytes, &mut ctx, &connection);
        info!("machine configured: {} bytes RAM, CPU clock {} Hz", config.ram_bytes, config.cpu_frequency);

        Emulator { ctx, memc, host_events, options: config.options }
    }

    /// Load a low-ROM image, rejecting it without touching any existing state if it exceeds
    /// MEMC's 4 MiB low-ROM window.
    pub fn load_low_rom(&mut self, bytes: &[u8]) -> Result<(), OperationError> {
        self.memc.set_low_rom(bytes)
    }

    /// Load a high-ROM image, rejecting it if it exceeds MEMC's 8 MiB high-ROM window.
    pub fn load_high_rom(&mut self, bytes: &[u8]) -> Result<(), OperationError> {
        self.memc.set_high_rom(bytes)
    }

    /// Reset MEMC's page table so every logical page maps into the low-ROM window, matching a
    /// guest power-on/reset: the next fetch from address 0 reads the ROM's reset vector.
    pub fn reset(&mut self) {
        self.memc.reset();
    }

    pub fn read_word(&mut self, address: u32) -> Option<u32> {
        self.memc.read_word(address, &mut self.ctx)
    }

    pub fn write_word(&mut self, address: u32, value: u32) -> Result<bool, OperationError> {
        self.memc.write_word(address, value, &mut self.ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_fresh_machine_reads_its_reset_vector_from_low_rom() {
        let mut emulator = Emulator::new(Configuration::default());
        let mut rom = vec![0u8; 16];
        rom[0..4].copy_from_slice(&0xE1A0_0000u32.to_le_bytes());
        emulator.load_low_rom(&rom).unwrap();
        emulator.reset();
        assert_eq!(emulator.read_word(0), Some(0xE1A0_0000));
    }

    #[test]
    fn oversized_rom_is_rejected_before_it_touches_machine_state() {
        let mut emulator = Emulator::new(Configuration::default());
        let oversized = vec![0u8; 5 * 1024 * 1024];
        assert!(emulator.load_low_rom(&oversized).is_err());
    }
}
