//! MEMC: physical RAM and ROM, the page-table CAM, the branchless permission check, and the hub
//! that owns IOC and VIDC and dispatches every guest memory access across them.

use std::cell::RefCell;
use std::rc::Rc;

use log::{error, trace};

use crate::address_map::{AddressMap, ConnectionContext, MmioRegion};
use crate::error::OperationError;
use crate::ioc::Ioc;
use crate::options::Options;
use crate::system_context::SystemContext;
use crate::vidc::Vidc;

const PHYS_RAM_START: u32 = 0x0200_0000;
const IO_ADDR_START: u32 = 0x0300_0000;
const VIDC_START: u32 = 0x0340_0000;
const MEMC_START: u32 = 0x0360_0000;
const ADDR_TRANS_START: u32 = 0x0380_0000;
const ADDR_SPACE_END: u32 = 0x0400_0000;
const LOW_ROM_START: u32 = VIDC_START;
const HIGH_ROM_START: u32 = ADDR_TRANS_START;

const LOW_ROM_MAX: usize = 4 * 1024 * 1024;
const HIGH_ROM_MAX: usize = 8 * 1024 * 1024;

/// Supported RAM sizes, smallest to largest. A requested size is rounded up to the first tier
/// that accommodates it, capped at the largest.
const RAM_TIERS: [usize; 6] = [512 * 1024, 1024 * 1024, 2 * 1024 * 1024, 4 * 1024 * 1024, 8 * 1024 * 1024, 12 * 1024 * 1024];

/// Branchless permission table: bit `index` is 1 iff access is allowed, where
/// `index = is_write:1 << 4 | ppl:2 << 2 | is_privileged:1 << 1 | os_mode:1`. Derived offline from
/// the MEMC datasheet's (mode, PPL, direction) truth table; exercised exhaustively by the test
/// suite rather than re-derived at runtime.
const PERMISSION_TABLE: u32 = 0xCCEF_EEFF;

const PAGE_TABLE_SIZE: usize = 8192;

fn extract_bits(value: u32, lsb: u32, count: u32) -> u32 {
    (value >> lsb) & ((1u32 << count) - 1)
}

fn round_up_ram_size(requested: usize) -> usize {
    RAM_TIERS.iter().copied().find(|&tier| tier >= requested).unwrap_or(*RAM_TIERS.last().unwrap())
}

/// A page-table entry: `{ ppl: 2 (high bits), phys_page_number: 14 (low bits) }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageEntry(u16);

impl PageEntry {
    fn new(phys_page_number: u32, ppl: u8) -> Self {
        PageEntry((((ppl & 0x3) as u16) << 14) | ((phys_page_number & 0x3FFF) as u16))
    }

    fn phys_page_number(self) -> u32 {
        (self.0 & 0x3FFF) as u32
    }

    fn ppl(self) -> u8 {
        (self.0 >> 14) as u8
    }
}

/// The fields extracted from a CAM programming write: which logical page to overwrite, and the
/// new entry's contents.
struct CamWrite {
    logical_page: u32,
    entry: PageEntry,
}

/// Decode a page-table-programming write address into its four encoded fields, per the current
/// page size. Each arm is a direct transcription of one of the source's four bit-scattering
/// schemes (one per page size); `extract_bits(addr, lsb, count)` pulls `count` bits starting at
/// `addr`'s bit `lsb`, exactly inverting the construction the source's CAM decoder performs.
fn decode_cam_write(page_size_pow2: u8, addr: u32) -> CamWrite {
    let (logical_page, phys_low, phys_low_bits, ppl, memc_id) = match page_size_pow2 {
        12 => {
            let logical = extract_bits(addr, 12, 10) | (extract_bits(addr, 10, 2) << 10);
            let phys_low = extract_bits(addr, 0, 7) | (extract_bits(addr, 7, 1) << 7);
            let ppl = extract_bits(addr, 8, 2);
            (logical, phys_low, 8u32, ppl, 0u32)
        }
        13 => {
            let logical = extract_bits(addr, 13, 10) | (extract_bits(addr, 10, 2) << 10);
            let phys_low = extract_bits(addr, 1, 6) | (extract_bits(addr, 0, 1) << 6);
            let ppl = extract_bits(addr, 8, 2);
            let memc_id = extract_bits(addr, 7, 1) | (extract_bits(addr, 12, 1) << 1);
            (logical, phys_low, 7u32, ppl, memc_id)
        }
        14 => {
            let logical = extract_bits(addr, 14, 9) | (extract_bits(addr, 10, 2) << 9);
            let phys_low = extract_bits(addr, 2, 5) | (extract_bits(addr, 0, 2) << 5);
            let ppl = extract_bits(addr, 8, 2);
            let memc_id = extract_bits(addr, 7, 1) | (extract_bits(addr, 12, 1) << 1);
            (logical, phys_low, 7u32, ppl, memc_id)
        }
        15 => {
            let logical = extract_bits(addr, 15, 8) | (extract_bits(addr, 10, 2) << 9);
            let phys_low = extract_bits(addr, 3, 4)
                | (extract_bits(addr, 0, 1) << 4)
                | (extract_bits(addr, 2, 1) << 5)
                | (extract_bits(addr, 1, 1) << 6);
            let ppl = extract_bits(addr, 8, 2);
            let memc_id = extract_bits(addr, 7, 1) | (extract_bits(addr, 12, 1) << 1);
            (logical, phys_low, 7u32, ppl, memc_id)
        }
        _ => unreachable!("page size is always one of 4/8/16/32 KiB"),
    };
    let phys_page_number = phys_low | (memc_id << phys_low_bits);
    CamWrite { logical_page, entry: PageEntry::new(phys_page_number, ppl as u8) }
}

/// The address MEMC's control register responds to, split into its page-size-selecting offset
/// (bits 2-3) and the flag bits (test mode 13, os-mode 12, sound DMA 11, video DMA 10) described
/// by the external register-map contract.
fn decode_memc_control(addr: u32) -> (u8, bool, bool, bool, bool) {
    let page_size_pow2 = 12 + extract_bits(addr, 2, 2) as u8;
    let video_dma = extract_bits(addr, 10, 1) != 0;
    let sound_dma = extract_bits(addr, 11, 1) != 0;
    let os_mode = extract_bits(addr, 12, 1) != 0;
    let test_mode = extract_bits(addr, 13, 1) != 0;
    (page_size_pow2, video_dma, sound_dma, os_mode, test_mode)
}

/// Where a physical (post-translation) address resolves to.
enum PhysicalTarget {
    Ram { offset: usize },
    LowRom { offset: usize },
    HighRom { offset: usize },
    Mmio,
    OutOfRange,
}

pub struct Memc {
    ram: Vec<u8>,
    low_rom: Vec<u8>,
    high_rom: Vec<u8>,
    page_table: Vec<PageEntry>,
    page_size_pow2: u8,
    os_mode: bool,
    video_dma_enabled: bool,
    sound_dma_enabled: bool,
    privileged: bool,
    read_map: AddressMap,
    write_map: AddressMap,
    ioc: Rc<RefCell<Ioc>>,
    vidc: Rc<RefCell<Vidc>>,
}

impl Memc {
    /// Build a new MEMC with `requested_ram` bytes of physical memory (rounded up to the nearest
    /// supported tier, capped at 12 MiB), registers IOC and VIDC into fresh read/write maps, and
    /// resolves IOC's keyboard-controller collaborator via `connection`.
    pub fn new(_options: &Options, requested_ram: usize, ctx: &mut SystemContext, connection: &ConnectionContext) -> Memc {
        let ioc = Ioc::new(ctx);
        let vidc = Rc::new(RefCell::new(Vidc::new()));

        // Both maps are keyed by offset from IO_ADDR_START, matching the lookup in read_word/write_word.
        // Real MEMC places IOC at 0x3200000, i.e. 0x200000 into the I/O window.
        let mut read_map = AddressMap::new();
        let mut write_map = AddressMap::new();
        assert!(read_map.try_insert(0x0020_0000, Rc::clone(&ioc) as Rc<RefCell<dyn MmioRegion>>));
        assert!(write_map.try_insert(0x0020_0000, Rc::clone(&ioc) as Rc<RefCell<dyn MmioRegion>>));

        ioc.borrow().connect(connection);

        let mut memc = Memc {
            ram: vec![0; round_up_ram_size(requested_ram)],
            low_rom: Vec::new(),
            high_rom: Vec::new(),
            page_table: vec![PageEntry(0); PAGE_TABLE_SIZE],
            page_size_pow2: 12,
            os_mode: false,
            video_dma_enabled: false,
            sound_dma_enabled: false,
            privileged: true,
            read_map,
            write_map,
            ioc,
            vidc,
        };
        memc.regenerate_rom_page_mappings();
        memc
    }

    pub fn set_privileged_mode(&mut self, privileged: bool) {
        self.privileged = privileged;
    }

    pub fn privileged_mode(&self) -> bool {
        self.privileged
    }

    pub fn set_low_rom(&mut self, bytes: &[u8]) -> Result<(), OperationError> {
        if bytes.len() > LOW_ROM_MAX {
            return Err(OperationError::LowRomTooLarge { size: bytes.len() });
        }
        self.low_rom = bytes.to_vec();
        Ok(())
    }

    pub fn set_high_rom(&mut self, bytes: &[u8]) -> Result<(), OperationError> {
        if bytes.len() > HIGH_ROM_MAX {
            return Err(OperationError::HighRomTooLarge { size: bytes.len() });
        }
        self.high_rom = bytes.to_vec();
        Ok(())
    }

    /// Restores the page size to 4 KiB, re-maps every logical page into the low-ROM window with
    /// PPL=1, clears OS-mode and sound DMA, and leaves video DMA and RAM contents untouched; the
    /// MEMC data sheet calls out video DMA specifically as surviving a reset.
    pub fn reset(&mut self) {
        self.page_size_pow2 = 12;
        self.os_mode = false;
        self.sound_dma_enabled = false;
        self.regenerate_rom_page_mappings();
    }

    fn regenerate_rom_page_mappings(&mut self) {
        let rom_pages = (LOW_ROM_MAX >> 12) as u32;
        let base_page = LOW_ROM_START >> 12;
        for (logical, slot) in self.page_table.iter_mut().enumerate() {
            let phys_page_number = base_page + (logical as u32 % rom_pages);
            *slot = PageEntry::new(phys_page_number, 1);
        }
    }

    fn page_size(&self) -> u32 {
        1u32 << self.page_size_pow2
    }

    /// Translate a logical address (`< PHYS_RAM_START`) to a physical one, and report whether the
    /// access is permitted. Logical addresses at or above `PHYS_RAM_START` are never translated
    /// (callers must route those through the direct-physical path instead).
    fn translate(&self, logical_addr: u32, is_write: bool) -> (u32, bool) {
        let page_mask = self.page_size() - 1;
        let page_index = (logical_addr >> self.page_size_pow2) as usize;
        let entry = self.page_table[page_index % PAGE_TABLE_SIZE];
        let phys_addr = (entry.phys_page_number() << self.page_size_pow2) | (logical_addr & page_mask);

        let index = ((is_write as u32) << 4) | ((entry.ppl() as u32) << 2) | ((self.privileged as u32) << 1) | (self.os_mode as u32);
        let allowed = (PERMISSION_TABLE >> index) & 1 != 0;
        (phys_addr, allowed)
    }

    /// Map a fully physical address to where its bytes live, independent of any permission check.
    fn locate_physical(&self, phys_addr: u32) -> PhysicalTarget {
        if phys_addr < PHYS_RAM_START {
            let offset = (phys_addr as usize) % self.ram.len().max(1);
            PhysicalTarget::Ram { offset }
        } else if phys_addr < IO_ADDR_START {
            let offset = ((phys_addr - PHYS_RAM_START) as usize) % self.ram.len().max(1);
            PhysicalTarget::Ram { offset }
        } else if phys_addr < LOW_ROM_START {
            PhysicalTarget::Mmio
        } else if phys_addr < HIGH_ROM_START {
            let offset = (phys_addr - LOW_ROM_START) as usize;
            if offset < self.low_rom.len() {
                PhysicalTarget::LowRom { offset }
            } else {
                PhysicalTarget::OutOfRange
            }
        } else if phys_addr < ADDR_SPACE_END {
            let offset = (phys_addr - HIGH_ROM_START) as usize;
            if offset < self.high_rom.len() {
                PhysicalTarget::HighRom { offset }
            } else {
                PhysicalTarget::OutOfRange
            }
        } else {
            PhysicalTarget::OutOfRange
        }
    }

    /// Read one word. `logical_addr` may be a translated logical address or a direct physical
    /// one; returns `None` if the access is not permitted (RAM/MMIO require privileged mode with
    /// no further check outside the translated range; ROM reads are never gated).
    pub fn read_word(&mut self, logical_addr: u32, ctx: &mut SystemContext) -> Option<u32> {
        let phys_addr = if logical_addr < PHYS_RAM_START {
            let (phys_addr, allowed) = self.translate(logical_addr, false);
            if !allowed {
                return None;
            }
            phys_addr
        } else if logical_addr < IO_ADDR_START {
            if !self.privileged {
                return None;
            }
            logical_addr
        } else if logical_addr < LOW_ROM_START {
            if !self.privileged {
                return None;
            }
            logical_addr
        } else {
            logical_addr
        };

        match self.locate_physical(phys_addr) {
            PhysicalTarget::Ram { offset } => Some(read_u32_le(&self.ram, offset)),
            PhysicalTarget::LowRom { offset } => Some(read_u32_le(&self.low_rom, offset)),
            PhysicalTarget::HighRom { offset } => Some(read_u32_le(&self.high_rom, offset)),
            PhysicalTarget::Mmio => {
                let offset_in_window = phys_addr - IO_ADDR_START;
                match self.read_map.try_find_region(offset_in_window) {
                    Some((region, offset, _remaining)) => Some(region.borrow_mut().read(offset, ctx)),
                    None => Some(ctx.get_fuzz()),
                }
            }
            PhysicalTarget::OutOfRange => Some(ctx.get_fuzz()),
        }
    }

    /// Write one word. Returns `Ok(false)` without side effects if the access is not permitted.
    /// Enabling MEMC test mode is not a routine permission failure: it halts DRAM refresh on real
    /// hardware, so it is surfaced as a fatal [`OperationError::TestModeRejected`] instead.
    pub fn write_word(&mut self, logical_addr: u32, value: u32, ctx: &mut SystemContext) -> Result<bool, OperationError> {
        if logical_addr < PHYS_RAM_START {
            let (phys_addr, allowed) = self.translate(logical_addr, true);
            if !allowed {
                return Ok(false);
            }
            return Ok(self.write_physical_ram_or_rom(phys_addr, value));
        }

        if !self.privileged {
            return Ok(false);
        }

        if logical_addr < IO_ADDR_START {
            return Ok(self.write_physical_ram_or_rom(logical_addr, value));
        }
        if logical_addr < VIDC_START {
            let offset_in_window = logical_addr - IO_ADDR_START;
            if let Some((region, offset, _remaining)) = self.write_map.try_find_region(offset_in_window) {
                region.borrow_mut().write(offset, value, ctx);
            }
            return Ok(true);
        }
        if logical_addr < MEMC_START {
            self.vidc.borrow_mut().write(0, value, ctx);
            return Ok(true);
        }
        if logical_addr < ADDR_TRANS_START {
            self.write_memc_control(logical_addr)?;
            return Ok(true);
        }

        let cam = decode_cam_write(self.page_size_pow2, logical_addr);
        trace!("CAM write: logical page {} -> phys page {} ppl {}", cam.logical_page, cam.entry.phys_page_number(), cam.entry.ppl());
        self.page_table[(cam.logical_page as usize) % PAGE_TABLE_SIZE] = cam.entry;
        Ok(true)
    }

    fn write_physical_ram_or_rom(&mut self, phys_addr: u32, value: u32) -> bool {
        match self.locate_physical(phys_addr) {
            PhysicalTarget::Ram { offset } => {
                write_u32_le(&mut self.ram, offset, value);
                true
            }
            // ROM and unmapped physical space silently swallow writes, matching read-only memory.
            _ => true,
        }
    }

    fn write_memc_control(&mut self, addr: u32) -> Result<(), OperationError> {
        let (page_size_pow2, video_dma, sound_dma, os_mode, test_mode) = decode_memc_control(addr);
        if test_mode {
            error!("guest enabled MEMC test mode, which halts DRAM refresh on real hardware");
            return Err(OperationError::TestModeRejected);
        }
        self.page_size_pow2 = page_size_pow2;
        self.video_dma_enabled = video_dma;
        self.sound_dma_enabled = sound_dma;
        self.os_mode = os_mode;
        Ok(())
    }

    /// Read `count` consecutive words starting at `logical_addr`, stopping early (but never
    /// aborting a prior successful word) if a later word in the run falls outside the granted
    /// access or the current page/region's span.
    pub fn read_words(&mut self, logical_addr: u32, ctx: &mut SystemContext, out: &mut [u32]) -> bool {
        for (i, slot) in out.iter_mut().enumerate() {
            let addr = logical_addr.wrapping_add((i as u32) * 4);
            match self.read_word(addr, ctx) {
                Some(word) => *slot = word,
                None if i == 0 => return false,
                None => break,
            }
        }
        true
    }

    /// Write `values` to consecutive words starting at `logical_addr`, aborting the whole run
    /// (propagating the error) if test mode is rejected mid-write, and otherwise stopping early
    /// on the first permission failure after at least one word has succeeded.
    pub fn write_words(&mut self, logical_addr: u32, ctx: &mut SystemContext, values: &[u32]) -> Result<bool, OperationError> {
        for (i, &value) in values.iter().enumerate() {
            let addr = logical_addr.wrapping_add((i as u32) * 4);
            if !self.write_word(addr, value, ctx)? {
                if i == 0 {
                    return Ok(false);
                }
                break;
            }
        }
        Ok(true)
    }
}

fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    for (i, slot) in buf.iter_mut().enumerate() {
        *slot = bytes.get(offset + i).copied().unwrap_or(0);
    }
    u32::from_le_bytes(buf)
}

fn write_u32_le(bytes: &mut [u8], offset: usize, value: u32) {
    let encoded = value.to_le_bytes();
    for (i, byte) in encoded.iter().enumerate() {
        if let Some(slot) = bytes.get_mut(offset + i) {
            *slot = *byte;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_map::ConnectionContext;

    fn make_memc(ram: usize) -> (Memc, SystemContext) {
        let (mut ctx, _rx) = SystemContext::new(8_000_000, 1);
        let memc = {
            let (scratch, _rx2) = SystemContext::new(8_000_000, 1);
            let read_map = AddressMap::new();
            let write_map = AddressMap::new();
            let connection = ConnectionContext::new(&scratch, &read_map, &write_map);
            Memc::new(&Options::default(), ram, &mut ctx, &connection)
        };
        (memc, ctx)
    }

    fn make4k_address(logical_page: u32, phys_page: u32, ppl: u8) -> u32 {
        let mut addr = ADDR_TRANS_START;
        addr |= extract_bits(logical_page, 0, 10) << 12;
        addr |= extract_bits(logical_page, 10, 2) << 10;
        addr |= extract_bits(phys_page, 0, 7);
        addr |= extract_bits(phys_page, 7, 1) << 7;
        addr |= (ppl as u32 & 0x3) << 8;
        addr
    }

    fn make8k_address(logical_page: u32, phys_page: u32, ppl: u8) -> u32 {
        let mut addr = ADDR_TRANS_START;
        addr |= extract_bits(logical_page, 0, 10) << 13;
        addr |= extract_bits(logical_page, 10, 2) << 10;
        addr |= extract_bits(phys_page, 0, 6) << 1;
        addr |= extract_bits(phys_page, 6, 1);
        addr |= (ppl as u32 & 0x3) << 8;
        let memc_id = extract_bits(phys_page, 7, 2);
        addr |= extract_bits(memc_id, 0, 1) << 7;
        addr |= extract_bits(memc_id, 1, 1) << 12;
        addr
    }

    fn make16k_address(logical_page: u32, phys_page: u32, ppl: u8) -> u32 {
        let mut addr = ADDR_TRANS_START;
        addr |= extract_bits(logical_page, 0, 9) << 14;
        addr |= extract_bits(logical_page, 9, 2) << 10;
        addr |= extract_bits(phys_page, 5, 2);
        addr |= extract_bits(phys_page, 0, 5) << 2;
        addr |= (ppl as u32 & 0x3) << 8;
        let memc_id = extract_bits(phys_page, 7, 2);
        addr |= extract_bits(memc_id, 0, 1) << 7;
        addr |= extract_bits(memc_id, 1, 1) << 12;
        addr
    }

    fn make32k_address(logical_page: u32, phys_page: u32, ppl: u8) -> u32 {
        let mut addr = ADDR_TRANS_START;
        addr |= extract_bits(logical_page, 0, 8) << 15;
        addr |= extract_bits(logical_page, 9, 2) << 10;
        addr |= extract_bits(phys_page, 0, 4) << 3;
        addr |= extract_bits(phys_page, 4, 1);
        addr |= extract_bits(phys_page, 5, 1) << 2;
        addr |= extract_bits(phys_page, 6, 1) << 1;
        addr |= (ppl as u32 & 0x3) << 8;
        let memc_id = extract_bits(phys_page, 7, 2);
        addr |= extract_bits(memc_id, 0, 1) << 7;
        addr |= extract_bits(memc_id, 1, 1) << 12;
        addr
    }

    fn set_page_size(memc: &mut Memc, ctx: &mut SystemContext, pow2: u8) {
        memc.set_privileged_mode(true);
        let addr = 0x036E_0000 | (((pow2 - 12) as u32) << 2);
        assert!(memc.write_word(addr, 0, ctx).unwrap());
    }

    #[test]
    fn control_register_write_requires_privilege() {
        let (mut memc, mut ctx) = make_memc(1024 * 1024);
        memc.set_privileged_mode(false);
        assert!(!memc.write_word(0x036E_0008, 42, &mut ctx).unwrap());
    }

    #[test]
    fn enabling_test_mode_is_rejected_without_corrupting_other_state() {
        let (mut memc, mut ctx) = make_memc(1024 * 1024);
        memc.set_privileged_mode(true);
        let before = memc.page_size_pow2;
        assert_eq!(memc.write_word(0x036E_2008, 42, &mut ctx), Err(OperationError::TestModeRejected));
        assert_eq!(memc.page_size_pow2, before);
    }

    #[test]
    fn four_kib_cam_round_trips_through_translation_and_direct_access() {
        let (mut memc, mut ctx) = make_memc(1024 * 1024);
        set_page_size(&mut memc, &mut ctx, 12);

        let addr = make4k_address(2, 1, 0);
        assert!(memc.write_word(addr, 0, &mut ctx).unwrap());

        let page_size = 1u32 << 12;
        let logical = 0x0C + page_size * 2;
        assert!(memc.write_word(logical, 0xDEAD_BEEF, &mut ctx).unwrap());
        assert_eq!(memc.read_word(logical, &mut ctx), Some(0xDEAD_BEEF));

        let physical = PHYS_RAM_START + page_size + 0x0C;
        assert_eq!(memc.read_word(physical, &mut ctx), Some(0xDEAD_BEEF));
    }

    #[test]
    fn eight_kib_cam_round_trips() {
        let (mut memc, mut ctx) = make_memc(1024 * 1024);
        set_page_size(&mut memc, &mut ctx, 13);

        let addr = make8k_address(2, 1, 0);
        assert!(memc.write_word(addr, 0, &mut ctx).unwrap());

        let page_size = 1u32 << 13;
        let logical = 0x0C + page_size * 2;
        assert!(memc.write_word(logical, 0xDEAD_BEEF, &mut ctx).unwrap());
        assert_eq!(memc.read_word(logical, &mut ctx), Some(0xDEAD_BEEF));

        let physical = PHYS_RAM_START + page_size + 0x0C;
        assert_eq!(memc.read_word(physical, &mut ctx), Some(0xDEAD_BEEF));
    }

    #[test]
    fn sixteen_kib_cam_round_trips() {
        let (mut memc, mut ctx) = make_memc(1024 * 1024);
        set_page_size(&mut memc, &mut ctx, 14);

        let addr = make16k_address(2, 1, 0);
        assert!(memc.write_word(addr, 0, &mut ctx).unwrap());

        let page_size = 1u32 << 14;
        let logical = 0x0C + page_size * 2;
        assert!(memc.write_word(logical, 0xDEAD_BEEF, &mut ctx).unwrap());
        assert_eq!(memc.read_word(logical, &mut ctx), Some(0xDEAD_BEEF));

        let physical = PHYS_RAM_START + page_size + 0x0C;
        assert_eq!(memc.read_word(physical, &mut ctx), Some(0xDEAD_BEEF));
    }

    #[test]
    fn thirty_two_kib_cam_round_trips() {
        let (mut memc, mut ctx) = make_memc(1024 * 1024);
        set_page_size(&mut memc, &mut ctx, 15);

        let addr = make32k_address(2, 1, 0);
        assert!(memc.write_word(addr, 0, &mut ctx).unwrap());

        let page_size = 1u32 << 15;
        let logical = 0x0C + page_size * 2;
        assert!(memc.write_word(logical, 0xDEAD_BEEF, &mut ctx).unwrap());
        assert_eq!(memc.read_word(logical, &mut ctx), Some(0xDEAD_BEEF));

        let physical = PHYS_RAM_START + page_size + 0x0C;
        assert_eq!(memc.read_word(physical, &mut ctx), Some(0xDEAD_BEEF));
    }

    #[test]
    fn ppl1_allows_user_read_but_not_user_write_and_os_mode_lifts_the_restriction() {
        let (mut memc, mut ctx) = make_memc(1024 * 1024);
        set_page_size(&mut memc, &mut ctx, 14);

        let addr = make16k_address(2, 1, 1);
        assert!(memc.write_word(addr, 0, &mut ctx).unwrap());

        let page_size = 1u32 << 14;
        let logical = 0x0C + page_size * 2;
        let sample = 0xDEAD_BEEFu32;
        let sample2 = 0xCAFE_BABEu32;
        assert!(memc.write_word(logical, sample, &mut ctx).unwrap());

        memc.set_privileged_mode(false);
        assert_eq!(memc.read_word(logical, &mut ctx), Some(sample));
        assert!(!memc.write_word(logical, sample2, &mut ctx).unwrap());

        memc.set_privileged_mode(true);
        let os_addr = 0x036E_1000 | (((14u32 - 12) ) << 2);
        assert!(memc.write_word(os_addr, 0, &mut ctx).unwrap());
        memc.set_privileged_mode(false);
        assert!(memc.write_word(logical, sample2, &mut ctx).unwrap());
        assert_eq!(memc.read_word(logical, &mut ctx), Some(sample2));
    }

    #[test]
    fn permission_table_matches_the_full_truth_table() {
        for index in 0u32..32 {
            let is_write = (index >> 4) & 1;
            let ppl = (index >> 2) & 0x3;
            let privileged = (index >> 1) & 1;
            let os_mode = index & 1;

            let expected = (PERMISSION_TABLE >> index) & 1 != 0;

            // Direct truth table from the MEMC data sheet: privileged mode always grants access;
            // OS mode grants access to PPL0/1 and read-only access to PPL2/3; plain unprivileged
            // access is gated by PPL and direction.
            let allowed = if privileged == 1 {
                true
            } else if os_mode == 1 {
                match ppl {
                    0 | 1 => true,
                    _ => is_write == 0,
                }
            } else {
                match ppl {
                    0 => true,
                    1 => is_write == 0,
                    _ => false,
                }
            };
            assert_eq!(expected, allowed, "mismatch at index {}", index);
        }
    }

    #[test]
    fn reset_maps_every_logical_page_to_low_rom_with_ppl1() {
        let (mut memc, mut ctx) = make_memc(1024 * 1024);
        let rom = [0xDEAD_BEEFu32, 0xCAFE_BABE, 0x4269_2496];
        let mut rom_bytes = Vec::new();
        for word in &rom {
            rom_bytes.extend_from_slice(&word.to_le_bytes());
        }
        memc.set_low_rom(&rom_bytes).unwrap();
        memc.reset();

        assert_eq!(memc.read_word(0, &mut ctx), Some(rom[0]));
        assert_eq!(memc.read_word(4, &mut ctx), Some(rom[1]));
        assert_eq!(memc.read_word(8, &mut ctx), Some(rom[2]));
        assert_eq!(memc.read_word(LOW_ROM_START, &mut ctx), Some(rom[0]));
    }

    #[test]
    fn direct_ram_window_requires_privileged_mode_for_both_directions() {
        let (mut memc, mut ctx) = make_memc(1024 * 1024);
        memc.set_privileged_mode(false);
        assert!(!memc.write_word(PHYS_RAM_START + 8, 42, &mut ctx).unwrap());
        assert_eq!(memc.read_word(PHYS_RAM_START + 8, &mut ctx), None);
    }

    #[test]
    fn low_rom_reads_are_never_privilege_gated() {
        let (mut memc, mut ctx) = make_memc(1024 * 1024);
        memc.set_low_rom(&[0xEF, 0xBE, 0xAD, 0xDE]).unwrap();
        memc.set_privileged_mode(false);
        assert_eq!(memc.read_word(LOW_ROM_START, &mut ctx), Some(0xDEAD_BEEF));
    }

    #[test]
    fn oversized_rom_image_is_rejected() {
        let (mut memc, _ctx) = make_memc(1024 * 1024);
        let oversized = vec![0u8; LOW_ROM_MAX + 1];
        assert_eq!(memc.set_low_rom(&oversized), Err(OperationError::LowRomTooLarge { size: LOW_ROM_MAX + 1 }));
    }

    #[test]
    fn requested_ram_size_rounds_up_to_the_next_tier() {
        assert_eq!(round_up_ram_size(700 * 1024), 1024 * 1024);
        assert_eq!(round_up_ram_size(12 * 1024 * 1024 + 1), 12 * 1024 * 1024);
    }
}
