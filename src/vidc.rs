//! VIDC: the video/sound controller's register-write acceptance path. Real pixel and sound DMA
//! output is out of scope for this core; what's modelled is the write-only CAM-style register
//! interface MEMC forwards writes to, and the fact that reads return undefined bus noise.

use log::debug;

use crate::address_map::MmioRegion;
use crate::system_context::SystemContext;

/// VIDC presents a 2 MiB write-only window. Unlike MEMC's own CAM, the register ID and payload
/// for a VIDC write are both packed into the *value*, not the address (bits 26-31 select the
/// register, the low bits carry the payload); the address only needs to land inside the window,
/// which is why `write` below ignores `offset` entirely.
const WINDOW_SIZE: u32 = 0x0020_0000;

pub struct Vidc {
    last_register: Option<u8>,
}

impl Vidc {
    pub fn new() -> Self {
        Vidc { last_register: None }
    }

    /// The register ID most recently selected by a guest write, for collaborators that want to
    /// observe VIDC traffic without a full register model (e.g. a future framebuffer renderer).
    pub fn last_register(&self) -> Option<u8> {
        self.last_register
    }
}

impl Default for Vidc {
    fn default() -> Self {
        Vidc::new()
    }
}

impl MmioRegion for Vidc {
    fn name(&self) -> &'static str {
        "VIDC"
    }

    fn size(&self) -> u32 {
        WINDOW_SIZE
    }

    /// VIDC registers are write-only; a read sees whatever pseudo-random value happens to be on
    /// the undriven data bus.
    fn read(&mut self, _offset: u32, ctx: &mut SystemContext) -> u32 {
        ctx.get_fuzz()
    }

    fn write(&mut self, _offset: u32, value: u32, _ctx: &mut SystemContext) {
        let register = ((value >> 26) & 0x3F) as u8;
        self.last_register = Some(register);
        debug!("VIDC register {:#04x} written with payload {:#010x}", register, value & 0x03FF_FFFF);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_its_size_and_name() {
        let mut vidc = Vidc::new();
        assert_eq!(vidc.name(), "VIDC");
        assert_eq!(vidc.size(), 0x0020_0000);
    }

    #[test]
    fn write_records_the_register_selected_by_the_values_high_bits() {
        let (mut ctx, _rx) = SystemContext::new(8_000_000, 1);
        let mut vidc = Vidc::new();
        assert_eq!(vidc.last_register(), None);

        vidc.write(0, 0x2C00_0000, &mut ctx);
        assert_eq!(vidc.last_register(), Some(0x0B));
    }

    #[test]
    fn read_returns_fuzz_not_the_last_written_register() {
        let (mut ctx, _rx) = SystemContext::new(8_000_000, 1);
        let mut vidc = Vidc::new();
        vidc.write(0, 0xFFFF_FFFF, &mut ctx);
        let a = vidc.read(0, &mut ctx);
        let b = vidc.read(0, &mut ctx);
        assert_ne!(a, b);
    }
}
