//! The address-region registry devices are mapped into, and the transient context used to wire
//! devices up to each other by name before a session starts.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::system_context::SystemContext;

/// A device that can be mapped into an [`AddressMap`] and addressed by word-sized reads/writes
/// relative to its own base. `ctx` is threaded through so a register write can schedule or cancel
/// a task (a timer's "go" command, say) without the device needing to own its own clock.
pub trait MmioRegion {
    fn name(&self) -> &'static str;
    fn size(&self) -> u32;
    fn read(&mut self, offset: u32, ctx: &mut SystemContext) -> u32;
    fn write(&mut self, offset: u32, value: u32, ctx: &mut SystemContext);
}

struct Mapping {
    address: u32,
    end: u32,
    region: Rc<RefCell<dyn MmioRegion>>,
}

/// An ordered, non-overlapping index of device mappings, looked up by binary search. Two
/// instances typically exist per MEMC: one for the read path, one for the write path (VIDC, for
/// instance, only ever appears in the write map).
#[derive(Default)]
pub struct AddressMap {
    mappings: Vec<Mapping>,
}

impl AddressMap {
    pub fn new() -> Self {
        AddressMap { mappings: Vec::new() }
    }

    /// Insert `region` at `address`. Returns `false` (and leaves the map unchanged) if the new
    /// mapping would overlap an existing one.
    pub fn try_insert(&mut self, address: u32, region: Rc<RefCell<dyn MmioRegion>>) -> bool {
        let end = match address.checked_add(region.borrow().size()) {
            Some(end) => end,
            None => return false,
        };
        let pos = self.mappings.partition_point(|m| m.address < address);
        if pos > 0 && self.mappings[pos - 1].end > address {
            return false;
        }
        if pos < self.mappings.len() && self.mappings[pos].address < end {
            return false;
        }
        self.mappings.insert(pos, Mapping { address, end, region });
        true
    }

    /// Find the unique mapping containing `addr`, returning the region, the offset of `addr`
    /// within it, and the number of bytes remaining to the end of the mapping.
    pub fn try_find_region(&self, addr: u32) -> Option<(Rc<RefCell<dyn MmioRegion>>, u32, u32)> {
        let pos = self.mappings.partition_point(|m| m.address <= addr);
        if pos == 0 {
            return None;
        }
        let mapping = &self.mappings[pos - 1];
        if addr < mapping.end {
            Some((Rc::clone(&mapping.region), addr - mapping.address, mapping.end - addr))
        } else {
            None
        }
    }
}

/// Passed to every device's `connect` method at startup so it can resolve named collaborators
/// (e.g. IOC finds "Keyboard Controller") and see the frozen address maps. Discarded once
/// `connect` returns on every device.
pub struct ConnectionContext<'a> {
    pub system: &'a SystemContext,
    pub read_map: &'a AddressMap,
    pub write_map: &'a AddressMap,
    devices: HashMap<&'static str, Rc<dyn Any>>,
}

impl<'a> ConnectionContext<'a> {
    pub fn new(system: &'a SystemContext, read_map: &'a AddressMap, write_map: &'a AddressMap) -> Self {
        ConnectionContext { system, read_map, write_map, devices: HashMap::new() }
    }

    pub fn register_device<T: Any>(&mut self, name: &'static str, device: Rc<T>) {
        self.devices.insert(name, device);
    }

    /// Resolve a previously-registered device by name and concrete type. Returns `None` if no
    /// device was registered under that name, or if it was registered under a different type.
    pub fn try_find_device<T: Any>(&self, name: &str) -> Option<Rc<T>> {
        self.devices.get(name).and_then(|device| Rc::clone(device).downcast::<T>().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Stub {
        size: u32,
        last_write: Cell<u32>,
    }

    impl MmioRegion for Stub {
        fn name(&self) -> &'static str {
            "stub"
        }
        fn size(&self) -> u32 {
            self.size
        }
        fn read(&mut self, offset: u32, _ctx: &mut SystemContext) -> u32 {
            offset
        }
        fn write(&mut self, offset: u32, value: u32, _ctx: &mut SystemContext) {
            self.last_write.set(offset ^ value);
        }
    }

    #[test]
    fn non_overlapping_insertions_succeed_and_lookup_finds_the_right_one() {
        let (mut ctx, _rx) = SystemContext::new(8_000_000, 1);
        let mut map = AddressMap::new();
        let a = Rc::new(RefCell::new(Stub { size: 0x100, last_write: Cell::new(0) }));
        let b = Rc::new(RefCell::new(Stub { size: 0x80, last_write: Cell::new(0) }));
        assert!(map.try_insert(0x1000, a));
        assert!(map.try_insert(0x2000, b));

        let (region, offset, remaining) = map.try_find_region(0x2010).unwrap();
        assert_eq!(offset, 0x10);
        assert_eq!(remaining, 0x80 - 0x10);
        assert_eq!(region.borrow_mut().read(offset, &mut ctx), 0x10);
    }

    #[test]
    fn overlapping_insertion_is_rejected() {
        let mut map = AddressMap::new();
        let a = Rc::new(RefCell::new(Stub { size: 0x100, last_write: Cell::new(0) }));
        let b = Rc::new(RefCell::new(Stub { size: 0x100, last_write: Cell::new(0) }));
        assert!(map.try_insert(0x1000, a));
        assert!(!map.try_insert(0x1080, b));
    }

    #[test]
    fn lookup_outside_any_mapping_returns_none() {
        let mut map = AddressMap::new();
        let a = Rc::new(RefCell::new(Stub { size: 0x100, last_write: Cell::new(0) }));
        assert!(map.try_insert(0x1000, a));
        assert!(map.try_find_region(0x2000).is_none());
    }

    #[test]
    fn connection_context_resolves_devices_by_name_and_type() {
        let (system, _rx) = SystemContext::new(8_000_000, 1);
        let read_map = AddressMap::new();
        let write_map = AddressMap::new();
        let mut ctx = ConnectionContext::new(&system, &read_map, &write_map);
        let device = Rc::new(RefCell::new(Stub { size: 4, last_write: Cell::new(0) }));
        ctx.register_device("Stub Device", Rc::clone(&device));

        let found = ctx.try_find_device::<RefCell<Stub>>("Stub Device").unwrap();
        let (mut scratch, _rx) = SystemContext::new(8_000_000, 1);
        found.borrow_mut().write(0, 0xFF, &mut scratch);
        assert_eq!(found.borrow().last_write.get(), 0xFF);

        assert!(ctx.try_find_device::<RefCell<Stub>>("Missing").is_none());
    }
}
