pub use log::{debug, info, warn};

pub use crate::cartridge::attach_error::AttachError;
pub use crate::cartridge::rom_image::RomImage;
pub use crate::mapper_list::MapperKind;
pub use crate::memory::bank_index::{BankConfiguration, BankIndex};
pub use crate::memory::cartridge_memory::CartridgeMemory;
pub use crate::memory::page_binding::{Region, UNMAPPED_BYTE};
pub use crate::memory::raw_memory::RawMemory;
pub use crate::memory::slot_id::{Page, SlotId, PAGE_SIZE};
pub use crate::save::save_state::{StateError, StateRecord};
pub use crate::util::logger::BANK_SWITCH_TARGET;
pub use crate::util::unit::KIBIBYTE;

use crate::memory::mapper_handle::MapperHandle;
use crate::memory::page_binding::{Backing, BackingWindow, DeviceRef, PageBinding};
use crate::memory::page_table::PageTable;

// A cartridge's bank-switching logic. Storage lives outside the mapper, in the CartridgeMemory
// that the bus hands over through a MapperContext, so the bus can serve fast-path accesses
// without involving the mapper at all.
//
// All addresses a mapper sees are relative to its lowest page.
pub trait Mapper {
    fn kind(&self) -> MapperKind;

    fn page_count(&self) -> u8 {
        4
    }

    // Builds storage for an image that has already passed validation.
    fn allocate(&self, image: &RomImage) -> CartridgeMemory {
        let padded_size = image.size().next_power_of_two();
        CartridgeMemory::new(image.data().mirrored_to(padded_size), RawMemory::default())
    }

    // Binds every owned page from the current register state. Called after attach, reset and
    // state loads. Bindings themselves are never saved.
    fn map_pages(&self, ctx: &mut MapperContext);

    // Called for writes to any owned page that doesn't have a writable fast path.
    fn write(&mut self, ctx: &mut MapperContext, address: u16, value: u8);

    // Most mappers only receive reads for pages they've taken off the fast path, and those reads
    // have no side effects.
    fn read(&mut self, ctx: &mut MapperContext, address: u16) -> u8 {
        self.peek(&ctx.view(), address)
    }

    // Must never change any state.
    fn peek(&self, view: &MapperView, address: u16) -> u8 {
        view.peek_bound(address)
    }

    // Restores power-on register values. The bus rebinds pages afterwards.
    fn power_on(&mut self);

    fn save_state(&self) -> StateRecord;
    fn load_state(&mut self, record: &StateRecord) -> Result<(), StateError>;

    // Most mappers don't have anything that survives power off.
    fn nonvolatile(&self) -> Option<Nonvolatile> {
        None
    }

    // Most mappers don't care about cycles.
    fn on_cycle(&mut self, _ctx: &mut MapperContext, _cycle: u64) {}
    fn cancel_pending_events(&mut self) {}
    // Only mappers that register a write-to-zero hook receive these.
    fn write_zero(&mut self, _ctx: &mut MapperContext, _value: u8) {}
}

// Storage that must be persisted when the cartridge is removed.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Nonvolatile {
    pub region: Region,
    pub suffix: &'static str,
}

impl Nonvolatile {
    pub const SRAM: Nonvolatile = Nonvolatile { region: Region::Ram, suffix: ".sram" };
    pub const FLASH: Nonvolatile = Nonvolatile { region: Region::Rom, suffix: ".flash" };
    pub const EEPROM: Nonvolatile = Nonvolatile { region: Region::Ram, suffix: ".eeprom" };
}

// Where a mapper lives in the machine.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Placement {
    pub slot: SlotId,
    pub start_page: Page,
    pub page_count: u8,
}

impl Placement {
    pub fn page(&self, relative_page: u8) -> Page {
        assert!(relative_page < self.page_count, "Relative page {relative_page} is outside of the mapper.");
        self.start_page.add(relative_page)
    }

    pub fn pages(&self) -> impl Iterator<Item = Page> + use<> {
        let start = self.start_page;
        (0..self.page_count).map(move |i| start.add(i))
    }
}

// How one page of a mapper is wired up.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct PageMapping {
    region: Region,
    offset: u32,
    size: u32,
    readable: bool,
    writable: bool,
    handler: bool,
}

impl PageMapping {
    pub const fn rom(offset: u32) -> Self {
        Self { region: Region::Rom, offset, size: PAGE_SIZE, readable: true, writable: false, handler: false }
    }

    // A RAM window of `size` bytes, mirrored across the page.
    pub const fn ram(offset: u32, size: u32) -> Self {
        Self { region: Region::Ram, offset, size, readable: true, writable: true, handler: false }
    }

    pub const fn read_only(self) -> Self {
        Self { writable: false, .. self }
    }

    // Writes that can't take the fast path are delivered to Mapper::write.
    pub const fn with_write_handler(self) -> Self {
        Self { handler: true, .. self }
    }

    // Reads are delivered to Mapper::read too.
    pub const fn with_read_handler(self) -> Self {
        Self { readable: false, handler: true, .. self }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }
}

pub struct MapperContext<'a> {
    pub(crate) table: &'a mut PageTable,
    pub(crate) memory: &'a mut CartridgeMemory,
    pub(crate) handle: MapperHandle,
    pub(crate) placement: Placement,
    pub(crate) cycle: u64,
}

impl MapperContext<'_> {
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    pub fn rom(&self) -> &RawMemory {
        self.memory.rom()
    }

    pub fn rom_mut(&mut self) -> &mut RawMemory {
        self.memory.rom_mut()
    }

    pub fn ram(&self) -> &RawMemory {
        self.memory.ram()
    }

    pub fn ram_mut(&mut self) -> &mut RawMemory {
        self.memory.ram_mut()
    }

    pub fn view(&self) -> MapperView<'_> {
        MapperView { table: self.table, memory: self.memory, placement: self.placement }
    }

    // Points a page at part of this mapper's storage. Offsets past the end of the region are
    // wrapped back into it, so a bad bank calculation can never escape the mapper's storage.
    pub fn map(&mut self, relative_page: u8, mapping: PageMapping) {
        let page = self.placement.page(relative_page);
        assert!(mapping.size.is_power_of_two() && mapping.size <= PAGE_SIZE);

        let device = mapping.handler.then_some(DeviceRef { owner: self.handle, base_page: self.placement.start_page });
        let region_size = self.memory.region(mapping.region).size();
        if region_size == 0 {
            warn!("Mapper {} has no {:?} storage to map at {page}.", self.handle, mapping.region);
            let binding = PageBinding::new(Backing::Unmapped, device.is_none(), false, device);
            self.table.bind(self.placement.slot, page, binding);
            return;
        }

        let size = mapping.size.min(region_size);
        let mut offset = mapping.offset;
        if offset.checked_add(size).is_none_or(|end| end > region_size) {
            let wrapped = (offset % region_size) & !(size - 1);
            warn!("Mapper {} offset {offset:X} is past the end of {:?}, wrapped to {wrapped:X}.", self.handle, mapping.region);
            offset = wrapped;
        }

        let window = BackingWindow { owner: self.handle, region: mapping.region, offset, mask: size - 1 };
        let binding = PageBinding::new(Backing::Memory(window), mapping.readable, mapping.writable, device);
        self.table.bind(self.placement.slot, page, binding);
    }

    // Leaves a page open bus, optionally still routing accesses to the mapper.
    pub fn map_handler_only(&mut self, relative_page: u8) {
        let page = self.placement.page(relative_page);
        let device = DeviceRef { owner: self.handle, base_page: self.placement.start_page };
        self.table.bind(self.placement.slot, page, PageBinding::new(Backing::Unmapped, false, false, Some(device)));
    }

    pub fn unmap(&mut self, relative_page: u8) {
        let page = self.placement.page(relative_page);
        self.table.unbind(self.placement.slot, page);
    }
}

// Read-only access for peeking.
pub struct MapperView<'a> {
    table: &'a PageTable,
    memory: &'a CartridgeMemory,
    placement: Placement,
}

impl<'a> MapperView<'a> {
    pub(crate) fn new(table: &'a PageTable, memory: &'a CartridgeMemory, placement: Placement) -> Self {
        Self { table, memory, placement }
    }

    pub fn rom(&self) -> &RawMemory {
        self.memory.rom()
    }

    pub fn ram(&self) -> &RawMemory {
        self.memory.ram()
    }

    // The byte the page's backing holds at `address`, whether or not the fast path may read it.
    pub fn peek_bound(&self, address: u16) -> u8 {
        let relative_page = (address >> 13) as u8;
        if relative_page >= self.placement.page_count {
            return UNMAPPED_BYTE;
        }

        let binding = self.table.binding(self.placement.slot, self.placement.page(relative_page));
        match binding.backing() {
            Backing::Unmapped => UNMAPPED_BYTE,
            Backing::Memory(window) => self.memory.region(window.region)
                .get(window.index(address))
                .unwrap_or(UNMAPPED_BYTE),
        }
    }
}

// Checks that an image can be cut into banks of `bank_size` and isn't larger than `max_size`.
pub fn check_image(image: &RomImage, bank_size: u32, max_size: u32) -> Result<(), AttachError> {
    let size = image.size();
    if size == 0 {
        Err(AttachError::EmptyImage)
    } else if size > max_size {
        Err(AttachError::ImageTooLarge { size, max: max_size })
    } else if size % bank_size != 0 {
        Err(AttachError::BadImageSize { size, granularity: bank_size })
    } else {
        Ok(())
    }
}

// Bank-switching mappers keep their registers as a byte array in save states.
pub fn save_registers(record: &mut StateRecord, banks: &[u8]) {
    record.set_bytes("banks", banks);
}

pub fn load_registers<const N: usize>(record: &StateRecord) -> Result<[u8; N], StateError> {
    record.byte_array("banks")
}
