use itertools::Itertools;
use log::{info, warn};

use crate::cartridge::attach_error::AttachError;
use crate::cartridge::rom_guess::guess_mapper_kind;
use crate::cartridge::rom_image::RomImage;
use crate::config::MachineConfig;
use crate::mapper::{Mapper, MapperContext, MapperView, Placement};
use crate::mapper_list::{new_mapper, AttachOptions, MapperKind};
use crate::memory::cartridge_memory::CartridgeMemory;
use crate::memory::mapper_handle::MapperHandle;
use crate::memory::mapper_registry::{AttachedMapper, MapperRegistry};
use crate::memory::page_binding::{DeviceRef, Region, UNMAPPED_BYTE};
use crate::memory::page_table::PageTable;
use crate::memory::slot_id::{Page, Quadrant, SlotId, PAGE_COUNT, SLOT_COUNT};
use crate::memory::slot_selector::SlotSelector;
use crate::save::save_state::{StateError, StateRecord};
use crate::save::save_store::SaveStore;

// Memory-mapped in the last byte of a sub-slotted primary slot.
pub const SUBSLOT_REGISTER_ADDRESS: u16 = 0xFFFF;

const MACHINE_TAG: &str = "Machine";
const CARTRIDGE_TAG: &str = "Cartridge";

// One cartridge's part of a state that has passed every check that doesn't need the mapper.
struct StagedCartridge<'a> {
    handle: MapperHandle,
    previous: StateRecord,
    mapper_state: &'a StateRecord,
    ram: &'a [u8],
    rom: Option<&'a [u8]>,
}

// The CPU's view of memory. Owns everything that decides what a CPU address means: the page
// table, the slot selection, and every attached mapper along with its storage.
pub struct MachineBus {
    page_table: PageTable,
    selector: SlotSelector,
    mappers: MapperRegistry,
    save_store: Box<dyn SaveStore>,
    attach_options: AttachOptions,
    write_zero_hook: Option<MapperHandle>,
    cycle: u64,
}

impl MachineBus {
    pub fn new(config: &MachineConfig) -> Self {
        Self::with_save_store(config, config.save_store())
    }

    pub fn with_save_store(config: &MachineConfig, save_store: Box<dyn SaveStore>) -> Self {
        let mut page_table = PageTable::new();
        let selector = SlotSelector::new(config.subslotted);
        selector.reactivate_all(&mut page_table);
        Self {
            page_table,
            selector,
            mappers: MapperRegistry::new(),
            save_store,
            attach_options: config.attach_options(),
            write_zero_hook: None,
            cycle: 0,
        }
    }

    #[inline]
    pub fn read(&mut self, address: u16) -> u8 {
        if address == SUBSLOT_REGISTER_ADDRESS && self.selector.subslot_register_visible() {
            return self.selector.read_subslot_register();
        }

        let binding = *self.page_table.active(Page::of(address));
        if binding.is_readable() {
            return self.mappers.read_backing(binding.backing(), address);
        }

        match binding.device() {
            Some(device) => self.with_mapper(device.owner, |mapper, ctx| {
                mapper.read(ctx, device.relative_address(address))
            }).unwrap_or(UNMAPPED_BYTE),
            None => UNMAPPED_BYTE,
        }
    }

    // Reads without disturbing any device. Safe for debuggers and disassemblers.
    pub fn peek(&self, address: u16) -> u8 {
        if address == SUBSLOT_REGISTER_ADDRESS && self.selector.subslot_register_visible() {
            return self.selector.read_subslot_register();
        }

        let binding = self.page_table.active(Page::of(address));
        if binding.is_readable() {
            return self.mappers.read_backing(binding.backing(), address);
        }

        binding.device()
            .map_or(UNMAPPED_BYTE, |device| self.peek_device(device, address))
    }

    #[inline]
    pub fn write(&mut self, address: u16, value: u8) {
        if address == 0
            && let Some(hook) = self.write_zero_hook
            && self.with_mapper(hook, |mapper, ctx| mapper.write_zero(ctx, value)).is_some()
        {
            return;
        }

        if address == SUBSLOT_REGISTER_ADDRESS && self.selector.subslot_register_visible() {
            self.selector.write_subslot_register(&mut self.page_table, value);
            return;
        }

        let binding = *self.page_table.active(Page::of(address));
        if binding.is_writable() {
            self.mappers.write_backing(binding.backing(), address, value);
        } else if let Some(device) = binding.device() {
            self.with_mapper(device.owner, |mapper, ctx| {
                mapper.write(ctx, device.relative_address(address), value);
            });
        }
    }

    pub fn attach(
        &mut self,
        image: &RomImage,
        kind: MapperKind,
        slot: SlotId,
        start_page: Page,
    ) -> Result<MapperHandle, AttachError> {
        let options = self.attach_options;
        self.attach_with_options(image, kind, slot, start_page, &options)
    }

    // Attaches using whatever mapper the image's contents suggest.
    pub fn attach_guessed(&mut self, image: &RomImage, slot: SlotId, start_page: Page) -> Result<MapperHandle, AttachError> {
        let kind = guess_mapper_kind(image).ok_or(AttachError::UnrecognizedImage)?;
        self.attach(image, kind, slot, start_page)
    }

    pub fn attach_ram(&mut self, size: u32, slot: SlotId, start_page: Page) -> Result<MapperHandle, AttachError> {
        let options = AttachOptions { ram_size: size, ..self.attach_options };
        let image = RomImage::from_bytes("ram", Vec::new());
        self.attach_with_options(&image, MapperKind::PlainRam, slot, start_page, &options)
    }

    pub fn attach_with_options(
        &mut self,
        image: &RomImage,
        kind: MapperKind,
        slot: SlotId,
        start_page: Page,
        options: &AttachOptions,
    ) -> Result<MapperHandle, AttachError> {
        let mapper = new_mapper(kind, image, options)?;
        let page_count = mapper.page_count();
        if usize::from(start_page.to_u8()) + usize::from(page_count) > PAGE_COUNT {
            return Err(AttachError::PageRangeOutOfBounds { start_page, page_count });
        }

        let placement = Placement { slot, start_page, page_count };
        if let Some(page) = placement.pages().find(|&page| !self.page_table.binding(slot, page).is_unmapped()) {
            return Err(AttachError::SlotOccupied { slot, page });
        }

        let mut memory = mapper.allocate(image);
        let persistence_key = mapper.nonvolatile().map(|nonvolatile| {
            let key = image.persistence_key(nonvolatile.suffix);
            let region = memory.region_mut(nonvolatile.region);
            match self.save_store.load(&key, region.as_mut_slice()) {
                Ok(true) => info!("Restored non-volatile storage from '{key}'."),
                Ok(false) => {}
                Err(err) => warn!("{err} Starting with default contents."),
            }

            key
        });

        info!(
            "Attaching '{}' ({} bytes, CRC32 {:08X}) as {kind} in slot {slot} at {start_page}.",
            image.name(), image.size(), image.crc(),
        );

        let handle = self.mappers.insert(AttachedMapper {
            mapper,
            memory,
            placement,
            image_name: image.name().to_owned(),
            persistence_key,
        });
        self.with_mapper(handle, |mapper, ctx| mapper.map_pages(ctx));
        Ok(handle)
    }

    // Removes a mapper, persisting its non-volatile storage first. Returns false for a handle
    // that is no longer attached.
    pub fn detach(&mut self, handle: MapperHandle) -> bool {
        let Some(attached) = self.mappers.get_mut(handle) else {
            return false;
        };

        attached.mapper.cancel_pending_events();
        if let (Some(nonvolatile), Some(key)) = (attached.mapper.nonvolatile(), &attached.persistence_key) {
            let data = attached.memory.region(nonvolatile.region).as_slice();
            match self.save_store.save(key, data) {
                Ok(()) => info!("Saved non-volatile storage to '{key}'."),
                Err(err) => warn!("{err} Contents are lost."),
            }
        }

        let unbound = self.page_table.unbind_owner(handle);
        if self.write_zero_hook == Some(handle) {
            self.write_zero_hook = None;
        }

        if let Some(attached) = self.mappers.remove(handle) {
            info!("Detached '{}' ({unbound} pages) from slot {}.", attached.image_name, attached.placement.slot);
        }

        true
    }

    // Detaches everything, persisting non-volatile storage along the way.
    pub fn shutdown(&mut self) {
        for handle in self.mappers.handles() {
            self.detach(handle);
        }
    }

    // A machine reset: every mapper returns to its power-on banks, and every slot selection
    // returns to slot 0.
    pub fn reset(&mut self) {
        for handle in self.mappers.handles() {
            self.with_mapper(handle, |mapper, ctx| {
                mapper.power_on();
                mapper.map_pages(ctx);
            });
        }

        self.selector.restore(&mut self.page_table, 0, [0; SLOT_COUNT]);
    }

    // Moves the machine's clock forward, letting devices complete any operations that were
    // waiting on it.
    pub fn advance_to(&mut self, cycle: u64) {
        self.cycle = cycle;
        for handle in self.mappers.handles() {
            self.with_mapper(handle, |mapper, ctx| mapper.on_cycle(ctx, cycle));
        }
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    // Routes every write to address 0 to the mapper, ahead of the normal page dispatch. Returns
    // false if the handle is stale.
    pub fn set_write_zero_hook(&mut self, handle: MapperHandle) -> bool {
        if self.mappers.get(handle).is_none() {
            return false;
        }

        self.write_zero_hook = Some(handle);
        true
    }

    pub fn clear_write_zero_hook(&mut self) {
        self.write_zero_hook = None;
    }

    pub fn write_zero_hook(&self) -> Option<MapperHandle> {
        self.write_zero_hook
    }

    pub fn select_primary(&mut self, quadrant: Quadrant, primary: u8) {
        self.selector.select_primary(&mut self.page_table, quadrant, primary);
    }

    pub fn write_primary_slot_register(&mut self, value: u8) {
        self.selector.write_primary_slot_register(&mut self.page_table, value);
    }

    pub fn primary_slot_register(&self) -> u8 {
        self.selector.primary_slot_register()
    }

    pub fn set_subslotted(&mut self, primary: u8, subslotted: bool) {
        self.selector.set_subslotted(&mut self.page_table, primary, subslotted);
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    pub fn slot_selector(&self) -> &SlotSelector {
        &self.selector
    }

    // Bumped whenever any active page changes.
    pub fn revision(&self) -> u64 {
        self.page_table.revision()
    }

    pub fn is_attached(&self, handle: MapperHandle) -> bool {
        self.mappers.get(handle).is_some()
    }

    pub fn attached_handles(&self) -> Vec<MapperHandle> {
        self.mappers.handles()
    }

    pub fn mapper(&self, handle: MapperHandle) -> Option<&dyn Mapper> {
        self.mappers.get(handle).map(|attached| attached.mapper.as_ref())
    }

    pub fn mapper_kind(&self, handle: MapperHandle) -> Option<MapperKind> {
        self.mapper(handle).map(|mapper| mapper.kind())
    }

    pub fn placement(&self, handle: MapperHandle) -> Option<Placement> {
        self.mappers.get(handle).map(|attached| attached.placement)
    }

    pub fn cartridge_memory(&self, handle: MapperHandle) -> Option<&CartridgeMemory> {
        self.mappers.get(handle).map(|attached| &attached.memory)
    }

    pub fn persistence_key(&self, handle: MapperHandle) -> Option<&str> {
        self.mappers.get(handle).and_then(|attached| attached.persistence_key.as_deref())
    }

    // One line per page: which slot is visible there and what it resolves to.
    pub fn slot_map_summary(&self) -> String {
        Page::all()
            .map(|page| {
                let slot = self.page_table.active_slot(page);
                let binding = self.page_table.active(page);
                let owner = match binding.owner().and_then(|owner| self.mappers.get(owner).map(|a| (owner, a))) {
                    Some((owner, attached)) => format!("{} {owner} '{}'", attached.mapper.kind(), attached.image_name),
                    None => "-".to_owned(),
                };
                let access = [
                    if binding.is_readable() { 'r' } else { '-' },
                    if binding.is_writable() { 'w' } else { '-' },
                    if binding.device().is_some() { 'd' } else { '-' },
                ].iter().collect::<String>();
                format!("{page} {:04X} slot {slot} {access} {owner}", page.start_address())
            })
            .join("\n")
    }

    // Registers, slot selection and every mapper's volatile storage. Page bindings aren't part of
    // the state, they are rebuilt from it.
    pub fn save_state(&self) -> StateRecord {
        let mut record = StateRecord::new(MACHINE_TAG);
        record.set_u64("cycle", self.cycle);
        record.set_u8("primary_slots", self.selector.primary_slot_register());
        let subslot_registers: Vec<u8> = (0..SLOT_COUNT as u8)
            .map(|primary| self.selector.subslot_register(primary))
            .collect();
        record.set_bytes("subslot_registers", &subslot_registers);

        for (i, handle) in self.mappers.handles().into_iter().enumerate() {
            if let Some(attached) = self.mappers.get(handle) {
                record.set_child(&format!("cartridge{i}"), Self::save_cartridge(attached));
            }
        }

        record
    }

    // Restores a state saved with the same cartridges attached in the same places.
    pub fn load_state(&mut self, record: &StateRecord) -> Result<(), StateError> {
        record.expect_tag(MACHINE_TAG)?;
        let cycle = record.u64("cycle")?;
        let primary_slots = record.u8("primary_slots")?;
        let subslot_registers: [u8; SLOT_COUNT] = record.byte_array("subslot_registers")?;

        let handles = self.mappers.handles();
        let cartridge_count = record.children().count();
        if cartridge_count != handles.len() {
            return Err(StateError::MapperMismatch { expected: handles.len(), found: cartridge_count });
        }

        // Everything that can fail is checked before any cartridge changes.
        let mut staged = Vec::new();
        for (i, &handle) in handles.iter().enumerate() {
            let cartridge = record.child(&format!("cartridge{i}"))?;
            let Some(attached) = self.mappers.get(handle) else { continue };
            Self::check_cartridge(attached, cartridge)?;
            let mapper_state = cartridge.child("mapper")?;
            let ram = cartridge.bytes_of_len("ram", attached.memory.ram().as_slice().len())?;
            let rom = match cartridge.bytes("rom") {
                Ok(_) => Some(cartridge.bytes_of_len("rom", attached.memory.rom().as_slice().len())?),
                Err(_) => None,
            };

            staged.push(StagedCartridge { handle, previous: attached.mapper.save_state(), mapper_state, ram, rom });
        }

        // Mapper registers are the only part left that can reject a state. A mapper that fails
        // takes every earlier mapper back to where it was.
        for (loaded, cartridge) in staged.iter().enumerate() {
            let Some(attached) = self.mappers.get_mut(cartridge.handle) else { continue };
            if let Err(err) = attached.mapper.load_state(cartridge.mapper_state) {
                warn!("Save state rejected by {}: {err}", attached.mapper.kind());
                for earlier in &staged[..=loaded] {
                    if let Some(attached) = self.mappers.get_mut(earlier.handle)
                        && let Err(rollback_err) = attached.mapper.load_state(&earlier.previous) {
                        warn!("{} couldn't return to its previous state: {rollback_err}", attached.mapper.kind());
                    }
                }

                return Err(err);
            }
        }

        for cartridge in &staged {
            let Some(attached) = self.mappers.get_mut(cartridge.handle) else { continue };
            attached.memory.ram_mut().copy_from(cartridge.ram);
            if let Some(rom) = cartridge.rom {
                attached.memory.rom_mut().copy_from(rom);
            }
        }

        self.cycle = cycle;
        for handle in handles {
            self.with_mapper(handle, |mapper, ctx| mapper.map_pages(ctx));
        }

        self.selector.restore(&mut self.page_table, primary_slots, subslot_registers);
        Ok(())
    }

    pub fn save_state_blob(&self) -> Vec<u8> {
        self.save_state().to_blob()
    }

    pub fn load_state_blob(&mut self, blob: &[u8]) -> Result<(), StateError> {
        let record = StateRecord::from_blob(blob)?;
        self.load_state(&record)
    }

    fn save_cartridge(attached: &AttachedMapper) -> StateRecord {
        let mut record = StateRecord::new(CARTRIDGE_TAG);
        record.set_bytes("kind", attached.mapper.kind().name().as_bytes());
        record.set_u8("primary", attached.placement.slot.primary());
        record.set_u8("sub", attached.placement.slot.sub());
        record.set_u8("start_page", attached.placement.start_page.to_u8());
        record.set_bytes("ram", attached.memory.ram().as_slice());
        // Flash contents are the only ROM that can change.
        if attached.mapper.nonvolatile().is_some_and(|nonvolatile| nonvolatile.region == Region::Rom) {
            record.set_bytes("rom", attached.memory.rom().as_slice());
        }

        record.set_child("mapper", attached.mapper.save_state());
        record
    }

    fn check_cartridge(attached: &AttachedMapper, record: &StateRecord) -> Result<(), StateError> {
        record.expect_tag(CARTRIDGE_TAG)?;
        let expected_kind = attached.mapper.kind().name();
        let found_kind = String::from_utf8_lossy(record.bytes("kind")?).into_owned();
        let placement = attached.placement;
        let primary = record.u8("primary")?;
        let sub = record.u8("sub")?;
        let start_page = record.u8("start_page")?;
        let same_place = primary == placement.slot.primary()
            && sub == placement.slot.sub()
            && start_page == placement.start_page.to_u8();
        if found_kind != expected_kind || !same_place {
            return Err(StateError::CartridgeMismatch {
                expected: format!("{expected_kind} in slot {} at {}", placement.slot, placement.start_page),
                found: format!("{found_kind} in slot {primary}-{sub} at P{start_page}"),
            });
        }

        Ok(())
    }

    fn peek_device(&self, device: DeviceRef, address: u16) -> u8 {
        self.mappers.get(device.owner).map_or(UNMAPPED_BYTE, |attached| {
            let view = MapperView::new(&self.page_table, &attached.memory, attached.placement);
            attached.mapper.peek(&view, device.relative_address(address))
        })
    }

    fn with_mapper<R>(
        &mut self,
        handle: MapperHandle,
        f: impl FnOnce(&mut dyn Mapper, &mut MapperContext) -> R,
    ) -> Option<R> {
        let Self { page_table, mappers, cycle, .. } = self;
        let AttachedMapper { mapper, memory, placement, .. } = mappers.get_mut(handle)?;
        let mut ctx = MapperContext { table: page_table, memory, handle, placement: *placement, cycle: *cycle };
        Some(f(mapper.as_mut(), &mut ctx))
    }
}

impl Drop for MachineBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
pub mod test_data {
    use super::*;
    use crate::save::save_store::MemorySaveStore;

    // A machine with one cartridge in slot 1, and slot 1 visible in every quadrant.
    pub fn machine_with(kind: MapperKind, image: &RomImage, start_page: Page) -> (MachineBus, MapperHandle) {
        let mut bus = MachineBus::with_save_store(&MachineConfig::default(), Box::new(MemorySaveStore::new()));
        let handle = bus.attach(image, kind, SlotId::new(1, 0), start_page).unwrap();
        bus.write_primary_slot_register(0b01_01_01_01);
        (bus, handle)
    }
}
