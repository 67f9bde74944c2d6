use std::ops::RangeInclusive;

use crate::chips::serial_eeprom::{EepromModel, SerialEeprom};
use crate::mapper::*;
use crate::mapper_list::AttachOptions;

// The control register's 16 mirrors at the top of the second page.
const CONTROL_REGISTER: RangeInclusive<u16> = 0x3FF0..=0x3FFF;

// An unbanked ROM carrying a 93C76/93C86 serial EEPROM for configuration storage. The guest
// bit-bangs the EEPROM through a control register:
//   write: bit 0 data in, bit 1 clock, bit 2 chip select
//   read: bit 0 data out, all other bits high
pub struct SerialEepromRom {
    kind: MapperKind,
    page_count: u8,
    eeprom: SerialEeprom,
}

impl SerialEepromRom {
    pub fn new(kind: MapperKind, image: &RomImage, options: &AttachOptions) -> Result<SerialEepromRom, AttachError> {
        check_image(image, PAGE_SIZE, 4 * PAGE_SIZE)?;
        let model = match kind {
            MapperKind::SerialEeprom93C76 => EepromModel::C76,
            MapperKind::SerialEeprom93C86 => EepromModel::C86,
            _ => unreachable!("{kind} is not a serial EEPROM board."),
        };

        let image_pages = (image.size() / PAGE_SIZE) as u8;
        Ok(SerialEepromRom {
            kind,
            page_count: image_pages.max(2),
            eeprom: SerialEeprom::new(model, options.eeprom_organization, options.eeprom_program_cycles),
        })
    }

    pub fn eeprom(&self) -> &SerialEeprom {
        &self.eeprom
    }

    fn control_register(&self) -> u8 {
        0xFE | u8::from(self.eeprom.data_out())
    }
}

impl Mapper for SerialEepromRom {
    fn kind(&self) -> MapperKind {
        self.kind
    }

    fn page_count(&self) -> u8 {
        self.page_count
    }

    fn allocate(&self, image: &RomImage) -> CartridgeMemory {
        let rom_size = u32::from(self.page_count) * PAGE_SIZE;
        CartridgeMemory::new(image.data().mirrored_to(rom_size), RawMemory::filled(self.eeprom.size(), 0xFF))
    }

    fn map_pages(&self, ctx: &mut MapperContext) {
        for page in 0..self.page_count {
            let mapping = PageMapping::rom(u32::from(page) * PAGE_SIZE);
            // The page holding the control register must always reach the mapper.
            let mapping = if page == 1 { mapping.with_read_handler() } else { mapping };
            ctx.map(page, mapping);
        }
    }

    fn read(&mut self, ctx: &mut MapperContext, address: u16) -> u8 {
        self.peek(&ctx.view(), address)
    }

    fn peek(&self, view: &MapperView, address: u16) -> u8 {
        if CONTROL_REGISTER.contains(&address) {
            self.control_register()
        } else {
            view.peek_bound(address)
        }
    }

    fn write(&mut self, ctx: &mut MapperContext, address: u16, value: u8) {
        if CONTROL_REGISTER.contains(&address) {
            let cycle = ctx.cycle();
            self.eeprom.write_lines(ctx.ram_mut().as_mut_slice(), value, cycle);
        }
    }

    fn power_on(&mut self) {
        self.eeprom.reset();
    }

    fn save_state(&self) -> StateRecord {
        let mut record = StateRecord::new(self.kind.name());
        record.set_child("eeprom", self.eeprom.save_state());
        record
    }

    fn load_state(&mut self, record: &StateRecord) -> Result<(), StateError> {
        record.expect_tag(self.kind.name())?;
        self.eeprom.load_state(record.child("eeprom")?)
    }

    fn nonvolatile(&self) -> Option<Nonvolatile> {
        Some(Nonvolatile::EEPROM)
    }

    fn on_cycle(&mut self, _ctx: &mut MapperContext, cycle: u64) {
        self.eeprom.on_cycle(cycle);
    }

    fn cancel_pending_events(&mut self) {
        self.eeprom.cancel_pending();
    }
}
