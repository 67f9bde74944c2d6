use crate::mapper::*;

// Ordinary RAM. Every page is readable and writable through the fast path, so the mapper itself
// never sees an access.
pub struct PlainRam {
    size: u32,
}

impl PlainRam {
    pub fn new(size: u32) -> Result<PlainRam, AttachError> {
        if size == 0 {
            return Err(AttachError::EmptyImage);
        } else if size > 8 * PAGE_SIZE {
            return Err(AttachError::ImageTooLarge { size, max: 8 * PAGE_SIZE });
        } else if size % PAGE_SIZE != 0 {
            return Err(AttachError::BadImageSize { size, granularity: PAGE_SIZE });
        }

        Ok(PlainRam { size })
    }
}

impl Mapper for PlainRam {
    fn kind(&self) -> MapperKind {
        MapperKind::PlainRam
    }

    fn page_count(&self) -> u8 {
        (self.size / PAGE_SIZE) as u8
    }

    fn allocate(&self, _image: &RomImage) -> CartridgeMemory {
        CartridgeMemory::new(RawMemory::default(), RawMemory::new(self.size))
    }

    fn map_pages(&self, ctx: &mut MapperContext) {
        for page in 0..self.page_count() {
            ctx.map(page, PageMapping::ram(u32::from(page) * PAGE_SIZE, PAGE_SIZE));
        }
    }

    fn write(&mut self, _ctx: &mut MapperContext, _address: u16, _value: u8) {}

    fn power_on(&mut self) {}

    fn save_state(&self) -> StateRecord {
        StateRecord::new("PlainRam")
    }

    fn load_state(&mut self, record: &StateRecord) -> Result<(), StateError> {
        record.expect_tag("PlainRam")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineConfig;
    use crate::memory::machine_bus::MachineBus;

    #[test]
    fn size_limits() {
        assert_eq!(PlainRam::new(0).err(), Some(AttachError::EmptyImage));
        assert_eq!(
            PlainRam::new(9 * PAGE_SIZE).err(),
            Some(AttachError::ImageTooLarge { size: 9 * PAGE_SIZE, max: 8 * PAGE_SIZE }),
        );
        assert_eq!(
            PlainRam::new(PAGE_SIZE + 1).err(),
            Some(AttachError::BadImageSize { size: PAGE_SIZE + 1, granularity: PAGE_SIZE }),
        );
        assert_eq!(PlainRam::new(3 * PAGE_SIZE).map(|ram| ram.page_count()).ok(), Some(3));
        assert_eq!(PlainRam::new(8 * PAGE_SIZE).map(|ram| ram.page_count()).ok(), Some(8));
    }

    #[test]
    fn every_page_reads_back_what_was_written() {
        let mut bus = MachineBus::new(&MachineConfig::default());
        bus.attach_ram(2 * PAGE_SIZE, SlotId::new(2, 0), Page::new(4)).unwrap();
        bus.write_primary_slot_register(0b10_10_10_10);
        bus.write(0x8000, 0x11);
        bus.write(0xA000, 0x22);
        bus.write(0xBFFF, 0x33);
        assert_eq!(bus.read(0x8000), 0x11);
        assert_eq!(bus.read(0xA000), 0x22);
        assert_eq!(bus.read(0xBFFF), 0x33);
        assert_eq!(bus.read(0x8001), 0x00);

        bus.write(0xC000, 0x44);
        assert_eq!(bus.read(0xC000), UNMAPPED_BYTE);
        assert_eq!(bus.read(0x7FFF), UNMAPPED_BYTE);
    }
}
