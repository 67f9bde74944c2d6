use crate::mapper::*;

// An unbanked ROM. Each page shows the matching 8KiB of the image; images smaller than the
// mapped range repeat.
pub struct PlainRom {
    kind: MapperKind,
    page_count: u8,
}

impl PlainRom {
    pub fn new(image: &RomImage, page_count: Option<u8>) -> Result<PlainRom, AttachError> {
        check_image(image, PAGE_SIZE, 8 * PAGE_SIZE)?;
        let image_pages = (image.size() / PAGE_SIZE) as u8;
        Ok(PlainRom { kind: MapperKind::PlainRom, page_count: page_count.unwrap_or(image_pages) })
    }

    // Fills the whole address space, for images that expect to appear everywhere.
    pub fn mirrored(image: &RomImage) -> Result<PlainRom, AttachError> {
        check_image(image, PAGE_SIZE, 8 * PAGE_SIZE)?;
        Ok(PlainRom { kind: MapperKind::MirroredRom, page_count: 8 })
    }
}

impl Mapper for PlainRom {
    fn kind(&self) -> MapperKind {
        self.kind
    }

    fn page_count(&self) -> u8 {
        self.page_count
    }

    fn map_pages(&self, ctx: &mut MapperContext) {
        let rom_size = ctx.rom().size();
        for page in 0..self.page_count {
            ctx.map(page, PageMapping::rom((u32::from(page) * PAGE_SIZE) % rom_size));
        }
    }

    fn write(&mut self, _ctx: &mut MapperContext, _address: u16, _value: u8) {
        // ROM. Do nothing.
    }

    fn power_on(&mut self) {}

    fn save_state(&self) -> StateRecord {
        StateRecord::new(self.kind.name())
    }

    fn load_state(&mut self, record: &StateRecord) -> Result<(), StateError> {
        record.expect_tag(self.kind.name())
    }
}
