use crate::mapper::*;

const BANK_SIZE: u32 = 16 * KIBIBYTE;
const SRAM_SIZE: u32 = 2 * KIBIBYTE;

// ASCII 16KiB mapper, optionally with 2KiB of SRAM (ASCII16 SRAM boards).
//
// 0x4000 - 0x7FFF: window 0
//   0x6000 - 0x6FFF: writes select window 0's bank
//   0x7000 - 0x7FFF: writes select window 1's bank
// 0x8000 - 0xBFFF: window 1
//
// On SRAM boards, any bit above the ROM bank mask selects SRAM, which mirrors across the
// whole window. SRAM can only be written through window 1.
pub struct Ascii16 {
    kind: MapperKind,
    rom_banks: BankConfiguration,
    has_sram: bool,
    registers: [u8; 2],
}

impl Ascii16 {
    pub fn new(kind: MapperKind, image: &RomImage) -> Result<Ascii16, AttachError> {
        check_image(image, BANK_SIZE, 256 * BANK_SIZE)?;
        let has_sram = match kind {
            MapperKind::Ascii16 => false,
            MapperKind::Ascii16Sram => true,
            _ => unreachable!("{kind} is not an ASCII16 board."),
        };

        Ok(Ascii16 {
            kind,
            rom_banks: BankConfiguration::for_region(BANK_SIZE, image.size().next_power_of_two()),
            has_sram,
            registers: [0; 2],
        })
    }

    fn rom_mask(&self) -> u8 {
        self.rom_banks.mask() as u8
    }

    fn shows_sram(&self, window: usize) -> bool {
        self.has_sram && self.registers[window] & !self.rom_mask() != 0
    }

    fn map_window(&self, ctx: &mut MapperContext, window: usize) {
        let first_page = 2 * window as u8;
        if self.shows_sram(window) {
            let mapping = PageMapping::ram(0, SRAM_SIZE).with_write_handler();
            let mapping = if window == 1 { mapping } else { mapping.read_only() };
            ctx.map(first_page, mapping);
            ctx.map(first_page + 1, mapping);
        } else {
            let start = self.rom_banks.start_of(BankIndex::from_u8(self.registers[window]));
            ctx.map(first_page, PageMapping::rom(start).with_write_handler());
            ctx.map(first_page + 1, PageMapping::rom(start + PAGE_SIZE).with_write_handler());
        }
    }
}

impl Mapper for Ascii16 {
    fn kind(&self) -> MapperKind {
        self.kind
    }

    fn allocate(&self, image: &RomImage) -> CartridgeMemory {
        let rom_size = u32::from(self.rom_banks.bank_count()) * BANK_SIZE;
        let sram_size = if self.has_sram { SRAM_SIZE } else { 0 };
        CartridgeMemory::new(image.data().mirrored_to(rom_size), RawMemory::filled(sram_size, 0xFF))
    }

    fn map_pages(&self, ctx: &mut MapperContext) {
        self.map_window(ctx, 0);
        self.map_window(ctx, 1);
    }

    fn write(&mut self, ctx: &mut MapperContext, address: u16, value: u8) {
        let window = match address {
            0x2000..=0x2FFF => 0,
            0x3000..=0x3FFF => 1,
            _ => return,
        };

        let value = if self.has_sram { value } else { value & self.rom_mask() };
        if self.registers[window] != value {
            debug!(target: BANK_SWITCH_TARGET, "{}: window {window} = {value:02X}", self.kind);
            self.registers[window] = value;
            self.map_window(ctx, window);
        }
    }

    fn power_on(&mut self) {
        self.registers = [0; 2];
    }

    fn save_state(&self) -> StateRecord {
        let mut record = StateRecord::new(self.kind.name());
        save_registers(&mut record, &self.registers);
        record
    }

    fn load_state(&mut self, record: &StateRecord) -> Result<(), StateError> {
        record.expect_tag(self.kind.name())?;
        self.registers = load_registers(record)?;
        Ok(())
    }

    fn nonvolatile(&self) -> Option<Nonvolatile> {
        self.has_sram.then_some(Nonvolatile::SRAM)
    }
}
