use crate::mapper::*;

// Konami 8KiB mapper without a sound chip. The first window is hard-wired to bank 0.
//
// 0x4000 - 0x5FFF: window 0, always bank 0
// 0x6000 - 0x7FFF: window 1, writes select its bank
// 0x8000 - 0x9FFF: window 2, writes select its bank
// 0xA000 - 0xBFFF: window 3, writes select its bank
pub struct Konami4 {
    rom_banks: BankConfiguration,
    registers: [u8; 4],
}

const POWER_ON_REGISTERS: [u8; 4] = [0, 1, 2, 3];

impl Konami4 {
    pub fn new(image: &RomImage) -> Result<Konami4, AttachError> {
        check_image(image, PAGE_SIZE, 256 * PAGE_SIZE)?;
        Ok(Konami4 {
            rom_banks: BankConfiguration::for_region(PAGE_SIZE, image.size().next_power_of_two()),
            registers: POWER_ON_REGISTERS,
        })
    }
}

impl Mapper for Konami4 {
    fn kind(&self) -> MapperKind {
        MapperKind::Konami4
    }

    fn map_pages(&self, ctx: &mut MapperContext) {
        for (window, &bank) in self.registers.iter().enumerate() {
            let start = self.rom_banks.start_of(BankIndex::from_u8(bank));
            ctx.map(window as u8, PageMapping::rom(start).with_write_handler());
        }
    }

    fn write(&mut self, ctx: &mut MapperContext, address: u16, value: u8) {
        let window = match address {
            0x2000..=0x7FFF => usize::from(address >> 13),
            _ => return,
        };

        let value = value & self.rom_banks.mask() as u8;
        if self.registers[window] != value {
            debug!(target: BANK_SWITCH_TARGET, "Konami4: window {window} = {value:02X}");
            self.registers[window] = value;
            let start = self.rom_banks.start_of(BankIndex::from_u8(value));
            ctx.map(window as u8, PageMapping::rom(start).with_write_handler());
        }
    }

    fn power_on(&mut self) {
        self.registers = POWER_ON_REGISTERS;
    }

    fn save_state(&self) -> StateRecord {
        let mut record = StateRecord::new(MapperKind::Konami4.name());
        save_registers(&mut record, &self.registers);
        record
    }

    fn load_state(&mut self, record: &StateRecord) -> Result<(), StateError> {
        record.expect_tag(MapperKind::Konami4.name())?;
        let registers: [u8; 4] = load_registers(record)?;
        if registers[0] != 0 {
            return Err(StateError::BadValue { key: "banks".to_owned(), value: registers[0].into() });
        }

        self.registers = registers;
        Ok(())
    }
}
