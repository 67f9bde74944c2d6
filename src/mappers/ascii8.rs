use crate::mapper::*;

// ASCII 8KiB mapper, optionally with battery-backed SRAM (ASCII8 SRAM and Koei boards).
//
// 0x4000 - 0x5FFF: window 0
// 0x6000 - 0x7FFF: window 1; writes select banks:
//   0x6000 - 0x67FF: window 0
//   0x6800 - 0x6FFF: window 1
//   0x7000 - 0x77FF: window 2
//   0x7800 - 0x7FFF: window 3
// 0x8000 - 0x9FFF: window 2
// 0xA000 - 0xBFFF: window 3
//
// On SRAM boards, a bank value with any bit above the ROM bank mask selects SRAM instead of ROM.
// SRAM can only be written through windows 2 and 3.
pub struct Ascii8 {
    kind: MapperKind,
    rom_banks: BankConfiguration,
    sram_banks: Option<BankConfiguration>,
    registers: [u8; 4],
}

const SRAM_WRITABLE_WINDOWS: [bool; 4] = [false, false, true, true];

impl Ascii8 {
    pub fn new(kind: MapperKind, image: &RomImage) -> Result<Ascii8, AttachError> {
        check_image(image, PAGE_SIZE, 256 * PAGE_SIZE)?;
        let sram_size = match kind {
            MapperKind::Ascii8 => None,
            MapperKind::Ascii8Sram | MapperKind::KoeiSram8 => Some(8 * KIBIBYTE),
            MapperKind::KoeiSram32 => Some(32 * KIBIBYTE),
            _ => unreachable!("{kind} is not an ASCII8 board."),
        };

        Ok(Ascii8 {
            kind,
            rom_banks: BankConfiguration::for_region(PAGE_SIZE, image.size().next_power_of_two()),
            sram_banks: sram_size.map(|size| BankConfiguration::for_region(PAGE_SIZE, size)),
            registers: [0; 4],
        })
    }

    fn rom_mask(&self) -> u8 {
        self.rom_banks.mask() as u8
    }

    fn shows_sram(&self, window: usize) -> bool {
        self.sram_banks.is_some() && self.registers[window] & !self.rom_mask() != 0
    }

    fn set_bank(&mut self, ctx: &mut MapperContext, window: usize, value: u8) {
        // Unconnected bits are dropped, but the SRAM select bits survive.
        let value = if self.sram_banks.is_some() { value } else { value & self.rom_mask() };
        if self.registers[window] != value {
            debug!(target: BANK_SWITCH_TARGET, "{}: window {window} = {value:02X}", self.kind);
            self.registers[window] = value;
            self.map_window(ctx, window);
        }
    }

    fn map_window(&self, ctx: &mut MapperContext, window: usize) {
        let mapping = match self.sram_banks {
            Some(sram_banks) if self.shows_sram(window) => {
                let offset = sram_banks.start_of(BankIndex::from_u8(self.registers[window]));
                let mapping = PageMapping::ram(offset, PAGE_SIZE).with_write_handler();
                if SRAM_WRITABLE_WINDOWS[window] { mapping } else { mapping.read_only() }
            }
            _ => {
                let offset = self.rom_banks.start_of(BankIndex::from_u8(self.registers[window]));
                PageMapping::rom(offset).with_write_handler()
            }
        };

        ctx.map(window as u8, mapping);
    }
}

impl Mapper for Ascii8 {
    fn kind(&self) -> MapperKind {
        self.kind
    }

    fn allocate(&self, image: &RomImage) -> CartridgeMemory {
        let rom_size = u32::from(self.rom_banks.bank_count()) * PAGE_SIZE;
        let sram_size = self.sram_banks.map_or(0, |banks| u32::from(banks.bank_count()) * PAGE_SIZE);
        CartridgeMemory::new(image.data().mirrored_to(rom_size), RawMemory::filled(sram_size, 0xFF))
    }

    fn map_pages(&self, ctx: &mut MapperContext) {
        for window in 0..4 {
            self.map_window(ctx, window);
        }
    }

    fn write(&mut self, ctx: &mut MapperContext, address: u16, value: u8) {
        match address {
            0x2000..=0x3FFF => {
                let window = usize::from((address >> 11) & 0b11);
                self.set_bank(ctx, window, value);
            }
            // Writes to SRAM that is mapped writable never get here.
            _ => { /* Do nothing. */ }
        }
    }

    fn power_on(&mut self) {
        self.registers = [0; 4];
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
        self.sram_banks.map(|_| Nonvolatile::SRAM)
    }
}
