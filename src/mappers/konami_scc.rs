use std::ops::RangeInclusive;

use crate::chips::scc::{SccRegisterFile, WaveSoundChip};
use crate::mapper::*;

// Konami 8KiB mapper with an SCC wave-table sound chip (a.k.a. Konami5).
//
// 0x4000 - 0x5FFF: window 0, bank select at 0x5000 - 0x57FF
// 0x6000 - 0x7FFF: window 1, bank select at 0x7000 - 0x77FF
// 0x8000 - 0x9FFF: window 2, bank select at 0x9000 - 0x97FF
//   0x9800 - 0x9FFF: SCC registers, while enabled
// 0xA000 - 0xBFFF: window 3, bank select at 0xB000 - 0xB7FF
//
// Writing a value whose low six bits are all set to window 2's select enables the SCC.
pub struct KonamiScc {
    rom_banks: BankConfiguration,
    registers: [u8; 4],
    scc_enabled: bool,
    scc: Box<dyn WaveSoundChip>,
}

pub const POWER_ON_REGISTERS: [u8; 4] = [0, 1, 2, 3];
pub const SCC_WINDOW: usize = 2;
pub const SCC_REGISTERS: RangeInclusive<u16> = 0x5800..=0x5FFF;

// Which window a Konami5-style bank select address selects for.
pub fn bank_select_window(address: u16) -> Option<usize> {
    (address & 0x1800 == 0x1000).then_some(usize::from(address >> 13) & 0b11)
}

pub fn enables_scc(value: u8) -> bool {
    value & 0x3F == 0x3F
}

impl KonamiScc {
    pub fn new(image: &RomImage) -> Result<KonamiScc, AttachError> {
        KonamiScc::with_sound_chip(image, Box::new(SccRegisterFile::new()))
    }

    pub fn with_sound_chip(image: &RomImage, scc: Box<dyn WaveSoundChip>) -> Result<KonamiScc, AttachError> {
        check_image(image, PAGE_SIZE, 256 * PAGE_SIZE)?;
        Ok(KonamiScc {
            rom_banks: BankConfiguration::for_region(PAGE_SIZE, image.size().next_power_of_two()),
            registers: POWER_ON_REGISTERS,
            scc_enabled: false,
            scc,
        })
    }

    pub fn is_scc_enabled(&self) -> bool {
        self.scc_enabled
    }

    fn map_window(&self, ctx: &mut MapperContext, window: usize) {
        let start = self.rom_banks.start_of(BankIndex::from_u8(self.registers[window]));
        let mapping = PageMapping::rom(start).with_write_handler();
        // The SCC overlays the ROM, so reads must always reach the mapper while it's on.
        let mapping = if window == SCC_WINDOW && self.scc_enabled { mapping.with_read_handler() } else { mapping };
        ctx.map(window as u8, mapping);
    }

    fn in_scc_registers(&self, address: u16) -> bool {
        self.scc_enabled && SCC_REGISTERS.contains(&address)
    }
}

impl Mapper for KonamiScc {
    fn kind(&self) -> MapperKind {
        MapperKind::KonamiScc
    }

    fn map_pages(&self, ctx: &mut MapperContext) {
        for window in 0..4 {
            self.map_window(ctx, window);
        }
    }

    fn read(&mut self, ctx: &mut MapperContext, address: u16) -> u8 {
        if self.in_scc_registers(address) {
            self.scc.read(address as u8)
        } else {
            ctx.view().peek_bound(address)
        }
    }

    fn peek(&self, view: &MapperView, address: u16) -> u8 {
        if self.in_scc_registers(address) {
            self.scc.peek(address as u8)
        } else {
            view.peek_bound(address)
        }
    }

    fn write(&mut self, ctx: &mut MapperContext, address: u16, value: u8) {
        if self.in_scc_registers(address) {
            self.scc.write(address as u8, value);
            return;
        }

        let Some(window) = bank_select_window(address) else {
            return;
        };

        let masked = value & self.rom_banks.mask() as u8;
        let mut changed = self.registers[window] != masked;
        self.registers[window] = masked;
        if window == SCC_WINDOW {
            let scc_enabled = enables_scc(value);
            changed |= self.scc_enabled != scc_enabled;
            self.scc_enabled = scc_enabled;
        }

        if changed {
            debug!(target: BANK_SWITCH_TARGET, "KonamiSCC: window {window} = {masked:02X}, SCC {}",
                if self.scc_enabled { "on" } else { "off" });
            self.map_window(ctx, window);
        }
    }

    fn power_on(&mut self) {
        self.registers = POWER_ON_REGISTERS;
        self.scc_enabled = false;
        self.scc.reset();
    }

    fn save_state(&self) -> StateRecord {
        let mut record = StateRecord::new(MapperKind::KonamiScc.name());
        save_registers(&mut record, &self.registers);
        record.set_bool("scc_enabled", self.scc_enabled);
        record.set_child("scc", self.scc.save_state());
        record
    }

    fn load_state(&mut self, record: &StateRecord) -> Result<(), StateError> {
        record.expect_tag(MapperKind::KonamiScc.name())?;
        let registers = load_registers(record)?;
        let scc_enabled = record.bool("scc_enabled")?;
        self.scc.load_state(record.child("scc")?)?;
        self.registers = registers;
        self.scc_enabled = scc_enabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bank_select_decoding() {
        assert_eq!(bank_select_window(0x1000), Some(0));
        assert_eq!(bank_select_window(0x17FF), Some(0));
        assert_eq!(bank_select_window(0x1800), None);
        assert_eq!(bank_select_window(0x3000), Some(1));
        assert_eq!(bank_select_window(0x5400), Some(2));
        assert_eq!(bank_select_window(0x7000), Some(3));
        assert_eq!(bank_select_window(0x6000), None);
    }

    #[test]
    fn scc_enable_pattern() {
        assert!(enables_scc(0x3F));
        assert!(enables_scc(0xFF));
        assert!(!enables_scc(0x3E));
    }
}
