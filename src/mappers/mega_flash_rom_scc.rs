use crate::chips::amd_flash::{AmdFlash, FlashMode};
use crate::chips::scc::{SccRegisterFile, WaveSoundChip};
use crate::mapper::*;
use crate::mappers::konami_scc::{bank_select_window, enables_scc, POWER_ON_REGISTERS, SCC_REGISTERS, SCC_WINDOW};

// Manbow 2 keeps its game in the first seven sectors and saves in the last one.
const MANBOW2_WRITE_PROTECT: u64 = 0b0111_1111;

// Konami SCC style banking over an AMD flash chip instead of a mask ROM. Every write to the
// cartridge is also seen by the flash, at the address the current bank maps it to, so the guest
// can reprogram the cartridge in place.
pub struct MegaFlashRomScc {
    kind: MapperKind,
    flash: AmdFlash,
    flash_banks: BankConfiguration,
    registers: [u8; 4],
    scc_enabled: bool,
    scc: Box<dyn WaveSoundChip>,
}

impl MegaFlashRomScc {
    pub fn new(kind: MapperKind, image: &RomImage) -> Result<MegaFlashRomScc, AttachError> {
        check_image(image, PAGE_SIZE, AmdFlash::AM29F040B_SIZE)?;
        let write_protect = match kind {
            MapperKind::MegaFlashRomScc => 0,
            MapperKind::Manbow2 => MANBOW2_WRITE_PROTECT,
            _ => unreachable!("{kind} is not a flash SCC board."),
        };

        let flash = AmdFlash::am29f040b(write_protect);
        Ok(MegaFlashRomScc {
            kind,
            flash_banks: BankConfiguration::for_region(PAGE_SIZE, flash.size()),
            flash,
            registers: POWER_ON_REGISTERS,
            scc_enabled: false,
            scc: Box::new(SccRegisterFile::new()),
        })
    }

    pub fn flash_mode(&self) -> FlashMode {
        self.flash.mode()
    }

    fn flash_address(&self, address: u16) -> u32 {
        let window = usize::from(address >> 13) & 0b11;
        self.flash_banks.start_of(BankIndex::from_u8(self.registers[window])) + u32::from(address & 0x1FFF)
    }

    fn map_window(&self, ctx: &mut MapperContext, window: usize) {
        let start = self.flash_banks.start_of(BankIndex::from_u8(self.registers[window]));
        let mut mapping = PageMapping::rom(start).with_write_handler();
        if self.flash.mode() == FlashMode::Identify || (window == SCC_WINDOW && self.scc_enabled) {
            mapping = mapping.with_read_handler();
        }

        ctx.map(window as u8, mapping);
    }

    fn in_scc_registers(&self, address: u16) -> bool {
        self.scc_enabled && SCC_REGISTERS.contains(&address)
    }
}

impl Mapper for MegaFlashRomScc {
    fn kind(&self) -> MapperKind {
        self.kind
    }

    fn allocate(&self, image: &RomImage) -> CartridgeMemory {
        let mut flash = RawMemory::filled(self.flash.size(), 0xFF);
        flash.copy_from(image.bytes());
        CartridgeMemory::new(flash, RawMemory::default())
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
            self.peek(&ctx.view(), address)
        }
    }

    fn peek(&self, view: &MapperView, address: u16) -> u8 {
        if self.in_scc_registers(address) {
            self.scc.peek(address as u8)
        } else if self.flash.mode() == FlashMode::Identify {
            self.flash.peek(view.rom().as_slice(), self.flash_address(address))
        } else {
            view.peek_bound(address)
        }
    }

    fn write(&mut self, ctx: &mut MapperContext, address: u16, value: u8) {
        if self.in_scc_registers(address) {
            self.scc.write(address as u8, value);
        }

        let mode_before = self.flash.mode();
        let flash_address = self.flash_address(address);
        self.flash.write(ctx.rom_mut().as_mut_slice(), flash_address, value);
        let mut remap = self.flash.mode() != mode_before;

        if let Some(window) = bank_select_window(address) {
            let masked = value & self.flash_banks.mask() as u8;
            if self.registers[window] != masked {
                debug!(target: BANK_SWITCH_TARGET, "{}: window {window} = {masked:02X}", self.kind);
                self.registers[window] = masked;
                remap = true;
            }

            if window == SCC_WINDOW && self.scc_enabled != enables_scc(value) {
                self.scc_enabled = enables_scc(value);
                remap = true;
            }
        }

        if remap {
            self.map_pages(ctx);
        }
    }

    fn power_on(&mut self) {
        self.registers = POWER_ON_REGISTERS;
        self.scc_enabled = false;
        self.scc.reset();
        self.flash.reset();
    }

    fn save_state(&self) -> StateRecord {
        let mut record = StateRecord::new(self.kind.name());
        save_registers(&mut record, &self.registers);
        record.set_bool("scc_enabled", self.scc_enabled);
        record.set_child("scc", self.scc.save_state());
        record.set_child("flash", self.flash.save_state());
        record
    }

    fn load_state(&mut self, record: &StateRecord) -> Result<(), StateError> {
        record.expect_tag(self.kind.name())?;
        let registers = load_registers(record)?;
        let scc_enabled = record.bool("scc_enabled")?;
        self.scc.load_state(record.child("scc")?)?;
        self.flash.load_state(record.child("flash")?)?;
        self.registers = registers;
        self.scc_enabled = scc_enabled;
        Ok(())
    }

    fn nonvolatile(&self) -> Option<Nonvolatile> {
        Some(Nonvolatile::FLASH)
    }
}
