use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::cartridge::attach_error::AttachError;
use crate::cartridge::rom_image::RomImage;
use crate::chips::serial_eeprom::{Organization, DEFAULT_PROGRAM_CYCLES};
use crate::mapper::Mapper;
use crate::mappers as m;

// Every supported cartridge board. Names parse case-insensitively, including the names common
// ROM databases use.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Display, EnumIter, EnumString, IntoStaticStr)]
#[strum(ascii_case_insensitive)]
pub enum MapperKind {
    #[strum(to_string = "Normal", serialize = "plain", serialize = "standard")]
    PlainRom,
    #[strum(to_string = "Mirrored")]
    MirroredRom,
    #[strum(to_string = "RAM", serialize = "ramNormal")]
    PlainRam,
    #[strum(to_string = "ASCII8")]
    Ascii8,
    #[strum(to_string = "ASCII8SRAM8", serialize = "ascii8sram")]
    Ascii8Sram,
    #[strum(to_string = "KoeiSRAM8", serialize = "koei")]
    KoeiSram8,
    #[strum(to_string = "KoeiSRAM32")]
    KoeiSram32,
    #[strum(to_string = "ASCII16")]
    Ascii16,
    #[strum(to_string = "ASCII16SRAM2", serialize = "ascii16sram")]
    Ascii16Sram,
    #[strum(to_string = "Konami", serialize = "konami4")]
    Konami4,
    #[strum(to_string = "KonamiSCC", serialize = "konami5", serialize = "scc")]
    KonamiScc,
    #[strum(to_string = "MegaFlashRomScc", serialize = "megaflashromscc")]
    MegaFlashRomScc,
    #[strum(to_string = "Manbow2")]
    Manbow2,
    #[strum(to_string = "EEPROM93C76", serialize = "93c76")]
    SerialEeprom93C76,
    #[strum(to_string = "EEPROM93C86", serialize = "93c86")]
    SerialEeprom93C86,
}

impl MapperKind {
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn all() -> impl Iterator<Item = MapperKind> {
        MapperKind::iter()
    }
}

// Settings that some boards need beyond the image itself.
#[derive(Clone, Copy, Debug)]
pub struct AttachOptions {
    // Overrides how many pages an unbanked ROM covers.
    pub page_count: Option<u8>,
    pub ram_size: u32,
    pub eeprom_program_cycles: u64,
    // Whether the EEPROM's ORG pin selects 8-bit or 16-bit words.
    pub eeprom_organization: Organization,
}

impl Default for AttachOptions {
    fn default() -> Self {
        Self {
            page_count: None,
            ram_size: 64 * 1024,
            eeprom_program_cycles: DEFAULT_PROGRAM_CYCLES,
            eeprom_organization: Organization::Bits8,
        }
    }
}

pub fn new_mapper(kind: MapperKind, image: &RomImage, options: &AttachOptions) -> Result<Box<dyn Mapper>, AttachError> {
    use MapperKind::*;
    Ok(match kind {
        PlainRom => Box::new(m::plain_rom::PlainRom::new(image, options.page_count)?),
        MirroredRom => Box::new(m::plain_rom::PlainRom::mirrored(image)?),
        PlainRam => Box::new(m::plain_ram::PlainRam::new(options.ram_size)?),
        Ascii8 | Ascii8Sram | KoeiSram8 | KoeiSram32 => Box::new(m::ascii8::Ascii8::new(kind, image)?),
        Ascii16 | Ascii16Sram => Box::new(m::ascii16::Ascii16::new(kind, image)?),
        Konami4 => Box::new(m::konami4::Konami4::new(image)?),
        KonamiScc => Box::new(m::konami_scc::KonamiScc::new(image)?),
        MegaFlashRomScc | Manbow2 => Box::new(m::mega_flash_rom_scc::MegaFlashRomScc::new(kind, image)?),
        SerialEeprom93C76 | SerialEeprom93C86 =>
            Box::new(m::serial_eeprom_rom::SerialEepromRom::new(kind, image, options)?),
    })
}

pub fn parse_mapper_kind(name: &str) -> Result<MapperKind, AttachError> {
    name.trim().parse().map_err(|_| AttachError::UnknownMapperKind(name.to_owned()))
}
