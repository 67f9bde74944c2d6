use std::path::{Path, PathBuf};

use structopt::StructOpt;

use crate::mapper_list::{AttachOptions, MapperKind};
use crate::memory::slot_id::SLOT_COUNT;
use crate::save::save_store::{DirectorySaveStore, MemorySaveStore, SaveStore};

pub const MSX_CPU_FREQUENCY: u64 = 3_579_545;

// How long an EEPROM write cycle takes on the boards that carry one.
const EEPROM_PROGRAM_MICROSECONDS: u64 = 2_000;

#[derive(Clone, Debug)]
pub struct MachineConfig {
    // Which primary slots are expanded into four sub-slots.
    pub subslotted: [bool; SLOT_COUNT],
    // Where SRAM, flash and EEPROM contents are kept between sessions.
    pub save_directory: PathBuf,
    pub allow_saving: bool,
    pub cycles_per_second: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            subslotted: [false, false, false, true],
            save_directory: PathBuf::from("saves"),
            allow_saving: false,
            cycles_per_second: MSX_CPU_FREQUENCY,
        }
    }
}

impl MachineConfig {
    pub fn with_save_directory(mut self, directory: &Path) -> Self {
        self.save_directory = directory.to_path_buf();
        self.allow_saving = true;
        self
    }

    pub fn with_subslotted(mut self, primary: u8, subslotted: bool) -> Self {
        assert!(usize::from(primary) < SLOT_COUNT, "Primary slot {primary} out of range.");
        self.subslotted[usize::from(primary)] = subslotted;
        self
    }

    // Without permission to save, non-volatile storage still survives detach and re-attach, but
    // only for the life of the process.
    pub fn save_store(&self) -> Box<dyn SaveStore> {
        if self.allow_saving {
            Box::new(DirectorySaveStore::new(&self.save_directory))
        } else {
            Box::new(MemorySaveStore::new())
        }
    }

    pub fn attach_options(&self) -> AttachOptions {
        AttachOptions {
            eeprom_program_cycles: self.cycles_per_second * EEPROM_PROGRAM_MICROSECONDS / 1_000_000,
            ..AttachOptions::default()
        }
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "REMSX", about = "Inspects how an MSX cartridge maps into the slot layout.")]
pub struct Opt {
    #[structopt(name = "ROM", parse(from_os_str))]
    pub rom_path: PathBuf,

    // Guessed from the image when absent.
    #[structopt(short, long)]
    pub mapper: Option<MapperKind>,

    #[structopt(long, default_value = "1")]
    pub slot: u8,

    #[structopt(long, default_value = "0")]
    pub subslot: u8,

    #[structopt(long, default_value = "2")]
    pub page: u8,

    #[structopt(long, parse(from_os_str))]
    pub save_directory: Option<PathBuf>,

    #[structopt(long)]
    pub log_bank_switches: bool,

    #[structopt(long)]
    pub log_flash_commands: bool,

    #[structopt(long)]
    pub log_eeprom_protocol: bool,
}

impl Opt {
    pub fn machine_config(&self) -> MachineConfig {
        let mut config = MachineConfig::default();
        if let Some(directory) = &self.save_directory {
            config = config.with_save_directory(directory);
        }

        if usize::from(self.slot) < SLOT_COUNT && self.subslot > 0 {
            config = config.with_subslotted(self.slot, true);
        }

        config
    }
}
