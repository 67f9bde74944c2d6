use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};

pub fn init(logger: Logger) -> Result<(), SetLoggerError> {
    let max_level = logger.max_level;
    log::set_boxed_logger(Box::new(logger))
        .map(|()| log::set_max_level(max_level))
}

pub struct Logger {
    pub max_level: LevelFilter,
    pub log_bank_switches: bool,
    pub log_flash_commands: bool,
    pub log_eeprom_protocol: bool,
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            max_level: LevelFilter::Info,
            log_bank_switches: false,
            log_flash_commands: false,
            log_eeprom_protocol: false,
        }
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if metadata.level() > self.max_level {
            return false;
        }

        match metadata.target() {
            "" => true,
            BANK_SWITCH_TARGET => self.log_bank_switches,
            FLASH_TARGET => self.log_flash_commands,
            EEPROM_TARGET => self.log_eeprom_protocol,
            target => {
                let chunks: Vec<&str> = target.split("::").collect();
                // Embedders bring their own crates; only ours are on by default.
                matches!(chunks[..], ["remsx", ..])
            }
        }
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            if record.level() < Level::Info {
                print!("{} - ", record.level());
            }

            println!("{}", record.args());
        }
    }

    fn flush(&self) {}
}

pub const BANK_SWITCH_TARGET: &str = "bankswitch";
pub const FLASH_TARGET: &str = "flash";
pub const EEPROM_TARGET: &str = "eeprom";
