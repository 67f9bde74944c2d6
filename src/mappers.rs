pub mod ascii8;
pub mod ascii16;
pub mod konami4;
pub mod konami_scc;
pub mod mega_flash_rom_scc;
pub mod plain_ram;
pub mod plain_rom;
pub mod serial_eeprom_rom;
