pub mod amd_flash;
pub mod scc;
pub mod serial_eeprom;
