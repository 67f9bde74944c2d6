use log::debug;

use crate::save::save_state::{StateError, StateRecord};
use crate::util::logger::FLASH_TARGET;

const MAX_COMMAND_LEN: usize = 6;
// Only the low address lines take part in command decoding.
const COMMAND_ADDRESS_MASK: u32 = 0x7FF;
const ABORT: u8 = 0xF0;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum FlashMode {
    Array,
    Identify,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum Command {
    Identify,
    Program,
    EraseSector,
    EraseChip,
}

#[derive(Clone, Copy)]
struct Step {
    address: Option<u32>,
    value: Option<u8>,
}

impl Step {
    const fn at(address: u32, value: u8) -> Self {
        Self { address: Some(address), value: Some(value) }
    }

    const fn anywhere(value: u8) -> Self {
        Self { address: None, value: Some(value) }
    }

    const ANY: Step = Step { address: None, value: None };

    fn matches(self, address: u32, value: u8) -> bool {
        self.address.is_none_or(|expected| address & COMMAND_ADDRESS_MASK == expected)
            && self.value.is_none_or(|expected| value == expected)
    }
}

const COMMANDS: [(Command, &[Step]); 4] = [
    (Command::Identify, &[Step::at(0x555, 0xAA), Step::at(0x2AA, 0x55), Step::at(0x555, 0x90)]),
    (Command::Program, &[Step::at(0x555, 0xAA), Step::at(0x2AA, 0x55), Step::at(0x555, 0xA0), Step::ANY]),
    (Command::EraseSector, &[
        Step::at(0x555, 0xAA), Step::at(0x2AA, 0x55), Step::at(0x555, 0x80),
        Step::at(0x555, 0xAA), Step::at(0x2AA, 0x55), Step::anywhere(0x30),
    ]),
    (Command::EraseChip, &[
        Step::at(0x555, 0xAA), Step::at(0x2AA, 0x55), Step::at(0x555, 0x80),
        Step::at(0x555, 0xAA), Step::at(0x2AA, 0x55), Step::at(0x555, 0x10),
    ]),
];

enum Match {
    Complete(Command),
    Partial,
    None,
}

// An AMD-style command-set flash chip. Commands are recognized from unlock sequences written to
// magic addresses, and complete immediately. The array itself is owned by the caller.
#[derive(Clone, Debug)]
pub struct AmdFlash {
    size: u32,
    sector_size: u32,
    manufacturer_id: u8,
    device_id: u8,
    // One bit per sector. A set bit silently vetoes program and erase.
    write_protect: u64,

    mode: FlashMode,
    command_addresses: [u32; MAX_COMMAND_LEN],
    command_values: [u8; MAX_COMMAND_LEN],
    command_len: usize,
}

impl AmdFlash {
    // Am29F040B: 512KiB in eight 64KiB sectors.
    pub const AM29F040B_SIZE: u32 = 512 * 1024;
    pub const AM29F040B_SECTOR_SIZE: u32 = 64 * 1024;

    pub fn am29f040b(write_protect: u64) -> Self {
        AmdFlash::new(Self::AM29F040B_SIZE, Self::AM29F040B_SECTOR_SIZE, 0x01, 0xA4, write_protect)
    }

    pub fn new(size: u32, sector_size: u32, manufacturer_id: u8, device_id: u8, write_protect: u64) -> Self {
        assert!(size.is_power_of_two() && sector_size.is_power_of_two() && sector_size <= size);
        assert!(size / sector_size <= 64, "At most 64 sectors are supported.");
        Self {
            size,
            sector_size,
            manufacturer_id,
            device_id,
            write_protect,

            mode: FlashMode::Array,
            command_addresses: [0; MAX_COMMAND_LEN],
            command_values: [0; MAX_COMMAND_LEN],
            command_len: 0,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn mode(&self) -> FlashMode {
        self.mode
    }

    pub fn pending_command_len(&self) -> usize {
        self.command_len
    }

    pub fn sector_of(&self, address: u32) -> u32 {
        (address & (self.size - 1)) / self.sector_size
    }

    pub fn is_protected(&self, address: u32) -> bool {
        self.write_protect >> self.sector_of(address) & 1 == 1
    }

    pub fn reset(&mut self) {
        self.mode = FlashMode::Array;
        self.command_len = 0;
    }

    pub fn peek(&self, array: &[u8], address: u32) -> u8 {
        let address = address & (self.size - 1);
        match self.mode {
            FlashMode::Array => array.get(address as usize).copied().unwrap_or(0xFF),
            FlashMode::Identify => match address & 0b11 {
                0 => self.manufacturer_id,
                1 => self.device_id,
                2 => u8::from(self.is_protected(address)),
                _ => 0x00,
            },
        }
    }

    pub fn read(&self, array: &[u8], address: u32) -> u8 {
        self.peek(array, address)
    }

    pub fn write(&mut self, array: &mut [u8], address: u32, value: u8) {
        let address = address & (self.size - 1);
        if self.command_len == MAX_COMMAND_LEN {
            self.command_len = 0;
        }

        self.command_addresses[self.command_len] = address;
        self.command_values[self.command_len] = value;
        self.command_len += 1;

        match self.match_pending() {
            Match::Complete(command) => {
                self.execute(array, command);
                self.command_len = 0;
            }
            Match::Partial => {}
            Match::None => {
                if value == ABORT {
                    if self.mode != FlashMode::Array {
                        debug!(target: FLASH_TARGET, "Flash: leaving identify mode.");
                    }

                    self.mode = FlashMode::Array;
                }

                // The deviating write may itself begin a new sequence.
                self.command_len = 0;
                if COMMANDS[0].1[0].matches(address, value) {
                    self.command_addresses[0] = address;
                    self.command_values[0] = value;
                    self.command_len = 1;
                }
            }
        }
    }

    fn match_pending(&self) -> Match {
        let mut partial = false;
        for (command, steps) in COMMANDS {
            if self.command_len > steps.len() {
                continue;
            }

            let prefix_matches = steps.iter()
                .zip(self.command_addresses.iter().zip(&self.command_values))
                .take(self.command_len)
                .all(|(step, (&address, &value))| step.matches(address, value));
            if prefix_matches {
                if self.command_len == steps.len() {
                    return Match::Complete(command);
                }

                partial = true;
            }
        }

        if partial { Match::Partial } else { Match::None }
    }

    fn execute(&mut self, array: &mut [u8], command: Command) {
        let target = self.command_addresses[self.command_len - 1];
        match command {
            Command::Identify => {
                debug!(target: FLASH_TARGET, "Flash: entering identify mode.");
                self.mode = FlashMode::Identify;
            }
            Command::Program => {
                if self.is_protected(target) {
                    debug!(target: FLASH_TARGET, "Flash: program of protected address {target:05X} ignored.");
                    return;
                }

                let value = self.command_values[self.command_len - 1];
                // Programming can only clear bits.
                if let Some(byte) = array.get_mut(target as usize) {
                    *byte &= value;
                }
            }
            Command::EraseSector => {
                self.erase_sector(array, self.sector_of(target));
            }
            Command::EraseChip => {
                debug!(target: FLASH_TARGET, "Flash: chip erase.");
                for sector in 0..self.size / self.sector_size {
                    self.erase_sector(array, sector);
                }
            }
        }
    }

    fn erase_sector(&self, array: &mut [u8], sector: u32) {
        let start = sector * self.sector_size;
        if self.is_protected(start) {
            debug!(target: FLASH_TARGET, "Flash: erase of protected sector {sector} ignored.");
            return;
        }

        debug!(target: FLASH_TARGET, "Flash: erasing sector {sector}.");
        let end = (start + self.sector_size).min(array.len() as u32);
        if start < end {
            array[start as usize..end as usize].fill(0xFF);
        }
    }

    pub fn save_state(&self) -> StateRecord {
        let mut record = StateRecord::new("AmdFlash");
        record.set_bool("identify", self.mode == FlashMode::Identify);
        record.set_u8("command_len", self.command_len as u8);
        let addresses: Vec<u8> = self.command_addresses.iter()
            .flat_map(|address| address.to_le_bytes())
            .collect();
        record.set_bytes("command_addresses", &addresses);
        record.set_bytes("command_values", &self.command_values);
        record
    }

    pub fn load_state(&mut self, record: &StateRecord) -> Result<(), StateError> {
        record.expect_tag("AmdFlash")?;
        let command_len = record.u8("command_len")?;
        if usize::from(command_len) > MAX_COMMAND_LEN {
            return Err(StateError::BadValue { key: "command_len".to_owned(), value: command_len.into() });
        }

        let addresses: [u8; MAX_COMMAND_LEN * 4] = record.byte_array("command_addresses")?;
        let values = record.byte_array("command_values")?;

        self.mode = if record.bool("identify")? { FlashMode::Identify } else { FlashMode::Array };
        self.command_len = command_len.into();
        for (address, bytes) in self.command_addresses.iter_mut().zip(addresses.chunks_exact(4)) {
            *address = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }

        self.command_values = values;
        Ok(())
    }
}
