use log::{debug, trace};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use splitbits::splitbits_named;

use crate::save::save_state::{StateError, StateRecord};
use crate::util::edge_detector::{EdgeDetector, SignalLevel};
use crate::util::logger::EEPROM_TARGET;

// Roughly 2ms at the MSX's 3.58MHz clock.
pub const DEFAULT_PROGRAM_CYCLES: u64 = 7_159;

#[derive(PartialEq, Eq, Clone, Copy, Debug, FromPrimitive)]
pub enum EepromPhase {
    Idle,
    Command,
    DataTransferRead,
    DataTransferWrite,
    Programming,
    CommandDone,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum EepromModel {
    // 1KiB
    C76,
    // 2KiB
    C86,
}

impl EepromModel {
    pub fn size(self) -> u32 {
        match self {
            EepromModel::C76 => 1024,
            EepromModel::C86 => 2048,
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Organization {
    Bits8,
    Bits16,
}

impl Organization {
    fn word_bits(self) -> u8 {
        match self {
            Organization::Bits8 => 8,
            Organization::Bits16 => 16,
        }
    }

    // Both sizes take the same number of address bits; the unused top bit is ignored on a C76.
    fn address_bits(self) -> u8 {
        match self {
            Organization::Bits8 => 11,
            Organization::Bits16 => 10,
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, FromPrimitive)]
enum PendingWrite {
    None,
    Word,
    All,
}

// A 93C76/93C86 Microwire serial EEPROM, driven one line change at a time. The contents are
// owned by the caller and passed in on each access.
#[derive(Clone, Debug)]
pub struct SerialEeprom {
    model: EepromModel,
    organization: Organization,
    program_cycles: u64,

    phase: EepromPhase,
    shift_register: u32,
    bit_count: u8,
    address: u16,
    pending_write: PendingWrite,
    write_enabled: bool,

    chip_select: bool,
    clock: EdgeDetector,
    data_in: bool,
    data_out: bool,
    // The cycle at which the current program operation completes.
    deadline: Option<u64>,
}

impl SerialEeprom {
    pub fn new(model: EepromModel, organization: Organization, program_cycles: u64) -> Self {
        Self {
            model,
            organization,
            program_cycles,

            phase: EepromPhase::Idle,
            shift_register: 0,
            bit_count: 0,
            address: 0,
            pending_write: PendingWrite::None,
            write_enabled: false,

            chip_select: false,
            clock: EdgeDetector::rising(),
            data_in: false,
            data_out: true,
            deadline: None,
        }
    }

    pub fn size(&self) -> u32 {
        self.model.size()
    }

    pub fn organization(&self) -> Organization {
        self.organization
    }

    pub fn phase(&self) -> EepromPhase {
        self.phase
    }

    pub fn data_out(&self) -> bool {
        self.data_out
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    pub fn is_write_enabled(&self) -> bool {
        self.write_enabled
    }

    fn word_count(&self) -> u16 {
        let bytes_per_word = u32::from(self.organization.word_bits() / 8);
        (self.model.size() / bytes_per_word) as u16
    }

    fn address_mask(&self) -> u16 {
        self.word_count() - 1
    }

    pub fn reset(&mut self) {
        self.phase = EepromPhase::Idle;
        self.shift_register = 0;
        self.bit_count = 0;
        self.pending_write = PendingWrite::None;
        self.write_enabled = false;
        self.chip_select = false;
        self.clock.force_level(SignalLevel::Low);
        self.data_in = false;
        self.data_out = true;
        self.deadline = None;
    }

    // Drops a scheduled program completion. Used when the cartridge is removed mid-operation.
    pub fn cancel_pending(&mut self) {
        if self.deadline.take().is_some() {
            debug!(target: EEPROM_TARGET, "EEPROM: pending program completion cancelled.");
        }
    }

    // Applies a write to the control register: bit 0 data in, bit 1 clock, bit 2 chip select.
    pub fn write_lines(&mut self, data: &mut [u8], value: u8, cycle: u64) {
        let (chip_select, clock, data_in) = splitbits_named!(value, ".....scd");
        self.set_data_in(data_in);
        self.set_chip_select(chip_select);
        self.set_clock(data, clock, cycle);
    }

    pub fn set_data_in(&mut self, level: bool) {
        self.data_in = level;
    }

    pub fn set_chip_select(&mut self, level: bool) {
        if self.chip_select == level {
            return;
        }

        self.chip_select = level;
        if level {
            return;
        }

        self.data_out = self.phase != EepromPhase::Programming;
        match self.phase {
            EepromPhase::Command
            | EepromPhase::DataTransferRead
            | EepromPhase::DataTransferWrite
            | EepromPhase::CommandDone => {
                trace!(target: EEPROM_TARGET, "EEPROM: deselected during {:?}.", self.phase);
                self.phase = EepromPhase::Idle;
            }
            EepromPhase::Idle | EepromPhase::Programming => {}
        }
    }

    pub fn set_clock(&mut self, data: &mut [u8], level: bool, cycle: u64) {
        let rising = self.clock.set_level_then_detect(level.into());
        if rising && self.chip_select {
            self.on_rising_edge(data, cycle);
        }
    }

    // Delivers the scheduled program completion once its deadline has passed.
    pub fn on_cycle(&mut self, cycle: u64) {
        if self.deadline.is_some_and(|deadline| cycle >= deadline) {
            self.deadline = None;
            self.data_out = true;
            self.phase = if self.chip_select { EepromPhase::CommandDone } else { EepromPhase::Idle };
            debug!(target: EEPROM_TARGET, "EEPROM: programming complete, now {:?}.", self.phase);
        }
    }

    fn on_rising_edge(&mut self, data: &mut [u8], cycle: u64) {
        match self.phase {
            EepromPhase::Idle => {
                // Leading zeros are allowed before the start bit.
                if self.data_in {
                    self.phase = EepromPhase::Command;
                    self.shift_register = 0;
                    self.bit_count = 0;
                }
            }
            EepromPhase::Command => {
                self.shift_in();
                if self.bit_count == 2 + self.organization.address_bits() {
                    self.decode_command(data, cycle);
                }
            }
            EepromPhase::DataTransferWrite => {
                self.shift_in();
                if self.bit_count == self.organization.word_bits() {
                    self.finish_write(data, cycle);
                }
            }
            EepromPhase::DataTransferRead => {
                let word_bits = self.organization.word_bits();
                self.data_out = (self.shift_register >> (word_bits - 1 - self.bit_count)) & 1 == 1;
                self.bit_count += 1;
                if self.bit_count == word_bits {
                    self.address = (self.address + 1) & self.address_mask();
                    self.shift_register = self.word(data, self.address).into();
                    self.bit_count = 0;
                }
            }
            EepromPhase::Programming | EepromPhase::CommandDone => {}
        }
    }

    fn shift_in(&mut self) {
        self.shift_register = (self.shift_register << 1) | u32::from(self.data_in);
        self.bit_count += 1;
    }

    fn decode_command(&mut self, data: &mut [u8], cycle: u64) {
        let address_bits = self.organization.address_bits();
        let opcode = (self.shift_register >> address_bits) & 0b11;
        let address = (self.shift_register & ((1 << address_bits) - 1)) as u16;
        self.shift_register = 0;
        self.bit_count = 0;

        match opcode {
            0b10 => {
                self.address = address & self.address_mask();
                trace!(target: EEPROM_TARGET, "EEPROM: READ {:03X}.", self.address);
                self.shift_register = self.word(data, self.address).into();
                // A dummy zero precedes the data.
                self.data_out = false;
                self.phase = EepromPhase::DataTransferRead;
            }
            0b01 => {
                self.address = address & self.address_mask();
                trace!(target: EEPROM_TARGET, "EEPROM: WRITE {:03X}.", self.address);
                self.pending_write = PendingWrite::Word;
                self.phase = EepromPhase::DataTransferWrite;
            }
            0b11 => {
                self.address = address & self.address_mask();
                trace!(target: EEPROM_TARGET, "EEPROM: ERASE {:03X}.", self.address);
                if self.write_enabled {
                    let erased = self.erased_word();
                    self.set_word(data, self.address, erased);
                    self.start_programming(cycle);
                } else {
                    self.phase = EepromPhase::CommandDone;
                }
            }
            _ => match address >> (address_bits - 2) {
                0b11 => {
                    debug!(target: EEPROM_TARGET, "EEPROM: EWEN.");
                    self.write_enabled = true;
                    self.phase = EepromPhase::CommandDone;
                }
                0b00 => {
                    debug!(target: EEPROM_TARGET, "EEPROM: EWDS.");
                    self.write_enabled = false;
                    self.phase = EepromPhase::CommandDone;
                }
                0b10 => {
                    debug!(target: EEPROM_TARGET, "EEPROM: ERAL.");
                    if self.write_enabled {
                        data.fill(0xFF);
                        self.start_programming(cycle);
                    } else {
                        self.phase = EepromPhase::CommandDone;
                    }
                }
                _ => {
                    debug!(target: EEPROM_TARGET, "EEPROM: WRAL.");
                    self.pending_write = PendingWrite::All;
                    self.phase = EepromPhase::DataTransferWrite;
                }
            },
        }
    }

    fn finish_write(&mut self, data: &mut [u8], cycle: u64) {
        let word = self.shift_register as u16;
        self.shift_register = 0;
        self.bit_count = 0;
        let pending_write = std::mem::replace(&mut self.pending_write, PendingWrite::None);
        if !self.write_enabled {
            debug!(target: EEPROM_TARGET, "EEPROM: write while disabled ignored.");
            self.phase = EepromPhase::CommandDone;
            return;
        }

        match pending_write {
            PendingWrite::Word => self.set_word(data, self.address, word),
            PendingWrite::All => {
                for address in 0..self.word_count() {
                    self.set_word(data, address, word);
                }
            }
            PendingWrite::None => {}
        }

        self.start_programming(cycle);
    }

    fn start_programming(&mut self, cycle: u64) {
        self.phase = EepromPhase::Programming;
        self.data_out = false;
        self.deadline = Some(cycle + self.program_cycles);
    }

    fn erased_word(&self) -> u16 {
        match self.organization {
            Organization::Bits8 => 0xFF,
            Organization::Bits16 => 0xFFFF,
        }
    }

    fn word(&self, data: &[u8], address: u16) -> u16 {
        let byte = |index: usize| u16::from(data.get(index).copied().unwrap_or(0xFF));
        let address = usize::from(address);
        match self.organization {
            Organization::Bits8 => byte(address),
            Organization::Bits16 => byte(2 * address) | (byte(2 * address + 1) << 8),
        }
    }

    fn set_word(&self, data: &mut [u8], address: u16, word: u16) {
        let address = usize::from(address);
        let [low, high] = word.to_le_bytes();
        match self.organization {
            Organization::Bits8 => {
                if let Some(byte) = data.get_mut(address) {
                    *byte = low;
                }
            }
            Organization::Bits16 => {
                if let Some(bytes) = data.get_mut(2 * address..2 * address + 2) {
                    bytes[0] = low;
                    bytes[1] = high;
                }
            }
        }
    }

    pub fn save_state(&self) -> StateRecord {
        let mut record = StateRecord::new("SerialEeprom");
        record.set_u8("phase", self.phase as u8);
        record.set_u32("shift_register", self.shift_register);
        record.set_u8("bit_count", self.bit_count);
        record.set_u16("address", self.address);
        record.set_u8("pending_write", self.pending_write as u8);
        record.set_bool("write_enabled", self.write_enabled);
        record.set_bool("chip_select", self.chip_select);
        record.set_bool("clock", self.clock.current_level().is_high());
        record.set_bool("data_in", self.data_in);
        record.set_bool("data_out", self.data_out);
        if let Some(deadline) = self.deadline {
            record.set_u64("deadline", deadline);
        }

        record
    }

    pub fn load_state(&mut self, record: &StateRecord) -> Result<(), StateError> {
        record.expect_tag("SerialEeprom")?;
        let raw_phase = record.u8("phase")?;
        let phase = EepromPhase::from_u8(raw_phase)
            .ok_or(StateError::BadValue { key: "phase".to_owned(), value: raw_phase.into() })?;
        let raw_pending = record.u8("pending_write")?;
        let pending_write = PendingWrite::from_u8(raw_pending)
            .ok_or(StateError::BadValue { key: "pending_write".to_owned(), value: raw_pending.into() })?;
        let bit_count = record.u8("bit_count")?;
        if bit_count >= self.bit_count_limit(phase) {
            return Err(StateError::BadValue { key: "bit_count".to_owned(), value: bit_count.into() });
        }

        let shift_register = record.u32("shift_register")?;
        let address = record.u16("address")? & self.address_mask();
        let write_enabled = record.bool("write_enabled")?;
        let chip_select = record.bool("chip_select")?;
        let clock = record.bool("clock")?;
        let data_in = record.bool("data_in")?;
        let data_out = record.bool("data_out")?;
        let deadline = match record.u64("deadline") {
            Ok(deadline) => Some(deadline),
            Err(StateError::MissingKey(_)) => None,
            Err(err) => return Err(err),
        };

        self.phase = phase;
        self.pending_write = pending_write;
        self.bit_count = bit_count;
        self.shift_register = shift_register;
        self.address = address;
        self.write_enabled = write_enabled;
        self.chip_select = chip_select;
        self.clock.force_level(SignalLevel::from_bool(clock));
        self.data_in = data_in;
        self.data_out = data_out;
        self.deadline = deadline;
        Ok(())
    }

    // One past the largest bit count the phase can be left holding between clock edges.
    fn bit_count_limit(&self, phase: EepromPhase) -> u8 {
        let command_bits = 2 + self.organization.address_bits();
        let word_bits = self.organization.word_bits();
        match phase {
            EepromPhase::Command => command_bits,
            EepromPhase::DataTransferRead | EepromPhase::DataTransferWrite => word_bits,
            // Deselecting mid-transfer leaves the count behind.
            EepromPhase::Idle | EepromPhase::Programming | EepromPhase::CommandDone => command_bits.max(word_bits),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::test_data::Driver;

    const EWEN: (u32, u32) = (0b00, 0b110_0000_0000);
    const EWDS: (u32, u32) = (0b00, 0b000_0000_0000);
    const ERAL: (u32, u32) = (0b00, 0b100_0000_0000);
    const WRAL: (u32, u32) = (0b00, 0b010_0000_0000);

    fn eeprom_and_data() -> (SerialEeprom, Vec<u8>) {
        let eeprom = SerialEeprom::new(EepromModel::C76, Organization::Bits8, DEFAULT_PROGRAM_CYCLES);
        let data = (0..1024u32).map(|i| (i * 7) as u8).collect();
        (eeprom, data)
    }

    #[test]
    fn read_shifts_out_word_msb_first() {
        let (mut eeprom, mut data) = eeprom_and_data();
        data[0x123] = 0b1011_0010;
        let mut driver = Driver { eeprom: &mut eeprom, data: &mut data, cycle: 0 };
        driver.command(0b10, 0x123);
        assert_eq!(driver.eeprom.phase(), EepromPhase::DataTransferRead);
        assert!(!driver.eeprom.data_out());

        let mut bits = Vec::new();
        for _ in 0..8 {
            bits.push(driver.clock_bit(false));
        }

        assert_eq!(bits, [true, false, true, true, false, false, true, false]);
    }

    #[test]
    fn read_streams_into_next_word() {
        let (mut eeprom, mut data) = eeprom_and_data();
        data[0x3FF] = 0xA5;
        data[0x000] = 0x3C;
        let mut driver = Driver { eeprom: &mut eeprom, data: &mut data, cycle: 0 };
        // The top address bit is beyond a C76's capacity and is ignored.
        driver.command(0b10, 0x7FF);
        assert_eq!(driver.read_word(8), 0xA5);
        assert_eq!(driver.read_word(8), 0x3C);
    }

    #[test]
    fn write_requires_enable() {
        let (mut eeprom, mut data) = eeprom_and_data();
        let before = data[0x010];
        let mut driver = Driver { eeprom: &mut eeprom, data: &mut data, cycle: 0 };
        driver.command(0b01, 0x010);
        assert_eq!(driver.eeprom.phase(), EepromPhase::DataTransferWrite);
        driver.clock_bits(0x5A, 8);
        assert_eq!(driver.eeprom.phase(), EepromPhase::CommandDone);
        assert_eq!(driver.data[0x010], before);
        assert_eq!(driver.eeprom.deadline(), None);
    }

    #[test]
    fn enabled_write_programs_then_completes() {
        let (mut eeprom, mut data) = eeprom_and_data();
        let mut driver = Driver { eeprom: &mut eeprom, data: &mut data, cycle: 0 };
        driver.command(EWEN.0, EWEN.1);
        assert_eq!(driver.eeprom.phase(), EepromPhase::CommandDone);
        assert!(driver.eeprom.is_write_enabled());
        driver.deselect();
        assert_eq!(driver.eeprom.phase(), EepromPhase::Idle);

        driver.command(0b01, 0x010);
        driver.clock_bits(0x5A, 8);
        assert_eq!(driver.data[0x010], 0x5A);
        assert_eq!(driver.eeprom.phase(), EepromPhase::Programming);
        assert!(!driver.eeprom.data_out());

        // Deselecting doesn't interrupt programming.
        driver.deselect();
        assert_eq!(driver.eeprom.phase(), EepromPhase::Programming);
        assert!(!driver.eeprom.data_out());

        let deadline = driver.eeprom.deadline().unwrap();
        driver.eeprom.on_cycle(deadline - 1);
        assert_eq!(driver.eeprom.phase(), EepromPhase::Programming);
        driver.eeprom.on_cycle(deadline);
        assert_eq!(driver.eeprom.phase(), EepromPhase::Idle);
        assert!(driver.eeprom.data_out());
    }

    #[test]
    fn completion_while_selected_goes_to_command_done() {
        let (mut eeprom, mut data) = eeprom_and_data();
        let mut driver = Driver { eeprom: &mut eeprom, data: &mut data, cycle: 100 };
        driver.command(EWEN.0, EWEN.1);
        driver.deselect();
        driver.command(0b11, 0x020);
        assert_eq!(driver.data[0x020], 0xFF);
        assert_eq!(driver.eeprom.phase(), EepromPhase::Programming);

        driver.eeprom.on_cycle(u64::MAX);
        assert_eq!(driver.eeprom.phase(), EepromPhase::CommandDone);
        assert!(driver.eeprom.data_out());
    }

    #[test]
    fn write_all_and_erase_all() {
        let (mut eeprom, mut data) = eeprom_and_data();
        let mut driver = Driver { eeprom: &mut eeprom, data: &mut data, cycle: 0 };
        driver.command(EWEN.0, EWEN.1);
        driver.deselect();
        driver.command(WRAL.0, WRAL.1);
        driver.clock_bits(0x42, 8);
        assert!(driver.data.iter().all(|&b| b == 0x42));
        driver.eeprom.on_cycle(u64::MAX);
        driver.deselect();

        driver.command(ERAL.0, ERAL.1);
        assert!(driver.data.iter().all(|&b| b == 0xFF));
        driver.eeprom.on_cycle(u64::MAX);
        driver.deselect();

        driver.command(EWDS.0, EWDS.1);
        assert!(!driver.eeprom.is_write_enabled());
    }

    #[test]
    fn deselect_aborts_command() {
        let (mut eeprom, mut data) = eeprom_and_data();
        let mut driver = Driver { eeprom: &mut eeprom, data: &mut data, cycle: 0 };
        driver.select();
        driver.clock_bit(true);
        driver.clock_bits(0b10, 2);
        assert_eq!(driver.eeprom.phase(), EepromPhase::Command);
        driver.deselect();
        assert_eq!(driver.eeprom.phase(), EepromPhase::Idle);
        assert!(driver.eeprom.data_out());
    }

    #[test]
    fn sixteen_bit_words() {
        let mut eeprom = SerialEeprom::new(EepromModel::C86, Organization::Bits16, 10);
        let mut data = vec![0u8; 2048];
        data[2 * 0x155] = 0x34;
        data[2 * 0x155 + 1] = 0x12;
        let mut driver = Driver { eeprom: &mut eeprom, data: &mut data, cycle: 0 };
        driver.select();
        driver.clock_bit(true);
        driver.clock_bits(0b10, 2);
        driver.clock_bits(0x155, 10);
        assert_eq!(driver.read_word(16), 0x1234);
    }

    #[test]
    fn lines_register_decodes_bits() {
        let (mut eeprom, mut data) = eeprom_and_data();
        // Chip select with data in high, then a clock rise: a start bit.
        eeprom.write_lines(&mut data, 0b101, 0);
        eeprom.write_lines(&mut data, 0b111, 1);
        assert_eq!(eeprom.phase(), EepromPhase::Command);
    }

    #[test]
    fn cancel_drops_deadline() {
        let (mut eeprom, mut data) = eeprom_and_data();
        let mut driver = Driver { eeprom: &mut eeprom, data: &mut data, cycle: 0 };
        driver.command(EWEN.0, EWEN.1);
        driver.deselect();
        driver.command(ERAL.0, ERAL.1);
        eeprom.cancel_pending();
        assert_eq!(eeprom.deadline(), None);
        eeprom.on_cycle(u64::MAX);
        assert_eq!(eeprom.phase(), EepromPhase::Programming);
    }

    #[test]
    fn sixteen_bit_state_saved_mid_word_reloads() {
        let mut eeprom = SerialEeprom::new(EepromModel::C86, Organization::Bits16, 10);
        let mut data = vec![0u8; 2048];
        let mut driver = Driver { eeprom: &mut eeprom, data: &mut data, cycle: 0 };
        driver.select();
        driver.clock_bit(true);
        driver.clock_bits(0b11, 2);
        driver.clock_bits(0b11_0000_0000, 10);
        driver.deselect();
        // WRITE 0x0AB, then 13 of the 16 data bits.
        driver.select();
        driver.clock_bit(true);
        driver.clock_bits(0b01, 2);
        driver.clock_bits(0x0AB, 10);
        driver.clock_bits(0xBEEF >> 3, 13);
        assert_eq!(driver.eeprom.phase(), EepromPhase::DataTransferWrite);
        let record = eeprom.save_state();

        let mut restored = SerialEeprom::new(EepromModel::C86, Organization::Bits16, 10);
        restored.load_state(&record).unwrap();
        let mut driver = Driver { eeprom: &mut restored, data: &mut data, cycle: 0 };
        driver.clock_bits(0xBEEF & 0b111, 3);
        assert_eq!(driver.eeprom.phase(), EepromPhase::Programming);
        assert_eq!(&data[2 * 0x0AB..2 * 0x0AB + 2], &[0xEF, 0xBE]);
    }

    #[test]
    fn bit_count_beyond_phase_rejected_without_changes() {
        let (mut eeprom, mut data) = eeprom_and_data();
        let mut driver = Driver { eeprom: &mut eeprom, data: &mut data, cycle: 0 };
        driver.command(0b01, 0x010);
        let mut record = eeprom.save_state();
        record.set_u8("bit_count", 8);

        let mut other = SerialEeprom::new(EepromModel::C76, Organization::Bits8, DEFAULT_PROGRAM_CYCLES);
        assert_eq!(
            other.load_state(&record),
            Err(StateError::BadValue { key: "bit_count".to_owned(), value: 8 }),
        );
        assert_eq!(other.phase(), EepromPhase::Idle);

        record.set_u8("bit_count", 7);
        record.set_u8("phase", EepromPhase::Command as u8);
        other.load_state(&record).unwrap();
        assert_eq!(other.phase(), EepromPhase::Command);
    }

    #[test]
    fn state_survives_save_and_load() {
        let (mut eeprom, mut data) = eeprom_and_data();
        data[0x040] = 0x81;
        let mut driver = Driver { eeprom: &mut eeprom, data: &mut data, cycle: 0 };
        driver.command(0b10, 0x040);
        driver.clock_bit(false);
        let record = eeprom.save_state();

        let mut restored = SerialEeprom::new(EepromModel::C76, Organization::Bits8, DEFAULT_PROGRAM_CYCLES);
        restored.load_state(&record).unwrap();
        let mut driver = Driver { eeprom: &mut restored, data: &mut data, cycle: 0 };
        assert_eq!(driver.read_word(7), 0x01);
    }
}
