use crate::save::save_state::{StateError, StateRecord};

// The register face of a wave-table sound chip mapped into cartridge space. The mapping layer
// only forwards register accesses; sample generation belongs to whoever implements this.
pub trait WaveSoundChip {
    fn read(&mut self, register: u8) -> u8;
    fn peek(&self, register: u8) -> u8;
    fn write(&mut self, register: u8, value: u8);
    fn reset(&mut self);
    fn save_state(&self) -> StateRecord;
    fn load_state(&mut self, record: &StateRecord) -> Result<(), StateError>;
}

const CHANNEL_COUNT: usize = 5;
const WAVE_LEN: usize = 32;

// Konami SCC register file.
// 00-7F: waveforms for channels 0-3; channel 4 shares channel 3's waveform.
// 80-9F: periods, volumes and the channel enable mask, mirrored every 16 bytes.
// A0-DF: unused.
// E0-FF: deformation register. Reading it clears it to FF.
#[derive(Clone, Debug)]
pub struct SccRegisterFile {
    waves: [[u8; WAVE_LEN]; CHANNEL_COUNT],
    periods: [u16; CHANNEL_COUNT],
    volumes: [u8; CHANNEL_COUNT],
    enable: u8,
    deformation: u8,
}

impl SccRegisterFile {
    pub fn new() -> Self {
        Self {
            waves: [[0; WAVE_LEN]; CHANNEL_COUNT],
            periods: [0; CHANNEL_COUNT],
            volumes: [0; CHANNEL_COUNT],
            enable: 0,
            deformation: 0,
        }
    }

    pub fn period(&self, channel: usize) -> u16 {
        self.periods[channel]
    }

    pub fn volume(&self, channel: usize) -> u8 {
        self.volumes[channel]
    }

    pub fn enabled_channels(&self) -> u8 {
        self.enable
    }

    pub fn wave(&self, channel: usize) -> &[u8; WAVE_LEN] {
        &self.waves[channel]
    }

    fn is_wave_read_only(&self, channel: usize) -> bool {
        match self.deformation & 0xC0 {
            0x40 | 0xC0 => true,
            0x80 => channel >= 3,
            _ => false,
        }
    }

    fn peek_tone_register(&self, register: u8) -> u8 {
        let register = usize::from(register & 0x0F);
        match register {
            0x0..=0x9 if register % 2 == 0 => self.periods[register / 2] as u8,
            0x0..=0x9 => (self.periods[register / 2] >> 8) as u8,
            0xA..=0xE => self.volumes[register - 0xA],
            _ => self.enable,
        }
    }

    fn write_tone_register(&mut self, register: u8, value: u8) {
        let register = usize::from(register & 0x0F);
        match register {
            0x0..=0x9 => {
                let period = &mut self.periods[register / 2];
                *period = if register % 2 == 0 {
                    (*period & 0xF00) | u16::from(value)
                } else {
                    (u16::from(value & 0x0F) << 8) | (*period & 0x0FF)
                };
            }
            0xA..=0xE => self.volumes[register - 0xA] = value & 0x0F,
            _ => self.enable = value,
        }
    }
}

impl Default for SccRegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveSoundChip for SccRegisterFile {
    fn read(&mut self, register: u8) -> u8 {
        if register >= 0xE0 {
            self.deformation = 0xFF;
        }

        self.peek(register)
    }

    fn peek(&self, register: u8) -> u8 {
        match register {
            0x00..=0x7F => self.waves[usize::from(register >> 5)][usize::from(register & 0x1F)],
            0x80..=0x9F => self.peek_tone_register(register),
            0xA0..=0xFF => 0xFF,
        }
    }

    fn write(&mut self, register: u8, value: u8) {
        match register {
            0x00..=0x7F => {
                let channel = usize::from(register >> 5);
                if self.is_wave_read_only(channel) {
                    return;
                }

                let position = usize::from(register & 0x1F);
                self.waves[channel][position] = value;
                if channel == 3 {
                    self.waves[4][position] = value;
                }
            }
            0x80..=0x9F => self.write_tone_register(register, value),
            0xA0..=0xDF => {}
            0xE0..=0xFF => self.deformation = value,
        }
    }

    fn reset(&mut self) {
        *self = SccRegisterFile::new();
    }

    fn save_state(&self) -> StateRecord {
        let mut record = StateRecord::new("Scc");
        let waves: Vec<u8> = self.waves.iter().flatten().copied().collect();
        record.set_bytes("waves", &waves);
        let periods: Vec<u8> = self.periods.iter().flat_map(|period| period.to_le_bytes()).collect();
        record.set_bytes("periods", &periods);
        record.set_bytes("volumes", &self.volumes);
        record.set_u8("enable", self.enable);
        record.set_u8("deformation", self.deformation);
        record
    }

    fn load_state(&mut self, record: &StateRecord) -> Result<(), StateError> {
        record.expect_tag("Scc")?;
        let waves: [u8; WAVE_LEN * CHANNEL_COUNT] = record.byte_array("waves")?;
        let periods: [u8; 2 * CHANNEL_COUNT] = record.byte_array("periods")?;
        self.volumes = record.byte_array("volumes")?;
        self.enable = record.u8("enable")?;
        self.deformation = record.u8("deformation")?;
        for (wave, saved) in self.waves.iter_mut().zip(waves.chunks_exact(WAVE_LEN)) {
            wave.copy_from_slice(saved);
        }

        for (period, saved) in self.periods.iter_mut().zip(periods.chunks_exact(2)) {
            *period = u16::from_le_bytes([saved[0], saved[1]]);
        }

        Ok(())
    }
}
