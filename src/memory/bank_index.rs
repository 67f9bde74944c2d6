// A bank number as written by the guest. Values past the end of the image wrap around, the way
// unconnected high address lines on a real board do.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub struct BankIndex(u16);

impl BankIndex {
    pub const fn from_u8(value: u8) -> BankIndex {
        BankIndex(value as u16)
    }

    pub const fn from_u16(value: u16) -> BankIndex {
        BankIndex(value)
    }

    pub fn to_raw(self) -> u16 {
        self.0
    }

    pub fn to_u16(self, bank_count: u16) -> u16 {
        self.0 % bank_count
    }

    pub fn to_u32(self, bank_count: u16) -> u32 {
        self.to_u16(bank_count).into()
    }
}

impl From<u8> for BankIndex {
    fn from(value: u8) -> Self {
        BankIndex(value.into())
    }
}

// How a region of storage divides into equally sized banks.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct BankConfiguration {
    bank_size: u32,
    bank_count: u16,
}

impl BankConfiguration {
    pub const fn new(bank_size: u32, bank_count: u16) -> Self {
        assert!(bank_count > 0, "A bank configuration needs at least one bank.");
        assert!(bank_count.is_power_of_two(), "Bank count must be a power of two.");
        Self { bank_size, bank_count }
    }

    pub fn for_region(bank_size: u32, region_size: u32) -> Self {
        let bank_count = (region_size / bank_size).max(1);
        BankConfiguration::new(bank_size, bank_count as u16)
    }

    pub fn bank_size(self) -> u32 {
        self.bank_size
    }

    pub fn bank_count(self) -> u16 {
        self.bank_count
    }

    // The low bits of a register write that select a bank.
    pub fn mask(self) -> u16 {
        self.bank_count - 1
    }

    pub fn start_of(self, index: BankIndex) -> u32 {
        index.to_u32(self.bank_count) * self.bank_size
    }
}
