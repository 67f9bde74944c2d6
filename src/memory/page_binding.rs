use crate::memory::mapper_handle::MapperHandle;
use crate::memory::slot_id::Page;

pub const UNMAPPED_BYTE: u8 = 0xFF;

// Which of a mapper's storage areas a binding points into.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Region {
    // The cartridge image, or the flash array for flash cartridges.
    Rom,
    // SRAM, plain RAM or EEPROM contents.
    Ram,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Backing {
    Unmapped,
    Memory(BackingWindow),
}

// A typed view onto part of a mapper's storage. `mask` is applied to the CPU address before
// `offset` is added, so windows smaller than a page mirror across the page.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct BackingWindow {
    pub owner: MapperHandle,
    pub region: Region,
    pub offset: u32,
    pub mask: u32,
}

impl BackingWindow {
    pub fn index(&self, address: u16) -> u32 {
        self.offset + (u32::from(address) & self.mask)
    }
}

// The mapper that handles accesses the fast path can't, and the page its relative addresses
// start from.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct DeviceRef {
    pub owner: MapperHandle,
    pub base_page: Page,
}

impl DeviceRef {
    pub fn relative_address(&self, address: u16) -> u16 {
        address.wrapping_sub(self.base_page.start_address())
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct PageBinding {
    backing: Backing,
    readable: bool,
    writable: bool,
    device: Option<DeviceRef>,
}

impl PageBinding {
    // Open bus: every byte reads 0xFF, writes vanish.
    pub const UNMAPPED: PageBinding = PageBinding {
        backing: Backing::Unmapped,
        readable: true,
        writable: false,
        device: None,
    };

    pub const fn new(backing: Backing, readable: bool, writable: bool, device: Option<DeviceRef>) -> Self {
        Self { backing, readable, writable, device }
    }

    pub fn backing(&self) -> Backing {
        self.backing
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn device(&self) -> Option<DeviceRef> {
        self.device
    }

    pub fn is_unmapped(&self) -> bool {
        *self == PageBinding::UNMAPPED
    }

    pub fn owner(&self) -> Option<MapperHandle> {
        match (self.backing, self.device) {
            (Backing::Memory(window), _) => Some(window.owner),
            (Backing::Unmapped, Some(device)) => Some(device.owner),
            (Backing::Unmapped, None) => None,
        }
    }
}
