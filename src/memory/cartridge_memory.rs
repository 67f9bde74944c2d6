use crate::memory::page_binding::Region;
use crate::memory::raw_memory::RawMemory;

// All storage owned by one attached mapper. Page bindings refer into it by region and offset,
// never by reference.
#[derive(Clone, Debug, Default)]
pub struct CartridgeMemory {
    rom: RawMemory,
    ram: RawMemory,
}

impl CartridgeMemory {
    pub fn new(rom: RawMemory, ram: RawMemory) -> Self {
        Self { rom, ram }
    }

    pub fn rom(&self) -> &RawMemory {
        &self.rom
    }

    pub fn rom_mut(&mut self) -> &mut RawMemory {
        &mut self.rom
    }

    pub fn ram(&self) -> &RawMemory {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut RawMemory {
        &mut self.ram
    }

    pub fn region(&self, region: Region) -> &RawMemory {
        match region {
            Region::Rom => &self.rom,
            Region::Ram => &self.ram,
        }
    }

    pub fn region_mut(&mut self, region: Region) -> &mut RawMemory {
        match region {
            Region::Rom => &mut self.rom,
            Region::Ram => &mut self.ram,
        }
    }
}
