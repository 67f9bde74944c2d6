use std::fmt;
use std::fs;
use std::path::Path;

use crate::memory::raw_memory::RawMemory;

// A cartridge image as supplied by the loader, before any mapper-specific padding.
#[derive(Clone)]
pub struct RomImage {
    name: String,
    data: RawMemory,
    crc: u32,
}

impl RomImage {
    pub fn load(path: &Path) -> Result<RomImage, String> {
        let data = fs::read(path)
            .map_err(|err| format!("Failed to read ROM '{}': {err}", path.display()))?;
        let name = path.file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| format!("ROM path '{}' has no usable file name.", path.display()))?;
        if u32::try_from(data.len()).is_err() {
            return Err(format!("ROM '{}' is too large.", path.display()));
        }

        Ok(RomImage::from_bytes(name, data))
    }

    pub fn from_bytes(name: &str, data: Vec<u8>) -> RomImage {
        let crc = crc32fast::hash(&data);
        RomImage { name: name.to_owned(), data: RawMemory::from_vec(data), crc }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &RawMemory {
        &self.data
    }

    pub fn bytes(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn size(&self) -> u32 {
        self.data.size()
    }

    pub fn crc(&self) -> u32 {
        self.crc
    }

    // The key non-volatile contents are stored under, e.g. "Hydlide 2.sram".
    pub fn persistence_key(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.name)
    }
}

impl fmt::Debug for RomImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RomImage {{ name: {:?}, size: {}, crc: {:08X} }}", self.name, self.size(), self.crc)
    }
}
