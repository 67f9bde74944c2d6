use std::fmt;

use crate::memory::slot_id::{Page, SlotId};

// Why a cartridge couldn't be inserted. The machine is left exactly as it was before the attempt.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum AttachError {
    EmptyImage,
    ImageTooLarge { size: u32, max: u32 },
    BadImageSize { size: u32, granularity: u32 },
    PageRangeOutOfBounds { start_page: Page, page_count: u8 },
    SlotOccupied { slot: SlotId, page: Page },
    UnknownMapperKind(String),
    UnrecognizedImage,
}

impl fmt::Display for AttachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachError::EmptyImage => write!(f, "Cartridge image is empty."),
            AttachError::ImageTooLarge { size, max } =>
                write!(f, "Cartridge image is {size} bytes, but this mapper supports at most {max}."),
            AttachError::BadImageSize { size, granularity } =>
                write!(f, "Cartridge image size {size} is not a multiple of the {granularity} byte bank size."),
            AttachError::PageRangeOutOfBounds { start_page, page_count } =>
                write!(f, "{page_count} pages starting at {start_page} run past the end of the address space."),
            AttachError::SlotOccupied { slot, page } =>
                write!(f, "Slot {slot} already has a cartridge at {page}."),
            AttachError::UnknownMapperKind(name) => write!(f, "Unknown mapper type '{name}'."),
            AttachError::UnrecognizedImage => write!(f, "Could not determine the mapper type of the cartridge image."),
        }
    }
}

impl std::error::Error for AttachError {}
