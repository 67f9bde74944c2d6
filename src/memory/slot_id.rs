use std::fmt;

use enum_iterator::Sequence;
use itertools::iproduct;
use num_derive::FromPrimitive;

use crate::util::unit::KIBIBYTE;

pub const PAGE_SIZE: u32 = 8 * KIBIBYTE;
pub const PAGE_COUNT: usize = 8;
pub const SLOT_COUNT: usize = 4;

// An 8KiB window of the CPU address space.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub struct Page(u8);

impl Page {
    pub const fn new(index: u8) -> Self {
        assert!(index < PAGE_COUNT as u8, "Page index must be less than 8.");
        Page(index)
    }

    pub const fn of(address: u16) -> Self {
        Page((address >> 13) as u8)
    }

    pub fn all() -> impl Iterator<Item = Page> {
        (0..PAGE_COUNT as u8).map(Page)
    }

    pub const fn to_u8(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn start_address(self) -> u16 {
        (self.0 as u16) << 13
    }

    pub fn quadrant(self) -> Quadrant {
        Quadrant::ALL[usize::from(self.0 >> 1)]
    }

    // The page `count` pages above this one. Panics if that runs off the top of the address space.
    pub const fn add(self, count: u8) -> Page {
        Page::new(self.0 + count)
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

// A 16KiB quarter of the CPU address space. Slot selection happens at this granularity.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug, Sequence, FromPrimitive)]
pub enum Quadrant {
    Q0,
    Q1,
    Q2,
    Q3,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [Quadrant::Q0, Quadrant::Q1, Quadrant::Q2, Quadrant::Q3];

    pub const fn new(index: u8) -> Self {
        assert!(index < 4, "Quadrant index must be less than 4.");
        Quadrant::ALL[index as usize]
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn pages(self) -> [Page; 2] {
        let first = (self as u8) * 2;
        [Page(first), Page(first + 1)]
    }
}

// A primary slot plus a sub-slot within it. The sub-slot is 0 for slots that aren't expanded.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub struct SlotId {
    primary: u8,
    sub: u8,
}

impl SlotId {
    pub const fn new(primary: u8, sub: u8) -> Self {
        assert!(primary < SLOT_COUNT as u8, "Primary slot must be less than 4.");
        assert!(sub < SLOT_COUNT as u8, "Sub-slot must be less than 4.");
        SlotId { primary, sub }
    }

    pub const fn primary(self) -> u8 {
        self.primary
    }

    pub const fn sub(self) -> u8 {
        self.sub
    }

    pub fn all() -> impl Iterator<Item = SlotId> {
        iproduct!(0..SLOT_COUNT as u8, 0..SLOT_COUNT as u8)
            .map(|(primary, sub)| SlotId { primary, sub })
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.primary, self.sub)
    }
}
