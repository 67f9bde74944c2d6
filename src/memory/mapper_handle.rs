use std::fmt;

// Identifies one attached mapper. A handle outlives its mapper only as a dead key: once the
// mapper is detached its slot's generation moves on and the handle no longer resolves.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub struct MapperHandle {
    index: u16,
    generation: u32,
}

impl MapperHandle {
    pub(crate) const fn new(index: u16, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> usize {
        usize::from(self.index)
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for MapperHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}
