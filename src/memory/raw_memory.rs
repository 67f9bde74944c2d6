use std::ops::{Index, IndexMut, Range};

// A chunk of primitive memory. Allows indexing on u32s instead of usizes.
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct RawMemory(Vec<u8>);

impl RawMemory {
    pub fn new(size: u32) -> Self {
        Self(vec![0; size as usize])
    }

    pub fn filled(size: u32, value: u8) -> Self {
        Self(vec![value; size as usize])
    }

    pub fn from_vec(vec: Vec<u8>) -> Self {
        assert!(u32::try_from(vec.len()).is_ok(), "Memory must be addressable by a u32.");
        Self(vec)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0[..]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0[..]
    }

    pub fn slice(&self, range: Range<u32>) -> &[u8] {
        &self.0[range.start as usize..range.end as usize]
    }

    pub fn get(&self, index: u32) -> Option<u8> {
        self.0.get(index as usize).copied()
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut u8> {
        self.0.get_mut(index as usize)
    }

    // Repeats the current contents until they fill `size` bytes. Mirrors a short ROM image
    // across the power-of-two space its address lines decode.
    pub fn mirrored_to(&self, size: u32) -> RawMemory {
        if self.0.is_empty() {
            return RawMemory::new(size);
        }

        RawMemory(self.0.iter().copied().cycle().take(size as usize).collect())
    }

    pub fn fill(&mut self, value: u8) {
        self.0.fill(value);
    }

    pub fn copy_from(&mut self, data: &[u8]) {
        let len = data.len().min(self.0.len());
        self.0[..len].copy_from_slice(&data[..len]);
    }

    pub fn size(&self) -> u32 {
        self.0.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Index<u32> for RawMemory {
    type Output = u8;

    fn index(&self, index: u32) -> &u8 {
        &self.0[index as usize]
    }
}

impl IndexMut<u32> for RawMemory {
    fn index_mut(&mut self, index: u32) -> &mut u8 {
        &mut self.0[index as usize]
    }
}
