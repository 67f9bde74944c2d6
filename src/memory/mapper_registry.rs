use crate::mapper::{Mapper, Placement};
use crate::memory::cartridge_memory::CartridgeMemory;
use crate::memory::mapper_handle::MapperHandle;
use crate::memory::page_binding::{Backing, UNMAPPED_BYTE};

pub struct AttachedMapper {
    pub mapper: Box<dyn Mapper>,
    pub memory: CartridgeMemory,
    pub placement: Placement,
    pub image_name: String,
    pub persistence_key: Option<String>,
}

struct Entry {
    generation: u32,
    attached: Option<AttachedMapper>,
}

// The attached mappers, addressed by generation-checked handles. A handle to a removed mapper
// never resolves, even after its entry is reused.
#[derive(Default)]
pub struct MapperRegistry {
    entries: Vec<Entry>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, attached: AttachedMapper) -> MapperHandle {
        if let Some(index) = self.entries.iter().position(|entry| entry.attached.is_none()) {
            let entry = &mut self.entries[index];
            entry.attached = Some(attached);
            return MapperHandle::new(index as u16, entry.generation);
        }

        let index = self.entries.len();
        assert!(index < usize::from(u16::MAX), "Too many mappers attached.");
        self.entries.push(Entry { generation: 0, attached: Some(attached) });
        MapperHandle::new(index as u16, 0)
    }

    pub fn get(&self, handle: MapperHandle) -> Option<&AttachedMapper> {
        self.entries.get(handle.index())
            .filter(|entry| entry.generation == handle.generation())
            .and_then(|entry| entry.attached.as_ref())
    }

    pub fn get_mut(&mut self, handle: MapperHandle) -> Option<&mut AttachedMapper> {
        self.entries.get_mut(handle.index())
            .filter(|entry| entry.generation == handle.generation())
            .and_then(|entry| entry.attached.as_mut())
    }

    pub fn remove(&mut self, handle: MapperHandle) -> Option<AttachedMapper> {
        let entry = self.entries.get_mut(handle.index())
            .filter(|entry| entry.generation == handle.generation())?;
        let attached = entry.attached.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        Some(attached)
    }

    pub fn handles(&self) -> Vec<MapperHandle> {
        self.entries.iter()
            .enumerate()
            .filter(|(_, entry)| entry.attached.is_some())
            .map(|(index, entry)| MapperHandle::new(index as u16, entry.generation))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.attached.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn read_backing(&self, backing: Backing, address: u16) -> u8 {
        match backing {
            Backing::Unmapped => UNMAPPED_BYTE,
            Backing::Memory(window) => self.get(window.owner)
                .and_then(|attached| attached.memory.region(window.region).get(window.index(address)))
                .unwrap_or(UNMAPPED_BYTE),
        }
    }

    #[inline]
    pub fn write_backing(&mut self, backing: Backing, address: u16, value: u8) {
        if let Backing::Memory(window) = backing
            && let Some(attached) = self.get_mut(window.owner)
            && let Some(byte) = attached.memory.region_mut(window.region).get_mut(window.index(address))
        {
            *byte = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::rom_image::RomImage;
    use crate::mapper::{Mapper, Placement};
    use crate::mapper_list::{new_mapper, AttachOptions, MapperKind};
    use crate::memory::page_binding::{BackingWindow, Region};
    use crate::memory::slot_id::{Page, SlotId};

    fn attached(fill: u8) -> AttachedMapper {
        let image = RomImage::from_bytes("test", vec![fill; 0x4000]);
        let mapper: Box<dyn Mapper> = new_mapper(MapperKind::PlainRom, &image, &AttachOptions::default()).unwrap();
        let memory = mapper.allocate(&image);
        AttachedMapper {
            mapper,
            memory,
            placement: Placement { slot: SlotId::new(1, 0), start_page: Page::new(2), page_count: 2 },
            image_name: "test".to_owned(),
            persistence_key: None,
        }
    }

    #[test]
    fn stale_handle_does_not_resolve_after_reuse() {
        let mut registry = MapperRegistry::new();
        let first = registry.insert(attached(0x11));
        assert!(registry.remove(first).is_some());

        let second = registry.insert(attached(0x22));
        assert_eq!(first.index(), second.index());
        assert!(registry.get(first).is_none());
        assert!(registry.remove(first).is_none());
        assert!(registry.get(second).is_some());
    }

    #[test]
    fn stale_backing_reads_open_bus() {
        let mut registry = MapperRegistry::new();
        let handle = registry.insert(attached(0x11));
        let backing = Backing::Memory(BackingWindow { owner: handle, region: Region::Rom, offset: 0, mask: 0x1FFF });
        assert_eq!(registry.read_backing(backing, 0x4000), 0x11);

        registry.remove(handle);
        assert_eq!(registry.read_backing(backing, 0x4000), UNMAPPED_BYTE);
        registry.write_backing(backing, 0x4000, 0x33);
        assert!(registry.is_empty());
    }
}
