use crate::memory::mapper_handle::MapperHandle;
use crate::memory::page_binding::PageBinding;
use crate::memory::slot_id::{Page, Quadrant, SlotId, PAGE_COUNT, SLOT_COUNT};

// Every (primary slot, sub-slot, page) binding, plus a per-page copy of whichever binding is
// currently visible to the CPU.
#[derive(Clone, Debug)]
pub struct PageTable {
    bindings: [[[PageBinding; PAGE_COUNT]; SLOT_COUNT]; SLOT_COUNT],
    active_slots: [SlotId; PAGE_COUNT],
    active: ActivePages,
    revision: u64,
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ActivePages([PageBinding; PAGE_COUNT]);

impl ActivePages {
    pub fn get(&self, page: Page) -> &PageBinding {
        &self.0[page.index()]
    }
}

impl PageTable {
    pub fn new() -> Self {
        Self {
            bindings: [[[PageBinding::UNMAPPED; PAGE_COUNT]; SLOT_COUNT]; SLOT_COUNT],
            active_slots: [SlotId::new(0, 0); PAGE_COUNT],
            active: ActivePages([PageBinding::UNMAPPED; PAGE_COUNT]),
            revision: 0,
        }
    }

    pub fn binding(&self, slot: SlotId, page: Page) -> &PageBinding {
        &self.bindings[usize::from(slot.primary())][usize::from(slot.sub())][page.index()]
    }

    #[inline]
    pub fn active(&self, page: Page) -> &PageBinding {
        self.active.get(page)
    }

    pub fn active_pages(&self) -> &ActivePages {
        &self.active
    }

    pub fn active_slot(&self, page: Page) -> SlotId {
        self.active_slots[page.index()]
    }

    // Bumped whenever what the CPU sees changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn bind(&mut self, slot: SlotId, page: Page, binding: PageBinding) {
        self.bindings[usize::from(slot.primary())][usize::from(slot.sub())][page.index()] = binding;
        self.rebind_active_if_current(slot, page);
    }

    pub fn unbind(&mut self, slot: SlotId, page: Page) {
        self.bind(slot, page, PageBinding::UNMAPPED);
    }

    // Removes every binding that refers to the specified mapper, wherever it lives.
    pub fn unbind_owner(&mut self, owner: MapperHandle) -> usize {
        let mut unbound = 0;
        for slot in SlotId::all() {
            for page in Page::all() {
                if self.binding(slot, page).owner() == Some(owner) {
                    self.unbind(slot, page);
                    unbound += 1;
                }
            }
        }

        unbound
    }

    pub fn activate(&mut self, quadrant: Quadrant, slot: SlotId) {
        for page in quadrant.pages() {
            self.active_slots[page.index()] = slot;
            self.refresh_active(page);
        }
    }

    fn rebind_active_if_current(&mut self, slot: SlotId, page: Page) {
        if self.active_slots[page.index()] == slot {
            self.refresh_active(page);
        }
    }

    fn refresh_active(&mut self, page: Page) {
        let binding = *self.binding(self.active_slots[page.index()], page);
        let active = &mut self.active.0[page.index()];
        if *active != binding {
            *active = binding;
            self.revision += 1;
        }
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}
