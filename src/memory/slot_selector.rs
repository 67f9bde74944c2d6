use enum_iterator::all;
use log::debug;
use modular_bitfield::prelude::*;

use crate::memory::page_table::PageTable;
use crate::memory::slot_id::{Quadrant, SlotId, SLOT_COUNT};

// Two bits per quadrant, lowest quadrant in the lowest bits. Used both for the primary slot
// register and for each expanded slot's sub-slot register.
#[bitfield]
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct SlotRegister {
    quadrant0: B2,
    quadrant1: B2,
    quadrant2: B2,
    quadrant3: B2,
}

impl SlotRegister {
    pub fn from_u8(value: u8) -> Self {
        SlotRegister::from_bytes([value])
    }

    pub fn to_u8(self) -> u8 {
        self.into_bytes()[0]
    }

    pub fn get(self, quadrant: Quadrant) -> u8 {
        match quadrant {
            Quadrant::Q0 => self.quadrant0(),
            Quadrant::Q1 => self.quadrant1(),
            Quadrant::Q2 => self.quadrant2(),
            Quadrant::Q3 => self.quadrant3(),
        }
    }

    pub fn set(&mut self, quadrant: Quadrant, value: u8) {
        match quadrant {
            Quadrant::Q0 => self.set_quadrant0(value),
            Quadrant::Q1 => self.set_quadrant1(value),
            Quadrant::Q2 => self.set_quadrant2(value),
            Quadrant::Q3 => self.set_quadrant3(value),
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct SlotSelection {
    pub primary: u8,
    pub sub: u8,
    pub subslotted: bool,
}

#[derive(Clone, Debug)]
pub struct SlotSelector {
    primary: SlotRegister,
    // Indexed by primary slot. Only consulted when that slot is sub-slotted.
    subslot_registers: [SlotRegister; SLOT_COUNT],
    subslotted: [bool; SLOT_COUNT],
}

impl SlotSelector {
    pub fn new(subslotted: [bool; SLOT_COUNT]) -> Self {
        Self {
            primary: SlotRegister::new(),
            subslot_registers: [SlotRegister::new(); SLOT_COUNT],
            subslotted,
        }
    }

    pub fn is_subslotted(&self, primary: u8) -> bool {
        self.subslotted[usize::from(primary)]
    }

    pub fn selection(&self, quadrant: Quadrant) -> SlotSelection {
        let primary = self.primary.get(quadrant);
        let subslotted = self.is_subslotted(primary);
        let sub = if subslotted { self.subslot_registers[usize::from(primary)].get(quadrant) } else { 0 };
        SlotSelection { primary, sub, subslotted }
    }

    pub fn visible_slot(&self, quadrant: Quadrant) -> SlotId {
        let selection = self.selection(quadrant);
        SlotId::new(selection.primary, selection.sub)
    }

    pub fn select_primary(&mut self, table: &mut PageTable, quadrant: Quadrant, primary: u8) {
        assert!(usize::from(primary) < SLOT_COUNT, "Primary slot must be less than 4.");
        self.primary.set(quadrant, primary);
        table.activate(quadrant, self.visible_slot(quadrant));
    }

    pub fn primary_slot_register(&self) -> u8 {
        self.primary.to_u8()
    }

    pub fn write_primary_slot_register(&mut self, table: &mut PageTable, value: u8) {
        self.primary = SlotRegister::from_u8(value);
        self.reactivate_all(table);
    }

    // Whether the top byte of the address space is currently the sub-slot register.
    pub fn subslot_register_visible(&self) -> bool {
        self.is_subslotted(self.primary.get(Quadrant::Q3))
    }

    pub fn write_subslot_register(&mut self, table: &mut PageTable, value: u8) {
        let owner = self.primary.get(Quadrant::Q3);
        // Stored even for an unexpanded slot so that write-then-read probing sees the bits.
        self.subslot_registers[usize::from(owner)] = SlotRegister::from_u8(value);
        if !self.is_subslotted(owner) {
            return;
        }

        debug!("Sub-slot register of slot {owner} set to {value:02X}.");
        for quadrant in all::<Quadrant>() {
            if self.primary.get(quadrant) == owner {
                table.activate(quadrant, self.visible_slot(quadrant));
            }
        }
    }

    pub fn read_subslot_register(&self) -> u8 {
        let owner = self.primary.get(Quadrant::Q3);
        !self.subslot_registers[usize::from(owner)].to_u8()
    }

    pub fn subslot_register(&self, primary: u8) -> u8 {
        self.subslot_registers[usize::from(primary)].to_u8()
    }

    pub fn set_subslotted(&mut self, table: &mut PageTable, primary: u8, subslotted: bool) {
        self.subslotted[usize::from(primary)] = subslotted;
        for quadrant in all::<Quadrant>() {
            if self.primary.get(quadrant) == primary {
                table.activate(quadrant, self.visible_slot(quadrant));
            }
        }
    }

    // Restores raw register contents, as from a saved state, then re-derives the active pages.
    pub fn restore(&mut self, table: &mut PageTable, primary: u8, subslot_registers: [u8; SLOT_COUNT]) {
        self.primary = SlotRegister::from_u8(primary);
        for (register, value) in self.subslot_registers.iter_mut().zip(subslot_registers) {
            *register = SlotRegister::from_u8(value);
        }

        self.reactivate_all(table);
    }

    pub fn reactivate_all(&self, table: &mut PageTable) {
        for quadrant in all::<Quadrant>() {
            table.activate(quadrant, self.visible_slot(quadrant));
        }
    }
}
