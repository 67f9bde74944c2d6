use remsx::cartridge::attach_error::AttachError;
use remsx::cartridge::rom_image::RomImage;
use remsx::config::MachineConfig;
use remsx::chips::serial_eeprom::Organization;
use remsx::mapper_list::{AttachOptions, MapperKind};
use remsx::memory::machine_bus::{MachineBus, SUBSLOT_REGISTER_ADDRESS};
use remsx::memory::page_binding::UNMAPPED_BYTE;
use remsx::memory::slot_id::{Page, Quadrant, SlotId};
use remsx::save::save_store::MemorySaveStore;

const BANK_SIZE: usize = 0x2000;

// Every 8KiB bank starts with its bank number, the rest varies with the offset.
fn banked_image(name: &str, size: usize) -> (RomImage, Vec<u8>) {
    let bytes: Vec<u8> = (0..size)
        .map(|i| if i % BANK_SIZE == 0 { (i / BANK_SIZE) as u8 } else { (i as u8).wrapping_mul(31) ^ (i >> 13) as u8 })
        .collect();
    (RomImage::from_bytes(name, bytes.clone()), bytes)
}

fn machine() -> MachineBus {
    MachineBus::with_save_store(&MachineConfig::default(), Box::new(MemorySaveStore::new()))
}

fn show_slot(bus: &mut MachineBus, primary: u8) {
    for quadrant in Quadrant::ALL {
        bus.select_primary(quadrant, primary);
    }
}

#[test]
fn ascii8_at_page_zero() {
    let mut bus = machine();
    let (image, bytes) = banked_image("game", 128 * 1024);
    bus.attach(&image, MapperKind::Ascii8, SlotId::new(1, 0), Page::new(0)).unwrap();
    show_slot(&mut bus, 1);

    assert_eq!(bus.read(0x4000), bytes[0]);
    // Relative to the mapper, the window 2 select range starts 0x3000 bytes in.
    bus.write(0x3000, 3);
    assert_eq!(bus.read(0x4000), bytes[3 * BANK_SIZE]);
    assert_eq!(bus.read(0x5FFF), bytes[4 * BANK_SIZE - 1]);
    // Nothing else moved.
    assert_eq!(bus.read(0x0000), bytes[0]);
    assert_eq!(bus.read(0x6000), bytes[0]);
    assert_eq!(bus.read(0x8000), UNMAPPED_BYTE);
}

#[test]
fn ascii8_window_reads_follow_bank_modulo() {
    let mut bus = machine();
    let (image, bytes) = banked_image("game", 128 * 1024);
    bus.attach(&image, MapperKind::Ascii8, SlotId::new(2, 0), Page::new(2)).unwrap();
    show_slot(&mut bus, 2);

    let select_addresses = [0x6000, 0x6800, 0x7000, 0x7800];
    for (window, select) in select_addresses.into_iter().enumerate() {
        for value in [0u8, 5, 15, 16, 0x2F] {
            bus.write(select, value);
            let base = 0x4000 + (window * BANK_SIZE) as u16;
            let bank = usize::from(value) % 16;
            for offset in [0, 1, 0x1234, 0x1FFF] {
                assert_eq!(bus.read(base + offset), bytes[bank * BANK_SIZE + usize::from(offset)]);
            }
        }
    }
}

#[test]
fn sram_survives_detach_and_reattach() {
    let mut bus = machine();
    let (image, _) = banked_image("hydlide", 128 * 1024);
    let slot = SlotId::new(1, 0);
    let handle = bus.attach(&image, MapperKind::Ascii8Sram, slot, Page::new(2)).unwrap();
    show_slot(&mut bus, 1);
    bus.write(0x7800, 0x10);
    for address in 0xA000..0xA100u16 {
        bus.write(address, address as u8 ^ 0x5A);
    }
    let before: Vec<u8> = (0xA000..0xC000u16).map(|address| bus.read(address)).collect();

    assert!(bus.detach(handle));
    assert_eq!(bus.read(0xA000), UNMAPPED_BYTE);

    bus.attach(&image, MapperKind::Ascii8Sram, slot, Page::new(2)).unwrap();
    bus.write(0x7800, 0x10);
    let after: Vec<u8> = (0xA000..0xC000u16).map(|address| bus.read(address)).collect();
    assert_eq!(before, after);
}

#[test]
fn sram_is_read_only_in_low_windows() {
    let mut bus = machine();
    let (image, _) = banked_image("koei", 256 * 1024);
    bus.attach(&image, MapperKind::KoeiSram8, SlotId::new(1, 0), Page::new(2)).unwrap();
    show_slot(&mut bus, 1);

    bus.write(0x7000, 0x20);
    bus.write(0x8000, 0x77);
    bus.write(0x6000, 0x20);
    assert_eq!(bus.read(0x4000), 0x77);
    bus.write(0x4000, 0x11);
    assert_eq!(bus.read(0x4000), 0x77);
}

fn flash_command(bus: &mut MachineBus, steps: &[(u16, u8)]) {
    for &(address, value) in steps {
        bus.write(address, value);
    }
}

fn erase_sector_steps(target: u16) -> [(u16, u8); 6] {
    [(0x4555, 0xAA), (0x42AA, 0x55), (0x4555, 0x80), (0x4555, 0xAA), (0x42AA, 0x55), (target, 0x30)]
}

#[test]
fn flash_sector_erase_through_the_bus() {
    let mut bus = machine();
    let (image, bytes) = banked_image("flash", 512 * 1024);
    bus.attach(&image, MapperKind::MegaFlashRomScc, SlotId::new(1, 0), Page::new(2)).unwrap();
    show_slot(&mut bus, 1);

    // Window 1 shows bank 8, the start of the second sector.
    bus.write(0x7000, 8);
    assert_eq!(bus.read(0x6000), bytes[8 * BANK_SIZE]);
    flash_command(&mut bus, &erase_sector_steps(0x6000));

    for bank in 8..16 {
        bus.write(0x7000, bank);
        assert_eq!(bus.read(0x6000), 0xFF);
        assert_eq!(bus.read(0x7FFF), 0xFF);
    }

    bus.write(0x7000, 16);
    assert_eq!(bus.read(0x6000), bytes[16 * BANK_SIZE]);
    assert_eq!(bus.read(0x4001), bytes[1]);
}

#[test]
fn protected_flash_sector_is_unchanged() {
    let mut bus = machine();
    let (image, bytes) = banked_image("manbow2", 512 * 1024);
    bus.attach(&image, MapperKind::Manbow2, SlotId::new(1, 0), Page::new(2)).unwrap();
    show_slot(&mut bus, 1);

    bus.write(0x7000, 8);
    flash_command(&mut bus, &erase_sector_steps(0x6000));
    assert_eq!(bus.read(0x6000), bytes[8 * BANK_SIZE]);

    // The last sector is the save area.
    bus.write(0x7000, 56);
    flash_command(&mut bus, &erase_sector_steps(0x6000));
    assert_eq!(bus.read(0x6000), 0xFF);
}

#[test]
fn flash_identify_mode_and_abort() {
    let mut bus = machine();
    let (image, bytes) = banked_image("flash", 128 * 1024);
    bus.attach(&image, MapperKind::MegaFlashRomScc, SlotId::new(1, 0), Page::new(2)).unwrap();
    show_slot(&mut bus, 1);

    let revision = bus.revision();
    flash_command(&mut bus, &[(0x4555, 0xAA), (0x42AA, 0x55), (0x4555, 0x90)]);
    assert!(bus.revision() > revision);
    assert_eq!(bus.read(0x4000), 0x01);
    assert_eq!(bus.read(0x4001), 0xA4);
    assert_eq!(bus.peek(0x4000), 0x01);

    bus.write(0x4000, 0xF0);
    assert_eq!(bus.read(0x4000), bytes[0]);
    assert_eq!(bus.read(0x4001), bytes[1]);
}

#[test]
fn flash_contents_persist() {
    let mut bus = machine();
    let (image, _) = banked_image("flash", 512 * 1024);
    let slot = SlotId::new(1, 0);
    let handle = bus.attach(&image, MapperKind::MegaFlashRomScc, slot, Page::new(2)).unwrap();
    show_slot(&mut bus, 1);
    flash_command(&mut bus, &[(0x4555, 0xAA), (0x42AA, 0x55), (0x4555, 0xA0), (0x4010, 0x00)]);
    assert_eq!(bus.read(0x4010), 0x00);
    bus.detach(handle);

    bus.attach(&image, MapperKind::MegaFlashRomScc, slot, Page::new(2)).unwrap();
    assert_eq!(bus.read(0x4010), 0x00);
}

const CS: u8 = 0b100;
const CLK: u8 = 0b010;
const CONTROL: u16 = 0x7FF0;

fn clock_bit(bus: &mut MachineBus, bit: bool) -> bool {
    let data_in = u8::from(bit);
    bus.write(CONTROL, CS | data_in);
    bus.write(CONTROL, CS | CLK | data_in);
    bus.read(CONTROL) & 1 == 1
}

fn clock_bits(bus: &mut MachineBus, value: u32, count: u8) {
    for i in (0..count).rev() {
        clock_bit(bus, (value >> i) & 1 == 1);
    }
}

fn eeprom_command(bus: &mut MachineBus, opcode: u32, address: u32) {
    bus.write(CONTROL, CS);
    clock_bit(bus, true);
    clock_bits(bus, opcode, 2);
    clock_bits(bus, address, 11);
}

fn deselect(bus: &mut MachineBus) {
    bus.write(CONTROL, 0);
}

#[test]
fn eeprom_write_then_read_through_control_register() {
    let mut bus = machine();
    let (image, bytes) = banked_image("config", 16 * 1024);
    let slot = SlotId::new(2, 0);
    let handle = bus.attach(&image, MapperKind::SerialEeprom93C76, slot, Page::new(2)).unwrap();
    show_slot(&mut bus, 2);
    assert_eq!(bus.read(0x4000), bytes[0]);
    assert_eq!(bus.read(CONTROL), 0xFF);

    // EWEN
    eeprom_command(&mut bus, 0b00, 0b110_0000_0000);
    deselect(&mut bus);
    eeprom_command(&mut bus, 0b01, 0x010);
    clock_bits(&mut bus, 0x5A, 8);
    deselect(&mut bus);
    assert_eq!(bus.read(CONTROL) & 1, 0);

    bus.advance_to(1_000_000);
    assert_eq!(bus.read(CONTROL) & 1, 1);

    eeprom_command(&mut bus, 0b10, 0x010);
    let word = (0..8).fold(0u8, |word, _| (word << 1) | u8::from(clock_bit(&mut bus, false)));
    deselect(&mut bus);
    assert_eq!(word, 0x5A);

    bus.detach(handle);
    bus.attach(&image, MapperKind::SerialEeprom93C76, slot, Page::new(2)).unwrap();
    eeprom_command(&mut bus, 0b10, 0x010);
    let word = (0..8).fold(0u8, |word, _| (word << 1) | u8::from(clock_bit(&mut bus, false)));
    assert_eq!(word, 0x5A);
}

#[test]
fn sixteen_bit_eeprom_board() {
    let mut bus = machine();
    let (image, _) = banked_image("config", 16 * 1024);
    let options = AttachOptions { eeprom_organization: Organization::Bits16, ..AttachOptions::default() };
    let handle = bus.attach_with_options(&image, MapperKind::SerialEeprom93C86, SlotId::new(2, 0), Page::new(2), &options)
        .unwrap();
    show_slot(&mut bus, 2);

    // x16 commands carry a 10-bit address.
    let command = |bus: &mut MachineBus, opcode: u32, address: u32| {
        bus.write(CONTROL, CS);
        clock_bit(bus, true);
        clock_bits(bus, opcode, 2);
        clock_bits(bus, address, 10);
    };
    command(&mut bus, 0b00, 0b11_0000_0000);
    deselect(&mut bus);
    command(&mut bus, 0b01, 0x3FF);
    clock_bits(&mut bus, 0xC0DE, 16);
    deselect(&mut bus);
    bus.advance_to(1_000_000);

    let eeprom = bus.cartridge_memory(handle).unwrap().ram().as_slice();
    assert_eq!(eeprom.len(), 2048);
    assert_eq!(&eeprom[0x7FE..], &[0xDE, 0xC0]);

    command(&mut bus, 0b10, 0x3FF);
    let word = (0..16).fold(0u16, |word, _| (word << 1) | u16::from(clock_bit(&mut bus, false)));
    assert_eq!(word, 0xC0DE);
}

#[test]
fn subslot_register_reads_back_inverted() {
    let mut bus = machine();
    bus.write_primary_slot_register(0b11_00_00_00);
    bus.write(SUBSLOT_REGISTER_ADDRESS, 0xA5);
    assert_eq!(bus.read(SUBSLOT_REGISTER_ADDRESS), 0x5A);

    bus.write_primary_slot_register(0b10_00_00_00);
    bus.write(SUBSLOT_REGISTER_ADDRESS, 0xA5);
    assert_eq!(bus.read(SUBSLOT_REGISTER_ADDRESS), UNMAPPED_BYTE);
}

#[test]
fn save_state_round_trip_reproduces_every_read() {
    let mut bus = machine();
    let (konami, _) = banked_image("konami", 256 * 1024);
    let (flash, _) = banked_image("flash", 256 * 1024);
    bus.attach(&konami, MapperKind::KonamiScc, SlotId::new(1, 0), Page::new(2)).unwrap();
    bus.attach(&flash, MapperKind::MegaFlashRomScc, SlotId::new(3, 1), Page::new(2)).unwrap();
    bus.attach_ram(64 * 1024, SlotId::new(3, 0), Page::new(0)).unwrap();

    bus.write_primary_slot_register(0b11_01_01_11);
    bus.write(0x5000, 7);
    bus.write(0x9000, 0x3F);
    bus.write(0x9810, 0x44);
    bus.write(0xB000, 12);
    bus.write(0xC123, 0x99);

    let state = bus.save_state_blob();
    let snapshot: Vec<u8> = (0..=0xFFFFu32).map(|address| bus.peek(address as u16)).collect();

    bus.write(0x5000, 1);
    bus.write(0x9000, 0);
    bus.write(0xC123, 0x00);
    bus.write_primary_slot_register(0);
    bus.load_state_blob(&state).unwrap();

    let restored: Vec<u8> = (0..=0xFFFFu32).map(|address| bus.peek(address as u16)).collect();
    assert_eq!(snapshot, restored);
}

fn peek_everything(bus: &MachineBus) -> Vec<u8> {
    (0..=0xFFFFu32).map(|address| bus.peek(address as u16)).collect()
}

// Bank selects, SRAM enables, SCC register writes and an EEPROM start bit, at the addresses
// the various boards decode them when placed at page 0.
const BUSY_WRITES: [(u16, u8); 13] = [
    (0x1000, 3), (0x2000, 1), (0x2800, 0x11), (0x3000, 0x3F), (0x3800, 0x12), (0x5000, 0x3F),
    (0x5800, 0x42), (0x5801, 0x24), (0x7000, 2), (0x4000, 0x99), (0x9000, 0x5A),
    (0x3FF0, 0b101), (0x3FF0, 0b111),
];

#[test]
fn every_mapper_kind_survives_a_state_round_trip() {
    let (image, _) = banked_image("any", 32 * 1024);
    for kind in MapperKind::all() {
        let slot = SlotId::new(1, 0);
        let mut bus = machine();
        bus.attach(&image, kind, slot, Page::new(0)).unwrap();
        show_slot(&mut bus, 1);
        for (address, value) in BUSY_WRITES {
            bus.write(address, value);
        }

        let state = bus.save_state_blob();
        let snapshot = peek_everything(&bus);

        // Into a freshly attached copy of the same board.
        let mut fresh = machine();
        fresh.attach(&image, kind, slot, Page::new(0)).unwrap();
        fresh.load_state_blob(&state).unwrap();
        assert_eq!(peek_everything(&fresh), snapshot, "{kind} into a fresh machine");

        // And back over later changes.
        for (address, value) in BUSY_WRITES {
            bus.write(address, !value);
        }

        bus.write_primary_slot_register(0);
        bus.load_state_blob(&state).unwrap();
        assert_eq!(peek_everything(&bus), snapshot, "{kind} after further writes");
        assert_eq!(bus.save_state_blob(), state, "{kind} re-saved");
    }
}

#[test]
fn no_cross_talk_between_slot_page_pairs() {
    let config = (0..4).fold(MachineConfig::default(), |config, primary| config.with_subslotted(primary, true));
    let mut bus = MachineBus::with_save_store(&config, Box::new(MemorySaveStore::new()));
    for slot in SlotId::all() {
        for page in Page::all() {
            bus.attach_ram(8 * 1024, slot, page).unwrap();
        }
    }

    let show = |bus: &mut MachineBus, slot: SlotId| {
        bus.write_primary_slot_register(slot.primary() * 0b01_01_01_01);
        bus.write(SUBSLOT_REGISTER_ADDRESS, slot.sub() * 0b01_01_01_01);
    };
    let marker = |slot: SlotId, page: Page| 0x80 | (slot.primary() << 5) | (slot.sub() << 3) | page.to_u8();

    for slot in SlotId::all() {
        show(&mut bus, slot);
        for page in Page::all() {
            bus.write(page.start_address() + 1, marker(slot, page));
        }
    }

    for slot in SlotId::all() {
        show(&mut bus, slot);
        for page in Page::all() {
            assert_eq!(bus.read(page.start_address() + 1), marker(slot, page), "slot {slot} {page}");
            assert_eq!(bus.read(page.start_address() + 2), 0x00, "slot {slot} {page}");
        }
    }
}

#[test]
fn scc_overlay_on_third_window() {
    let mut bus = machine();
    let (image, bytes) = banked_image("scc", 128 * 1024);
    bus.attach(&image, MapperKind::KonamiScc, SlotId::new(1, 0), Page::new(2)).unwrap();
    show_slot(&mut bus, 1);

    assert_eq!(bus.read(0x9800), bytes[2 * BANK_SIZE + 0x1800]);
    bus.write(0x9000, 0x3F);
    bus.write(0x9800, 0x12);
    assert_eq!(bus.read(0x9800), 0x12);
    assert_eq!(bus.read(0x8000), bytes[(0x3F % 16) * BANK_SIZE]);

    bus.write(0x9000, 2);
    assert_eq!(bus.read(0x9800), bytes[2 * BANK_SIZE + 0x1800]);
}

#[test]
fn guessed_attach() {
    let mut bus = machine();
    let mut bytes = vec![0u8; 128 * 1024];
    for (i, target) in [0x5000u16, 0x9000, 0xB000, 0x9000].into_iter().enumerate() {
        let [low, high] = target.to_le_bytes();
        bytes[0x100 + 3 * i..0x100 + 3 * i + 3].copy_from_slice(&[0x32, low, high]);
    }

    let image = RomImage::from_bytes("guess", bytes);
    let handle = bus.attach_guessed(&image, SlotId::new(1, 0), Page::new(2)).unwrap();
    assert_eq!(bus.mapper_kind(handle), Some(MapperKind::KonamiScc));

    let unknown = RomImage::from_bytes("unknown", vec![0; 128 * 1024]);
    assert_eq!(bus.attach_guessed(&unknown, SlotId::new(2, 0), Page::new(2)), Err(AttachError::UnrecognizedImage));
}

#[test]
fn stale_handle_is_inert() {
    let mut bus = machine();
    let (image, _) = banked_image("game", 32 * 1024);
    let handle = bus.attach(&image, MapperKind::Ascii8, SlotId::new(1, 0), Page::new(2)).unwrap();
    assert!(bus.detach(handle));
    assert!(!bus.detach(handle));
    assert!(!bus.set_write_zero_hook(handle));
    assert_eq!(bus.mapper_kind(handle), None);
}

#[test]
fn bad_images_are_rejected_without_side_effects() {
    let mut bus = machine();
    let revision = bus.revision();
    let (odd, _) = banked_image("odd", 24 * 1024);
    assert_eq!(
        bus.attach(&odd, MapperKind::Ascii16, SlotId::new(1, 0), Page::new(2)),
        Err(AttachError::BadImageSize { size: 24 * 1024, granularity: 16 * 1024 }),
    );
    assert_eq!(
        bus.attach(&RomImage::from_bytes("empty", Vec::new()), MapperKind::Konami4, SlotId::new(1, 0), Page::new(2)),
        Err(AttachError::EmptyImage),
    );
    assert_eq!(bus.revision(), revision);
    assert!(bus.attached_handles().is_empty());
}
