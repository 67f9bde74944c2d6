use std::process;

use structopt::StructOpt;

use remsx::cartridge::rom_image::RomImage;
use remsx::config::Opt;
use remsx::memory::machine_bus::MachineBus;
use remsx::memory::slot_id::{Page, Quadrant, SlotId, PAGE_COUNT, SLOT_COUNT};
use remsx::util::logger::{self, Logger};

fn main() {
    let opt = Opt::from_args();
    let logger = Logger {
        log_bank_switches: opt.log_bank_switches,
        log_flash_commands: opt.log_flash_commands,
        log_eeprom_protocol: opt.log_eeprom_protocol,
        ..Logger::default()
    };
    logger::init(logger).unwrap();

    if usize::from(opt.slot) >= SLOT_COUNT || usize::from(opt.subslot) >= SLOT_COUNT || usize::from(opt.page) >= PAGE_COUNT {
        eprintln!("Slot {}-{} page {} is outside of the machine.", opt.slot, opt.subslot, opt.page);
        process::exit(1);
    }

    let image = RomImage::load(&opt.rom_path).unwrap_or_else(|err| {
        eprintln!("{err}");
        process::exit(1);
    });

    let mut bus = MachineBus::new(&opt.machine_config());
    let slot = SlotId::new(opt.slot, opt.subslot);
    let start_page = Page::new(opt.page);
    let result = match opt.mapper {
        Some(kind) => bus.attach(&image, kind, slot, start_page),
        None => bus.attach_guessed(&image, slot, start_page),
    };
    let handle = result.unwrap_or_else(|err| {
        eprintln!("{err}");
        process::exit(1);
    });

    if let Some(placement) = bus.placement(handle) {
        for page in placement.pages() {
            bus.select_primary(page.quadrant(), opt.slot);
        }

        if opt.subslot > 0 {
            // The sub-slot register lives in quadrant 3 of the expanded slot.
            bus.select_primary(Quadrant::Q3, opt.slot);
            let register = Quadrant::ALL.iter()
                .fold(0, |register, quadrant| register | (opt.subslot << (2 * quadrant.index())));
            bus.write(0xFFFF, register);
        }
    }

    println!("{} mapped as {}:", image.name(), bus.mapper_kind(handle).map_or("?", |kind| kind.name()));
    println!("{}", bus.slot_map_summary());
    bus.shutdown();
}
