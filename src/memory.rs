pub mod bank_index;
pub mod cartridge_memory;
pub mod machine_bus;
pub mod mapper_handle;
pub mod mapper_registry;
pub mod page_binding;
pub mod page_table;
pub mod raw_memory;
pub mod slot_id;
pub mod slot_selector;
