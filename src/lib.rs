pub mod cartridge;
pub mod chips;
pub mod config;
pub mod mapper;
pub mod mapper_list;
pub mod mappers;
pub mod memory;
pub mod save;
pub mod util;
