pub mod attach_error;
pub mod rom_guess;
pub mod rom_image;
