pub mod save_state;
pub mod save_store;
