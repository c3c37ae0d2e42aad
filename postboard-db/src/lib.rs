pub mod client;
pub mod memory;
pub mod store;
