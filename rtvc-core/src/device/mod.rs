pub mod memory;
pub mod signals;
