pub mod store;
pub mod voice;
