//! Input discovery

pub mod file_scanner;

pub use file_scanner::resolve_inputs;
