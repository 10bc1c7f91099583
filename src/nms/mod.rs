pub mod client;
pub mod resolve;
pub mod types;

pub use client::NmsClient;
pub use resolve::{resolve_core_port, PortDirectory, PRESTAGE_MARKER};
