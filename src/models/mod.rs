mod core_port;
mod params;

pub use core_port::*;
pub use params::*;
