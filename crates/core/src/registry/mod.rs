//! Twin registry port.

pub mod ports;

pub use ports::TwinRegistry;
