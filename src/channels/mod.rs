//! Concrete group channels
//!
//! - [`memory::MemoryChannel`]: in-process group for tests and simulation
//! - [`udp::UdpChannel`]: UDP broadcast group standing in for the radio

pub mod memory;
pub mod udp;

pub use memory::MemoryChannel;
pub use udp::UdpChannel;
