// OSI Layer modules
pub mod data_link; // Fixed-size wire framing of CAN frames
pub mod physical; // TCP/UDP socket substrate
pub mod transport; // Socket CAN device: port registry, lifecycle, receive loop

// Re-exports for convenience
pub use data_link::{FrameCodec, WireFormat};
pub use physical::{SocketConfig, SocketMode, SocketOptions};
pub use transport::{CanDevice, SocketCan, SocketCanConfig};

// Common types and traits
pub mod error;
pub mod types;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
