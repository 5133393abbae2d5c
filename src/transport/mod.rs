//! Transport layer: a CAN bus device tunneled over sockets.
//!
//! This module provides the bus-device contract used by the bus-management
//! layer and its socket implementation:
//! - [`CanDevice`]: probe/write/close plus an asynchronous receive callback
//! - [`socket::SocketCan`]: per-port socket connections, one shared receive
//!   thread, fixed-size wire frames
//!
//! The device keeps a registry of open ports. Probing the first port starts
//! the receive thread; closing the last one stops it. The thread visits every
//! open port in turn and tries to receive one frame from each, handing
//! decoded frames to that port's callback.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cansock::transport::CanDevice;
//! use cansock::SocketCan;
//!
//! let can = SocketCan::global();
//! can.probe(0, 1, 500_000, Box::new(|bus: u32, id: u32, dlc: u8, data: &[u8]| {
//!     println!("bus {} rx 0x{:X} [{}] {:02X?}", bus, id, dlc, data);
//! }))
//! .unwrap();
//!
//! can.write(0, 1, 0x123, 3, &[0xAA, 0xBB, 0xCC]).unwrap();
//! can.close(0, 1);
//! ```

pub mod registry;
mod rx;
pub mod socket;

use crate::error::Result;
use crate::types::{BusId, CanId, PortNumber, RxNotification};

pub use registry::ConnectionInfo;
pub use socket::{SocketCan, SocketCanConfig};

/// Bus device contract that must be implemented by CAN device backends
pub trait CanDevice: Send + Sync {
    fn name(&self) -> &'static str;

    /// Opens `port`; `on_receive` runs on the receive thread for each frame
    fn probe(
        &self,
        bus_id: BusId,
        port: PortNumber,
        bitrate: u32,
        on_receive: RxNotification,
    ) -> Result<()>;

    /// Sends the first `dlc` bytes of `data` as one frame on `port`
    fn write(
        &self,
        bus_id: BusId,
        port: PortNumber,
        can_id: CanId,
        dlc: u8,
        data: &[u8],
    ) -> Result<()>;

    /// Closes `port`; closing a port that is not open does nothing
    fn close(&self, bus_id: BusId, port: PortNumber);
}
