//! Physical layer: the socket substrate CAN frames are tunneled over.
//!
//! Each logical CAN port maps to one socket endpoint at `base_port + port`:
//! - Stream mode: a TCP connection to `host`, usually a loopback bus server
//! - Datagram mode: a UDP socket bound on the wildcard address that sends to
//!   `host` (a broadcast address by default), so every node on the segment
//!   sees every frame
//!
//! The transport layer only talks to [`Connector`] and [`SocketPort`], so the
//! substrate can be swapped for the in-memory mock in tests.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cansock::physical::{Connector, SocketConfig, SocketConnector, SocketPort};
//!
//! let connector = SocketConnector::new(SocketConfig::default());
//! let socket = connector.connect(1).unwrap(); // 127.0.0.1:81
//! socket.send(&[0u8; 69]).unwrap();
//! ```

pub mod datagram;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod stream;

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use bitflags::bitflags;

use crate::error::{Result, SocketCanError};
use crate::types::{Config, PortNumber};

pub use datagram::DatagramPort;
pub use stream::StreamPort;

/// Offset added to the logical port number to form the network port
pub const DEFAULT_BASE_PORT: u16 = 80;

/// Group joined by datagram sockets when `SocketOptions::MULTICAST` is set
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(226, 0, 0, 1);

/// One open socket endpoint carrying fixed-size wire frames.
///
/// All operations take `&self` so the write path and the receive thread can
/// share an endpoint without locking it.
pub trait SocketPort: Send + Sync {
    /// Single send attempt; returns the number of bytes accepted
    fn send(&self, buf: &[u8]) -> io::Result<usize>;
    /// Single receive attempt, bounded by the configured receive deadline
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn peer_addr(&self) -> SocketAddr;
    /// Best-effort shutdown used to unblock a pending receive
    fn shutdown(&self) -> io::Result<()>;
}

/// Opens socket endpoints for logical CAN ports
pub trait Connector: Send + Sync {
    fn connect(&self, port: PortNumber) -> io::Result<Box<dyn SocketPort>>;
}

/// How a port's socket is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketMode {
    /// TCP connect to `host:base_port + port`
    #[default]
    Stream,
    /// UDP bind on `0.0.0.0:base_port + port`, send to `host:base_port + port`
    Datagram,
}

bitflags! {
    /// Socket options applied when a port is opened
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SocketOptions: u32 {
        const NONE = 0;
        const NODELAY = 1 << 0;       // TCP_NODELAY (stream only)
        const REUSE_ADDRESS = 1 << 1; // SO_REUSEADDR (datagram only)
        const BROADCAST = 1 << 2;     // SO_BROADCAST (datagram only)
        const MULTICAST = 1 << 3;     // join `multicast_group` (datagram only)
    }
}

/// Socket substrate configuration
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub host: IpAddr,
    pub base_port: u16,
    pub mode: SocketMode,
    pub options: SocketOptions,
    pub connect_timeout_ms: u32,
    pub rx_timeout_ms: u32,
    pub multicast_group: Ipv4Addr,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: DEFAULT_BASE_PORT,
            mode: SocketMode::Stream,
            options: SocketOptions::NODELAY,
            connect_timeout_ms: 2000,
            rx_timeout_ms: 10,
            multicast_group: DEFAULT_MULTICAST_GROUP,
        }
    }
}

impl SocketConfig {
    /// Datagram defaults: broadcast on the local segment
    pub fn datagram() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::BROADCAST),
            mode: SocketMode::Datagram,
            options: SocketOptions::BROADCAST | SocketOptions::REUSE_ADDRESS,
            ..Default::default()
        }
    }

    /// Network address of a logical port
    pub fn port_address(&self, port: PortNumber) -> io::Result<SocketAddr> {
        let number = u32::from(self.base_port)
            .checked_add(port)
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("port {} + {} exceeds the network port range", self.base_port, port),
                )
            })?;
        Ok(SocketAddr::new(self.host, number))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.connect_timeout_ms))
    }

    pub fn rx_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.rx_timeout_ms))
    }
}

impl Config for SocketConfig {
    fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(SocketCanError::InvalidParameter(
                "connect_timeout_ms must be non-zero",
            ));
        }
        // A zero read timeout would make every receive block indefinitely
        if self.rx_timeout_ms == 0 {
            return Err(SocketCanError::InvalidParameter(
                "rx_timeout_ms must be non-zero",
            ));
        }
        if self.options.contains(SocketOptions::MULTICAST) && !self.multicast_group.is_multicast() {
            return Err(SocketCanError::InvalidParameter(
                "multicast_group is not a multicast address",
            ));
        }
        Ok(())
    }
}

/// [`Connector`] over real TCP/UDP sockets
#[derive(Debug, Clone)]
pub struct SocketConnector {
    config: SocketConfig,
}

impl SocketConnector {
    pub fn new(config: SocketConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }
}

impl Connector for SocketConnector {
    fn connect(&self, port: PortNumber) -> io::Result<Box<dyn SocketPort>> {
        let addr = self.config.port_address(port)?;
        match self.config.mode {
            SocketMode::Stream => Ok(Box::new(StreamPort::connect(addr, &self.config)?)),
            SocketMode::Datagram => Ok(Box::new(DatagramPort::bind(addr, &self.config)?)),
        }
    }
}
