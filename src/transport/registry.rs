use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::rx::RxDaemon;
use crate::error::{Result, SocketCanError};
use crate::physical::SocketPort;
use crate::types::{BusId, Frame, PortNumber, RxNotification};

/// Read-only view of an open port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub bus_id: BusId,
    pub port: PortNumber,
    pub bitrate: u32,
    pub peer: SocketAddr,
}

/// One open logical CAN port and the socket carrying it
pub struct PortConnection {
    bus_id: BusId,
    port: PortNumber,
    bitrate: u32, // informational, never negotiated over the wire
    peer: SocketAddr,
    // Taken out and dropped on close, which releases the OS socket
    socket: RwLock<Option<Box<dyn SocketPort>>>,
    on_receive: RxNotification,
    closed: AtomicBool,
}

impl PortConnection {
    pub fn new(
        bus_id: BusId,
        port: PortNumber,
        bitrate: u32,
        socket: Box<dyn SocketPort>,
        on_receive: RxNotification,
    ) -> Self {
        let peer = socket.peer_addr();
        Self {
            bus_id,
            port,
            bitrate,
            peer,
            socket: RwLock::new(Some(socket)),
            on_receive,
            closed: AtomicBool::new(false),
        }
    }

    pub fn bus_id(&self) -> BusId {
        self.bus_id
    }

    pub fn port(&self) -> PortNumber {
        self.port
    }

    pub fn bitrate(&self) -> u32 {
        self.bitrate
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            bus_id: self.bus_id,
            port: self.port,
            bitrate: self.bitrate,
            peer: self.peer,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn send(&self, buf: &[u8]) -> io::Result<usize> {
        match self.socket.read().as_deref() {
            Some(socket) => socket.send(buf),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    pub(crate) fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self.socket.read().as_deref() {
            Some(socket) => socket.recv(buf),
            None => Err(io::Error::from(io::ErrorKind::NotConnected)),
        }
    }

    /// Hands a received frame to the registered callback
    pub(crate) fn notify(&self, frame: &Frame) {
        (self.on_receive)(self.bus_id, frame.id(), frame.dlc(), frame.data());
    }

    /// Marks the connection closed, then shuts its socket down and releases it.
    ///
    /// Returns once the socket is dropped; a receive in flight on it holds
    /// the read lock until its deadline expires at the latest.
    pub(crate) fn close(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::Release);
        let result = match self.socket.read().as_deref() {
            Some(socket) => socket.shutdown(),
            None => Ok(()),
        };
        drop(self.socket.write().take());
        result
    }
}

impl fmt::Debug for PortConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortConnection")
            .field("bus_id", &self.bus_id)
            .field("port", &self.port)
            .field("bitrate", &self.bitrate)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Open connections in insertion order, plus the receive loop serving them.
///
/// Holds at most one connection per port. The receive loop is present iff the
/// registry is non-empty; the lifecycle keeps that true on every insert and
/// remove, under the same lock that guards the registry.
#[derive(Debug, Default)]
pub struct Registry {
    connections: Vec<Arc<PortConnection>>,
    daemon: Option<RxDaemon>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, port: PortNumber) -> Option<Arc<PortConnection>> {
        self.connections
            .iter()
            .find(|connection| connection.port == port)
            .cloned()
    }

    pub fn insert(&mut self, connection: Arc<PortConnection>) -> Result<()> {
        if self.lookup(connection.port).is_some() {
            return Err(SocketCanError::AlreadyOpen {
                port: connection.port,
            });
        }
        self.connections.push(connection);
        Ok(())
    }

    /// Detaches the connection for `port`; closing its socket is up to the caller
    pub fn remove(&mut self, port: PortNumber) -> Option<Arc<PortConnection>> {
        let index = self
            .connections
            .iter()
            .position(|connection| connection.port == port)?;
        Some(self.connections.remove(index))
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn ports(&self) -> Vec<PortNumber> {
        self.connections.iter().map(|c| c.port).collect()
    }

    /// Copy of the connection handles for iteration outside the lock
    pub fn snapshot(&self) -> Vec<Arc<PortConnection>> {
        self.connections.clone()
    }

    /// Whether a receive loop is attached
    pub fn is_running(&self) -> bool {
        self.daemon.is_some()
    }

    pub(crate) fn set_daemon(&mut self, daemon: RxDaemon) {
        self.daemon = Some(daemon);
    }

    pub(crate) fn take_daemon(&mut self) -> Option<RxDaemon> {
        self.daemon.take()
    }

    pub(crate) fn drain(&mut self) -> Vec<Arc<PortConnection>> {
        std::mem::take(&mut self.connections)
    }
}
