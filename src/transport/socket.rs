use std::io;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use super::registry::{ConnectionInfo, PortConnection, Registry};
use super::rx::RxDaemon;
use super::CanDevice;
use crate::data_link::{FrameCodec, WireFormat};
use crate::error::{Result, SocketCanError};
use crate::physical::{Connector, SocketConfig, SocketConnector};
use crate::types::{BusId, CanId, Config, Frame, PortNumber, RxNotification};

/// Name the device reports on the bus-device contract
pub const DEVICE_NAME: &str = "socket";

static GLOBAL: OnceLock<SocketCan> = OnceLock::new();

/// Socket CAN device configuration
#[derive(Debug, Clone, Default)]
pub struct SocketCanConfig {
    pub socket: SocketConfig,
    pub wire_format: WireFormat,
}

impl Config for SocketCanConfig {
    fn validate(&self) -> Result<()> {
        self.socket.validate()
    }
}

/// CAN bus emulated over TCP/UDP sockets.
///
/// Each probed port gets its own socket at `base_port + port`. A single
/// background thread receives from all open ports while at least one is open,
/// and is stopped when the last one closes.
pub struct SocketCan<C: Connector = SocketConnector> {
    config: SocketCanConfig,
    codec: Arc<dyn FrameCodec>,
    connector: C,
    registry: Arc<Mutex<Registry>>,
}

impl SocketCan<SocketConnector> {
    /// Creates a device over real sockets
    pub fn new(config: SocketCanConfig) -> Result<Self> {
        let connector = SocketConnector::new(config.socket.clone());
        Self::with_connector(config, connector)
    }

    /// Process-wide device with the default configuration, created on first
    /// use unless [`SocketCan::init_global`] ran before. It is never torn
    /// down; closing every port only stops its receive loop.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| {
            let config = SocketCanConfig::default();
            let connector = SocketConnector::new(config.socket.clone());
            Self::build(config, connector)
        })
    }

    /// Configures the process-wide device; fails once it exists
    pub fn init_global(config: SocketCanConfig) -> Result<&'static Self> {
        let device = Self::new(config)?;
        if GLOBAL.set(device).is_err() {
            return Err(SocketCanError::InvalidParameter(
                "global CAN socket device already initialized",
            ));
        }
        Ok(Self::global())
    }
}

impl<C: Connector> SocketCan<C> {
    /// Creates a device over a custom socket substrate
    pub fn with_connector(config: SocketCanConfig, connector: C) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, connector))
    }

    fn build(config: SocketCanConfig, connector: C) -> Self {
        Self {
            codec: config.wire_format.codec(),
            config,
            connector,
            registry: Arc::new(Mutex::new(Registry::new())),
        }
    }

    pub fn config(&self) -> &SocketCanConfig {
        &self.config
    }

    pub fn wire_format(&self) -> WireFormat {
        self.config.wire_format
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Open ports in probe order
    pub fn open_ports(&self) -> Vec<PortNumber> {
        self.registry.lock().ports()
    }

    pub fn is_open(&self, port: PortNumber) -> bool {
        self.registry.lock().lookup(port).is_some()
    }

    /// Whether the receive loop is active
    pub fn is_running(&self) -> bool {
        self.registry.lock().is_running()
    }

    pub fn connection_info(&self, port: PortNumber) -> Option<ConnectionInfo> {
        self.registry.lock().lookup(port).map(|c| c.info())
    }

    /// Closes every open port and stops the receive loop; safe to repeat
    pub fn shutdown(&self) {
        let (connections, daemon) = {
            let mut registry = self.registry.lock();
            let daemon = registry.take_daemon();
            if let Some(daemon) = &daemon {
                daemon.terminate();
            }
            (registry.drain(), daemon)
        };

        for connection in connections {
            close_connection(&connection);
        }
        if let Some(daemon) = daemon {
            daemon.join();
            info!("CAN socket receive loop stopped");
        }
    }

    fn send_frame(&self, connection: &PortConnection, frame: &Frame) -> Result<()> {
        let port = connection.port();
        let wire = self.codec.encode_to_vec(frame)?;

        let source = match connection.send(&wire) {
            Ok(n) if n == wire.len() => {
                trace!(
                    port,
                    can_id = frame.id(),
                    dlc = frame.dlc(),
                    "CAN socket frame sent"
                );
                return Ok(());
            }
            Ok(n) => io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short send: {} of {} bytes", n, wire.len()),
            ),
            Err(source) => source,
        };

        let err = SocketCanError::SendFailed { port, source };
        warn!(port, error = %err, "CAN socket send message failed");
        Err(err)
    }
}

impl<C: Connector> CanDevice for SocketCan<C> {
    fn name(&self) -> &'static str {
        DEVICE_NAME
    }

    fn probe(
        &self,
        bus_id: BusId,
        port: PortNumber,
        bitrate: u32,
        on_receive: RxNotification,
    ) -> Result<()> {
        if self.is_open(port) {
            warn!(port, "CAN socket port is already on-line, no need to probe it again");
            return Err(SocketCanError::AlreadyOpen { port });
        }

        // Connect outside the lock so a slow peer never stalls the receive loop
        let socket = self.connector.connect(port).map_err(|source| {
            let err = SocketCanError::ConnectFailed { port, source };
            warn!(port, error = %err, "CAN socket open failed");
            err
        })?;
        let connection = Arc::new(PortConnection::new(
            bus_id, port, bitrate, socket, on_receive,
        ));

        let mut registry = self.registry.lock();
        if let Err(err) = registry.insert(Arc::clone(&connection)) {
            // Lost a race with a concurrent probe of the same port
            warn!(port, "CAN socket port is already on-line, no need to probe it again");
            close_connection(&connection);
            return Err(err);
        }

        if !registry.is_running() {
            match RxDaemon::spawn(Arc::clone(&self.registry), Arc::clone(&self.codec)) {
                Ok(daemon) => {
                    registry.set_daemon(daemon);
                    info!("CAN socket receive loop started");
                }
                Err(source) => {
                    registry.remove(port);
                    drop(registry);
                    close_connection(&connection);
                    let err = SocketCanError::RxSpawnFailed(source);
                    warn!(port, error = %err, "CAN socket receive loop failed to start");
                    return Err(err);
                }
            }
        }

        info!(
            bus_id,
            port,
            bitrate,
            peer = %connection.peer_addr(),
            "CAN socket port on-line"
        );
        Ok(())
    }

    fn write(
        &self,
        _bus_id: BusId,
        port: PortNumber,
        can_id: CanId,
        dlc: u8,
        data: &[u8],
    ) -> Result<()> {
        let Some(connection) = self.registry.lock().lookup(port) else {
            warn!(port, "CAN socket port is not on-line, not able to send message");
            return Err(SocketCanError::NotOpen { port });
        };

        let frame = Frame::from_parts(can_id, dlc, data).map_err(|err| {
            warn!(port, error = %err, "CAN socket rejected frame");
            err
        })?;
        self.send_frame(&connection, &frame)
    }

    fn close(&self, bus_id: BusId, port: PortNumber) {
        let (connection, daemon) = {
            let mut registry = self.registry.lock();
            let Some(connection) = registry.remove(port) else {
                return;
            };
            let daemon = if registry.is_empty() {
                registry.take_daemon()
            } else {
                None
            };
            if let Some(daemon) = &daemon {
                daemon.terminate();
            }
            (connection, daemon)
        };

        // Shut the socket down first so a pending read on it returns
        close_connection(&connection);
        info!(bus_id, port, "CAN socket port off-line");

        if let Some(daemon) = daemon {
            daemon.join();
            info!("CAN socket receive loop stopped");
        }
    }
}

impl<C: Connector> Drop for SocketCan<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn close_connection(connection: &PortConnection) {
    if let Err(err) = connection.close() {
        debug!(port = connection.port(), error = %err, "CAN socket shutdown failed");
    }
}
