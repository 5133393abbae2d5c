use crate::error::{Result, SocketCanError};

/// CAN ID type
pub type CanId = u32;

/// Opaque bus identifier handed in by the bus-management layer
pub type BusId = u32;

/// Logical CAN port number (mapped onto `base_port + port`)
pub type PortNumber = u32;

/// Maximum payload length of a frame (CAN FD sized)
pub const MAX_DATA_LEN: usize = 64;

/// Receive notification invoked from the receive thread with
/// `(bus_id, can_id, dlc, payload)`.
pub type RxNotification = Box<dyn Fn(BusId, CanId, u8, &[u8]) + Send + Sync>;

/// Logical CAN frame: identifier plus `dlc` payload bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    id: CanId,
    data: Vec<u8>,
}

impl Frame {
    /// Creates a frame carrying all of `data`
    pub fn new(id: CanId, data: &[u8]) -> Result<Self> {
        if data.len() > MAX_DATA_LEN {
            return Err(SocketCanError::InvalidLength { len: data.len() });
        }
        Ok(Self {
            id,
            data: data.to_vec(),
        })
    }

    /// Creates a frame from the leading `dlc` bytes of `payload`
    pub fn from_parts(id: CanId, dlc: u8, payload: &[u8]) -> Result<Self> {
        let len = dlc as usize;
        if len > MAX_DATA_LEN || payload.len() < len {
            return Err(SocketCanError::InvalidLength { len });
        }
        Self::new(id, &payload[..len])
    }

    pub fn id(&self) -> CanId {
        self.id
    }

    /// Data length code, always equal to the payload length
    pub fn dlc(&self) -> u8 {
        self.data.len() as u8
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Configuration trait that must be implemented by all component configurations
pub trait Config: Send + Sync {
    fn validate(&self) -> Result<()>;
}
