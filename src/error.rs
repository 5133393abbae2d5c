use std::io;
use thiserror::Error;

use crate::types::PortNumber;

#[derive(Debug, Error)]
pub enum SocketCanError {
    // Lifecycle errors
    #[error("CAN socket port={port} is already on-line")]
    AlreadyOpen { port: PortNumber },

    #[error("CAN socket port={port} connect failed: {source}")]
    ConnectFailed {
        port: PortNumber,
        #[source]
        source: io::Error,
    },

    #[error("CAN socket port={port} is not on-line")]
    NotOpen { port: PortNumber },

    // Transport errors
    #[error("CAN socket port={port} send failed: {source}")]
    SendFailed {
        port: PortNumber,
        #[source]
        source: io::Error,
    },

    #[error("CAN socket port={port} read failed: {source}")]
    ReceiveError {
        port: PortNumber,
        #[source]
        source: io::Error,
    },

    // Frame errors
    #[error("Invalid data length: {len}")]
    InvalidLength { len: usize },

    #[error("Invalid wire frame size: expected {expected} bytes, got {actual}")]
    InvalidFrameSize { expected: usize, actual: usize },

    // Generic errors
    #[error("Invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("Failed to start receive thread: {0}")]
    RxSpawnFailed(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, SocketCanError>;
