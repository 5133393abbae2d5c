//! Data link layer: wire framing of logical CAN frames.
//!
//! The socket transport has no length-prefix framing, so every frame travels
//! as a fixed-size buffer. Two layouts are supported:
//!
//! - [`PackedTailCodec`] (default): payload first, identifier and DLC packed
//!   after the full 64-byte payload area
//! - [`StructuredCodec`]: identifier, DLC and payload laid out like the
//!   aligned `can_frame` struct of a peer on the same host
//!
//! A [`WireFormat`] picks one of them once; the two never mix on one wire.
//!
//! # Examples
//!
//! ```rust
//! use cansock::data_link::{FrameCodec, WireFormat};
//! use cansock::types::Frame;
//!
//! let codec = WireFormat::PackedTail.codec();
//! let frame = Frame::new(0x123, &[0xAA, 0xBB, 0xCC]).unwrap();
//! let wire = codec.encode_to_vec(&frame).unwrap();
//! assert_eq!(wire.len(), 69);
//! assert_eq!(codec.decode(&wire).unwrap(), frame);
//! ```

use std::sync::Arc;

use crate::error::{Result, SocketCanError};
use crate::types::{Frame, MAX_DATA_LEN};

/// Size of a packed-tail wire frame
pub const PACKED_FRAME_SIZE: usize = MAX_DATA_LEN + 5;

/// Size of a structured wire frame (`u32` id, `u8` dlc, 8-aligned payload)
pub const STRUCTURED_FRAME_SIZE: usize = STRUCTURED_DATA_OFFSET + MAX_DATA_LEN;

// Packed-tail field offsets
const PACKED_ID_OFFSET: usize = MAX_DATA_LEN;
const PACKED_DLC_OFFSET: usize = MAX_DATA_LEN + 4;

// Structured field offsets
const STRUCTURED_ID_OFFSET: usize = 0;
const STRUCTURED_DLC_OFFSET: usize = 4;
const STRUCTURED_DATA_OFFSET: usize = 8;

/// Encoding of a logical frame into a fixed-size wire buffer
pub trait FrameCodec: Send + Sync {
    /// Exact number of bytes every frame occupies on the wire
    fn frame_size(&self) -> usize;

    /// Writes `frame` into `out`, which must be exactly `frame_size()` long
    fn encode(&self, frame: &Frame, out: &mut [u8]) -> Result<()>;

    /// Reads a frame back from a buffer of exactly `frame_size()` bytes
    fn decode(&self, buf: &[u8]) -> Result<Frame>;

    fn encode_to_vec(&self, frame: &Frame) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.frame_size()];
        self.encode(frame, &mut out)?;
        Ok(out)
    }
}

/// Wire layout selection, resolved once per device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    #[default]
    PackedTail,
    Structured,
}

impl WireFormat {
    pub fn codec(self) -> Arc<dyn FrameCodec> {
        match self {
            WireFormat::PackedTail => Arc::new(PackedTailCodec),
            WireFormat::Structured => Arc::new(StructuredCodec),
        }
    }

    pub fn frame_size(self) -> usize {
        match self {
            WireFormat::PackedTail => PACKED_FRAME_SIZE,
            WireFormat::Structured => STRUCTURED_FRAME_SIZE,
        }
    }
}

/// `[payload; 64] [id: u32 big-endian] [dlc: u8]`
#[derive(Debug, Clone, Copy, Default)]
pub struct PackedTailCodec;

impl FrameCodec for PackedTailCodec {
    fn frame_size(&self) -> usize {
        PACKED_FRAME_SIZE
    }

    fn encode(&self, frame: &Frame, out: &mut [u8]) -> Result<()> {
        check_size(out.len(), PACKED_FRAME_SIZE)?;
        let dlc = check_dlc(frame)?;

        out.fill(0);
        out[..dlc].copy_from_slice(frame.data());
        out[PACKED_ID_OFFSET..PACKED_DLC_OFFSET].copy_from_slice(&frame.id().to_be_bytes());
        out[PACKED_DLC_OFFSET] = dlc as u8;
        Ok(())
    }

    fn decode(&self, buf: &[u8]) -> Result<Frame> {
        check_size(buf.len(), PACKED_FRAME_SIZE)?;
        let id = u32::from_be_bytes([
            buf[PACKED_ID_OFFSET],
            buf[PACKED_ID_OFFSET + 1],
            buf[PACKED_ID_OFFSET + 2],
            buf[PACKED_ID_OFFSET + 3],
        ]);
        Frame::from_parts(id, buf[PACKED_DLC_OFFSET], &buf[..MAX_DATA_LEN])
    }
}

/// `[id: u32 host order] [dlc: u8] [pad; 3] [payload; 64]`
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredCodec;

impl FrameCodec for StructuredCodec {
    fn frame_size(&self) -> usize {
        STRUCTURED_FRAME_SIZE
    }

    fn encode(&self, frame: &Frame, out: &mut [u8]) -> Result<()> {
        check_size(out.len(), STRUCTURED_FRAME_SIZE)?;
        let dlc = check_dlc(frame)?;

        out.fill(0);
        out[STRUCTURED_ID_OFFSET..STRUCTURED_DLC_OFFSET]
            .copy_from_slice(&frame.id().to_ne_bytes());
        out[STRUCTURED_DLC_OFFSET] = dlc as u8;
        out[STRUCTURED_DATA_OFFSET..STRUCTURED_DATA_OFFSET + dlc].copy_from_slice(frame.data());
        Ok(())
    }

    fn decode(&self, buf: &[u8]) -> Result<Frame> {
        check_size(buf.len(), STRUCTURED_FRAME_SIZE)?;
        let id = u32::from_ne_bytes([
            buf[STRUCTURED_ID_OFFSET],
            buf[STRUCTURED_ID_OFFSET + 1],
            buf[STRUCTURED_ID_OFFSET + 2],
            buf[STRUCTURED_ID_OFFSET + 3],
        ]);
        Frame::from_parts(
            id,
            buf[STRUCTURED_DLC_OFFSET],
            &buf[STRUCTURED_DATA_OFFSET..],
        )
    }
}

fn check_size(actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(SocketCanError::InvalidFrameSize { expected, actual });
    }
    Ok(())
}

fn check_dlc(frame: &Frame) -> Result<usize> {
    let len = frame.data().len();
    if len > MAX_DATA_LEN {
        return Err(SocketCanError::InvalidLength { len });
    }
    Ok(len)
}
