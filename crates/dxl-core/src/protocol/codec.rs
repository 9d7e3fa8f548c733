//! Binary codec for instruction and status packets.
//!
//! Wire format:
//! ```text
//! [FF][FF][FD][reserved:1][id:1][length:2][instruction:1][params:N][crc:2]
//! ```
//! Multi-byte integers are little-endian.
//!
//! # Encoding order
//!
//! 1. Build the raw region `reserved ..= last parameter` with
//!    `length = params + 3` (instruction byte plus two checksum bytes).
//! 2. Byte-stuff the region and rewrite `length` to the post-stuffing count.
//! 3. Compute the checksum over the stuffed region and append it.
//!
//! Decoding mirrors this: the checksum is verified over the bytes exactly as
//! they arrived, and only then is the region unstuffed and parsed.  A frame
//! whose checksum fails is never parsed further.

use thiserror::Error;
use tracing::trace;

use crate::protocol::checksum::{checksum, checksum_bytes};
use crate::protocol::messages::{
    DeviceError, DeviceId, Instruction, InstructionPacket, PacketHeader, StatusPacket,
    CHECKSUM_SIZE, HEADER_SIZE, LENGTH_OFFSET, MARKER, MAX_PACKET_LEN, MIN_STATUS_PACKET_LEN,
    REGION_OFFSET, RESERVED,
};
use crate::protocol::stuffing::{stuff, unstuff};

/// Smallest legal value of the length field: instruction byte plus checksum.
const MIN_LENGTH_FIELD: u16 = 3;

/// Errors that can occur while encoding or decoding a packet.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The packet does not start with `FF FF FD`.
    #[error("bad start marker: {0:02X?}")]
    BadMarker([u8; 3]),

    /// The byte after the marker is not zero.
    #[error("reserved byte must be 0x00, got 0x{0:02X}")]
    BadReserved(u8),

    /// The length field disagrees with the number of bytes in the frame.
    #[error("length mismatch: header announces {declared} bytes, frame has {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// The length field announces a frame larger than [`MAX_PACKET_LEN`].
    #[error("frame of {declared} bytes exceeds the {max}-byte limit")]
    FrameTooLong { declared: usize, max: usize },

    /// The reply carries a different instruction than the one expected.
    #[error("unexpected instruction: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedInstruction { expected: u8, actual: u8 },

    /// The instruction byte is not a recognized code.
    #[error("unknown instruction: 0x{0:02X}")]
    UnknownInstruction(u8),

    /// The reply was sent by a different device than the one addressed.
    #[error("reply from device {actual}, expected device {expected}")]
    UnexpectedDeviceId { expected: u8, actual: u8 },

    /// The reply carries a different number of parameters than requested.
    #[error("reply payload has {actual} bytes, expected {expected}")]
    UnexpectedPayloadLength { expected: usize, actual: usize },

    /// The trailing checksum does not match the received bytes.
    #[error("checksum mismatch: packet carries 0x{received:04X}, computed 0x{computed:04X}")]
    ChecksumMismatch { received: u16, computed: u16 },

    /// 253 and 255 are not bus addresses.
    #[error("invalid device id: {0}")]
    InvalidDeviceId(u8),

    /// The encoded packet would exceed [`MAX_PACKET_LEN`].
    #[error("packet of {len} bytes exceeds the {max}-byte limit")]
    PacketTooLarge { len: usize, max: usize },
}

/// Coarse classification of every failure the crate reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bus did not carry the bytes (timeout, short transfer, port error).
    Transport,
    /// The bytes arrived but do not form the expected packet.
    Framing,
    /// The bytes arrived but were corrupted.
    Checksum,
    /// The request itself cannot be sent.
    InvalidRequest,
}

impl ProtocolError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::ChecksumMismatch { .. } => ErrorKind::Checksum,
            ProtocolError::InvalidDeviceId(_) | ProtocolError::PacketTooLarge { .. } => {
                ErrorKind::InvalidRequest
            }
            _ => ErrorKind::Framing,
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes an instruction packet into the exact bytes to transmit.
///
/// # Errors
///
/// Returns [`ProtocolError::PacketTooLarge`] if the stuffed packet would
/// exceed [`MAX_PACKET_LEN`].
///
/// # Examples
///
/// ```rust
/// use dxl_core::protocol::codec::encode_instruction;
/// use dxl_core::protocol::messages::{DeviceId, InstructionPacket};
///
/// let id = DeviceId::new(1).unwrap();
/// let bytes = encode_instruction(&InstructionPacket::ping(id)).unwrap();
/// assert_eq!(bytes, [0xFF, 0xFF, 0xFD, 0x00, 0x01, 0x03, 0x00, 0x01, 0x3A, 0x14]);
/// ```
pub fn encode_instruction(packet: &InstructionPacket) -> Result<Vec<u8>, ProtocolError> {
    encode_frame(packet.id.get(), packet.instruction as u8, &[], &packet.params)
}

/// Encodes a status packet, as a device would send it.
///
/// # Errors
///
/// Returns [`ProtocolError::PacketTooLarge`] if the stuffed packet would
/// exceed [`MAX_PACKET_LEN`].
pub fn encode_status(
    id: DeviceId,
    error: DeviceError,
    params: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    encode_frame(id.get(), Instruction::Status as u8, &[error.code()], params)
}

/// Reads the fixed prefix at the start of `bytes` (marker, reserved byte, id
/// and length field) and returns the total size of the frame it announces.
///
/// Only the first [`LENGTH_OFFSET`] bytes are needed, so a receiver can learn
/// the size of a reply before the instruction byte arrives.
///
/// # Errors
///
/// Returns [`ProtocolError`] if fewer than [`LENGTH_OFFSET`] bytes are given,
/// the marker or reserved byte is wrong, or the length field is out of range.
pub fn frame_len(bytes: &[u8]) -> Result<usize, ProtocolError> {
    if bytes.len() < LENGTH_OFFSET {
        return Err(ProtocolError::InsufficientData {
            needed: LENGTH_OFFSET,
            available: bytes.len(),
        });
    }
    if bytes[..3] != MARKER {
        return Err(ProtocolError::BadMarker([bytes[0], bytes[1], bytes[2]]));
    }
    if bytes[3] != RESERVED {
        return Err(ProtocolError::BadReserved(bytes[3]));
    }

    let length = u16::from_le_bytes([bytes[5], bytes[6]]);
    let declared = LENGTH_OFFSET + usize::from(length);
    if length < MIN_LENGTH_FIELD {
        return Err(ProtocolError::LengthMismatch {
            declared,
            actual: bytes.len(),
        });
    }
    if declared > MAX_PACKET_LEN {
        return Err(ProtocolError::FrameTooLong {
            declared,
            max: MAX_PACKET_LEN,
        });
    }
    Ok(declared)
}

/// Decodes one complete status packet.
///
/// `frame` must hold exactly one packet as received from the wire, stuffing
/// and checksum included.
///
/// # Errors
///
/// Framing errors for a wrong marker, length or instruction, and
/// [`ProtocolError::ChecksumMismatch`] if the frame was corrupted.
///
/// # Examples
///
/// ```rust
/// use dxl_core::protocol::codec::{decode_status, encode_status};
/// use dxl_core::protocol::messages::{DeviceError, DeviceId};
///
/// let id = DeviceId::new(1).unwrap();
/// let frame = encode_status(id, DeviceError::NONE, &[0x06, 0x04, 0x26]).unwrap();
/// let status = decode_status(&frame).unwrap();
/// assert_eq!(status.id, 1);
/// assert_eq!(status.params, vec![0x06, 0x04, 0x26]);
/// ```
pub fn decode_status(frame: &[u8]) -> Result<StatusPacket, ProtocolError> {
    let (header, body) = decode_frame(frame)?;

    if header.instruction != Instruction::Status as u8 {
        return Err(ProtocolError::UnexpectedInstruction {
            expected: Instruction::Status as u8,
            actual: header.instruction,
        });
    }

    let (&error, params) = body.split_first().ok_or(ProtocolError::InsufficientData {
        needed: MIN_STATUS_PACKET_LEN,
        available: frame.len(),
    })?;

    Ok(StatusPacket {
        id: header.id,
        error: DeviceError(error),
        params: params.to_vec(),
    })
}

/// Decodes one complete instruction packet, as a device would.
///
/// # Errors
///
/// Framing errors as for [`decode_status`], plus
/// [`ProtocolError::UnknownInstruction`] and [`ProtocolError::InvalidDeviceId`].
pub fn decode_instruction(frame: &[u8]) -> Result<InstructionPacket, ProtocolError> {
    let (header, params) = decode_frame(frame)?;
    let instruction = Instruction::try_from(header.instruction)
        .map_err(|_| ProtocolError::UnknownInstruction(header.instruction))?;
    let id = DeviceId::new(header.id)?;
    Ok(InstructionPacket::new(id, instruction, params))
}

// ── Framing ───────────────────────────────────────────────────────────────────

fn encode_frame(
    id: u8,
    instruction: u8,
    prefix: &[u8],
    params: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let raw_length = 1 + prefix.len() + params.len() + CHECKSUM_SIZE;
    if LENGTH_OFFSET + raw_length > MAX_PACKET_LEN {
        return Err(ProtocolError::PacketTooLarge {
            len: LENGTH_OFFSET + raw_length,
            max: MAX_PACKET_LEN,
        });
    }

    let header = PacketHeader {
        id,
        length: raw_length as u16,
        instruction,
    };
    let mut region = Vec::with_capacity(HEADER_SIZE - REGION_OFFSET + prefix.len() + params.len());
    region.extend_from_slice(&header.to_bytes()[REGION_OFFSET..]);
    region.extend_from_slice(prefix);
    region.extend_from_slice(params);

    // Header bytes never form a marker (id <= 0xFE, length < 0xFF00, known
    // instruction codes), so stuffing only ever grows the parameter section.
    let stuffed = stuff(&region);
    let wire_len = REGION_OFFSET + stuffed.len() + CHECKSUM_SIZE;
    if wire_len > MAX_PACKET_LEN {
        return Err(ProtocolError::PacketTooLarge {
            len: wire_len,
            max: MAX_PACKET_LEN,
        });
    }

    let mut wire = Vec::with_capacity(wire_len);
    wire.extend_from_slice(&MARKER);
    wire.extend_from_slice(&stuffed);
    let length = (wire_len - LENGTH_OFFSET) as u16;
    wire[5..LENGTH_OFFSET].copy_from_slice(&length.to_le_bytes());

    let crc = checksum(0, &wire[REGION_OFFSET..]);
    wire.extend_from_slice(&checksum_bytes(crc));

    trace!(id, instruction, len = wire.len(), "encoded packet");
    Ok(wire)
}

/// Validates a frame and returns its header plus the unstuffed bytes that
/// follow the instruction byte.
fn decode_frame(frame: &[u8]) -> Result<(PacketHeader, Vec<u8>), ProtocolError> {
    let declared = frame_len(frame)?;
    if declared != frame.len() {
        return Err(ProtocolError::LengthMismatch {
            declared,
            actual: frame.len(),
        });
    }

    let crc_at = frame.len() - CHECKSUM_SIZE;
    let received = u16::from_le_bytes([frame[crc_at], frame[crc_at + 1]]);
    let computed = checksum(0, &frame[REGION_OFFSET..crc_at]);
    if received != computed {
        return Err(ProtocolError::ChecksumMismatch { received, computed });
    }

    // The header is never stuffed, so it can be read from the raw frame.
    let header = PacketHeader::from_bytes(frame)?;
    let region = unstuff(&frame[REGION_OFFSET..crc_at]);
    let body = region[HEADER_SIZE - REGION_OFFSET..].to_vec();
    Ok((header, body))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
