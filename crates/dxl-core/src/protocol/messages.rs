//! Packet types, identifiers and constants of the serial bus protocol.
//!
//! Wire layout shared by instruction and status packets:
//!
//! ```text
//! [FF][FF][FD][00][id:1][length:2 LE][instruction:1][params:N][crc:2 LE]
//! ```
//!
//! `length` counts the instruction byte, the parameters and the two checksum
//! bytes, all measured after byte stuffing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::codec::ProtocolError;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Three-byte sequence that starts every packet.
pub const MARKER: [u8; 3] = [0xFF, 0xFF, 0xFD];

/// Byte inserted after a marker found inside packet content.
pub const STUFFING_BYTE: u8 = 0xFD;

/// Value of the reserved byte that follows the marker.
pub const RESERVED: u8 = 0x00;

/// Bytes from the first marker byte through the instruction byte.
pub const HEADER_SIZE: usize = 8;

/// Bytes before the length field's coverage begins (marker, reserved, id, length).
pub const LENGTH_OFFSET: usize = 7;

/// Offset of the first byte covered by stuffing and by the checksum.
pub const REGION_OFFSET: usize = 3;

/// Size of the trailing checksum.
pub const CHECKSUM_SIZE: usize = 2;

/// Smallest possible status packet: header, error byte and checksum.
pub const MIN_STATUS_PACKET_LEN: usize = HEADER_SIZE + 1 + CHECKSUM_SIZE;

/// Largest packet, in wire bytes, this crate will build or accept.
///
/// Keeping the bound well under `0xFF00` also guarantees the high length byte
/// is never `0xFF`, so the header itself can never contain a marker.
pub const MAX_PACKET_LEN: usize = 1024;

/// Extra reply parameters carried by a ping status packet.
pub const PING_REPLY_PARAMS: usize = 3;

// ── Device identifiers ────────────────────────────────────────────────────────

/// A bus address that may appear in a packet.
///
/// `0..=252` address individual devices and `254` addresses all of them.
/// `253` and `255` are not valid identifiers and cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DeviceId(u8);

impl DeviceId {
    /// Highest individually addressable identifier.
    pub const MAX_UNICAST: u8 = 252;

    /// Identifier every device listens to.  Devices never reply to it.
    pub const BROADCAST: DeviceId = DeviceId(0xFE);

    /// Validates `id` as a bus address.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidDeviceId`] for `253` and `255`.
    pub fn new(id: u8) -> Result<Self, ProtocolError> {
        match id {
            0..=Self::MAX_UNICAST | 0xFE => Ok(Self(id)),
            _ => Err(ProtocolError::InvalidDeviceId(id)),
        }
    }

    /// Returns the raw identifier byte.
    pub fn get(self) -> u8 {
        self.0
    }

    /// `true` for the broadcast identifier.
    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }
}

impl TryFrom<u8> for DeviceId {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        DeviceId::new(value)
    }
}

impl From<DeviceId> for u8 {
    fn from(id: DeviceId) -> u8 {
        id.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            write!(f, "broadcast")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

// ── Instruction codes ─────────────────────────────────────────────────────────

/// Instruction byte carried at offset 7 of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Instruction {
    // Single device
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    RegWrite = 0x04,
    Action = 0x05,
    FactoryReset = 0x06,
    Reboot = 0x08,
    Clear = 0x10,
    ControlTableBackup = 0x20,
    // Reply
    Status = 0x55,
    // Multi device (decoded only)
    SyncRead = 0x82,
    SyncWrite = 0x83,
    FastSyncRead = 0x8A,
    BulkRead = 0x92,
    BulkWrite = 0x93,
    FastBulkRead = 0x9A,
}

impl TryFrom<u8> for Instruction {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(Instruction::Ping),
            0x02 => Ok(Instruction::Read),
            0x03 => Ok(Instruction::Write),
            0x04 => Ok(Instruction::RegWrite),
            0x05 => Ok(Instruction::Action),
            0x06 => Ok(Instruction::FactoryReset),
            0x08 => Ok(Instruction::Reboot),
            0x10 => Ok(Instruction::Clear),
            0x20 => Ok(Instruction::ControlTableBackup),
            0x55 => Ok(Instruction::Status),
            0x82 => Ok(Instruction::SyncRead),
            0x83 => Ok(Instruction::SyncWrite),
            0x8A => Ok(Instruction::FastSyncRead),
            0x92 => Ok(Instruction::BulkRead),
            0x93 => Ok(Instruction::BulkWrite),
            0x9A => Ok(Instruction::FastBulkRead),
            _ => Err(()),
        }
    }
}

/// What a factory reset should preserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FactoryResetMode {
    /// Reset every control table entry.
    All = 0xFF,
    /// Reset everything except the device id.
    ExceptId = 0x01,
    /// Reset everything except the device id and baud rate.
    ExceptIdAndBaud = 0x02,
}

// ── Device error byte ─────────────────────────────────────────────────────────

/// Raw error byte reported by a device in its status packet.
///
/// The value is forwarded exactly as received.  The constants name the codes
/// the protocol documents for the low seven bits; bit 7 is the hardware alert
/// flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceError(pub u8);

impl DeviceError {
    pub const NONE: DeviceError = DeviceError(0x00);
    pub const RESULT_FAIL: DeviceError = DeviceError(0x01);
    pub const INSTRUCTION: DeviceError = DeviceError(0x02);
    pub const CRC: DeviceError = DeviceError(0x03);
    pub const DATA_RANGE: DeviceError = DeviceError(0x04);
    pub const DATA_LENGTH: DeviceError = DeviceError(0x05);
    pub const DATA_LIMIT: DeviceError = DeviceError(0x06);
    pub const ACCESS: DeviceError = DeviceError(0x07);

    /// `true` when the device reported no error at all.
    pub fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Returns the raw byte.
    pub fn code(self) -> u8 {
        self.0
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

// ── Fixed packet header ───────────────────────────────────────────────────────

/// The eight fixed bytes at the start of every packet.
///
/// Serialisation is explicit and little-endian; the struct is never
/// reinterpreted as raw memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub id: u8,
    /// Instruction + parameters + checksum, in wire bytes.
    pub length: u16,
    pub instruction: u8,
}

impl PacketHeader {
    /// Writes the header in wire order.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let [len_lo, len_hi] = self.length.to_le_bytes();
        [
            MARKER[0],
            MARKER[1],
            MARKER[2],
            RESERVED,
            self.id,
            len_lo,
            len_hi,
            self.instruction,
        ]
    }

    /// Reads a header from the first [`HEADER_SIZE`] bytes of `bytes`.
    ///
    /// Only the marker and reserved byte are validated here; the caller
    /// decides what id, length and instruction are acceptable.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::InsufficientData`], [`ProtocolError::BadMarker`] or
    /// [`ProtocolError::BadReserved`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::InsufficientData {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }
        if bytes[..3] != MARKER {
            return Err(ProtocolError::BadMarker([bytes[0], bytes[1], bytes[2]]));
        }
        if bytes[3] != RESERVED {
            return Err(ProtocolError::BadReserved(bytes[3]));
        }
        Ok(Self {
            id: bytes[4],
            length: u16::from_le_bytes([bytes[5], bytes[6]]),
            instruction: bytes[7],
        })
    }

    /// Total wire size of the packet this header announces.
    pub fn packet_len(&self) -> usize {
        LENGTH_OFFSET + usize::from(self.length)
    }
}

// ── Instruction packets ───────────────────────────────────────────────────────

/// An outbound request addressed to one device (or to all of them).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionPacket {
    pub id: DeviceId,
    pub instruction: Instruction,
    /// Parameters before stuffing.
    pub params: Vec<u8>,
}

impl InstructionPacket {
    /// Creates a packet with arbitrary parameters.
    pub fn new(id: DeviceId, instruction: Instruction, params: Vec<u8>) -> Self {
        Self {
            id,
            instruction,
            params,
        }
    }

    /// Asks the device to identify itself.
    pub fn ping(id: DeviceId) -> Self {
        Self::new(id, Instruction::Ping, Vec::new())
    }

    /// Reads `count` bytes of the control table starting at `address`.
    pub fn read(id: DeviceId, address: u16, count: u16) -> Self {
        let mut params = Vec::with_capacity(4);
        params.extend_from_slice(&address.to_le_bytes());
        params.extend_from_slice(&count.to_le_bytes());
        Self::new(id, Instruction::Read, params)
    }

    /// Writes `data` to the control table starting at `address`.
    pub fn write(id: DeviceId, address: u16, data: &[u8]) -> Self {
        Self::new(id, Instruction::Write, address_then(address, data))
    }

    /// Registers a write that is applied on the next [`Instruction::Action`].
    pub fn reg_write(id: DeviceId, address: u16, data: &[u8]) -> Self {
        Self::new(id, Instruction::RegWrite, address_then(address, data))
    }

    /// Applies a previously registered write.
    pub fn action(id: DeviceId) -> Self {
        Self::new(id, Instruction::Action, Vec::new())
    }

    /// Restarts the device.
    pub fn reboot(id: DeviceId) -> Self {
        Self::new(id, Instruction::Reboot, Vec::new())
    }

    /// Restores factory settings, preserving what `mode` says to keep.
    pub fn factory_reset(id: DeviceId, mode: FactoryResetMode) -> Self {
        Self::new(id, Instruction::FactoryReset, vec![mode as u8])
    }

    /// Parameter bytes the device's status packet carries after the error
    /// byte, or `None` when the device sends no reply at all.
    pub fn expected_reply_params(&self) -> Option<usize> {
        if self.id.is_broadcast() {
            return None;
        }
        Some(match self.instruction {
            Instruction::Ping => PING_REPLY_PARAMS,
            Instruction::Read => match self.params.as_slice() {
                [_, _, lo, hi, ..] => usize::from(u16::from_le_bytes([*lo, *hi])),
                _ => 0,
            },
            _ => 0,
        })
    }
}

fn address_then(address: u16, data: &[u8]) -> Vec<u8> {
    let mut params = Vec::with_capacity(2 + data.len());
    params.extend_from_slice(&address.to_le_bytes());
    params.extend_from_slice(data);
    params
}

// ── Status packets ────────────────────────────────────────────────────────────

/// A device's reply to an instruction packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPacket {
    /// Device that sent the reply.
    pub id: u8,
    /// Error byte forwarded verbatim.
    pub error: DeviceError,
    /// Reply parameters after the error byte, unstuffed.
    pub params: Vec<u8>,
}

/// Identification data returned by a ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingInfo {
    pub model_number: u16,
    pub firmware_version: u8,
}

impl PingInfo {
    /// Decodes the three ping reply parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnexpectedPayloadLength`] unless exactly
    /// [`PING_REPLY_PARAMS`] bytes are supplied.
    pub fn from_params(params: &[u8]) -> Result<Self, ProtocolError> {
        match params {
            [lo, hi, fw] => Ok(Self {
                model_number: u16::from_le_bytes([*lo, *hi]),
                firmware_version: *fw,
            }),
            _ => Err(ProtocolError::UnexpectedPayloadLength {
                expected: PING_REPLY_PARAMS,
                actual: params.len(),
            }),
        }
    }

    /// Encodes the ping reply parameters.
    pub fn to_params(self) -> [u8; PING_REPLY_PARAMS] {
        let [lo, hi] = self.model_number.to_le_bytes();
        [lo, hi, self.firmware_version]
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
