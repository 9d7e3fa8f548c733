//! Transaction driver: one request, one reply, on a half-duplex bus.
//!
//! # Anatomy of a transaction
//!
//! ```text
//! build packet ─► stuff + length ─► checksum ─► transmit
//!                                                  │
//!                       (broadcast: stop here) ◄───┤
//!                                                  ▼
//! caller ◄─ parse ◄─ unstuff ◄─ verify checksum ◄─ receive
//! ```
//!
//! Every step that can fail returns immediately.  There are no retries and no
//! state carried from one transaction to the next, so a [`Device`] is ready
//! for a new call after any error.
//!
//! # Sharing a device
//!
//! Every operation takes `&mut self`: the borrow checker guarantees one
//! transaction at a time per handle.  Callers that share a handle between
//! threads wrap it in a `Mutex`.

pub mod config;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::protocol::codec::{decode_status, encode_instruction, frame_len, ErrorKind, ProtocolError};
use crate::protocol::messages::{
    DeviceError, DeviceId, FactoryResetMode, Instruction, InstructionPacket, PingInfo,
    StatusPacket, LENGTH_OFFSET, MAX_PACKET_LEN, MIN_STATUS_PACKET_LEN,
};
use crate::transport::{Transport, TransportError};

pub use config::DriverConfig;

/// Errors returned by [`Device`] operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The transport failed to move the bytes.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The request could not be encoded or the reply was rejected.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The operation needs a reply, which broadcast requests never get.
    #[error("{0:?} needs a reply and cannot be sent to the broadcast id")]
    BroadcastNotAllowed(Instruction),
}

impl DriverError {
    /// Classifies the error so callers can pick a retry policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::Transport(_) => ErrorKind::Transport,
            DriverError::Protocol(e) => e.kind(),
            DriverError::BroadcastNotAllowed(_) => ErrorKind::InvalidRequest,
        }
    }
}

/// Data returned by a device together with its error byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response<T> {
    pub error: DeviceError,
    pub data: T,
}

/// Outcome of an operation whose reply carries no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Sent to the broadcast id; no device replies.
    Broadcast,
    /// The addressed device acknowledged with this error byte.
    Device(DeviceError),
}

/// A handle to one device on the bus.
///
/// The id is fixed for the lifetime of the handle.
#[derive(Debug)]
pub struct Device<T> {
    id: DeviceId,
    transport: T,
    config: DriverConfig,
}

impl<T: Transport> Device<T> {
    /// Binds `id` to `transport` with default timeouts.
    pub fn new(id: DeviceId, transport: T) -> Self {
        Self::with_config(id, transport, DriverConfig::default())
    }

    /// Binds `id` to `transport` with explicit timeouts.
    pub fn with_config(id: DeviceId, transport: T, config: DriverConfig) -> Self {
        Self {
            id,
            transport,
            config,
        }
    }

    /// The id every packet from this handle is addressed to.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Timeouts used for each transmit and receive.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Borrows the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrows the transport, e.g. to reconfigure a port between transactions.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Releases the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    // ── Operations ────────────────────────────────────────────────────────────

    /// Checks that the device is present and returns its identification.
    ///
    /// # Errors
    ///
    /// [`DriverError::BroadcastNotAllowed`] for a broadcast handle, otherwise
    /// any transport or protocol failure.
    pub fn ping(&mut self) -> Result<Response<PingInfo>, DriverError> {
        let status = self.request(&InstructionPacket::ping(self.id))?;
        Ok(Response {
            error: status.error,
            data: PingInfo::from_params(&status.params)?,
        })
    }

    /// Reads `count` bytes of the control table starting at `address`.
    ///
    /// # Errors
    ///
    /// [`DriverError::BroadcastNotAllowed`] for a broadcast handle,
    /// [`ProtocolError::PacketTooLarge`] if the reply could not fit in a
    /// packet, otherwise any transport or protocol failure.
    pub fn read(&mut self, address: u16, count: u16) -> Result<Response<Vec<u8>>, DriverError> {
        let status = self.request(&InstructionPacket::read(self.id, address, count))?;
        Ok(Response {
            error: status.error,
            data: status.params,
        })
    }

    /// Writes `data` to the control table starting at `address`.
    ///
    /// # Errors
    ///
    /// Any transport or protocol failure.
    pub fn write(&mut self, address: u16, data: &[u8]) -> Result<Ack, DriverError> {
        self.command(&InstructionPacket::write(self.id, address, data))
    }

    /// Registers a write to be applied by a later [`Device::action`].
    ///
    /// # Errors
    ///
    /// Any transport or protocol failure.
    pub fn reg_write(&mut self, address: u16, data: &[u8]) -> Result<Ack, DriverError> {
        self.command(&InstructionPacket::reg_write(self.id, address, data))
    }

    /// Applies the write registered by [`Device::reg_write`].
    ///
    /// # Errors
    ///
    /// Any transport or protocol failure.
    pub fn action(&mut self) -> Result<Ack, DriverError> {
        self.command(&InstructionPacket::action(self.id))
    }

    /// Restarts the device.
    ///
    /// # Errors
    ///
    /// Any transport or protocol failure.
    pub fn reboot(&mut self) -> Result<Ack, DriverError> {
        self.command(&InstructionPacket::reboot(self.id))
    }

    /// Restores factory settings.
    ///
    /// # Errors
    ///
    /// Any transport or protocol failure.
    pub fn factory_reset(&mut self, mode: FactoryResetMode) -> Result<Ack, DriverError> {
        self.command(&InstructionPacket::factory_reset(self.id, mode))
    }

    /// Runs one complete transaction for an arbitrary packet.
    ///
    /// Returns `None` when the packet is addressed to the broadcast id: the
    /// packet is transmitted and no receive is attempted.
    ///
    /// # Errors
    ///
    /// - [`DriverError::Transport`] if transmit or receive fails; nothing is
    ///   received after a failed transmit.
    /// - [`DriverError::Protocol`] with a framing error if the reply has the
    ///   wrong shape, comes from another device, or carries a different
    ///   number of parameters than expected.
    /// - [`DriverError::Protocol`] with [`ProtocolError::ChecksumMismatch`] if
    ///   the reply was corrupted; its payload is discarded.
    pub fn transact(
        &mut self,
        packet: &InstructionPacket,
    ) -> Result<Option<StatusPacket>, DriverError> {
        let wire = encode_instruction(packet)?;
        let expected_params = packet.expected_reply_params();
        if let Some(params) = expected_params {
            let reply_len = MIN_STATUS_PACKET_LEN + params;
            if reply_len > MAX_PACKET_LEN {
                return Err(ProtocolError::PacketTooLarge {
                    len: reply_len,
                    max: MAX_PACKET_LEN,
                }
                .into());
            }
        }

        debug!(
            id = %packet.id,
            instruction = ?packet.instruction,
            len = wire.len(),
            "transmitting instruction"
        );
        trace!(bytes = ?wire, "tx");
        self.transport
            .transmit(&wire, self.config.transmit_timeout())
            .map_err(|e| {
                warn!(id = %packet.id, "transmit failed: {e}");
                e
            })?;

        let Some(params) = expected_params else {
            debug!(instruction = ?packet.instruction, "broadcast sent; no reply expected");
            return Ok(None);
        };

        let frame = self.receive_frame(MIN_STATUS_PACKET_LEN + params)?;
        trace!(bytes = ?frame, "rx");
        let status = decode_status(&frame).map_err(|e| {
            warn!(id = %packet.id, "reply rejected: {e}");
            e
        })?;

        if status.id != packet.id.get() {
            return Err(ProtocolError::UnexpectedDeviceId {
                expected: packet.id.get(),
                actual: status.id,
            }
            .into());
        }
        if status.params.len() != params {
            return Err(ProtocolError::UnexpectedPayloadLength {
                expected: params,
                actual: status.params.len(),
            }
            .into());
        }

        debug!(id = %packet.id, error = %status.error, "status received");
        Ok(Some(status))
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Runs a transaction whose reply is mandatory.
    fn request(&mut self, packet: &InstructionPacket) -> Result<StatusPacket, DriverError> {
        if self.id.is_broadcast() {
            return Err(DriverError::BroadcastNotAllowed(packet.instruction));
        }
        self.transact(packet)?
            .ok_or(DriverError::BroadcastNotAllowed(packet.instruction))
    }

    /// Runs a transaction whose reply (if any) carries only the error byte.
    fn command(&mut self, packet: &InstructionPacket) -> Result<Ack, DriverError> {
        Ok(match self.transact(packet)? {
            Some(status) => Ack::Device(status.error),
            None => Ack::Broadcast,
        })
    }

    /// Receives one reply frame in two bounded calls: the fixed prefix up to
    /// the length field, then exactly the bytes that field announces.
    ///
    /// A reply whose length differs from `expected` is still received whole,
    /// so a well-formed but short reply reaches the decoder and is reported
    /// as a framing error rather than a timeout.
    fn receive_frame(&mut self, expected: usize) -> Result<Vec<u8>, DriverError> {
        let timeout = self.config.receive_timeout();
        let mut frame = vec![0u8; LENGTH_OFFSET];
        self.transport.receive(&mut frame, timeout).map_err(|e| {
            warn!(expected, "receive failed: {e}");
            e
        })?;

        let announced = frame_len(&frame).map_err(|e| {
            warn!(expected, "reply prefix rejected: {e}");
            e
        })?;
        if announced != expected {
            debug!(expected, announced, "reply length differs from unstuffed size");
        }
        frame.resize(announced, 0);
        self.transport
            .receive(&mut frame[LENGTH_OFFSET..], timeout)
            .map_err(|e| {
                warn!(expected, announced, "receive failed: {e}");
                e
            })?;
        Ok(frame)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
