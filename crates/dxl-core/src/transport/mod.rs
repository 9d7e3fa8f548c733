//! Transport abstraction: the two blocking primitives the driver needs.
//!
//! The driver never touches a serial port directly.  Anything that can push a
//! block of bytes onto the bus and pull a fixed number of bytes back off it,
//! each within a timeout, can carry the protocol: a UART, an RS-485 adapter, a
//! USB bridge, or an in-memory fake in tests.
//!
//! # Contract
//!
//! - [`Transport::transmit`] sends *all* of `data` or fails.
//! - [`Transport::receive`] fills *all* of `buf` or fails.
//! - Each call is a single attempt bounded by `timeout`.  Retrying is the
//!   caller's decision, never the transport's.
//!
//! # Testability
//!
//! Unit tests use the `mockall`-generated `MockTransport`; integration tests
//! and benches use [`scripted::ScriptedTransport`].

use std::time::Duration;

use thiserror::Error;

#[cfg(test)]
use mockall::automock;

pub mod scripted;

/// Errors reported by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The operation did not complete before its timeout elapsed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Fewer bytes than requested were moved.
    #[error("short transfer: expected {expected} bytes, moved {actual}")]
    ShortTransfer { expected: usize, actual: usize },

    /// An operating-system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The port driver reported a failure.
    #[error("port error: {0}")]
    Port(String),
}

/// Blocking, half-duplex access to the bus.
#[cfg_attr(test, automock)]
pub trait Transport {
    /// Sends every byte of `data` within `timeout`.
    fn transmit(&mut self, data: &[u8], timeout: Duration) -> Result<(), TransportError>;

    /// Fills `buf` completely within `timeout`.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transmit(&mut self, data: &[u8], timeout: Duration) -> Result<(), TransportError> {
        (**self).transmit(data, timeout)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), TransportError> {
        (**self).receive(buf, timeout)
    }
}
