//! Serial-port implementation of [`Transport`].
//!
//! The OS serial driver only offers a per-call read timeout, so `receive`
//! keeps a deadline for the whole buffer and re-arms the port timeout with
//! whatever is left before every read.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use dxl_core::{Transport, TransportError};
use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, trace};

use crate::config::SerialConfig;

/// The operations [`SerialTransport`] needs from a port beyond `Read + Write`.
///
/// Implemented for `Box<dyn SerialPort>`; tests substitute an in-memory port.
pub trait Port: Read + Write {
    /// Sets the timeout applied to the next read or write call.
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Discards bytes received but not yet read.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl Port for Box<dyn SerialPort> {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        SerialPort::set_timeout(&mut **self, timeout).map_err(io::Error::from)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// A half-duplex bus reached through a serial port.
pub struct SerialTransport<P = Box<dyn SerialPort>> {
    port: P,
}

impl SerialTransport {
    /// Opens the port named in `config` at its configured baud rate.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Port`] if the OS refuses to open or
    /// configure the port.
    pub fn open(config: &SerialConfig) -> Result<Self, TransportError> {
        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(|e| TransportError::Port(format!("{}: {e}", config.port)))?;
        debug!(port = %config.port, baud = config.baud_rate, "serial port opened");
        Ok(Self { port })
    }
}

impl<P: Port> SerialTransport<P> {
    /// Wraps an already-open port.
    pub fn from_port(port: P) -> Self {
        Self { port }
    }

    /// Returns the wrapped port.
    pub fn into_inner(self) -> P {
        self.port
    }
}

impl<P: Port> Transport for SerialTransport<P> {
    fn transmit(&mut self, data: &[u8], timeout: Duration) -> Result<(), TransportError> {
        // Stale bytes from an earlier, abandoned reply would otherwise be
        // taken for the start of the next one.
        self.port.discard_input()?;
        self.port.set_timeout(timeout)?;
        self.port
            .write_all(data)
            .and_then(|()| self.port.flush())
            .map_err(|e| map_timeout(e, timeout))?;
        trace!(len = data.len(), "serial transmit complete");
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), TransportError> {
        let deadline = Instant::now() + timeout;
        let mut filled = 0;

        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(incomplete(buf.len(), filled, timeout));
            }
            self.port.set_timeout(remaining)?;

            match self.port.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(TransportError::ShortTransfer {
                        expected: buf.len(),
                        actual: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    return Err(incomplete(buf.len(), filled, timeout));
                }
                Err(e) => return Err(TransportError::Io(e)),
            }
        }

        trace!(len = filled, "serial receive complete");
        Ok(())
    }
}

fn map_timeout(e: io::Error, timeout: Duration) -> TransportError {
    if e.kind() == io::ErrorKind::TimedOut {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Io(e)
    }
}

/// Silence is a timeout; a reply that stopped part-way is a short transfer.
fn incomplete(expected: usize, actual: usize, timeout: Duration) -> TransportError {
    if actual == 0 {
        TransportError::Timeout(timeout)
    } else {
        TransportError::ShortTransfer { expected, actual }
    }
}
