//! Scripted in-memory transport for tests and benchmarks.
//!
//! Records every transmitted frame and serves reply bytes from a queue that
//! the test fills in advance.  No real bus or timing is involved.

use std::collections::VecDeque;
use std::time::Duration;

use super::{Transport, TransportError};

/// A [`Transport`] that replays queued bytes and records what was sent.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    sent: Vec<Vec<u8>>,
    incoming: VecDeque<u8>,
    receive_calls: usize,
    fail_next_transmit: bool,
}

impl ScriptedTransport {
    /// Creates a transport with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` to the data later calls to `receive` will return.
    pub fn queue_reply(&mut self, bytes: &[u8]) {
        self.incoming.extend(bytes);
    }

    /// Makes the next `transmit` fail with a timeout.
    pub fn fail_next_transmit(&mut self) {
        self.fail_next_transmit = true;
    }

    /// Every frame transmitted so far, oldest first.
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// The most recently transmitted frame.
    pub fn last_sent(&self) -> Option<&[u8]> {
        self.sent.last().map(Vec::as_slice)
    }

    /// Removes and returns the recorded frames.
    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.sent)
    }

    /// Number of `receive` calls made, successful or not.
    pub fn receive_calls(&self) -> usize {
        self.receive_calls
    }

    /// Queued bytes not yet received.
    pub fn pending(&self) -> usize {
        self.incoming.len()
    }

    /// Drops any queued bytes that were never received.
    pub fn clear_pending(&mut self) {
        self.incoming.clear();
    }
}

impl Transport for ScriptedTransport {
    fn transmit(&mut self, data: &[u8], timeout: Duration) -> Result<(), TransportError> {
        if std::mem::take(&mut self.fail_next_transmit) {
            return Err(TransportError::Timeout(timeout));
        }
        self.sent.push(data.to_vec());
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), TransportError> {
        self.receive_calls += 1;
        if self.incoming.len() < buf.len() {
            // A real bus would deliver what it had and then time out.
            self.incoming.clear();
            return Err(TransportError::Timeout(timeout));
        }
        let wanted = buf.len();
        for (slot, byte) in buf.iter_mut().zip(self.incoming.drain(..wanted)) {
            *slot = byte;
        }
        Ok(())
    }
}
