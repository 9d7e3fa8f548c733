//! Timeouts applied to each transaction.
//!
//! Both values default to the protocol's customary 50 ms and can be loaded
//! from any serde format.  In TOML:
//!
//! ```toml
//! [driver]
//! transmit_timeout_ms = 50
//! receive_timeout_ms = 100
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default timeout, in milliseconds, for both transmit and receive.
pub const DEFAULT_TIMEOUT_MS: u16 = 50;

/// Per-call timeouts used by [`crate::driver::Device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Upper bound for sending one instruction packet.
    #[serde(default = "default_timeout_ms")]
    pub transmit_timeout_ms: u16,
    /// Upper bound for each receive call while collecting a reply.
    #[serde(default = "default_timeout_ms")]
    pub receive_timeout_ms: u16,
}

fn default_timeout_ms() -> u16 {
    DEFAULT_TIMEOUT_MS
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            transmit_timeout_ms: default_timeout_ms(),
            receive_timeout_ms: default_timeout_ms(),
        }
    }
}

impl DriverConfig {
    pub fn transmit_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.transmit_timeout_ms))
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.receive_timeout_ms))
    }
}
