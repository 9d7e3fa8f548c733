//! # dxl-core
//!
//! Packet codec and transaction driver for servo motors that speak the
//! DYNAMIXEL Protocol 2.0 over a shared half-duplex serial bus.
//!
//! The crate is synchronous and has no dependencies on serial-port drivers or
//! operating-system APIs.  The bus is reached through the [`Transport`] trait,
//! which the application implements for its UART, RS-485 adapter or test
//! fake.
//!
//! # Architecture overview (for beginners)
//!
//! A controller talks to one servo at a time.  It sends an *instruction
//! packet* ("ping", "read 4 bytes at address 132", "write these bytes") and
//! the addressed servo answers with a *status packet* carrying an error byte
//! and any requested data.
//!
//! - **`protocol`** – How bytes look on the wire: the packet layout, the
//!   CRC-16 checksum, byte stuffing that keeps the start marker unique, and
//!   the codec that turns packets into bytes and back.
//!
//! - **`transport`** – The two blocking primitives (`transmit`, `receive`)
//!   the driver needs from the outside world.
//!
//! - **`driver`** – [`Device`], a handle bound to one servo id that runs
//!   complete request/response transactions with timeouts.
//!
//! # Example
//!
//! ```rust
//! use dxl_core::protocol::{encode_status, DeviceError, DeviceId};
//! use dxl_core::transport::scripted::ScriptedTransport;
//! use dxl_core::Device;
//!
//! let id = DeviceId::new(1).unwrap();
//! let mut bus = ScriptedTransport::new();
//! bus.queue_reply(&encode_status(id, DeviceError::NONE, &[0x06, 0x04, 0x26]).unwrap());
//!
//! let mut servo = Device::new(id, bus);
//! let pong = servo.ping().unwrap();
//! assert_eq!(pong.data.model_number, 0x0406);
//! ```

pub mod driver;
pub mod protocol;
pub mod transport;

// Re-export the most-used types at the crate root so callers can write
// `dxl_core::Device` instead of `dxl_core::driver::Device`.
pub use driver::{Ack, Device, DriverConfig, DriverError, Response};
pub use protocol::codec::{ErrorKind, ProtocolError};
pub use protocol::messages::{DeviceError, DeviceId, FactoryResetMode, Instruction, PingInfo};
pub use transport::{Transport, TransportError};
