//! Protocol module: packet types, checksum, byte stuffing and the binary codec.

pub mod checksum;
pub mod codec;
pub mod messages;
pub mod stuffing;

pub use checksum::checksum;
pub use codec::{
    decode_instruction, decode_status, encode_instruction, encode_status, frame_len, ErrorKind,
    ProtocolError,
};
pub use messages::*;
pub use stuffing::{stuff, unstuff};
