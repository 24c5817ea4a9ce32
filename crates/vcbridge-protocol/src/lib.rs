//! Wire formats for the game side of the bridge: the byte buffer the game
//! protocol reads and writes, the plugin-channel messages used during the
//! voice handshake, and the UDP voice packet payloads.

pub mod buffer;
pub mod error;
pub mod plugin;
pub mod voice;

pub use buffer::{Buffer, BufferMut};
pub use error::ProtocolError;
