//! Encryption and framing of the UDP voice packets.
//!
//! Every datagram is AES-128-CBC encrypted with the 16-byte session secret
//! the game server hands out over the `voicechat:secret` plugin channel.
//! The decrypted payload always starts with a copy of that secret, which
//! the receiver checks before trusting the rest of the packet.

mod cipher;
mod error;
mod framing;

pub use cipher::{decrypt, encrypt, IV_SIZE};
pub use error::CryptoError;
pub use framing::{
    decode_client_sent, decode_server_sent, encode_client_sent, encode_server_sent,
};
