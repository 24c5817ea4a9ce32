use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("buffer too short: needed {needed} more bytes, {remaining} remaining")]
    ShortBuffer { needed: usize, remaining: usize },

    #[error("malformed VarInt: continuation bit set past 5 bytes")]
    MalformedVarInt,

    #[error("invalid UTF-8 in string field")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("string length {0} exceeds the protocol limit")]
    StringTooLong(usize),

    #[error("unknown voice packet type: 0x{0:02x}")]
    UnknownPacketType(u8),
}
