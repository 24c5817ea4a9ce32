use thiserror::Error;
use uuid::Uuid;

use vcbridge_protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("ciphertext length {0} is not a whole number of AES blocks")]
    BadLength(usize),

    #[error("malformed PKCS#7 padding")]
    BadPadding,

    #[error("decrypted payload does not echo the session secret")]
    InvalidSecret,

    #[error("packet from unknown sender {0}")]
    UnknownSender(Uuid),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
