use std::collections::HashMap;

use uuid::Uuid;

use vcbridge_protocol::buffer::{Buffer, BufferMut};
use vcbridge_protocol::voice::VoicePacketType;

use crate::cipher::{decrypt, encrypt};
use crate::error::CryptoError;

/// Frame a packet the way the server sends it: just the encrypted payload.
///
/// The inner plaintext is `secret || tag || payload`.
pub fn encode_server_sent(packet_type: VoicePacketType, payload: &[u8], secret: &Uuid) -> Vec<u8> {
    let mut inner = BufferMut::new();
    inner.put_uuid(secret);
    inner.put_u8(packet_type as u8);
    inner.put_slice(payload);
    encrypt(secret, &inner.into_vec())
}

/// Frame a packet the way a client sends it: the sender's UUID and a
/// VarInt-length-prefixed encrypted payload.
pub fn encode_client_sent(
    packet_type: VoicePacketType,
    payload: &[u8],
    sender: &Uuid,
    secret: &Uuid,
) -> Vec<u8> {
    let encrypted = encode_server_sent(packet_type, payload, secret);
    let mut out = BufferMut::new();
    out.put_uuid(sender);
    out.put_varint(encrypted.len() as i32);
    out.put_slice(&encrypted);
    out.into_vec()
}

/// Decrypt a server-sent datagram and verify the leading secret echo.
///
/// On success the returned buffer is positioned at the packet tag byte.
pub fn decode_server_sent(data: &[u8], secret: &Uuid) -> Result<Buffer, CryptoError> {
    let mut payload = Buffer::new(decrypt(secret, data)?);
    let echoed = payload.read_uuid()?;
    if echoed != *secret {
        return Err(CryptoError::InvalidSecret);
    }
    Ok(payload)
}

/// Decrypt a client-sent datagram, looking the secret up by sender UUID.
///
/// Used on the receiving side of client-framed packets, where multiple
/// senders with distinct secrets can share one socket.
pub fn decode_client_sent(
    data: &[u8],
    secrets: &HashMap<Uuid, Uuid>,
) -> Result<(Uuid, Buffer), CryptoError> {
    let mut buf = Buffer::new(data.to_vec());
    let sender = buf.read_uuid()?;
    let secret = secrets.get(&sender).ok_or(CryptoError::UnknownSender(sender))?;
    let len = buf.read_varint()?;
    let encrypted = buf.read_bytes(len.max(0) as usize)?;
    Ok((sender, decode_server_sent(&encrypted, secret)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> Uuid {
        Uuid::from_u128(0xFEED_FACE_CAFE_BEEF_0123_4567_89AB_CDEF)
    }

    #[test]
    fn server_sent_roundtrip() {
        let framed = encode_server_sent(VoicePacketType::Ping, &[1, 2, 3], &secret());
        let mut buf = decode_server_sent(&framed, &secret()).unwrap();
        assert_eq!(buf.read_u8().unwrap(), VoicePacketType::Ping as u8);
        assert_eq!(buf.rest(), vec![1, 2, 3]);
    }

    #[test]
    fn server_sent_wrong_secret_rejected() {
        let framed = encode_server_sent(VoicePacketType::KeepAlive, &[], &secret());
        let other = Uuid::from_u128(42);
        match decode_server_sent(&framed, &other) {
            Err(CryptoError::BadPadding | CryptoError::InvalidSecret) => {}
            Err(e) => panic!("unexpected error kind: {e}"),
            Ok(_) => panic!("decoding with the wrong secret must fail"),
        }
    }

    #[test]
    fn client_sent_roundtrip() {
        let sender = Uuid::from_u128(0x1234);
        let framed =
            encode_client_sent(VoicePacketType::Mic, &[9, 9, 9], &sender, &secret());

        let secrets = HashMap::from([(sender, secret())]);
        let (decoded_sender, mut buf) = decode_client_sent(&framed, &secrets).unwrap();
        assert_eq!(decoded_sender, sender);
        assert_eq!(buf.read_u8().unwrap(), VoicePacketType::Mic as u8);
        assert_eq!(buf.rest(), vec![9, 9, 9]);
    }

    #[test]
    fn client_sent_unknown_sender() {
        let sender = Uuid::from_u128(0x1234);
        let framed = encode_client_sent(VoicePacketType::Mic, &[], &sender, &secret());
        let secrets = HashMap::new();
        assert!(matches!(
            decode_client_sent(&framed, &secrets),
            Err(CryptoError::UnknownSender(s)) if s == sender
        ));
    }

    #[test]
    fn client_sent_outer_frame_layout() {
        let sender = Uuid::from_u128(0x77);
        let framed = encode_client_sent(VoicePacketType::KeepAlive, &[], &sender, &secret());
        // sender uuid in the clear, then the varint-prefixed ciphertext
        assert_eq!(&framed[..16], sender.as_bytes());
        let mut buf = Buffer::new(framed[16..].to_vec());
        let len = buf.read_varint().unwrap();
        assert_eq!(len as usize, buf.remaining());
    }

    #[test]
    fn tampered_echo_rejected() {
        // Build a valid encrypted payload whose echoed secret is wrong.
        let mut inner = BufferMut::new();
        inner.put_uuid(&Uuid::from_u128(1));
        inner.put_u8(VoicePacketType::KeepAlive as u8);
        let framed = encrypt(&secret(), &inner.into_vec());
        assert!(matches!(
            decode_server_sent(&framed, &secret()),
            Err(CryptoError::InvalidSecret)
        ));
    }
}
