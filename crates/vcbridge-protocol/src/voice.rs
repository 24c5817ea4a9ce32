use uuid::Uuid;

use crate::buffer::{Buffer, BufferMut};
use crate::error::ProtocolError;

/// Opus audio parameters shared by both sides of the bridge.
pub const SAMPLE_RATE: u32 = 48_000;
pub const FRAME_LENGTH_MS: u32 = 20;
/// Samples per channel in one 20ms frame at 48kHz.
pub const SAMPLES_PER_FRAME: usize = 960;

/// Tag byte at the start of every decrypted voice payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VoicePacketType {
    /// Local player's outgoing microphone audio (client to server).
    Mic = 0x01,
    /// Another player's proximity audio.
    PlayerSound = 0x02,
    /// Another player's audio routed through a voice group.
    GroupSound = 0x03,
    /// Audio emitted at a world position (jukeboxes, plugins).
    LocationSound = 0x04,
    /// First packet of a session; carries the player and the secret.
    Authenticate = 0x05,
    /// Server's acknowledgement of authentication.
    AuthenticateAck = 0x06,
    /// Latency probe, echoed verbatim.
    Ping = 0x07,
    /// Liveness probe, echoed with an empty body.
    KeepAlive = 0x08,
}

impl VoicePacketType {
    pub fn from_byte(b: u8) -> Result<Self, ProtocolError> {
        match b {
            0x01 => Ok(Self::Mic),
            0x02 => Ok(Self::PlayerSound),
            0x03 => Ok(Self::GroupSound),
            0x04 => Ok(Self::LocationSound),
            0x05 => Ok(Self::Authenticate),
            0x06 => Ok(Self::AuthenticateAck),
            0x07 => Ok(Self::Ping),
            0x08 => Ok(Self::KeepAlive),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }
}

/// One decrypted UDP voice payload.
///
/// The wire layout of every variant is the tag byte followed by the fields
/// in declaration order; sound data is VarInt-length-prefixed.
#[derive(Debug, Clone, PartialEq)]
pub enum VoicePacket {
    Mic { data: Vec<u8>, sequence: u64, whispering: bool },
    PlayerSound { sender: Uuid, data: Vec<u8>, sequence: u64, whispering: bool },
    GroupSound { sender: Uuid, data: Vec<u8>, sequence: u64 },
    LocationSound { sender: Uuid, location: (f64, f64, f64), data: Vec<u8>, sequence: u64 },
    Authenticate { player: Uuid, secret: Uuid },
    AuthenticateAck,
    Ping { id: Uuid, timestamp: i64 },
    KeepAlive,
}

impl VoicePacket {
    pub fn packet_type(&self) -> VoicePacketType {
        match self {
            Self::Mic { .. } => VoicePacketType::Mic,
            Self::PlayerSound { .. } => VoicePacketType::PlayerSound,
            Self::GroupSound { .. } => VoicePacketType::GroupSound,
            Self::LocationSound { .. } => VoicePacketType::LocationSound,
            Self::Authenticate { .. } => VoicePacketType::Authenticate,
            Self::AuthenticateAck => VoicePacketType::AuthenticateAck,
            Self::Ping { .. } => VoicePacketType::Ping,
            Self::KeepAlive => VoicePacketType::KeepAlive,
        }
    }

    /// Serialize the packet body (everything after the tag byte).
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = BufferMut::new();
        match self {
            Self::Mic { data, sequence, whispering } => {
                buf.put_varint(data.len() as i32);
                buf.put_slice(data);
                buf.put_i64(*sequence as i64);
                buf.put_bool(*whispering);
            }
            Self::PlayerSound { sender, data, sequence, whispering } => {
                buf.put_uuid(sender);
                buf.put_varint(data.len() as i32);
                buf.put_slice(data);
                buf.put_i64(*sequence as i64);
                buf.put_bool(*whispering);
            }
            Self::GroupSound { sender, data, sequence } => {
                buf.put_uuid(sender);
                buf.put_varint(data.len() as i32);
                buf.put_slice(data);
                buf.put_i64(*sequence as i64);
            }
            Self::LocationSound { sender, location, data, sequence } => {
                buf.put_uuid(sender);
                buf.put_f64(location.0);
                buf.put_f64(location.1);
                buf.put_f64(location.2);
                buf.put_varint(data.len() as i32);
                buf.put_slice(data);
                buf.put_i64(*sequence as i64);
            }
            Self::Authenticate { player, secret } => {
                buf.put_uuid(player);
                buf.put_uuid(secret);
            }
            Self::Ping { id, timestamp } => {
                buf.put_uuid(id);
                buf.put_i64(*timestamp);
            }
            Self::AuthenticateAck | Self::KeepAlive => {}
        }
        buf.into_vec()
    }

    /// Decode the packet body for a known tag. The buffer must be positioned
    /// just past the tag byte.
    pub fn decode(packet_type: VoicePacketType, buf: &mut Buffer) -> Result<Self, ProtocolError> {
        match packet_type {
            VoicePacketType::Mic => {
                let data = read_sound_data(buf)?;
                let sequence = buf.read_i64()? as u64;
                let whispering = buf.read_bool()?;
                Ok(Self::Mic { data, sequence, whispering })
            }
            VoicePacketType::PlayerSound => {
                let sender = buf.read_uuid()?;
                let data = read_sound_data(buf)?;
                let sequence = buf.read_i64()? as u64;
                let whispering = buf.read_bool()?;
                Ok(Self::PlayerSound { sender, data, sequence, whispering })
            }
            VoicePacketType::GroupSound => {
                let sender = buf.read_uuid()?;
                let data = read_sound_data(buf)?;
                let sequence = buf.read_i64()? as u64;
                Ok(Self::GroupSound { sender, data, sequence })
            }
            VoicePacketType::LocationSound => {
                let sender = buf.read_uuid()?;
                let location = (buf.read_f64()?, buf.read_f64()?, buf.read_f64()?);
                let data = read_sound_data(buf)?;
                let sequence = buf.read_i64()? as u64;
                Ok(Self::LocationSound { sender, location, data, sequence })
            }
            VoicePacketType::Authenticate => {
                let player = buf.read_uuid()?;
                let secret = buf.read_uuid()?;
                Ok(Self::Authenticate { player, secret })
            }
            VoicePacketType::AuthenticateAck => Ok(Self::AuthenticateAck),
            VoicePacketType::Ping => {
                let id = buf.read_uuid()?;
                let timestamp = buf.read_i64()?;
                Ok(Self::Ping { id, timestamp })
            }
            VoicePacketType::KeepAlive => Ok(Self::KeepAlive),
        }
    }
}

fn read_sound_data(buf: &mut Buffer) -> Result<Vec<u8>, ProtocolError> {
    let len = buf.read_varint()?;
    buf.read_bytes(len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(packet: VoicePacket) -> VoicePacket {
        let payload = packet.encode_payload();
        let mut buf = Buffer::new(payload);
        let decoded = VoicePacket::decode(packet.packet_type(), &mut buf).unwrap();
        assert_eq!(buf.remaining(), 0);
        decoded
    }

    #[test]
    fn roundtrip_mic() {
        let packet = VoicePacket::Mic { data: vec![1, 2, 3, 4, 5], sequence: 42, whispering: false };
        assert_eq!(roundtrip(packet.clone()), packet);
    }

    #[test]
    fn roundtrip_player_sound() {
        let packet = VoicePacket::PlayerSound {
            sender: Uuid::from_u128(7),
            data: vec![0xAA; 60],
            sequence: 9_000_000_000,
            whispering: true,
        };
        assert_eq!(roundtrip(packet.clone()), packet);
    }

    #[test]
    fn roundtrip_group_sound() {
        let packet = VoicePacket::GroupSound {
            sender: Uuid::from_u128(0xDEAD_BEEF),
            data: vec![9, 8, 7],
            sequence: 3,
        };
        assert_eq!(roundtrip(packet.clone()), packet);
    }

    #[test]
    fn roundtrip_location_sound() {
        let packet = VoicePacket::LocationSound {
            sender: Uuid::from_u128(1),
            location: (128.5, 64.0, -32.25),
            data: vec![1],
            sequence: 0,
        };
        assert_eq!(roundtrip(packet.clone()), packet);
    }

    #[test]
    fn roundtrip_authenticate() {
        let packet = VoicePacket::Authenticate {
            player: Uuid::from_u128(0x1234),
            secret: Uuid::from_u128(0x5678),
        };
        assert_eq!(roundtrip(packet.clone()), packet);
    }

    #[test]
    fn roundtrip_ping() {
        let packet = VoicePacket::Ping { id: Uuid::from_u128(0xABCD), timestamp: 1_700_000_000_000 };
        assert_eq!(roundtrip(packet.clone()), packet);
    }

    #[test]
    fn empty_bodies() {
        assert!(VoicePacket::KeepAlive.encode_payload().is_empty());
        assert!(VoicePacket::AuthenticateAck.encode_payload().is_empty());
        assert_eq!(roundtrip(VoicePacket::KeepAlive), VoicePacket::KeepAlive);
    }

    #[test]
    fn mic_wire_layout() {
        let packet = VoicePacket::Mic { data: vec![0x10, 0x20], sequence: 1, whispering: true };
        let payload = packet.encode_payload();
        // varint len, data, 8-byte sequence, whispering flag
        assert_eq!(payload[0], 2);
        assert_eq!(&payload[1..3], &[0x10, 0x20]);
        assert_eq!(&payload[3..11], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(payload[11], 1);
    }

    #[test]
    fn packet_type_all_tags() {
        for (tag, expected) in [
            (0x01, VoicePacketType::Mic),
            (0x02, VoicePacketType::PlayerSound),
            (0x03, VoicePacketType::GroupSound),
            (0x04, VoicePacketType::LocationSound),
            (0x05, VoicePacketType::Authenticate),
            (0x06, VoicePacketType::AuthenticateAck),
            (0x07, VoicePacketType::Ping),
            (0x08, VoicePacketType::KeepAlive),
        ] {
            assert_eq!(VoicePacketType::from_byte(tag).unwrap(), expected);
        }
    }

    #[test]
    fn packet_type_invalid_tags() {
        assert!(VoicePacketType::from_byte(0x00).is_err());
        assert!(VoicePacketType::from_byte(0x09).is_err());
        assert!(VoicePacketType::from_byte(0xFF).is_err());
    }

    #[test]
    fn truncated_body_fails() {
        let packet = VoicePacket::GroupSound {
            sender: Uuid::from_u128(1),
            data: vec![1, 2, 3],
            sequence: 5,
        };
        let payload = packet.encode_payload();
        let mut buf = Buffer::new(payload[..payload.len() - 4].to_vec());
        assert!(VoicePacket::decode(VoicePacketType::GroupSound, &mut buf).is_err());
    }
}
