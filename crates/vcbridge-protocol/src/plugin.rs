use std::collections::HashMap;

use uuid::Uuid;

use crate::buffer::{Buffer, BufferMut};
use crate::error::ProtocolError;

/// Voice mod compatibility version advertised when requesting a secret.
pub const COMPAT_VERSION: i32 = 14;

pub const CHANNEL_REGISTER: &str = "minecraft:register";
pub const CHANNEL_BRAND: &str = "minecraft:brand";
pub const CHANNEL_REQUEST_SECRET: &str = "voicechat:request_secret";
pub const CHANNEL_SECRET: &str = "voicechat:secret";
pub const CHANNEL_UPDATE_STATE: &str = "voicechat:update_state";
pub const CHANNEL_CREATE_GROUP: &str = "voicechat:create_group";
pub const CHANNEL_SET_GROUP: &str = "voicechat:set_group";
pub const CHANNEL_LEAVE_GROUP: &str = "voicechat:leave_group";
pub const CHANNEL_JOINED_GROUP: &str = "voicechat:joined_group";
pub const CHANNEL_PLAYER_STATE: &str = "voicechat:player_state";
pub const CHANNEL_PLAYER_STATES: &str = "voicechat:player_states";

/// Plugin channels the voice handshake depends on. A server whose register
/// announcement is missing any of these does not run a compatible voice mod.
pub const REQUIRED_CHANNELS: [&str; 9] = [
    CHANNEL_PLAYER_STATE,
    CHANNEL_SECRET,
    CHANNEL_LEAVE_GROUP,
    CHANNEL_CREATE_GROUP,
    CHANNEL_REQUEST_SECRET,
    CHANNEL_SET_GROUP,
    CHANNEL_JOINED_GROUP,
    CHANNEL_UPDATE_STATE,
    CHANNEL_PLAYER_STATES,
];

/// A voice group as announced by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientGroup {
    pub id: Uuid,
    pub name: String,
    pub has_password: bool,
}

impl ClientGroup {
    fn decode(buf: &mut Buffer) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: buf.read_uuid()?,
            name: buf.read_string()?,
            has_password: buf.read_bool()?,
        })
    }

    fn encode(&self, buf: &mut BufferMut) {
        buf.put_uuid(&self.id);
        buf.put_string(&self.name);
        buf.put_bool(self.has_password);
    }
}

/// Another player's voice chat state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub uuid: Uuid,
    pub name: String,
    pub disabled: bool,
    pub disconnected: bool,
    pub group: Option<ClientGroup>,
}

impl PlayerState {
    fn decode(buf: &mut Buffer) -> Result<Self, ProtocolError> {
        let disabled = buf.read_bool()?;
        let disconnected = buf.read_bool()?;
        let uuid = buf.read_uuid()?;
        let name = buf.read_string()?;
        let group = if buf.read_bool()? { Some(ClientGroup::decode(buf)?) } else { None };
        Ok(Self { uuid, name, disabled, disconnected, group })
    }

    fn encode(&self, buf: &mut BufferMut) {
        buf.put_bool(self.disabled);
        buf.put_bool(self.disconnected);
        buf.put_uuid(&self.uuid);
        buf.put_string(&self.name);
        buf.put_bool(self.group.is_some());
        if let Some(group) = &self.group {
            group.encode(buf);
        }
    }
}

/// One plugin-channel message, identified by its channel string.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginMessage {
    /// NUL-separated list of channels the peer understands.
    Register { channels: Vec<String> },
    /// Server software brand, sent once on join.
    Brand { brand: String },
    RequestSecret { compat_version: i32 },
    /// Everything needed to open the UDP voice session.
    Secret {
        secret: Uuid,
        port: i32,
        player: Uuid,
        codec: u8,
        mtu: i32,
        dist: f64,
        fade_dist: f64,
        crouch_dist: f64,
        whisper_dist: f64,
        keep_alive: i32,
        groups_enabled: bool,
        host: String,
        allow_recording: bool,
    },
    UpdateState { disconnected: bool, disabled: bool },
    CreateGroup { name: String, password: Option<String> },
    SetGroup { group: Uuid, password: Option<String> },
    LeaveGroup,
    JoinedGroup { group: Option<ClientGroup>, wrong_password: bool },
    PlayerState { state: PlayerState },
    PlayerStates { states: HashMap<Uuid, PlayerState> },
}

impl PluginMessage {
    pub fn channel(&self) -> &'static str {
        match self {
            Self::Register { .. } => CHANNEL_REGISTER,
            Self::Brand { .. } => CHANNEL_BRAND,
            Self::RequestSecret { .. } => CHANNEL_REQUEST_SECRET,
            Self::Secret { .. } => CHANNEL_SECRET,
            Self::UpdateState { .. } => CHANNEL_UPDATE_STATE,
            Self::CreateGroup { .. } => CHANNEL_CREATE_GROUP,
            Self::SetGroup { .. } => CHANNEL_SET_GROUP,
            Self::LeaveGroup => CHANNEL_LEAVE_GROUP,
            Self::JoinedGroup { .. } => CHANNEL_JOINED_GROUP,
            Self::PlayerState { .. } => CHANNEL_PLAYER_STATE,
            Self::PlayerStates { .. } => CHANNEL_PLAYER_STATES,
        }
    }

    /// Decode the message carried on `channel`. Returns `None` for channels
    /// this client does not understand.
    pub fn decode(channel: &str, buf: &mut Buffer) -> Result<Option<Self>, ProtocolError> {
        let message = match channel {
            CHANNEL_REGISTER => Self::Register { channels: decode_register(buf) },
            CHANNEL_BRAND => Self::Brand { brand: buf.read_string()? },
            CHANNEL_REQUEST_SECRET => Self::RequestSecret { compat_version: buf.read_i32()? },
            CHANNEL_SECRET => Self::Secret {
                secret: buf.read_uuid()?,
                port: buf.read_i32()?,
                player: buf.read_uuid()?,
                codec: buf.read_u8()?,
                mtu: buf.read_i32()?,
                dist: buf.read_f64()?,
                fade_dist: buf.read_f64()?,
                crouch_dist: buf.read_f64()?,
                whisper_dist: buf.read_f64()?,
                keep_alive: buf.read_i32()?,
                groups_enabled: buf.read_bool()?,
                host: buf.read_string()?,
                allow_recording: buf.read_bool()?,
            },
            CHANNEL_UPDATE_STATE => Self::UpdateState {
                disconnected: buf.read_bool()?,
                disabled: buf.read_bool()?,
            },
            CHANNEL_CREATE_GROUP => {
                let name = buf.read_string()?;
                let password = if buf.read_bool()? { Some(buf.read_string()?) } else { None };
                Self::CreateGroup { name, password }
            }
            CHANNEL_SET_GROUP => {
                let group = buf.read_uuid()?;
                let password = if buf.read_bool()? { Some(buf.read_string()?) } else { None };
                Self::SetGroup { group, password }
            }
            CHANNEL_LEAVE_GROUP => Self::LeaveGroup,
            CHANNEL_JOINED_GROUP => {
                let group = if buf.read_bool()? { Some(ClientGroup::decode(buf)?) } else { None };
                let wrong_password = buf.read_bool()?;
                Self::JoinedGroup { group, wrong_password }
            }
            CHANNEL_PLAYER_STATE => Self::PlayerState { state: PlayerState::decode(buf)? },
            CHANNEL_PLAYER_STATES => {
                let count = buf.read_i32()?;
                let mut states = HashMap::with_capacity(count.max(0) as usize);
                for _ in 0..count {
                    let state = PlayerState::decode(buf)?;
                    states.insert(state.uuid, state);
                }
                Self::PlayerStates { states }
            }
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    /// Serialize the message payload (the bytes carried after the channel
    /// string in a plugin-message packet).
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = BufferMut::new();
        match self {
            Self::Register { channels } => {
                for channel in channels {
                    buf.put_slice(channel.as_bytes());
                    buf.put_u8(0);
                }
            }
            Self::Brand { brand } => buf.put_string(brand),
            Self::RequestSecret { compat_version } => buf.put_i32(*compat_version),
            Self::Secret {
                secret,
                port,
                player,
                codec,
                mtu,
                dist,
                fade_dist,
                crouch_dist,
                whisper_dist,
                keep_alive,
                groups_enabled,
                host,
                allow_recording,
            } => {
                buf.put_uuid(secret);
                buf.put_i32(*port);
                buf.put_uuid(player);
                buf.put_u8(*codec);
                buf.put_i32(*mtu);
                buf.put_f64(*dist);
                buf.put_f64(*fade_dist);
                buf.put_f64(*crouch_dist);
                buf.put_f64(*whisper_dist);
                buf.put_i32(*keep_alive);
                buf.put_bool(*groups_enabled);
                buf.put_string(host);
                buf.put_bool(*allow_recording);
            }
            Self::UpdateState { disconnected, disabled } => {
                buf.put_bool(*disconnected);
                buf.put_bool(*disabled);
            }
            Self::CreateGroup { name, password } => {
                buf.put_string(name);
                buf.put_bool(password.is_some());
                if let Some(password) = password {
                    buf.put_string(password);
                }
            }
            Self::SetGroup { group, password } => {
                buf.put_uuid(group);
                buf.put_bool(password.is_some());
                if let Some(password) = password {
                    buf.put_string(password);
                }
            }
            Self::LeaveGroup => {}
            Self::JoinedGroup { group, wrong_password } => {
                buf.put_bool(group.is_some());
                if let Some(group) = group {
                    group.encode(&mut buf);
                }
                buf.put_bool(*wrong_password);
            }
            Self::PlayerState { state } => state.encode(&mut buf),
            Self::PlayerStates { states } => {
                buf.put_i32(states.len() as i32);
                for state in states.values() {
                    state.encode(&mut buf);
                }
            }
        }
        buf.into_vec()
    }
}

/// The register payload is NUL-separated channel names with a trailing NUL.
fn decode_register(buf: &mut Buffer) -> Vec<String> {
    let data = buf.rest();
    let mut channels: Vec<String> = data
        .split(|&b| b == 0)
        .map(|segment| String::from_utf8_lossy(segment).into_owned())
        .collect();
    // Drop the empty element produced by the terminator.
    if channels.last().is_some_and(|c| c.is_empty()) {
        channels.pop();
    }
    channels
}
