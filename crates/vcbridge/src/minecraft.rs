//! The game protocol session: logs in, reaches the play phase, drives the
//! voice handshake over plugin channels, and pumps mic audio into the UDP
//! voice session.

use std::io::{Read as _, Write as _};

use anyhow::{bail, ensure, Context, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use vcbridge_protocol::buffer::{Buffer, BufferMut, MAX_VARINT_LEN};
use vcbridge_protocol::plugin::{PluginMessage, COMPAT_VERSION, REQUIRED_CHANNELS};

use crate::auth::Profile;
use crate::udp::{VoiceClient, VoiceEvent};

/// Game protocol version spoken on the wire (the 1.16.5 line).
pub const PROTOCOL_VERSION: i32 = 754;

/// Name of the voice group created once the voice session is up.
pub const GROUP_NAME: &str = "Discord Bridge";

/// Upper bound on one framed packet; anything larger is a corrupt stream.
const MAX_PACKET_LEN: usize = 2 * 1024 * 1024;

/// Clientbound packet ids at protocol 754.
mod clientbound {
    pub mod login {
        pub const DISCONNECT: i32 = 0x00;
        pub const ENCRYPTION_REQUEST: i32 = 0x01;
        pub const LOGIN_SUCCESS: i32 = 0x02;
        pub const SET_COMPRESSION: i32 = 0x03;
        pub const LOGIN_PLUGIN_REQUEST: i32 = 0x04;
    }
    pub mod play {
        pub const PLUGIN_MESSAGE: i32 = 0x17;
        pub const DISCONNECT: i32 = 0x19;
        pub const KEEP_ALIVE: i32 = 0x1F;
        pub const JOIN_GAME: i32 = 0x24;
        pub const PLAYER_POSITION: i32 = 0x34;
        pub const UPDATE_HEALTH: i32 = 0x49;
    }
}

/// Serverbound packet ids at protocol 754.
mod serverbound {
    pub mod handshake {
        pub const HANDSHAKE: i32 = 0x00;
    }
    pub mod login {
        pub const LOGIN_START: i32 = 0x00;
        pub const LOGIN_PLUGIN_RESPONSE: i32 = 0x02;
    }
    pub mod play {
        pub const TELEPORT_CONFIRM: i32 = 0x00;
        pub const CLIENT_STATUS: i32 = 0x04;
        pub const PLUGIN_MESSAGE: i32 = 0x0B;
        pub const KEEP_ALIVE: i32 = 0x10;
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unsupported server: required voice chat plugin channels are missing")]
    UnsupportedServer,

    #[error("server is in online mode, which needs an authenticated game account")]
    OnlineModeUnsupported,

    #[error("disconnected by server: {0}")]
    Disconnected(String),
}

/// The channels connecting the session to the rest of the bridge.
pub struct SessionHooks {
    /// Encoded mono Opus frames from the chat→game pipeline, transmitted
    /// as Mic packets.
    pub mic_frames: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Inbound game audio, fed to the game→chat pipeline.
    pub voice_sink: crossbeam_channel::Sender<Vec<u8>>,
}

/// Connect, log in, and run the play-phase session until the connection
/// ends or a fatal protocol error occurs.
pub async fn run(host: &str, port: u16, profile: Profile, hooks: SessionHooks) -> Result<()> {
    let mut stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("failed to connect to {host}:{port}"))?;
    info!(host, port, name = %profile.name, "connected to game server");

    let threshold = login(&mut stream, host, port, &profile).await?;

    let (read_half, write_half) = stream.into_split();
    let (packet_tx, packet_rx) = mpsc::unbounded_channel();
    let reader = tokio::spawn(read_loop(read_half, threshold, packet_tx));

    let (voice_tx, voice_rx) = mpsc::unbounded_channel();
    let mut session = Session {
        write: write_half,
        threshold,
        server_host: host.to_owned(),
        voice: None,
        voice_tx,
        voice_sink: hooks.voice_sink,
    };

    let result = session.run(packet_rx, voice_rx, hooks.mic_frames).await;

    reader.abort();
    if let Some(voice) = session.voice.take() {
        voice.shutdown().await;
    }
    result
}

struct Session {
    write: OwnedWriteHalf,
    threshold: Option<i32>,
    server_host: String,
    voice: Option<VoiceClient>,
    voice_tx: mpsc::UnboundedSender<VoiceEvent>,
    voice_sink: crossbeam_channel::Sender<Vec<u8>>,
}

enum Event {
    Packet(Option<(i32, Vec<u8>)>),
    Voice(Option<VoiceEvent>),
    Mic(Option<Vec<u8>>),
}

impl Session {
    async fn run(
        &mut self,
        mut packets: mpsc::UnboundedReceiver<(i32, Vec<u8>)>,
        mut voice_events: mpsc::UnboundedReceiver<VoiceEvent>,
        mut mic_frames: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Result<()> {
        loop {
            let event = tokio::select! {
                packet = packets.recv() => Event::Packet(packet),
                event = voice_events.recv() => Event::Voice(event),
                frame = mic_frames.recv() => Event::Mic(frame),
            };

            match event {
                Event::Packet(Some((id, body))) => self.handle_play_packet(id, body).await?,
                Event::Packet(None) => bail!("connection to game server lost"),
                Event::Voice(Some(VoiceEvent::Connected)) => self.on_voice_connected().await?,
                Event::Voice(Some(VoiceEvent::Data(data))) => {
                    let _ = self.voice_sink.send(data);
                }
                Event::Mic(Some(frame)) => {
                    if let Some(voice) = &mut self.voice {
                        voice.send_voice(frame).await;
                    }
                }
                // These channels close at bridge shutdown; nothing to do.
                Event::Voice(None) | Event::Mic(None) => {}
            }
        }
    }

    async fn handle_play_packet(&mut self, id: i32, body: Vec<u8>) -> Result<()> {
        let mut buf = Buffer::new(body);
        match id {
            clientbound::play::KEEP_ALIVE => {
                let keep_alive_id = buf.read_i64()?;
                let mut reply = BufferMut::new();
                reply.put_i64(keep_alive_id);
                self.send_packet(serverbound::play::KEEP_ALIVE, &reply.into_vec()).await?;
            }
            clientbound::play::PLUGIN_MESSAGE => self.handle_plugin_message(&mut buf).await?,
            clientbound::play::UPDATE_HEALTH => {
                let health = buf.read_f32()?;
                if health <= 0.0 {
                    info!("player died, respawning");
                    self.respawn().await?;
                }
            }
            clientbound::play::PLAYER_POSITION => {
                let x = buf.read_f64()?;
                let y = buf.read_f64()?;
                let z = buf.read_f64()?;
                buf.skip(4 + 4 + 1)?; // yaw, pitch, relative-move flags
                let teleport_id = buf.read_varint()?;
                let mut confirm = BufferMut::new();
                confirm.put_varint(teleport_id);
                self.send_packet(serverbound::play::TELEPORT_CONFIRM, &confirm.into_vec())
                    .await?;
                debug!(x, y, z, "accepted teleport");
            }
            clientbound::play::JOIN_GAME => {
                let entity_id = buf.read_i32()?;
                info!(entity_id, "joined game");
            }
            clientbound::play::DISCONNECT => {
                let reason = buf.read_string().unwrap_or_default();
                return Err(SessionError::Disconnected(reason).into());
            }
            _ => trace!(id, "ignoring play packet"),
        }
        Ok(())
    }

    async fn handle_plugin_message(&mut self, buf: &mut Buffer) -> Result<()> {
        let channel = match buf.read_string() {
            Ok(channel) => channel,
            Err(e) => {
                warn!("dropping plugin message with malformed channel: {e}");
                return Ok(());
            }
        };

        match PluginMessage::decode(&channel, buf) {
            Ok(Some(PluginMessage::Register { channels })) => {
                debug!(count = channels.len(), "server registered plugin channels");
                if !has_required_channels(&channels) {
                    warn!("closing connection: unsupported server");
                    return Err(SessionError::UnsupportedServer.into());
                }
            }
            Ok(Some(PluginMessage::Brand { brand })) => {
                debug!(brand, "server brand received, requesting voice secret");
                self.send_plugin_message(&PluginMessage::RequestSecret {
                    compat_version: COMPAT_VERSION,
                })
                .await?;
            }
            Ok(Some(PluginMessage::Secret { secret, port, player, host, .. })) => {
                self.start_voice(secret, port, player, host).await?;
            }
            Ok(Some(other)) => {
                trace!(channel = other.channel(), "ignoring voice chat status message");
            }
            Ok(None) => trace!(%channel, "ignoring unknown plugin channel"),
            Err(e) => warn!(%channel, "dropping undecodable plugin message: {e}"),
        }
        Ok(())
    }

    /// A fresh secret replaces the voice session wholesale: the old
    /// listener is stopped and released before the new one binds.
    async fn start_voice(
        &mut self,
        secret: Uuid,
        port: i32,
        player: Uuid,
        host: String,
    ) -> Result<()> {
        let host = if host.is_empty() { self.server_host.clone() } else { host };

        if let Some(old) = self.voice.take() {
            debug!("stopping previous voice session");
            old.shutdown().await;
        }

        match VoiceClient::connect(&host, port as u16, player, secret, self.voice_tx.clone()).await
        {
            Ok(client) => {
                info!(%host, port, %player, "voice session starting");
                self.voice = Some(client);
            }
            Err(e) => warn!("failed to start voice session: {e:#}"),
        }
        Ok(())
    }

    async fn on_voice_connected(&mut self) -> Result<()> {
        info!("connected to voice chat");
        self.send_plugin_message(&PluginMessage::UpdateState {
            disconnected: false,
            disabled: false,
        })
        .await?;
        self.send_plugin_message(&PluginMessage::CreateGroup {
            name: GROUP_NAME.to_owned(),
            password: None,
        })
        .await?;
        info!(name = GROUP_NAME, "created voice chat group");
        Ok(())
    }

    async fn respawn(&mut self) -> Result<()> {
        let mut body = BufferMut::new();
        body.put_varint(0); // action: respawn
        self.send_packet(serverbound::play::CLIENT_STATUS, &body.into_vec()).await
    }

    async fn send_plugin_message(&mut self, message: &PluginMessage) -> Result<()> {
        let mut body = BufferMut::new();
        body.put_string(message.channel());
        body.put_slice(&message.encode_payload());
        self.send_packet(serverbound::play::PLUGIN_MESSAGE, &body.into_vec()).await
    }

    async fn send_packet(&mut self, id: i32, body: &[u8]) -> Result<()> {
        write_raw_packet(&mut self.write, self.threshold, id, body).await
    }
}

/// Check the gate the voice handshake depends on: every channel the bridge
/// speaks must be announced by the server. Extras are fine.
fn has_required_channels(channels: &[String]) -> bool {
    REQUIRED_CHANNELS.iter().all(|required| channels.iter().any(|c| c == required))
}

/// Handshake and log in, returning the negotiated compression threshold.
async fn login(
    stream: &mut TcpStream,
    host: &str,
    port: u16,
    profile: &Profile,
) -> Result<Option<i32>> {
    let mut threshold = None;

    let mut handshake = BufferMut::new();
    handshake.put_varint(PROTOCOL_VERSION);
    handshake.put_string(host);
    handshake.put_u16(port);
    handshake.put_varint(2); // next state: login
    write_raw_packet(stream, threshold, serverbound::handshake::HANDSHAKE, &handshake.into_vec())
        .await?;

    let mut login_start = BufferMut::new();
    login_start.put_string(&profile.name);
    write_raw_packet(stream, threshold, serverbound::login::LOGIN_START, &login_start.into_vec())
        .await?;

    loop {
        let (id, body) = read_raw_packet(stream, threshold).await?;
        let mut buf = Buffer::new(body);
        match id {
            clientbound::login::DISCONNECT => {
                let reason = buf.read_string().unwrap_or_default();
                return Err(SessionError::Disconnected(reason).into());
            }
            clientbound::login::ENCRYPTION_REQUEST => {
                return Err(SessionError::OnlineModeUnsupported.into());
            }
            clientbound::login::LOGIN_SUCCESS => {
                let uuid = buf.read_uuid()?;
                let name = buf.read_string()?;
                info!(%name, %uuid, "logged in");
                return Ok(threshold);
            }
            clientbound::login::SET_COMPRESSION => {
                let value = buf.read_varint()?;
                debug!(threshold = value, "compression enabled");
                threshold = (value >= 0).then_some(value);
            }
            clientbound::login::LOGIN_PLUGIN_REQUEST => {
                let message_id = buf.read_varint()?;
                let mut reply = BufferMut::new();
                reply.put_varint(message_id);
                reply.put_bool(false); // not understood
                write_raw_packet(
                    stream,
                    threshold,
                    serverbound::login::LOGIN_PLUGIN_RESPONSE,
                    &reply.into_vec(),
                )
                .await?;
            }
            other => debug!(id = other, "ignoring login packet"),
        }
    }
}

async fn read_loop(
    mut read: OwnedReadHalf,
    threshold: Option<i32>,
    packets: mpsc::UnboundedSender<(i32, Vec<u8>)>,
) {
    loop {
        match read_raw_packet(&mut read, threshold).await {
            Ok(packet) => {
                if packets.send(packet).is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!("game connection read ended: {e:#}");
                return;
            }
        }
    }
}

async fn read_framing_varint<R: AsyncRead + Unpin>(stream: &mut R) -> Result<i32> {
    let mut value = 0u32;
    for i in 0..MAX_VARINT_LEN {
        let byte = stream.read_u8().await?;
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    bail!("malformed VarInt in packet framing");
}

/// Read one framed packet: VarInt length, then (with compression enabled)
/// a VarInt uncompressed length and a zlib body for packets over the
/// threshold, or a literal body behind a zero marker.
async fn read_raw_packet<R: AsyncRead + Unpin>(
    stream: &mut R,
    threshold: Option<i32>,
) -> Result<(i32, Vec<u8>)> {
    let length = read_framing_varint(stream).await?;
    ensure!(length >= 0 && (length as usize) <= MAX_PACKET_LEN, "invalid packet length {length}");

    let mut data = vec![0u8; length as usize];
    stream.read_exact(&mut data).await?;

    let body = if threshold.is_some() {
        let mut buf = Buffer::new(data);
        let uncompressed_len = buf.read_varint()?;
        let rest = buf.rest();
        if uncompressed_len == 0 {
            rest
        } else {
            ensure!(
                (uncompressed_len as usize) <= MAX_PACKET_LEN,
                "invalid uncompressed length {uncompressed_len}"
            );
            let mut decompressed = Vec::with_capacity(uncompressed_len as usize);
            ZlibDecoder::new(rest.as_slice())
                .read_to_end(&mut decompressed)
                .context("failed to decompress packet")?;
            decompressed
        }
    } else {
        data
    };

    let mut buf = Buffer::new(body);
    let id = buf.read_varint()?;
    Ok((id, buf.rest()))
}

async fn write_raw_packet<W: AsyncWrite + Unpin>(
    stream: &mut W,
    threshold: Option<i32>,
    id: i32,
    body: &[u8],
) -> Result<()> {
    let mut packet = BufferMut::new();
    packet.put_varint(id);
    packet.put_slice(body);
    let packet = packet.into_vec();

    let mut framed = BufferMut::new();
    match threshold {
        Some(threshold) if packet.len() >= threshold as usize => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&packet).context("failed to compress packet")?;
            let compressed = encoder.finish().context("failed to compress packet")?;

            let mut prefix = BufferMut::new();
            prefix.put_varint(packet.len() as i32);
            let prefix = prefix.into_vec();

            framed.put_varint((prefix.len() + compressed.len()) as i32);
            framed.put_slice(&prefix);
            framed.put_slice(&compressed);
        }
        Some(_) => {
            framed.put_varint(packet.len() as i32 + 1);
            framed.put_u8(0); // below threshold, sent uncompressed
            framed.put_slice(&packet);
        }
        None => {
            framed.put_varint(packet.len() as i32);
            framed.put_slice(&packet);
        }
    }

    stream.write_all(&framed.into_vec()).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required() -> Vec<String> {
        REQUIRED_CHANNELS.iter().map(|&c| c.to_owned()).collect()
    }

    #[test]
    fn gate_accepts_required_channels() {
        assert!(has_required_channels(&required()));
    }

    #[test]
    fn gate_accepts_extras() {
        let mut channels = required();
        channels.push("minecraft:brand".into());
        channels.push("somemod:channel".into());
        assert!(has_required_channels(&channels));
    }

    #[test]
    fn gate_rejects_any_single_missing_channel() {
        for i in 0..REQUIRED_CHANNELS.len() {
            let mut channels = required();
            channels.remove(i);
            assert!(!has_required_channels(&channels), "missing {}", REQUIRED_CHANNELS[i]);
        }
    }

    #[test]
    fn gate_rejects_empty_list() {
        assert!(!has_required_channels(&[]));
    }

    async fn write_to_vec(threshold: Option<i32>, id: i32, body: &[u8]) -> Vec<u8> {
        let mut wire = std::io::Cursor::new(Vec::new());
        write_raw_packet(&mut wire, threshold, id, body).await.unwrap();
        wire.into_inner()
    }

    #[tokio::test]
    async fn framing_roundtrip_uncompressed() {
        let wire = write_to_vec(None, 0x17, &[1, 2, 3]).await;
        let mut reader = wire.as_slice();
        let (id, body) = read_raw_packet(&mut reader, None).await.unwrap();
        assert_eq!(id, 0x17);
        assert_eq!(body, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn framing_roundtrip_below_threshold() {
        let wire = write_to_vec(Some(256), 0x0B, &[9; 16]).await;
        // Marker byte for an uncompressed body under compression framing.
        assert_eq!(wire[1], 0);
        let mut reader = wire.as_slice();
        let (id, body) = read_raw_packet(&mut reader, Some(256)).await.unwrap();
        assert_eq!(id, 0x0B);
        assert_eq!(body, vec![9; 16]);
    }

    #[tokio::test]
    async fn framing_roundtrip_compressed() {
        let payload = vec![7u8; 2048];
        let wire = write_to_vec(Some(256), 0x20, &payload).await;
        // Compressible payload frames under the raw size.
        assert!(wire.len() < payload.len());
        let mut reader = wire.as_slice();
        let (id, body) = read_raw_packet(&mut reader, Some(256)).await.unwrap();
        assert_eq!(id, 0x20);
        assert_eq!(body, payload);
    }

    #[tokio::test]
    async fn framing_rejects_oversize_length() {
        let mut framed = BufferMut::new();
        framed.put_varint((MAX_PACKET_LEN + 1) as i32);
        let wire = framed.into_vec();
        let mut reader = wire.as_slice();
        assert!(read_raw_packet(&mut reader, None).await.is_err());
    }
}
