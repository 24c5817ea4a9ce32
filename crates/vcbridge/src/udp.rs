//! The encrypted UDP voice session with the game server.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use vcbridge_crypto::{decode_server_sent, encode_client_sent};
use vcbridge_protocol::voice::{VoicePacket, VoicePacketType};

/// Largest datagram the voice server will send; comfortably above the
/// mod's default MTU.
const MAX_DATAGRAM: usize = 4096;

/// Undecryptable datagrams are logged on the first drop and then once per
/// this many occurrences.
const DROP_LOG_INTERVAL: u64 = 64;

/// Events the voice session reports back to the game session.
#[derive(Debug)]
pub enum VoiceEvent {
    /// The server acknowledged authentication; emitted exactly once.
    Connected,
    /// Opus data received from another player.
    Data(Vec<u8>),
}

/// Client side of one UDP voice session.
///
/// Created when the server hands out a secret; sends `Authenticate`
/// immediately, then echoes keep-alives and pings and forwards inbound
/// audio until it is shut down. A new secret means a new client.
pub struct VoiceClient {
    socket: Arc<UdpSocket>,
    player: Uuid,
    secret: Uuid,
    sequence: u64,
    receiver: Option<JoinHandle<()>>,
}

impl VoiceClient {
    /// Resolve the voice host, bind an ephemeral local port, connect the
    /// socket and authenticate.
    pub async fn connect(
        host: &str,
        port: u16,
        player: Uuid,
        secret: Uuid,
        events: mpsc::UnboundedSender<VoiceEvent>,
    ) -> Result<Self> {
        let addr = lookup_host((host, port))
            .await
            .with_context(|| format!("failed to resolve voice host {host}"))?
            .next()
            .with_context(|| format!("voice host {host} has no addresses"))?;

        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("failed to bind voice socket")?;
        socket
            .connect(addr)
            .await
            .with_context(|| format!("failed to connect voice socket to {addr}"))?;
        let socket = Arc::new(socket);
        debug!(%addr, "voice socket bound");

        let receiver = tokio::spawn(receive_loop(socket.clone(), player, secret, events));

        let client = Self { socket, player, secret, sequence: 0, receiver: Some(receiver) };
        client
            .send_packet(&VoicePacket::Authenticate { player, secret })
            .await
            .context("failed to send voice authentication")?;

        Ok(client)
    }

    /// Transmit one encoded Opus frame as a Mic packet. Send failures are
    /// reported but never fatal; the session is recreated on the next
    /// secret anyway.
    pub async fn send_voice(&mut self, data: Vec<u8>) {
        let sequence = self.sequence;
        self.sequence += 1;
        let packet = VoicePacket::Mic { data, sequence, whispering: false };
        if let Err(e) = self.send_packet(&packet).await {
            warn!("failed to send voice data: {e}");
        }
    }

    /// Stop the receive loop and release the socket.
    pub async fn shutdown(mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
            let _ = receiver.await;
        }
    }

    async fn send_packet(&self, packet: &VoicePacket) -> std::io::Result<()> {
        let framed = encode_client_sent(
            packet.packet_type(),
            &packet.encode_payload(),
            &self.player,
            &self.secret,
        );
        self.socket.send(&framed).await.map(|_| ())
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    player: Uuid,
    secret: Uuid,
    events: mpsc::UnboundedSender<VoiceEvent>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut connected = false;
    let mut dropped: u64 = 0;

    loop {
        let len = match socket.recv(&mut buf).await {
            Ok(len) => len,
            Err(e) => {
                warn!("voice receive error: {e}");
                continue;
            }
        };

        // Each datagram is its own failure domain: anything malformed is
        // counted and dropped, never fatal.
        let mut payload = match decode_server_sent(&buf[..len], &secret) {
            Ok(payload) => payload,
            Err(e) => {
                dropped += 1;
                if dropped == 1 || dropped % DROP_LOG_INTERVAL == 0 {
                    warn!(dropped, "dropping undecodable voice datagram: {e}");
                }
                continue;
            }
        };

        let Ok(tag) = payload.read_u8() else {
            continue;
        };
        let Ok(packet_type) = VoicePacketType::from_byte(tag) else {
            // Unknown packet kinds are dropped silently.
            trace!(tag, "ignoring unrecognized voice packet");
            continue;
        };
        let packet = match VoicePacket::decode(packet_type, &mut payload) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("dropping truncated voice packet: {e}");
                continue;
            }
        };

        match packet {
            VoicePacket::AuthenticateAck => {
                if !connected {
                    connected = true;
                    let _ = events.send(VoiceEvent::Connected);
                }
            }
            VoicePacket::GroupSound { data, .. }
            | VoicePacket::PlayerSound { data, .. }
            | VoicePacket::LocationSound { data, .. } => {
                let _ = events.send(VoiceEvent::Data(data));
            }
            VoicePacket::KeepAlive => {
                send_echo(&socket, &player, &secret, &VoicePacket::KeepAlive).await;
            }
            VoicePacket::Ping { id, timestamp } => {
                send_echo(&socket, &player, &secret, &VoicePacket::Ping { id, timestamp }).await;
            }
            VoicePacket::Mic { .. } | VoicePacket::Authenticate { .. } => {
                // Client-sent kinds; a server never legitimately sends these.
            }
        }
    }
}

async fn send_echo(socket: &UdpSocket, player: &Uuid, secret: &Uuid, packet: &VoicePacket) {
    let framed = encode_client_sent(packet.packet_type(), &packet.encode_payload(), player, secret);
    if let Err(e) = socket.send(&framed).await {
        warn!("failed to echo {:?}: {e}", packet.packet_type());
    }
}

impl Drop for VoiceClient {
    fn drop(&mut self) {
        if let Some(receiver) = &self.receiver {
            receiver.abort();
        }
    }
}

impl std::fmt::Debug for VoiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceClient")
            .field("player", &self.player)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}
