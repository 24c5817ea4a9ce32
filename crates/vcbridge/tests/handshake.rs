//! Drives the real game session against a mock game server and a mock
//! voice endpoint, covering the whole voice handshake and the UDP echo
//! behavior.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use vcbridge::auth::Profile;
use vcbridge::minecraft::{self, SessionHooks};
use vcbridge_crypto::{decode_client_sent, encode_server_sent};
use vcbridge_protocol::buffer::{Buffer, BufferMut};
use vcbridge_protocol::plugin::{PluginMessage, REQUIRED_CHANNELS};
use vcbridge_protocol::voice::{VoicePacket, VoicePacketType};

const DEADLINE: Duration = Duration::from_secs(10);

// Packet ids the mock speaks (protocol 754, no compression).
const CB_LOGIN_SUCCESS: i32 = 0x02;
const CB_PLUGIN_MESSAGE: i32 = 0x17;
const SB_PLUGIN_MESSAGE: i32 = 0x0B;

async fn read_packet(stream: &mut TcpStream) -> (i32, Buffer) {
    let mut length = 0u32;
    for i in 0..5 {
        let byte = timeout(DEADLINE, stream.read_u8()).await.unwrap().unwrap();
        length |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            break;
        }
    }
    let mut data = vec![0u8; length as usize];
    timeout(DEADLINE, stream.read_exact(&mut data)).await.unwrap().unwrap();
    let mut buf = Buffer::new(data);
    let id = buf.read_varint().unwrap();
    (id, buf)
}

async fn write_packet(stream: &mut TcpStream, id: i32, body: &[u8]) {
    let mut packet = BufferMut::new();
    packet.put_varint(id);
    packet.put_slice(body);
    let packet = packet.into_vec();

    let mut framed = BufferMut::new();
    framed.put_varint(packet.len() as i32);
    framed.put_slice(&packet);
    stream.write_all(&framed.into_vec()).await.unwrap();
}

async fn write_plugin_message(stream: &mut TcpStream, message: &PluginMessage) {
    let mut body = BufferMut::new();
    body.put_string(message.channel());
    body.put_slice(&message.encode_payload());
    write_packet(stream, CB_PLUGIN_MESSAGE, &body.into_vec()).await;
}

async fn read_plugin_message(stream: &mut TcpStream) -> PluginMessage {
    let (id, mut buf) = read_packet(stream).await;
    assert_eq!(id, SB_PLUGIN_MESSAGE, "expected a serverbound plugin message");
    let channel = buf.read_string().unwrap();
    PluginMessage::decode(&channel, &mut buf).unwrap().expect("known plugin channel")
}

/// Accept the connection and run it through handshake, login start and
/// login success, returning the play-phase stream.
async fn accept_and_login(listener: &TcpListener, player: &Uuid) -> TcpStream {
    let (mut stream, _) = timeout(DEADLINE, listener.accept()).await.unwrap().unwrap();

    let (id, mut buf) = read_packet(&mut stream).await;
    assert_eq!(id, 0x00);
    assert_eq!(buf.read_varint().unwrap(), minecraft::PROTOCOL_VERSION);
    assert_eq!(buf.read_string().unwrap(), "127.0.0.1");
    buf.read_u16().unwrap();
    assert_eq!(buf.read_varint().unwrap(), 2);

    let (id, mut buf) = read_packet(&mut stream).await;
    assert_eq!(id, 0x00);
    let name = buf.read_string().unwrap();

    let mut body = BufferMut::new();
    body.put_uuid(player);
    body.put_string(&name);
    write_packet(&mut stream, CB_LOGIN_SUCCESS, &body.into_vec()).await;

    stream
}

fn secret_message(secret: Uuid, player: Uuid, udp_port: u16) -> PluginMessage {
    PluginMessage::Secret {
        secret,
        port: i32::from(udp_port),
        player,
        codec: 0,
        mtu: 1024,
        dist: 48.0,
        fade_dist: 32.0,
        crouch_dist: 16.0,
        whisper_dist: 8.0,
        keep_alive: 1000,
        groups_enabled: true,
        // An empty host means "reuse the TCP host".
        host: String::new(),
        allow_recording: false,
    }
}

fn decode_voice(datagram: &[u8], secrets: &HashMap<Uuid, Uuid>) -> VoicePacket {
    let (_, mut payload) = decode_client_sent(datagram, secrets).unwrap();
    let tag = payload.read_u8().unwrap();
    VoicePacket::decode(VoicePacketType::from_byte(tag).unwrap(), &mut payload).unwrap()
}

async fn recv_voice(udp: &UdpSocket, secrets: &HashMap<Uuid, Uuid>) -> (VoicePacket, SocketAddr) {
    let mut buf = vec![0u8; 4096];
    let (len, peer) = timeout(DEADLINE, udp.recv_from(&mut buf)).await.unwrap().unwrap();
    (decode_voice(&buf[..len], secrets), peer)
}

async fn send_voice(udp: &UdpSocket, peer: SocketAddr, secret: &Uuid, packet: &VoicePacket) {
    let framed = encode_server_sent(packet.packet_type(), &packet.encode_payload(), secret);
    udp.send_to(&framed, peer).await.unwrap();
}

/// Wait on a crossbeam receiver without blocking the async runtime.
async fn recv_sink(rx: &crossbeam_channel::Receiver<Vec<u8>>) -> Vec<u8> {
    timeout(DEADLINE, async {
        loop {
            if let Ok(data) = rx.try_recv() {
                return data;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn voice_handshake_echoes_and_mic_sequence() {
    let secret = Uuid::from_u128(0x5EC2_E700_0000_0001);
    let player = Uuid::from_u128(0x9146);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let tcp_port = listener.local_addr().unwrap().port();
    let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let udp_port = udp.local_addr().unwrap().port();

    let (mic_tx, mic_frames) = mpsc::unbounded_channel();
    let (voice_tx, voice_rx) = crossbeam_channel::unbounded();
    let session = tokio::spawn(minecraft::run(
        "127.0.0.1",
        tcp_port,
        Profile::offline("BridgeTest"),
        SessionHooks { mic_frames, voice_sink: voice_tx },
    ));

    let mut stream = accept_and_login(&listener, &player).await;

    // Register all required channels plus extras, then the brand.
    let channels: Vec<String> = REQUIRED_CHANNELS
        .iter()
        .map(|&c| c.to_owned())
        .chain(["minecraft:brand".to_owned()])
        .collect();
    write_plugin_message(&mut stream, &PluginMessage::Register { channels }).await;
    write_plugin_message(&mut stream, &PluginMessage::Brand { brand: "vanilla".into() }).await;

    // The brand prompts exactly one secret request.
    assert_eq!(
        read_plugin_message(&mut stream).await,
        PluginMessage::RequestSecret { compat_version: 14 }
    );

    write_plugin_message(&mut stream, &secret_message(secret, player, udp_port)).await;

    // The voice client authenticates over UDP.
    let secrets = HashMap::from([(player, secret)]);
    let (packet, peer) = recv_voice(&udp, &secrets).await;
    assert_eq!(packet, VoicePacket::Authenticate { player, secret });

    // Acknowledge; the client reports its state and creates the group,
    // in that order.
    send_voice(&udp, peer, &secret, &VoicePacket::AuthenticateAck).await;
    assert_eq!(
        read_plugin_message(&mut stream).await,
        PluginMessage::UpdateState { disconnected: false, disabled: false }
    );
    assert_eq!(
        read_plugin_message(&mut stream).await,
        PluginMessage::CreateGroup { name: "Discord Bridge".into(), password: None }
    );

    // Keep-alive echo.
    send_voice(&udp, peer, &secret, &VoicePacket::KeepAlive).await;
    let (packet, _) = recv_voice(&udp, &secrets).await;
    assert_eq!(packet, VoicePacket::KeepAlive);

    // Ping echo, id and timestamp unchanged.
    let ping = VoicePacket::Ping { id: Uuid::from_u128(0x1D), timestamp: 1_234_567 };
    send_voice(&udp, peer, &secret, &ping).await;
    let (packet, _) = recv_voice(&udp, &secrets).await;
    assert_eq!(packet, ping);

    // Mic frames carry a strictly increasing sequence starting at zero.
    for expected in 0..3u64 {
        mic_tx.send(vec![0xF8, 0xFF, 0xFE]).unwrap();
        let (packet, _) = recv_voice(&udp, &secrets).await;
        match packet {
            VoicePacket::Mic { data, sequence, whispering } => {
                assert_eq!(data, vec![0xF8, 0xFF, 0xFE]);
                assert_eq!(sequence, expected);
                assert!(!whispering);
            }
            other => panic!("expected a Mic packet, got {other:?}"),
        }
    }

    // Inbound group audio lands on the voice sink.
    let group =
        VoicePacket::GroupSound { sender: Uuid::from_u128(2), data: vec![1, 2, 3], sequence: 7 };
    send_voice(&udp, peer, &secret, &group).await;
    assert_eq!(recv_sink(&voice_rx).await, vec![1, 2, 3]);

    // A fresh secret replaces the session: the new client authenticates
    // under the new secret from a new local port.
    let new_secret = Uuid::from_u128(0x5EC2_E700_0000_0002);
    write_plugin_message(&mut stream, &secret_message(new_secret, player, udp_port)).await;
    let new_secrets = HashMap::from([(player, new_secret)]);
    let (packet, new_peer) = recv_voice(&udp, &new_secrets).await;
    assert_eq!(packet, VoicePacket::Authenticate { player, secret: new_secret });
    assert_ne!(new_peer, peer);

    // Server goes away; the session ends with an error.
    drop(stream);
    let result = timeout(DEADLINE, session).await.unwrap().unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn missing_plugin_channel_closes_the_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let tcp_port = listener.local_addr().unwrap().port();

    let (_mic_tx, mic_frames) = mpsc::unbounded_channel();
    let (voice_tx, _voice_rx) = crossbeam_channel::unbounded();
    let session = tokio::spawn(minecraft::run(
        "127.0.0.1",
        tcp_port,
        Profile::offline("BridgeTest"),
        SessionHooks { mic_frames, voice_sink: voice_tx },
    ));

    let player = Uuid::from_u128(1);
    let mut stream = accept_and_login(&listener, &player).await;

    // Everything except voicechat:secret.
    let channels: Vec<String> = REQUIRED_CHANNELS
        .iter()
        .filter(|&&c| c != "voicechat:secret")
        .map(|&c| c.to_owned())
        .collect();
    write_plugin_message(&mut stream, &PluginMessage::Register { channels }).await;

    let result = timeout(DEADLINE, session).await.unwrap().unwrap();
    let err = result.expect_err("session must end on an unsupported server");
    assert!(err.to_string().contains("unsupported server"), "got: {err:#}");
}
