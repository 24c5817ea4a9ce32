//! Wires the two audio pipeline workers between the chat backend and the
//! game session and owns their lifecycle.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{info, warn};

use vcbridge_audio::{AudioPipeline, PipelineConfig};

use crate::auth::Profile;
use crate::chat::{CaptureSink, ChatVoice};
use crate::minecraft::{self, SessionHooks};

/// The game voice chat is mono; the chat service captures and plays stereo.
pub const GAME_CHANNELS: usize = 1;
pub const CHAT_CHANNELS: usize = 2;

/// The assembled bridge: both pipeline workers plus the channel plumbing
/// between the concurrency domains.
pub struct Bridge {
    chat_to_game: AudioPipeline,
    game_to_chat: AudioPipeline,
    mic_frames: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Bridge {
    /// Start both pipeline workers and wire the chat side.
    ///
    /// Captured chat PCM flows through the chat→game worker and out of
    /// `mic_frames` as encoded mono Opus; inbound game audio flows through
    /// the game→chat worker straight into `chat` when it is connected.
    pub fn new(chat: Arc<Mutex<dyn ChatVoice>>) -> Result<Self> {
        let (mic_tx, mic_frames) = mpsc::unbounded_channel();
        let chat_to_game = AudioPipeline::spawn(
            PipelineConfig {
                source_channels: CHAT_CHANNELS,
                sink_channels: GAME_CHANNELS,
                decode_input: false,
            },
            // Worker thread → event loop: the unbounded sender is the
            // thread-safe hop onto the loop.
            move |frame| {
                let _ = mic_tx.send(frame);
            },
        )?;

        let game_to_chat = AudioPipeline::spawn(
            PipelineConfig {
                source_channels: GAME_CHANNELS,
                sink_channels: CHAT_CHANNELS,
                decode_input: true,
            },
            move |frame| {
                let Ok(mut chat) = chat.lock() else {
                    return;
                };
                if !chat.is_connected() {
                    return;
                }
                if let Err(e) = chat.send_audio_packet(&frame) {
                    warn!("failed to hand frame to chat backend: {e:#}");
                }
            },
        )?;

        Ok(Self { chat_to_game, game_to_chat, mic_frames })
    }

    /// The handle the chat backend captures into.
    pub fn capture_sink(&self) -> CaptureSink {
        CaptureSink::new(self.chat_to_game.sender())
    }

    /// Run the game session until it ends, then stop the workers.
    pub async fn run(self, host: &str, port: u16, profile: Profile) -> Result<()> {
        let Bridge { chat_to_game, game_to_chat, mic_frames } = self;

        let hooks = SessionHooks { mic_frames, voice_sink: game_to_chat.sender() };
        let result = minecraft::run(host, port, profile, hooks).await;

        info!("shutting down audio pipeline workers");
        chat_to_game.stop();
        game_to_chat.stop();

        result
    }
}
