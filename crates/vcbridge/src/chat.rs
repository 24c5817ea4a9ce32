//! Contract between the bridge and the chat-service voice backend.
//!
//! The backend is an external collaborator: it joins the voice channel,
//! pushes captured PCM into the bridge through a [`CaptureSink`], and
//! plays back the already-encoded Opus frames the bridge hands it.

use anyhow::Result;
use tracing::trace;

/// The chat service's voice channel as the bridge sees it.
pub trait ChatVoice: Send {
    /// Whether the voice channel is currently joined. Playback is gated on
    /// this; frames produced while disconnected are dropped.
    fn is_connected(&self) -> bool;

    /// Deliver one stereo Opus frame for playback. The frame is already
    /// encoded; the backend must not re-encode it.
    fn send_audio_packet(&mut self, encoded: &[u8]) -> Result<()>;
}

/// Handle the chat backend uses to push captured voice into the bridge.
///
/// Frames are 48kHz stereo 20ms signed 16-bit little-endian PCM, pushed
/// from the backend's own thread; `write` only enqueues and never blocks.
#[derive(Clone)]
pub struct CaptureSink {
    frames: crossbeam_channel::Sender<Vec<u8>>,
}

impl CaptureSink {
    pub(crate) fn new(frames: crossbeam_channel::Sender<Vec<u8>>) -> Self {
        Self { frames }
    }

    pub fn write(&self, pcm: Vec<u8>, user_id: u64) {
        trace!(user_id, len = pcm.len(), "captured chat frame");
        let _ = self.frames.send(pcm);
    }
}

/// Stand-in backend used while no chat service is linked in: reports the
/// channel as disconnected and drops playback, which leaves the game side
/// fully functional for development against a real game server.
pub struct DetachedChat;

impl ChatVoice for DetachedChat {
    fn is_connected(&self) -> bool {
        false
    }

    fn send_audio_packet(&mut self, _encoded: &[u8]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_sink_enqueues() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = CaptureSink::new(tx);
        sink.write(vec![1, 2, 3], 42);
        assert_eq!(rx.try_recv().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn detached_chat_is_disconnected() {
        let mut chat = DetachedChat;
        assert!(!chat.is_connected());
        assert!(chat.send_audio_packet(&[1, 2, 3]).is_ok());
    }
}
