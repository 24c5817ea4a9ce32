use anyhow::{ensure, Result};
use audiopus::coder::Encoder as OpusEncoder;
use audiopus::{Application, SampleRate};

use vcbridge_protocol::voice::SAMPLES_PER_FRAME;

use crate::channels_for;

/// Upper bound on one encoded frame at the bitrates voice uses.
const MAX_ENCODED_FRAME: usize = 512;

/// Wraps the Opus encoder with the bridge's voice settings.
pub struct Encoder {
    inner: OpusEncoder,
    channels: usize,
}

impl Encoder {
    /// Create an encoder for interleaved 48kHz PCM with the given channel
    /// count, tuned for voice.
    pub fn new(channel_count: usize) -> Result<Self> {
        let encoder =
            OpusEncoder::new(SampleRate::Hz48000, channels_for(channel_count)?, Application::Voip)?;
        Ok(Self { inner: encoder, channels: channel_count })
    }

    /// Encode one 20ms frame of interleaved signed 16-bit PCM.
    pub fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>> {
        let expected = SAMPLES_PER_FRAME * self.channels;
        ensure!(
            pcm.len() == expected,
            "PCM frame must be exactly {expected} samples, got {}",
            pcm.len()
        );

        let mut output = vec![0u8; MAX_ENCODED_FRAME];
        let len = self.inner.encode(pcm, &mut output)?;
        output.truncate(len);
        Ok(output)
    }
}
