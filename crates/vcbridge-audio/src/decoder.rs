use anyhow::Result;
use audiopus::coder::Decoder as OpusDecoder;
use audiopus::packet::Packet;
use audiopus::{Channels, MutSignals, SampleRate};

use vcbridge_protocol::voice::SAMPLES_PER_FRAME;

use crate::channels_for;

/// Wraps the Opus decoder. One decoder instance per stream direction.
pub struct Decoder {
    inner: OpusDecoder,
    channels: usize,
}

impl Decoder {
    pub fn new(channel_count: usize) -> Result<Self> {
        let decoder = OpusDecoder::new(SampleRate::Hz48000, channels_for(channel_count)?)?;
        Ok(Self { inner: decoder, channels: channel_count })
    }

    /// Decode an Opus packet into interleaved signed 16-bit PCM.
    ///
    /// An empty packet is treated as a lost one and routed through
    /// [`decode_lost`](Self::decode_lost), matching the reference decoder
    /// which feeds libopus null for packet loss concealment.
    pub fn decode(&mut self, opus_data: &[u8]) -> Result<Vec<i16>> {
        if opus_data.is_empty() {
            return self.decode_lost();
        }
        let mut output = vec![0i16; SAMPLES_PER_FRAME * self.channels];
        let packet = Packet::try_from(opus_data)?;
        let signals = MutSignals::try_from(&mut output)?;
        let samples = self.inner.decode(Some(packet), signals, false)?;
        output.truncate(samples * self.channels);
        Ok(output)
    }

    /// Decode a lost packet; Opus synthesizes one full frame of
    /// concealment audio.
    pub fn decode_lost(&mut self) -> Result<Vec<i16>> {
        let mut output = vec![0i16; SAMPLES_PER_FRAME * self.channels];
        let signals = MutSignals::try_from(&mut output)?;
        let samples = self.inner.decode(None, signals, false)?;
        output.truncate(samples * self.channels);
        Ok(output)
    }
}
