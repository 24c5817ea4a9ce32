//! The audio half of the bridge: Opus transcoding and the per-direction
//! pipeline workers that move frames between the two voice transports.

use anyhow::{bail, Result};
use audiopus::Channels;

pub mod decoder;
pub mod encoder;
pub mod pipeline;
pub mod remix;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use pipeline::{AudioPipeline, PipelineConfig};

pub(crate) fn channels_for(count: usize) -> Result<Channels> {
    match count {
        1 => Ok(Channels::Mono),
        2 => Ok(Channels::Stereo),
        other => bail!("unsupported channel count: {other}"),
    }
}
