/// Remap an interleaved PCM frame between channel layouts by copying the
/// first source channel of every sample position into all sink channels.
/// Upmixing duplicates the signal; downmixing keeps the first channel.
pub fn remix(samples: &[i16], source_channels: usize, sink_channels: usize) -> Vec<i16> {
    let mut output = Vec::with_capacity(samples.len() / source_channels * sink_channels);
    for position in samples.chunks(source_channels) {
        for _ in 0..sink_channels {
            output.push(position[0]);
        }
    }
    output
}

/// Reinterpret little-endian byte pairs as interleaved i16 samples.
pub fn pcm_from_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Serialize interleaved i16 samples as little-endian bytes.
pub fn pcm_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
