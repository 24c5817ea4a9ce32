use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use vcbridge_protocol::voice::SAMPLES_PER_FRAME;

use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::remix::{pcm_from_bytes, remix};

/// How long the worker blocks on its input queue before re-checking the
/// stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-direction pipeline parameters.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub source_channels: usize,
    pub sink_channels: usize,
    /// Whether inbound items are Opus packets that must be decoded first.
    /// When false, items are raw interleaved s16le PCM frames.
    pub decode_input: bool,
}

impl PipelineConfig {
    pub fn source_frame_samples(&self) -> usize {
        SAMPLES_PER_FRAME * self.source_channels
    }

    pub fn source_frame_bytes(&self) -> usize {
        self.source_frame_samples() * 2
    }

    pub fn sink_frame_bytes(&self) -> usize {
        SAMPLES_PER_FRAME * self.sink_channels * 2
    }
}

/// One direction of the bridge: a worker thread that drains an input queue
/// of frames, optionally Opus-decodes them, remixes the channel layout and
/// re-encodes, handing each encoded frame to the sink callback.
///
/// The decoder and encoder live on the worker thread for their whole
/// lifetime; the thread owns them exclusively and drops them on exit.
pub struct AudioPipeline {
    input: Sender<Vec<u8>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl AudioPipeline {
    /// Spawn the worker. The sink callback runs on the worker thread; the
    /// caller is responsible for getting frames back onto whatever thread
    /// or task needs them.
    pub fn spawn(
        config: PipelineConfig,
        sink: impl FnMut(Vec<u8>) + Send + 'static,
    ) -> Result<Self> {
        let (input, receiver) = crossbeam_channel::unbounded();
        let stop = Arc::new(AtomicBool::new(false));

        // Codecs are built on the worker thread; construction failures are
        // reported back through this channel before spawn() returns, so a
        // half-initialized pipeline never outlives this call.
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let stop_flag = stop.clone();
        let worker = std::thread::Builder::new()
            .name(format!(
                "audio-{}to{}",
                config.source_channels, config.sink_channels
            ))
            .spawn(move || {
                let codecs = Decoder::new(config.source_channels)
                    .and_then(|d| Encoder::new(config.sink_channels).map(|e| (d, e)));
                match codecs {
                    Ok((decoder, encoder)) => {
                        let _ = ready_tx.send(Ok(()));
                        run_worker(config, receiver, stop_flag, decoder, encoder, sink);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .context("failed to spawn audio pipeline thread")?;

        ready_rx
            .recv()
            .context("audio pipeline worker exited during startup")??;

        Ok(Self { input, stop, worker: Some(worker) })
    }

    /// Queue one inbound item. Never blocks; the queue is unbounded.
    pub fn enqueue(&self, frame: Vec<u8>) {
        let _ = self.input.send(frame);
    }

    /// A cloneable handle for producers on other threads.
    pub fn sender(&self) -> Sender<Vec<u8>> {
        self.input.clone()
    }

    /// Signal the worker and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("audio pipeline worker panicked");
            }
        }
    }
}

impl Drop for AudioPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    config: PipelineConfig,
    receiver: Receiver<Vec<u8>>,
    stop: Arc<AtomicBool>,
    mut decoder: Decoder,
    mut encoder: Encoder,
    mut sink: impl FnMut(Vec<u8>),
) {
    debug!(
        source_channels = config.source_channels,
        sink_channels = config.sink_channels,
        decode_input = config.decode_input,
        "audio pipeline worker running"
    );

    while !stop.load(Ordering::Relaxed) {
        let item = match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(item) => item,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let pcm = if config.decode_input {
            match decoder.decode(&item) {
                Ok(pcm) => pcm,
                Err(e) => {
                    warn!("dropping frame the decoder rejected: {e:#}");
                    continue;
                }
            }
        } else {
            if item.len() != config.source_frame_bytes() {
                warn!(
                    len = item.len(),
                    expected = config.source_frame_bytes(),
                    "dropping PCM frame of unexpected size"
                );
                continue;
            }
            pcm_from_bytes(&item)
        };

        let pcm = if config.source_channels != config.sink_channels {
            remix(&pcm, config.source_channels, config.sink_channels)
        } else {
            pcm
        };

        match encoder.encode(&pcm) {
            Ok(encoded) => sink(encoded),
            Err(e) => warn!("dropping frame the encoder rejected: {e:#}"),
        }
    }

    debug!("audio pipeline worker stopped");
}
