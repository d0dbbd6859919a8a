//! CPAL audio backend
//!
//! Owns the output stream and adapts cpal's fill-the-whole-buffer
//! callback to the feeder's write-region negotiation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                        ┌──────────────────────┐
//! │ Supervisor loop  │◄── atomics + events ───│   CPAL audio thread  │
//! │  (polls ~100ms)  │                        │  (owns StreamFeeder) │
//! └────────┬─────────┘                        └──────────┬───────────┘
//!          │ is_done() → Playback::stop()                │ feed() per region
//!          ▼                                             ▼
//! ┌──────────────────┐                        ┌──────────────────────┐
//! │   cpal::Stream   │                        │     CallbackSink     │
//! │   (kept alive)   │                        │ (interleaved areas)  │
//! └──────────────────┘                        └──────────────────────┘
//! ```
//!
//! A cpal callback must leave its whole buffer defined, so the adapter
//! re-invokes the feeder (each invocation quantum-capped) until the
//! buffer is full or playback has finished, then zero-fills the rest.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use crate::engine::{
    playback_channel, ChannelArea, ChunkRequest, DeviceSink, FeedOutcome, PlaybackController,
    PlaybackOptions, PlaybackShared, StreamFeeder, UnderflowKind, WriteGrant,
};
use crate::store::SampleStore;
use crate::types::Sample;

use super::config::{AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE};
use super::device::{find_device_by_id, get_cpal_default_device};
use super::error::{AudioError, AudioResult};

/// A running playback stream.
///
/// Keeps the cpal stream alive; `stop()` (or dropping the handle) ends
/// the device's pull on the feeder.
pub struct Playback {
    stream: Stream,
    /// Supervisor-side controller for this run
    pub controller: PlaybackController,
    sample_rate: u32,
    buffer_size: u32,
}

impl Playback {
    /// Negotiated stream sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Negotiated device buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Output latency estimate in milliseconds (one device buffer)
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Pause the stream so the device stops invoking the feeder
    pub fn stop(&self) -> AudioResult<()> {
        self.stream
            .pause()
            .map_err(|e| AudioError::StreamPauseError(e.to_string()))
    }
}

/// Start streaming `store` to an output device.
///
/// Negotiates a device configuration (native i16 preferred, f32
/// fallback), builds and starts the stream, and hands back the running
/// [`Playback`]. The feeder moves into the stream callback; the
/// supervisor drives shutdown through the returned controller.
pub fn start_playback(
    store: Arc<SampleStore>,
    config: &AudioConfig,
    options: &PlaybackOptions,
) -> AudioResult<Playback> {
    let device = match &config.device {
        Some(id) => find_device_by_id(id)?,
        None => get_cpal_default_device()?,
    };
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let (supported_config, buffer_size) = get_output_config(&device, config, &store)?;
    let sample_rate = supported_config.sample_rate().0;
    let sample_format = supported_config.sample_format();

    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(buffer_size),
    };

    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency), {:?} samples",
        stream_config.channels,
        sample_rate,
        buffer_size,
        (buffer_size as f32 / sample_rate as f32) * 1000.0,
        sample_format
    );

    let (controller, link) = playback_channel(store.frame_count(), options.loop_enabled);
    // Queue two device buffers of silence behind the last source frame
    // so the real audio clears the device ring before Stopped
    let drain_frames = buffer_size.saturating_mul(2);
    let feeder = StreamFeeder::new(store, link, options.quantum_frames, drain_frames);

    let shared = controller.shared();
    let stream = match sample_format {
        SampleFormat::I16 => build_stream_i16(&device, &stream_config, feeder, shared)?,
        SampleFormat::F32 => build_stream_f32(&device, &stream_config, feeder, shared)?,
        other => {
            return Err(AudioError::UnsupportedFormat(format!("{:?}", other)));
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
    log::info!("Audio stream started");

    Ok(Playback {
        stream,
        controller,
        sample_rate,
        buffer_size,
    })
}

/// Pick the best supported configuration for this source.
///
/// Prefers the source's native i16 format at the source's sample rate
/// with at least as many channels as the source, then falls back to f32
/// at the same rate. There is no resampling, so a rate the device
/// cannot run at is an error, not a silent pitch shift.
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
    store: &SampleStore,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "No supported output configurations".to_string(),
        ));
    }

    let target_rate = config.sample_rate.unwrap_or_else(|| store.sample_rate());
    let needed_channels = store.channel_count() as u16;

    let pick = |format: SampleFormat| {
        supported_configs
            .iter()
            .filter(|c| c.sample_format() == format)
            .filter(|c| c.channels() >= needed_channels)
            .filter(|c| {
                target_rate >= c.min_sample_rate().0 && target_rate <= c.max_sample_rate().0
            })
            .min_by_key(|c| c.channels())
    };

    let best_config = pick(SampleFormat::I16)
        .or_else(|| pick(SampleFormat::F32))
        .ok_or_else(|| {
            AudioError::ConfigError(format!(
                "No output configuration supports {} channels at {}Hz in i16 or f32",
                needed_channels, target_rate
            ))
        })?;

    let stream_config = best_config
        .clone()
        .with_sample_rate(cpal::SampleRate(target_rate));

    let buffer_size = match config.buffer_size {
        BufferSize::Default => DEFAULT_BUFFER_SIZE,
        BufferSize::Fixed(frames) => frames.clamp(64, MAX_BUFFER_SIZE as u32),
    };
    log::debug!(
        "Selected buffer size: {} frames for {:?} mode",
        buffer_size,
        config.buffer_size
    );

    Ok((stream_config, buffer_size))
}

/// Sink over one cpal data buffer, handed to the feeder region by
/// region. The area layout is fixed per stream: source channel `ch`
/// maps to device channel `ch`, interleaved with the device stride.
struct CallbackSink<'a> {
    data: &'a mut [Sample],
    areas: &'a [ChannelArea],
    device_channels: usize,
    /// Frames already committed into `data`
    written: usize,
    pending: u32,
}

impl<'a> CallbackSink<'a> {
    fn new(data: &'a mut [Sample], areas: &'a [ChannelArea], device_channels: usize) -> Self {
        Self {
            data,
            areas,
            device_channels,
            written: 0,
            pending: 0,
        }
    }

    fn frames_free(&self) -> usize {
        self.data.len() / self.device_channels - self.written
    }
}

impl DeviceSink for CallbackSink<'_> {
    fn begin_write(&mut self, frames: u32) -> WriteGrant<'_> {
        let granted = (frames as usize).min(self.frames_free()) as u32;
        self.pending = granted;
        let start = self.written * self.device_channels;
        let end = start + granted as usize * self.device_channels;
        WriteGrant {
            frames: granted,
            samples: &mut self.data[start..end],
            areas: self.areas,
        }
    }

    fn end_write(&mut self) {
        self.written += self.pending as usize;
        self.pending = 0;
    }
}

/// Per-stream state moved into the data callback
struct CallbackState {
    feeder: StreamFeeder,
    /// Interleaved destination areas, computed once per stream
    areas: Vec<ChannelArea>,
    source_channels: usize,
    device_channels: usize,
}

impl CallbackState {
    fn new(feeder: StreamFeeder, device_channels: usize) -> Self {
        let source_channels = feeder.channel_count();
        let areas = (0..source_channels)
            .map(|ch| ChannelArea {
                offset: ch,
                step: device_channels,
            })
            .collect();
        Self {
            feeder,
            areas,
            source_channels,
            device_channels,
        }
    }

    /// Fill one cpal buffer: repeated feeder invocations, then silence
    /// for whatever playback did not claim.
    fn fill(&mut self, data: &mut [Sample]) {
        let mut sink = CallbackSink::new(data, &self.areas, self.device_channels);
        loop {
            let free = sink.frames_free() as u32;
            if free == 0 {
                break;
            }
            let request = ChunkRequest {
                min_frames: free,
                max_frames: free,
            };
            match self.feeder.feed(&mut sink, request) {
                FeedOutcome::Streaming | FeedOutcome::Draining => continue,
                FeedOutcome::NotReady | FeedOutcome::Finished => break,
            }
        }
        let written = sink.written;
        self.finish_frames(data, written);
    }

    /// Zero unclaimed frames and unmapped device channels; a mono source
    /// plays on every output channel.
    fn finish_frames(&self, data: &mut [Sample], written: usize) {
        // Frames the feeder did not fill (post-stop invocations and the
        // tail after a finished drain) must still be defined
        data[written * self.device_channels..].fill(0);

        if self.device_channels > self.source_channels {
            for frame in data[..written * self.device_channels].chunks_mut(self.device_channels) {
                if self.source_channels == 1 {
                    let sample = frame[0];
                    for ch in frame.iter_mut().skip(1) {
                        *ch = sample;
                    }
                } else {
                    for ch in frame.iter_mut().skip(self.source_channels) {
                        *ch = 0;
                    }
                }
            }
        }
    }
}

/// Error callback for the stream: classify device faults through the
/// shared state. Never touches the feeder, which lives on the audio
/// thread.
fn error_callback(shared: Arc<PlaybackShared>) -> impl FnMut(cpal::StreamError) {
    move |err| match shared.report_underflow() {
        UnderflowKind::Expected => {
            log::debug!("Stream stopped at end of source: {}", err);
        }
        UnderflowKind::Unexpected => {
            log::warn!("Audio stream fault mid-stream: {}", err);
        }
    }
}

fn build_stream_i16(
    device: &cpal::Device,
    config: &StreamConfig,
    feeder: StreamFeeder,
    shared: Arc<PlaybackShared>,
) -> AudioResult<Stream> {
    let mut state = CallbackState::new(feeder, config.channels as usize);

    device
        .build_output_stream(
            config,
            move |data: &mut [i16], _info: &cpal::OutputCallbackInfo| {
                state.fill(data);
            },
            error_callback(shared),
            None, // No timeout (blocking)
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

fn build_stream_f32(
    device: &cpal::Device,
    config: &StreamConfig,
    feeder: StreamFeeder,
    shared: Arc<PlaybackShared>,
) -> AudioResult<Stream> {
    let device_channels = config.channels as usize;
    let mut state = CallbackState::new(feeder, device_channels);
    // Staging buffer reused across callbacks; sized for the largest
    // buffer the device could hand us
    let mut staging: Vec<Sample> = vec![0; MAX_BUFFER_SIZE * device_channels];

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                // The device may ignore the requested buffer size, so
                // clamp to the staging capacity
                let len = data.len().min(staging.len());
                let staged = &mut staging[..len];
                state.fill(staged);
                for (out, &sample) in data.iter_mut().zip(staged.iter()) {
                    *out = sample as f32 / 32768.0;
                }
                for out in data[len..].iter_mut() {
                    *out = 0.0;
                }
            },
            error_callback(shared),
            None, // No timeout (blocking)
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feeder_with(samples: Vec<Sample>, channels: u32) -> StreamFeeder {
        let store = Arc::new(SampleStore::from_samples(samples, channels, 44100));
        let (_controller, link) = playback_channel(store.frame_count(), false);
        StreamFeeder::new(store, link, 800, 0)
    }

    #[test]
    fn test_fill_interleaved_stereo() {
        let feeder = feeder_with(vec![1, 2, 3, 4, 5, 6], 2);
        let mut state = CallbackState::new(feeder, 2);
        let mut data = vec![99i16; 10];

        state.fill(&mut data);
        // Three source frames then silence
        assert_eq!(data, vec![1, 2, 3, 4, 5, 6, 0, 0, 0, 0]);
    }

    #[test]
    fn test_fill_mono_source_plays_on_all_channels() {
        let feeder = feeder_with(vec![7, 8], 1);
        let mut state = CallbackState::new(feeder, 2);
        let mut data = vec![0i16; 8];

        state.fill(&mut data);
        assert_eq!(data, vec![7, 7, 8, 8, 0, 0, 0, 0]);
    }

    #[test]
    fn test_fill_extra_device_channels_are_silent() {
        let feeder = feeder_with(vec![1, 2, 3, 4], 2);
        let mut state = CallbackState::new(feeder, 4);
        let mut data = vec![9i16; 8];

        state.fill(&mut data);
        assert_eq!(data, vec![1, 2, 0, 0, 3, 4, 0, 0]);
    }

    #[test]
    fn test_fill_after_finish_is_silence() {
        let feeder = feeder_with(vec![1, 2], 1);
        let mut state = CallbackState::new(feeder, 1);
        let mut data = vec![5i16; 4];
        state.fill(&mut data);

        let mut next = vec![5i16; 4];
        state.fill(&mut next);
        assert_eq!(next, vec![0, 0, 0, 0]);
    }
}
