//! Real-time stream feeder
//!
//! The feeder is the body of the device callback: each invocation asks
//! the sink for write regions, copies the next span of source frames
//! into them, and advances the cursor. It never blocks, allocates, or
//! performs I/O.
//!
//! ```text
//! ┌──────────────┐   feed()   ┌───────────────┐  begin/end_write  ┌────────┐
//! │ Device clock │───────────►│ StreamFeeder  │──────────────────►│  Sink  │
//! │  (callback)  │            │ cursor + store│   strided copy    │(device)│
//! └──────────────┘            └───────┬───────┘                   └────────┘
//!                                     │ atomics + event ring
//!                                     ▼
//!                             ┌───────────────┐
//!                             │  Supervisor   │  polls is_done()
//!                             └───────────────┘
//! ```

use std::sync::Arc;

use crate::store::SampleStore;
use crate::types::Sample;

use super::cursor::PlaybackCursor;
use super::state::{PlaybackEvent, PlaybackLink, PlaybackState};

/// Default per-invocation chunk cap in frames.
///
/// Smaller quantums track the cursor more tightly; larger ones ride out
/// scheduler jitter at the cost of coarser position reporting.
pub const DEFAULT_QUANTUM_FRAMES: u32 = 800;

/// Frame budget the device offers for one callback invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRequest {
    /// Smallest fill the device will accept without starving
    pub min_frames: u32,
    /// Largest fill the device can take right now
    pub max_frames: u32,
}

/// Destination layout for one channel within a granted write region.
///
/// `offset` is the index of the channel's first sample in the region
/// buffer; `step` is the distance between that channel's consecutive
/// frames. Interleaved stereo is `{offset: ch, step: 2}`; planar
/// layouts use `{offset: ch * frames, step: 1}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelArea {
    pub offset: usize,
    pub step: usize,
}

/// One granted write region: a destination buffer plus per-channel areas
pub struct WriteGrant<'a> {
    /// Frames the device accepted (zero: not ready for more)
    pub frames: u32,
    /// Destination samples; channel layout described by `areas`
    pub samples: &'a mut [Sample],
    /// One area per source channel
    pub areas: &'a [ChannelArea],
}

/// Write access to a device buffer, negotiated region by region.
///
/// `begin_write` may grant fewer frames than requested; a grant of zero
/// means the device cannot accept more during this invocation. Each
/// grant must cover `frames` frames under its areas and be committed
/// with `end_write` before the next request.
pub trait DeviceSink {
    fn begin_write(&mut self, frames: u32) -> WriteGrant<'_>;
    fn end_write(&mut self);
}

/// Transport options for one playback run
#[derive(Debug, Clone, Copy)]
pub struct PlaybackOptions {
    /// Wrap at the end of the source instead of stopping
    pub loop_enabled: bool,
    /// Per-invocation chunk cap in frames
    pub quantum_frames: u32,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            loop_enabled: false,
            quantum_frames: DEFAULT_QUANTUM_FRAMES,
        }
    }
}

impl PlaybackOptions {
    /// Set whether playback restarts from the top at the end
    pub fn with_loop(mut self, enabled: bool) -> Self {
        self.loop_enabled = enabled;
        self
    }

    /// Set the per-invocation chunk cap
    pub fn with_quantum(mut self, frames: u32) -> Self {
        self.quantum_frames = frames;
        self
    }
}

/// What one feeder invocation accomplished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Source frames were copied
    Streaming,
    /// Source exhausted; silence is padding out the device latency
    Draining,
    /// The device granted no space; nothing advanced
    NotReady,
    /// Playback is complete; the invocation was a no-op
    Finished,
}

/// Copies source frames into device write regions under a deadline.
///
/// Owned by the stream callback; the supervisor observes progress only
/// through the shared state inside the link.
pub struct StreamFeeder {
    store: Arc<SampleStore>,
    cursor: PlaybackCursor,
    link: PlaybackLink,
    /// Per-invocation chunk cap in frames
    quantum: u32,
    /// Silent frames to queue after exhaustion before declaring Stopped
    drain_frames: u32,
    drained: u32,
    /// Completed loop cycles
    cycles: u64,
    /// Device underruns already folded into the event ring
    underruns_seen: u64,
}

impl StreamFeeder {
    pub fn new(store: Arc<SampleStore>, link: PlaybackLink, quantum: u32, drain_frames: u32) -> Self {
        let cursor = PlaybackCursor::new(store.frame_count(), link.shared().loop_enabled());
        Self {
            store,
            cursor,
            link,
            quantum: quantum.max(1),
            drain_frames,
            drained: 0,
            cycles: 0,
            underruns_seen: 0,
        }
    }

    /// Current position in frames
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// Frames still available to copy
    pub fn frames_remaining(&self) -> u64 {
        self.cursor.frames_remaining()
    }

    /// Source channels per frame
    pub fn channel_count(&self) -> usize {
        self.store.channel_count() as usize
    }

    /// Run one callback invocation against `sink`.
    ///
    /// Copies at most `min(frames_remaining, max_frames, quantum)`
    /// frames, splitting the chunk across as many write regions as the
    /// sink grants. A zero grant ends the invocation without advancing
    /// anything.
    pub fn feed(&mut self, sink: &mut impl DeviceSink, request: ChunkRequest) -> FeedOutcome {
        match self.link.shared().state() {
            PlaybackState::Stopped => return FeedOutcome::Finished,
            PlaybackState::Loading | PlaybackState::Underrun => {
                self.link.shared().set_state(PlaybackState::Streaming);
            }
            _ => {}
        }
        self.fold_device_underruns();

        if self.cursor.frames_remaining() == 0 {
            return self.drain(sink, request);
        }

        let mut left = self
            .cursor
            .frames_remaining()
            .min(request.max_frames as u64)
            .min(self.quantum as u64) as u32;
        if left == 0 {
            return FeedOutcome::NotReady;
        }

        while left > 0 {
            // Bound each span at the physical end of the buffer so loop
            // wraps land on span boundaries and a copy never crosses the
            // buffer edge
            let span = (left as u64).min(self.cursor.frames_to_end()) as u32;
            let position = self.cursor.position();

            let grant = sink.begin_write(span);
            if grant.frames == 0 {
                return FeedOutcome::NotReady;
            }
            let granted = grant.frames;

            for frame in 0..granted as usize {
                let source = self.store.frame_at(position + frame as u64);
                for (ch, area) in grant.areas.iter().enumerate() {
                    grant.samples[area.offset + frame * area.step] = source[ch];
                }
            }
            sink.end_write();

            if self.cursor.advance(granted as u64) {
                self.cycles += 1;
                self.link
                    .push_event(PlaybackEvent::Looped { cycle: self.cycles });
            }
            self.link.shared().store_position(self.cursor.position());
            left -= granted;

            if !self.cursor.loop_enabled() && self.cursor.frames_remaining() == 0 {
                // Last source frame handed off; switch to padding out
                // the device's buffered latency
                self.link.shared().set_state(PlaybackState::Draining);
                break;
            }
        }

        FeedOutcome::Streaming
    }

    /// Pad silence behind the last source frame until the device has had
    /// time to play the real audio out, then declare completion.
    fn drain(&mut self, sink: &mut impl DeviceSink, request: ChunkRequest) -> FeedOutcome {
        if self.link.shared().state() != PlaybackState::Draining {
            self.link.shared().set_state(PlaybackState::Draining);
        }

        let mut left = self
            .drain_frames
            .saturating_sub(self.drained)
            .min(request.max_frames)
            .min(self.quantum);

        while left > 0 {
            let grant = sink.begin_write(left);
            if grant.frames == 0 {
                return FeedOutcome::NotReady;
            }
            let granted = grant.frames;

            for frame in 0..granted as usize {
                for area in grant.areas.iter() {
                    grant.samples[area.offset + frame * area.step] = 0;
                }
            }
            sink.end_write();

            self.drained += granted;
            left -= granted;
        }

        if self.drained >= self.drain_frames {
            self.finish()
        } else {
            FeedOutcome::Draining
        }
    }

    /// Mark playback complete. The Stopped state makes every later
    /// invocation a no-op, so the Finished event fires exactly once.
    fn finish(&mut self) -> FeedOutcome {
        self.link.shared().set_state(PlaybackState::Stopped);
        self.link.push_event(PlaybackEvent::Finished);
        FeedOutcome::Finished
    }

    /// Fold device-reported underruns (recorded on another thread) into
    /// the event ring, attaching the current remaining count.
    fn fold_device_underruns(&mut self) {
        let total = self.link.shared().underrun_count();
        while self.underruns_seen < total {
            self.underruns_seen += 1;
            self.link.push_event(PlaybackEvent::Underrun {
                frames_remaining: self.cursor.frames_remaining(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::{playback_channel, PlaybackController, UnderflowKind};

    /// Sink over a plain interleaved buffer with a scriptable grant cap
    struct TestSink {
        buffer: Vec<Sample>,
        areas: Vec<ChannelArea>,
        channels: usize,
        written: usize,
        grant_limit: Option<u32>,
        pending: u32,
    }

    impl TestSink {
        fn interleaved(capacity_frames: usize, channels: usize) -> Self {
            let areas = (0..channels)
                .map(|ch| ChannelArea {
                    offset: ch,
                    step: channels,
                })
                .collect();
            Self {
                buffer: vec![0; capacity_frames * channels],
                areas,
                channels,
                written: 0,
                grant_limit: None,
                pending: 0,
            }
        }

        fn committed(&self) -> &[Sample] {
            &self.buffer[..self.written * self.channels]
        }
    }

    impl DeviceSink for TestSink {
        fn begin_write(&mut self, frames: u32) -> WriteGrant<'_> {
            let free = (self.buffer.len() / self.channels - self.written) as u32;
            let granted = frames.min(free).min(self.grant_limit.unwrap_or(u32::MAX));
            self.pending = granted;
            let start = self.written * self.channels;
            let end = start + granted as usize * self.channels;
            WriteGrant {
                frames: granted,
                samples: &mut self.buffer[start..end],
                areas: &self.areas,
            }
        }

        fn end_write(&mut self) {
            self.written += self.pending as usize;
            self.pending = 0;
        }
    }

    /// Sink with per-channel planes instead of interleaving, to prove
    /// the feeder honors arbitrary area strides
    struct PlanarSink {
        buffer: Vec<Sample>,
        areas: Vec<ChannelArea>,
        capacity: usize,
        channels: usize,
        written: usize,
        pending: u32,
    }

    impl PlanarSink {
        fn new(capacity_frames: usize, channels: usize) -> Self {
            Self {
                buffer: vec![0; capacity_frames * channels],
                areas: Vec::new(),
                capacity: capacity_frames,
                channels,
                written: 0,
                pending: 0,
            }
        }
    }

    impl DeviceSink for PlanarSink {
        fn begin_write(&mut self, frames: u32) -> WriteGrant<'_> {
            let free = (self.capacity - self.written) as u32;
            let granted = frames.min(free);
            self.areas.clear();
            for ch in 0..self.channels {
                self.areas.push(ChannelArea {
                    offset: ch * self.capacity + self.written,
                    step: 1,
                });
            }
            self.pending = granted;
            WriteGrant {
                frames: granted,
                samples: &mut self.buffer,
                areas: &self.areas,
            }
        }

        fn end_write(&mut self) {
            self.written += self.pending as usize;
            self.pending = 0;
        }
    }

    /// Five stereo frames; frame i carries (10*i, 10*i + 1)
    fn store_2ch_5f() -> Arc<SampleStore> {
        let samples = (0..5)
            .flat_map(|i| [(i * 10) as i16, (i * 10 + 1) as i16])
            .collect();
        Arc::new(SampleStore::from_samples(samples, 2, 44100))
    }

    fn feeder_for(
        store: &Arc<SampleStore>,
        loop_enabled: bool,
        quantum: u32,
        drain_frames: u32,
    ) -> (PlaybackController, StreamFeeder) {
        let (controller, link) = playback_channel(store.frame_count(), loop_enabled);
        let feeder = StreamFeeder::new(Arc::clone(store), link, quantum, drain_frames);
        (controller, feeder)
    }

    #[test]
    fn test_chunked_copy_to_completion() {
        let store = store_2ch_5f();
        let (mut controller, mut feeder) = feeder_for(&store, false, 800, 0);
        let mut sink = TestSink::interleaved(16, 2);
        let request = ChunkRequest {
            min_frames: 3,
            max_frames: 3,
        };

        assert_eq!(feeder.feed(&mut sink, request), FeedOutcome::Streaming);
        assert_eq!(feeder.position(), 3);
        assert!(!controller.is_done());

        assert_eq!(feeder.feed(&mut sink, request), FeedOutcome::Streaming);
        assert_eq!(feeder.position(), 5);
        assert_eq!(controller.state(), PlaybackState::Draining);
        assert!(!controller.is_done());

        // Completion lands on the following, empty invocation
        assert_eq!(feeder.feed(&mut sink, request), FeedOutcome::Finished);
        assert!(controller.is_done());
        assert_eq!(controller.poll_event(), Some(PlaybackEvent::Finished));

        assert_eq!(sink.committed(), &[0, 1, 10, 11, 20, 21, 30, 31, 40, 41]);
    }

    #[test]
    fn test_loop_copies_whole_buffer_and_wraps() {
        let store = store_2ch_5f();
        let (mut controller, mut feeder) = feeder_for(&store, true, 800, 0);
        let mut sink = TestSink::interleaved(32, 2);
        let request = ChunkRequest {
            min_frames: 7,
            max_frames: 7,
        };

        // Loop mode reports one whole buffer remaining, so exactly five
        // frames copy and the cursor lands back on frame 0
        assert_eq!(feeder.feed(&mut sink, request), FeedOutcome::Streaming);
        assert_eq!(feeder.position(), 0);
        assert_eq!(controller.position_frames(), 0);
        assert_eq!(controller.poll_event(), Some(PlaybackEvent::Looped { cycle: 1 }));

        // The next invocation starts over from frame 0
        assert_eq!(feeder.feed(&mut sink, request), FeedOutcome::Streaming);
        assert_eq!(&sink.committed()[10..12], &[0, 1]);
        assert!(!controller.is_done());
    }

    #[test]
    fn test_zero_grant_ends_invocation_without_advancing() {
        let store = store_2ch_5f();
        let (controller, mut feeder) = feeder_for(&store, false, 800, 0);
        let mut sink = TestSink::interleaved(16, 2);
        sink.grant_limit = Some(0);
        let request = ChunkRequest {
            min_frames: 4,
            max_frames: 4,
        };

        assert_eq!(feeder.feed(&mut sink, request), FeedOutcome::NotReady);
        assert_eq!(feeder.position(), 0);
        assert_eq!(controller.state(), PlaybackState::Streaming);
        assert_eq!(controller.underrun_count(), 0);
    }

    #[test]
    fn test_partial_grants_cover_the_chunk() {
        let store = store_2ch_5f();
        let (_controller, mut feeder) = feeder_for(&store, false, 800, 0);
        let mut sink = TestSink::interleaved(16, 2);
        sink.grant_limit = Some(2);
        let request = ChunkRequest {
            min_frames: 5,
            max_frames: 5,
        };

        // One invocation, granted 2+2+1 across three regions
        assert_eq!(feeder.feed(&mut sink, request), FeedOutcome::Streaming);
        assert_eq!(feeder.position(), 5);
        assert_eq!(sink.committed(), &[0, 1, 10, 11, 20, 21, 30, 31, 40, 41]);
    }

    #[test]
    fn test_quantum_caps_one_invocation() {
        let store = store_2ch_5f();
        let (_controller, mut feeder) = feeder_for(&store, false, 2, 0);
        let mut sink = TestSink::interleaved(16, 2);
        let request = ChunkRequest {
            min_frames: 5,
            max_frames: 5,
        };

        assert_eq!(feeder.feed(&mut sink, request), FeedOutcome::Streaming);
        assert_eq!(feeder.position(), 2);
        assert_eq!(feeder.frames_remaining(), 3);
    }

    #[test]
    fn test_drain_pads_silence_then_stops() {
        let store = store_2ch_5f();
        let (controller, mut feeder) = feeder_for(&store, false, 800, 4);
        let mut sink = TestSink::interleaved(32, 2);
        let request = ChunkRequest {
            min_frames: 8,
            max_frames: 8,
        };

        assert_eq!(feeder.feed(&mut sink, request), FeedOutcome::Streaming);
        assert_eq!(controller.state(), PlaybackState::Draining);

        assert_eq!(feeder.feed(&mut sink, request), FeedOutcome::Finished);
        assert!(controller.is_done());

        // Five source frames then four frames of silence
        let committed = sink.committed();
        assert_eq!(committed.len(), 18);
        assert!(committed[10..].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_drain_split_across_invocations() {
        let store = store_2ch_5f();
        let (controller, mut feeder) = feeder_for(&store, false, 800, 4);
        let mut sink = TestSink::interleaved(32, 2);
        let request = ChunkRequest {
            min_frames: 3,
            max_frames: 3,
        };

        while controller.state() != PlaybackState::Draining {
            feeder.feed(&mut sink, request);
        }
        assert_eq!(feeder.feed(&mut sink, request), FeedOutcome::Draining);
        assert_eq!(feeder.feed(&mut sink, request), FeedOutcome::Finished);
        assert!(controller.is_done());
    }

    #[test]
    fn test_finished_feeds_are_noops() {
        let store = store_2ch_5f();
        let (controller, mut feeder) = feeder_for(&store, false, 800, 0);
        let mut sink = TestSink::interleaved(64, 2);
        let request = ChunkRequest {
            min_frames: 800,
            max_frames: 800,
        };

        while feeder.feed(&mut sink, request) != FeedOutcome::Finished {}
        let written = sink.committed().len();

        assert_eq!(feeder.feed(&mut sink, request), FeedOutcome::Finished);
        assert_eq!(sink.committed().len(), written);
        assert!(controller.is_done());
    }

    #[test]
    fn test_unexpected_underrun_is_survived() {
        let store = store_2ch_5f();
        let (mut controller, mut feeder) = feeder_for(&store, false, 800, 0);
        let mut sink = TestSink::interleaved(32, 2);
        let request = ChunkRequest {
            min_frames: 2,
            max_frames: 2,
        };

        assert_eq!(feeder.feed(&mut sink, request), FeedOutcome::Streaming);

        // A device fault lands mid-stream on another thread
        assert_eq!(
            controller.shared().report_underflow(),
            UnderflowKind::Unexpected
        );
        assert_eq!(controller.state(), PlaybackState::Underrun);
        assert_eq!(controller.underrun_count(), 1);

        // The next invocation recovers, reports, and keeps copying
        assert_eq!(feeder.feed(&mut sink, request), FeedOutcome::Streaming);
        assert_eq!(feeder.position(), 4);
        assert_eq!(controller.state(), PlaybackState::Streaming);
        assert_eq!(
            controller.poll_event(),
            Some(PlaybackEvent::Underrun { frames_remaining: 3 })
        );
        assert!(!controller.is_done());
    }

    #[test]
    fn test_planar_destination_strides() {
        let store = store_2ch_5f();
        let (_controller, mut feeder) = feeder_for(&store, false, 800, 0);
        let mut sink = PlanarSink::new(8, 2);
        let request = ChunkRequest {
            min_frames: 5,
            max_frames: 5,
        };

        assert_eq!(feeder.feed(&mut sink, request), FeedOutcome::Streaming);
        // Left plane then right plane
        assert_eq!(&sink.buffer[..5], &[0, 10, 20, 30, 40]);
        assert_eq!(&sink.buffer[8..13], &[1, 11, 21, 31, 41]);
    }

    #[test]
    fn test_empty_store_completes_immediately() {
        let store = Arc::new(SampleStore::from_samples(vec![], 2, 44100));
        let (controller, mut feeder) = feeder_for(&store, true, 800, 0);
        let mut sink = TestSink::interleaved(8, 2);
        let request = ChunkRequest {
            min_frames: 4,
            max_frames: 4,
        };

        assert_eq!(feeder.feed(&mut sink, request), FeedOutcome::Finished);
        assert!(controller.is_done());
    }
}
