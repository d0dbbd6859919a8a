//! Shared playback state between the audio callback and the supervisor
//!
//! The callback side owns the cursor; everything the supervising thread
//! needs to see crosses over here, through atomics and one lock-free
//! event ring. Nothing in this module blocks or allocates after
//! construction.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Capacity of the feeder-to-supervisor event ring
const EVENT_RING_CAPACITY: usize = 64;

/// Lifecycle of one playback run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Samples are being decoded; the stream is not running yet
    Loading,
    /// The feeder is copying source frames to the device
    Streaming,
    /// All source frames handed off; device latency not yet played out
    Draining,
    /// The device starved while source frames remained
    Underrun,
    /// Playback finished; the feeder ignores further invocations
    Stopped,
}

impl PlaybackState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PlaybackState::Loading,
            1 => PlaybackState::Streaming,
            2 => PlaybackState::Draining,
            3 => PlaybackState::Underrun,
            _ => PlaybackState::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            PlaybackState::Loading => 0,
            PlaybackState::Streaming => 1,
            PlaybackState::Draining => 2,
            PlaybackState::Underrun => 3,
            PlaybackState::Stopped => 4,
        }
    }
}

/// Events the feeder reports from callback context.
///
/// Pushed onto a lock-free ring; dropped silently if the supervisor
/// falls behind. Losing an observation must never stall the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Loop mode wrapped back to the start of the buffer
    Looped { cycle: u64 },
    /// The device starved while frames were still available
    Underrun { frames_remaining: u64 },
    /// The drain completed and the state reached Stopped
    Finished,
}

/// How a device fault was classified by [`PlaybackShared::report_underflow`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnderflowKind {
    /// End of stream: nothing left to play, completion finalized
    Expected,
    /// The callback missed its deadline with frames still pending
    Unexpected,
}

/// Atomic state shared between the callback and supervising threads
pub struct PlaybackShared {
    /// Encoded [`PlaybackState`]. Release on store, Acquire on load: the
    /// Stopped transition gates stream shutdown on the other side.
    state: AtomicU8,
    /// Cursor mirror for status reporting
    position: AtomicU64,
    /// Device-reported underflows while frames remained
    underruns: AtomicU64,
    frame_count: u64,
    loop_enabled: bool,
}

impl PlaybackShared {
    fn new(frame_count: u64, loop_enabled: bool) -> Self {
        Self {
            state: AtomicU8::new(PlaybackState::Loading.as_u8()),
            position: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            frame_count,
            loop_enabled,
        }
    }

    /// Current lifecycle state (lock-free)
    #[inline]
    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set_state(&self, state: PlaybackState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Current playback position in frames (lock-free)
    #[inline]
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn store_position(&self, frames: u64) {
        self.position.store(frames, Ordering::Relaxed);
    }

    /// Underflows recorded while frames remained (lock-free)
    #[inline]
    pub fn underrun_count(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Whether this run wraps at the end of the source
    #[inline]
    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    /// Classify and record a device-reported fault.
    ///
    /// Starving with nothing left to play is the normal end-of-stream
    /// signal and finalizes completion. Starving mid-stream is recorded
    /// and survived; the feeder folds it into the event ring on its next
    /// run. Safe to call from any thread.
    pub fn report_underflow(&self) -> UnderflowKind {
        let state = self.state();
        let exhausted = !self.loop_enabled && self.position() >= self.frame_count;
        if exhausted || state == PlaybackState::Draining || state == PlaybackState::Stopped {
            self.set_state(PlaybackState::Stopped);
            UnderflowKind::Expected
        } else {
            self.underruns.fetch_add(1, Ordering::Relaxed);
            self.set_state(PlaybackState::Underrun);
            UnderflowKind::Unexpected
        }
    }
}

/// Supervisor-side handle over a playback run.
///
/// Owns the consumer half of the event ring; polled from the control
/// loop, never from callback context.
pub struct PlaybackController {
    shared: Arc<PlaybackShared>,
    events: rtrb::Consumer<PlaybackEvent>,
}

impl PlaybackController {
    /// True once playback has fully finished
    pub fn is_done(&self) -> bool {
        self.shared.state() == PlaybackState::Stopped
    }

    /// Current lifecycle state
    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    /// Playback position in frames
    pub fn position_frames(&self) -> u64 {
        self.shared.position()
    }

    /// Underflows recorded while frames remained
    pub fn underrun_count(&self) -> u64 {
        self.shared.underrun_count()
    }

    /// Shared state handle, for wiring device fault callbacks
    pub fn shared(&self) -> Arc<PlaybackShared> {
        Arc::clone(&self.shared)
    }

    /// Drain one pending event, if any
    pub fn poll_event(&mut self) -> Option<PlaybackEvent> {
        self.events.pop().ok()
    }
}

/// Feeder-side half: the shared atomics plus the event producer.
/// Moved into the stream callback together with the feeder.
pub struct PlaybackLink {
    shared: Arc<PlaybackShared>,
    events: rtrb::Producer<PlaybackEvent>,
}

impl PlaybackLink {
    /// Push an event; a full ring drops it rather than block the callback
    pub(crate) fn push_event(&mut self, event: PlaybackEvent) {
        let _ = self.events.push(event);
    }

    pub(crate) fn shared(&self) -> &PlaybackShared {
        &self.shared
    }
}

/// Create the supervisor/feeder pair for one playback run
pub fn playback_channel(
    frame_count: u64,
    loop_enabled: bool,
) -> (PlaybackController, PlaybackLink) {
    let shared = Arc::new(PlaybackShared::new(frame_count, loop_enabled));
    let (producer, consumer) = rtrb::RingBuffer::new(EVENT_RING_CAPACITY);
    (
        PlaybackController {
            shared: Arc::clone(&shared),
            events: consumer,
        },
        PlaybackLink {
            shared,
            events: producer,
        },
    )
}
