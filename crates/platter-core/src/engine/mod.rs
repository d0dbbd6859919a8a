//! Playback engine - cursor, feeder, shared state
//!
//! This module is the device-independent half of playback:
//! - PlaybackCursor: position tracking with optional looping
//! - StreamFeeder: copies source frames into device write regions
//! - PlaybackShared / PlaybackController: lock-free state for the supervisor
//!
//! It knows how to walk a sample store under a deadline but nothing
//! about cpal; the audio module owns the device half.

mod cursor;
mod feeder;
mod state;

pub use cursor::*;
pub use feeder::*;
pub use state::*;
