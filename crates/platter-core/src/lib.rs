//! Platter Core - deadline-driven PCM playback
//!
//! Decodes a WAV file fully into memory, then streams it to an output
//! device from the device's own callback: the device asks for frames,
//! the feeder copies them under the callback deadline, and a lock-free
//! shared state tells the supervising thread when playback is done.

pub mod audio;
pub mod engine;
pub mod store;
pub mod types;

pub use store::{LoadError, SampleStore};
pub use types::*;
