//! Cross-platform audio output
//!
//! Device discovery, stream configuration, and the cpal-backed output
//! stream that hosts the feeder.
//!
//! The design is lock-free for real-time safety:
//!
//! - **Audio thread**: owns the StreamFeeder exclusively, invoked by cpal
//! - **Supervisor thread**: reads playback state via atomics, drains the
//!   event ring, and tears the stream down once playback is done
//!
//! ```ignore
//! use platter_core::audio::{start_playback, AudioConfig};
//! use platter_core::engine::PlaybackOptions;
//!
//! let playback = start_playback(store, &AudioConfig::default(), &PlaybackOptions::default())?;
//! while !playback.controller.is_done() {
//!     std::thread::sleep(std::time::Duration::from_millis(100));
//! }
//! playback.stop()?;
//! ```

mod config;
mod cpal_backend;
mod device;
mod error;

pub use config::{AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE};

pub use cpal_backend::{start_playback, Playback};

// Re-export device types for listing and selection
pub use device::{find_device_by_id, get_cpal_default_device, get_output_devices, AudioDevice};

pub use error::{AudioError, AudioResult};
