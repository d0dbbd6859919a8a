//! Shared sample types and frame arithmetic

/// One PCM sample as stored in memory and handed to the device: signed
/// 16-bit integer, interleaved by channel.
pub type Sample = i16;

/// Size of one sample in bytes
pub const BYTES_PER_SAMPLE: usize = std::mem::size_of::<Sample>();

/// Convert a frame count to seconds at the given sample rate
pub fn frames_to_secs(frames: u64, sample_rate: u32) -> f64 {
    frames as f64 / sample_rate as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_to_secs() {
        assert_eq!(frames_to_secs(44100, 44100), 1.0);
        assert_eq!(frames_to_secs(22050, 44100), 0.5);
        assert_eq!(frames_to_secs(0, 48000), 0.0);
    }
}
