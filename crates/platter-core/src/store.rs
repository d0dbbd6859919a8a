//! In-memory PCM sample storage
//!
//! Files are fully decoded before the stream starts: the store holds the
//! whole data chunk as one interleaved 16-bit buffer, so the real-time
//! path never touches the disk or the decoder.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::{Sample, BYTES_PER_SAMPLE};

/// Errors that can occur while loading a file into a [`SampleStore`]
#[derive(Error, Debug)]
pub enum LoadError {
    /// File could not be opened or its header parsed
    #[error("Failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    /// The file is not 16-bit integer PCM
    #[error("{path:?} is not 16-bit PCM (got {bits}-bit {format})")]
    UnsupportedFormat {
        path: PathBuf,
        bits: u16,
        format: &'static str,
    },

    /// A sample could not be decoded mid-stream
    #[error("Failed to read sample data from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    /// The data chunk holds fewer samples than the header declares
    #[error("{path:?} is truncated: expected {expected} samples, got {actual}")]
    Truncated {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
}

/// Immutable interleaved PCM audio plus the metadata needed to play it.
///
/// One frame is `channel_count` consecutive samples; the buffer length is
/// always exactly `frame_count * channel_count`.
#[derive(Debug, Clone)]
pub struct SampleStore {
    samples: Vec<Sample>,
    frame_count: u64,
    channel_count: u32,
    sample_rate: u32,
}

impl SampleStore {
    /// Load a WAV file, decoding the whole data chunk into memory.
    ///
    /// Only 16-bit integer PCM is accepted. A data chunk shorter than
    /// the header declares is reported as [`LoadError::Truncated`];
    /// trailing bytes that do not make up a whole frame are dropped.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let reader = hound::WavReader::open(path).map_err(|e| LoadError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;

        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            let format = match spec.sample_format {
                hound::SampleFormat::Int => "integer",
                hound::SampleFormat::Float => "float",
            };
            return Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
                bits: spec.bits_per_sample,
                format,
            });
        }

        let frame_count = reader.duration() as u64;
        let channel_count = spec.channels as u32;
        let sample_rate = spec.sample_rate;
        let expected = frame_count * channel_count as u64;

        let mut samples: Vec<Sample> = Vec::with_capacity(expected as usize);
        for sample in reader.into_samples::<i16>().take(expected as usize) {
            samples.push(sample.map_err(|e| LoadError::Read {
                path: path.to_path_buf(),
                source: e,
            })?);
        }

        if (samples.len() as u64) < expected {
            return Err(LoadError::Truncated {
                path: path.to_path_buf(),
                expected,
                actual: samples.len() as u64,
            });
        }

        Ok(Self {
            samples,
            frame_count,
            channel_count,
            sample_rate,
        })
    }

    /// Build a store from an already-decoded interleaved buffer.
    ///
    /// Panics if the buffer length is not a whole number of frames.
    pub fn from_samples(samples: Vec<Sample>, channel_count: u32, sample_rate: u32) -> Self {
        assert!(channel_count > 0, "channel_count must be at least 1");
        assert!(
            samples.len() % channel_count as usize == 0,
            "interleaved buffer must be a whole number of frames"
        );
        let frame_count = (samples.len() / channel_count as usize) as u64;
        Self {
            samples,
            frame_count,
            channel_count,
            sample_rate,
        }
    }

    /// One frame: `channel_count` consecutive samples.
    ///
    /// Panics if `frame >= frame_count()`.
    #[inline]
    pub fn frame_at(&self, frame: u64) -> &[Sample] {
        let start = frame as usize * self.channel_count as usize;
        &self.samples[start..start + self.channel_count as usize]
    }

    /// Total number of frames
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Interleaved channels per frame
    #[inline]
    pub fn channel_count(&self) -> u32 {
        self.channel_count
    }

    /// Sample rate in Hz
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playing time of the whole store in seconds
    pub fn duration_seconds(&self) -> f64 {
        crate::types::frames_to_secs(self.frame_count, self.sample_rate)
    }

    /// Size of the sample buffer in bytes
    pub fn byte_len(&self) -> usize {
        self.samples.len() * BYTES_PER_SAMPLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_wav(path: &Path, samples: &[i16], channels: u16, sample_rate: u32) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..10).map(|i| i * 100).collect();
        write_test_wav(&path, &samples, 2, 44100);

        let store = SampleStore::load(&path).unwrap();
        assert_eq!(store.frame_count(), 5);
        assert_eq!(store.channel_count(), 2);
        assert_eq!(store.sample_rate(), 44100);
        assert_eq!(store.byte_len(), 10 * BYTES_PER_SAMPLE);
        assert_eq!(store.frame_at(0), &[0, 100]);
        assert_eq!(store.frame_at(4), &[800, 900]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = SampleStore::load(Path::new("/nonexistent/missing.wav")).unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }

    #[test]
    fn test_load_rejects_float_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0.5f32).unwrap();
        writer.finalize().unwrap();

        let err = SampleStore::load(&path).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat { bits: 32, .. }));
    }

    #[test]
    fn test_load_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.wav");
        let samples: Vec<i16> = vec![1; 200];
        write_test_wav(&path, &samples, 2, 44100);

        // Chop half the data chunk off without touching the header
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 200]).unwrap();

        assert!(SampleStore::load(&path).is_err());
    }

    #[test]
    fn test_from_samples() {
        let store = SampleStore::from_samples(vec![1, 2, 3, 4, 5, 6], 3, 48000);
        assert_eq!(store.frame_count(), 2);
        assert_eq!(store.frame_at(1), &[4, 5, 6]);
    }

    #[test]
    #[should_panic(expected = "whole number of frames")]
    fn test_from_samples_rejects_ragged_buffer() {
        SampleStore::from_samples(vec![1, 2, 3], 2, 44100);
    }

    #[test]
    fn test_mono_duration() {
        let store = SampleStore::from_samples(vec![0; 44100], 1, 44100);
        assert_eq!(store.duration_seconds(), 1.0);
    }
}
