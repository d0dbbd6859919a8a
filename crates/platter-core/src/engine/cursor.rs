//! Playback position tracking

/// Frame position within the sample store, advanced only by the feeder.
///
/// In loop mode the position wraps at the end of the buffer; otherwise
/// it parks at `frame_count` once the source is exhausted.
#[derive(Debug, Clone)]
pub struct PlaybackCursor {
    position_frames: u64,
    frame_count: u64,
    loop_enabled: bool,
}

impl PlaybackCursor {
    pub fn new(frame_count: u64, loop_enabled: bool) -> Self {
        Self {
            position_frames: 0,
            frame_count,
            loop_enabled,
        }
    }

    /// Current position in frames from the start of the buffer
    #[inline]
    pub fn position(&self) -> u64 {
        self.position_frames
    }

    /// Whether the cursor wraps at the end of the buffer
    #[inline]
    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    /// Frames still available to copy.
    ///
    /// Loop mode always reports one full buffer: the material is endless
    /// but a single chunk never needs more than the buffer length.
    pub fn frames_remaining(&self) -> u64 {
        if self.loop_enabled {
            self.frame_count
        } else {
            self.frame_count - self.position_frames
        }
    }

    /// Frames between the position and the physical end of the buffer
    #[inline]
    pub fn frames_to_end(&self) -> u64 {
        self.frame_count - self.position_frames
    }

    /// Advance by `n` frames after a completed copy. Returns true when
    /// loop mode wrapped past the end of the buffer.
    ///
    /// Advancing past the end in non-loop mode is a bug in the caller,
    /// not a runtime condition.
    pub fn advance(&mut self, n: u64) -> bool {
        if self.loop_enabled {
            if self.frame_count == 0 {
                return false;
            }
            let next = self.position_frames + n;
            self.position_frames = next % self.frame_count;
            next >= self.frame_count
        } else {
            assert!(
                n <= self.frames_remaining(),
                "cursor advanced past the end of the buffer"
            );
            self.position_frames += n;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_monotonic() {
        let mut cursor = PlaybackCursor::new(10, false);
        assert_eq!(cursor.frames_remaining(), 10);
        cursor.advance(4);
        assert_eq!(cursor.position(), 4);
        assert_eq!(cursor.frames_remaining(), 6);
        cursor.advance(6);
        assert_eq!(cursor.position(), 10);
        assert_eq!(cursor.frames_remaining(), 0);
    }

    #[test]
    #[should_panic(expected = "past the end")]
    fn test_advance_past_end_panics() {
        let mut cursor = PlaybackCursor::new(5, false);
        cursor.advance(6);
    }

    #[test]
    fn test_loop_wrap_keeps_remainder() {
        let mut cursor = PlaybackCursor::new(5, true);
        assert!(!cursor.advance(3));
        assert_eq!(cursor.position(), 3);
        assert!(cursor.advance(4));
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_loop_exact_end_resets_to_zero() {
        let mut cursor = PlaybackCursor::new(5, true);
        assert!(cursor.advance(5));
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.frames_remaining(), 5);
    }

    #[test]
    fn test_loop_position_stays_in_range() {
        let mut cursor = PlaybackCursor::new(7, true);
        for n in [3, 5, 9, 2, 7, 1] {
            cursor.advance(n);
            assert!(cursor.position() < 7);
        }
    }

    #[test]
    fn test_frames_to_end_differs_from_remaining_in_loop_mode() {
        let mut cursor = PlaybackCursor::new(8, true);
        cursor.advance(6);
        assert_eq!(cursor.frames_to_end(), 2);
        assert_eq!(cursor.frames_remaining(), 8);
    }
}
