//! Core audio data types
//!
//! Structures passed between the decoder, the mixer and the output device.

use std::time::Duration;

/// Decoded, in-memory clip ready for mixing.
///
/// **Format:**
/// - Samples are f32 (floating point -1.0 to 1.0)
/// - Stereo interleaved: [L, R, L, R, ...]
/// - Sample rate equals the output device rate it was decoded for
#[derive(Debug, Clone)]
pub struct Clip {
    /// PCM audio samples (interleaved stereo)
    pub samples: Vec<f32>,

    /// Sample rate the samples are at
    pub sample_rate: u32,
}

impl Clip {
    /// Create a clip from interleaved stereo samples
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        debug_assert_eq!(samples.len() % 2, 0, "Samples must be stereo pairs");
        Self { samples, sample_rate }
    }

    /// Number of stereo frames
    pub fn frame_count(&self) -> usize {
        self.samples.len() / 2
    }

    /// Playback duration at the clip's sample rate
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }

    /// Audio frame at a specific frame index
    pub fn frame(&self, frame_index: usize) -> Option<AudioFrame> {
        let i = frame_index * 2;
        if i + 1 < self.samples.len() {
            Some(AudioFrame::from_stereo(self.samples[i], self.samples[i + 1]))
        } else {
            None
        }
    }
}

/// AudioFrame represents a single stereo sample (one frame of audio).
///
/// Used for passing audio data between mixer and output device.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioFrame {
    /// Left channel sample
    pub left: f32,

    /// Right channel sample
    pub right: f32,
}

impl AudioFrame {
    /// Create a silent frame (0.0, 0.0)
    pub fn zero() -> Self {
        AudioFrame { left: 0.0, right: 0.0 }
    }

    /// Create a frame from left/right samples
    pub fn from_stereo(left: f32, right: f32) -> Self {
        AudioFrame { left, right }
    }

    /// Add another frame (additive mixing)
    pub fn add(&mut self, other: AudioFrame) {
        self.left += other.left;
        self.right += other.right;
    }

    /// Clamp both channels to [-1.0, 1.0]
    pub fn clamped(self) -> Self {
        AudioFrame {
            left: self.left.clamp(-1.0, 1.0),
            right: self.right.clamp(-1.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_duration() {
        let clip = Clip::new(vec![0.0; 48000 * 2], 48000);
        assert_eq!(clip.frame_count(), 48000);
        assert_eq!(clip.duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_clip_frame_bounds() {
        let clip = Clip::new(vec![0.1, 0.2, 0.3, 0.4], 44100);
        assert_eq!(clip.frame(1), Some(AudioFrame::from_stereo(0.3, 0.4)));
        assert_eq!(clip.frame(2), None);
    }

    #[test]
    fn test_frame_add_and_clamp() {
        let mut frame = AudioFrame::from_stereo(0.75, -0.75);
        frame.add(AudioFrame::from_stereo(0.5, -0.5));
        assert_eq!(frame, AudioFrame::from_stereo(1.25, -1.25));
        assert_eq!(frame.clamped(), AudioFrame::from_stereo(1.0, -1.0));
    }
}
