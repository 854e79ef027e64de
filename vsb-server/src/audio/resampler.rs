//! Audio resampling using rubato
//!
//! Converts decoded clips to the active output device's sample rate.
//! Used at decode time (stale uploads still play correctly after a device
//! switch) and when in-flight voices are carried across a switch.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Audio resampler using rubato for sample rate conversion.
pub struct Resampler;

impl Resampler {
    /// Resample interleaved audio from `input_rate` to `output_rate`.
    ///
    /// Returns a copy without resampling when the rates already match.
    pub fn resample(input: &[f32], input_rate: u32, output_rate: u32, channels: u16) -> Result<Vec<f32>> {
        if input_rate == output_rate {
            debug!("Sample rate already at {}Hz, skipping resample", output_rate);
            return Ok(input.to_vec());
        }

        if input_rate == 0 || output_rate == 0 || channels == 0 {
            return Err(Error::DecodeFailed(format!(
                "Cannot resample {}Hz -> {}Hz with {} channels",
                input_rate, output_rate, channels
            )));
        }

        let planar_input = Self::deinterleave(input, channels);
        let input_frames = planar_input[0].len();
        if input_frames == 0 {
            return Ok(Vec::new());
        }

        debug!(
            "Resampling {} frames from {}Hz to {}Hz ({} channels)",
            input_frames, input_rate, output_rate, channels
        );

        // Whole clip in one chunk
        let mut resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            input_frames,
            channels as usize,
        )
        .map_err(|e| Error::DecodeFailed(format!("Failed to create resampler: {}", e)))?;

        let planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| Error::DecodeFailed(format!("Resampling failed: {}", e)))?;

        Ok(Self::interleave(planar_output))
    }

    /// Convert interleaved samples to planar format.
    ///
    /// Input:  [L, R, L, R, L, R, ...]
    /// Output: [[L, L, L, ...], [R, R, R, ...]]
    fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
        let num_channels = channels as usize;
        let num_frames = samples.len() / num_channels;

        let mut planar = vec![Vec::with_capacity(num_frames); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (ch, sample) in frame.iter().enumerate() {
                planar[ch].push(*sample);
            }
        }
        planar
    }

    /// Convert planar samples to interleaved format.
    fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
        let Some(first) = planar.first() else {
            return Vec::new();
        };

        let num_frames = first.len();
        let mut interleaved = Vec::with_capacity(num_frames * planar.len());
        for frame_idx in 0..num_frames {
            for channel in &planar {
                interleaved.push(channel[frame_idx]);
            }
        }
        interleaved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave() {
        let interleaved = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let planar = Resampler::deinterleave(&interleaved, 2);

        assert_eq!(planar.len(), 2);
        assert_eq!(planar[0], vec![1.0, 3.0, 5.0]);
        assert_eq!(planar[1], vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_interleave() {
        let planar = vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]];
        assert_eq!(Resampler::interleave(planar), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_resample_same_rate() {
        let input = vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let output = Resampler::resample(&input, 48000, 48000, 2).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_resample_empty() {
        let output = Resampler::resample(&[], 44100, 48000, 2).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_resample_changes_length() {
        let input_rate = 48000;
        let frames = 4800;
        let mut input = Vec::with_capacity(frames * 2);
        for i in 0..frames {
            let t = i as f32 / input_rate as f32;
            let sample = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
            input.push(sample);
            input.push(sample);
        }

        let output = Resampler::resample(&input, input_rate, 44100, 2).unwrap();

        let expected = (frames as f64 * 44100.0 / input_rate as f64) as usize;
        let got = output.len() / 2;
        assert!(
            got + 10 >= expected && got <= expected + 10,
            "Expected ~{} frames, got {}",
            expected,
            got
        );
    }

    #[test]
    fn test_resample_rejects_zero_rate() {
        assert!(Resampler::resample(&[0.0, 0.0], 0, 48000, 2).is_err());
    }
}
