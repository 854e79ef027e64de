//! Audio decoder using symphonia
//!
//! Decodes a stored clip (MP3, FLAC, AAC, Vorbis, WAV) into stereo f32 PCM
//! and resamples it to the rate the output device is running at.

use crate::audio::resampler::Resampler;
use crate::audio::types::Clip;
use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Raw decode result before resampling
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved stereo samples
    pub samples: Vec<f32>,
    /// Sample rate stored in the file
    pub sample_rate: u32,
    /// Channel count stored in the file
    pub source_channels: u16,
}

/// Simple whole-file decoder using symphonia.
pub struct SimpleDecoder;

impl SimpleDecoder {
    /// Decode a clip and resample it to `target_rate`.
    ///
    /// A file that vanished since it was resolved surfaces as
    /// `SoundNotFound`, same as a failed resolve.
    pub fn decode_clip(path: &Path, identifier: &str, target_rate: u32) -> Result<Clip> {
        let decoded = Self::decode_file(path).map_err(|e| match e {
            Error::Io(io) if io.kind() == ErrorKind::NotFound => Error::SoundNotFound(identifier.to_string()),
            other => other,
        })?;

        if decoded.sample_rate != target_rate {
            debug!(
                identifier,
                stored_rate = decoded.sample_rate,
                target_rate,
                "Clip rate differs from output rate, resampling at decode time"
            );
        }

        let samples = Resampler::resample(&decoded.samples, decoded.sample_rate, target_rate, 2)?;
        Ok(Clip::new(samples, target_rate))
    }

    /// Decode entire audio file to stereo PCM samples.
    ///
    /// # Returns
    /// Interleaved stereo samples at the file's own sample rate. Mono files
    /// are duplicated to both channels; files with more than two channels
    /// keep their first two.
    ///
    /// # Errors
    /// - `Io` if the file cannot be opened
    /// - `DecodeFailed` for unsupported or corrupt audio
    pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
        debug!("Decoding entire file: {}", path.display());

        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::DecodeFailed(format!("Failed to probe format: {}", e)))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::DecodeFailed("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::DecodeFailed("Sample rate not found".to_string()))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::DecodeFailed(format!("Failed to create decoder: {}", e)))?;

        let mut samples = Vec::new();
        let mut source_channels = codec_params.channels.map(|c| c.count() as u16).unwrap_or(0);
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => {
                    warn!("Error reading packet from {}: {}", path.display(), e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // Corrupt frame: skip it, keep the rest of the clip
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error in {}: {}", path.display(), e);
                    continue;
                }
                Err(e) => return Err(Error::DecodeFailed(e.to_string())),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            source_channels = channels as u16;

            let needs_buffer = sample_buf
                .as_ref()
                .map_or(true, |buf| buf.capacity() < decoded.capacity() * channels);
            if needs_buffer {
                sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
            }
            let Some(buf) = sample_buf.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(decoded);

            Self::push_stereo(buf.samples(), channels, &mut samples);
        }

        if samples.is_empty() {
            return Err(Error::DecodeFailed(format!("No audio decoded from {}", path.display())));
        }

        debug!(
            "Decoded {} frames at {}Hz ({} source channels)",
            samples.len() / 2,
            sample_rate,
            source_channels
        );

        Ok(DecodedAudio {
            samples,
            sample_rate,
            source_channels,
        })
    }

    /// Fold interleaved `channels`-wide samples into interleaved stereo.
    fn push_stereo(interleaved: &[f32], channels: usize, output: &mut Vec<f32>) {
        match channels {
            0 => {}
            1 => {
                for &s in interleaved {
                    output.push(s);
                    output.push(s);
                }
            }
            n => {
                for frame in interleaved.chunks_exact(n) {
                    output.push(frame[0]);
                    output.push(frame[1]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_stereo_mono_duplicates() {
        let mut out = Vec::new();
        SimpleDecoder::push_stereo(&[0.1, 0.2], 1, &mut out);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_push_stereo_drops_extra_channels() {
        let mut out = Vec::new();
        SimpleDecoder::push_stereo(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 3, &mut out);
        assert_eq!(out, vec![0.1, 0.2, 0.4, 0.5]);
    }

    #[test]
    fn test_missing_file_is_sound_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = SimpleDecoder::decode_clip(&dir.path().join("gone.wav"), "gone.wav", 48000);
        assert!(matches!(result, Err(Error::SoundNotFound(ref id)) if id == "gone.wav"));
    }

    #[test]
    fn test_garbage_is_decode_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let result = SimpleDecoder::decode_clip(&path, "noise.mp3", 48000);
        assert!(matches!(result, Err(Error::DecodeFailed(_))));
    }

    #[test]
    fn test_decode_wav_resamples_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..4410 {
            let t = i as f32 / 44100.0;
            let s = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let clip = SimpleDecoder::decode_clip(&path, "tone.wav", 48000).unwrap();
        assert_eq!(clip.sample_rate, 48000);
        let frames = clip.frame_count();
        assert!((4790..=4810).contains(&frames), "got {} frames", frames);
    }
}
