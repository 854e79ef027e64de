//! Native stand-in for ffmpeg
//!
//! Decodes the input with the service's own decoder, resamples it and
//! writes a 16-bit stereo WAV at the requested rate.

use hound::{WavSpec, WavWriter};
use std::path::Path;
use vsb_server::audio::decoder::SimpleDecoder;
use vsb_server::audio::resampler::Resampler;
use vsb_server::ingest::Transcoder;
use vsb_server::{Error, Result};

pub struct WavTranscoder;

impl Transcoder for WavTranscoder {
    fn normalize(&self, input: &Path, output: &Path, sample_rate: u32) -> Result<()> {
        let decoded = SimpleDecoder::decode_file(input).map_err(|e| Error::TranscodeFailed(e.to_string()))?;
        let samples = Resampler::resample(&decoded.samples, decoded.sample_rate, sample_rate, 2)?;

        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = WavWriter::create(output, spec).map_err(|e| Error::TranscodeFailed(e.to_string()))?;
        for s in samples {
            let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(v).map_err(|e| Error::TranscodeFailed(e.to_string()))?;
        }
        writer.finalize().map_err(|e| Error::TranscodeFailed(e.to_string()))
    }
}
