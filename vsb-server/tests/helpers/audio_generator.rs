//! Audio test file generation
//!
//! Deterministic sine-wave WAV files with a known rate and length.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::io::Cursor;
use std::path::Path;

fn spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn write_sine<W: std::io::Write + std::io::Seek>(
    writer: &mut WavWriter<W>,
    sample_rate: u32,
    duration_ms: u64,
    frequency_hz: f32,
) -> Result<(), hound::Error> {
    let total_frames = (sample_rate as u64 * duration_ms) / 1000;
    for i in 0..total_frames {
        let t = i as f32 / sample_rate as f32;
        let s = ((2.0 * PI * frequency_hz * t).sin() * 0.5 * i16::MAX as f32) as i16;
        writer.write_sample(s)?;
        writer.write_sample(s)?;
    }
    Ok(())
}

/// Stereo 16-bit sine WAV as an in-memory upload body
pub fn sine_wav_bytes(sample_rate: u32, duration_ms: u64, frequency_hz: f32) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec(sample_rate)).unwrap();
        write_sine(&mut writer, sample_rate, duration_ms, frequency_hz).unwrap();
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Stereo 16-bit sine WAV written to `path`
pub fn write_sine_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    duration_ms: u64,
    frequency_hz: f32,
) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, spec(sample_rate))?;
    write_sine(&mut writer, sample_rate, duration_ms, frequency_hz)?;
    writer.finalize()
}
