//! WAV I/O: 32-bit float intermediates and the 16-bit PCM master.

use std::io::{Cursor, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use super::buffer::AudioBuffer;

fn float_spec(buffer: &AudioBuffer) -> WavSpec {
    WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    }
}

fn pcm16_spec(buffer: &AudioBuffer) -> WavSpec {
    WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Quantize one sample to 16-bit PCM, saturating at the integer range.
pub fn to_i16(sample: f32) -> i16 {
    (sample as f64 * 32767.0).round().clamp(-32768.0, 32767.0) as i16
}

/// Write a lossless 32-bit float file. Used for per-stem intermediates.
pub fn write_float(path: &Path, buffer: &AudioBuffer) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, float_spec(buffer))?;
    for &s in buffer.samples() {
        writer.write_sample(s)?;
    }
    writer.finalize()
}

/// Write interleaved 16-bit PCM to any seekable sink.
pub fn write_pcm16<W: Write + Seek>(sink: W, buffer: &AudioBuffer) -> Result<(), hound::Error> {
    let mut writer = WavWriter::new(sink, pcm16_spec(buffer))?;
    for &s in buffer.samples() {
        writer.write_sample(to_i16(s))?;
    }
    writer.finalize()
}

/// Encode a buffer as a 16-bit PCM WAV byte array.
pub fn encode_pcm16(buffer: &AudioBuffer) -> Result<Vec<u8>, hound::Error> {
    let mut cursor = Cursor::new(Vec::new());
    write_pcm16(&mut cursor, buffer)?;
    Ok(cursor.into_inner())
}

/// Read a WAV file of any integer or float format into an `AudioBuffer`.
pub fn read(path: &Path) -> Result<AudioBuffer, hound::Error> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };
    Ok(AudioBuffer::from_interleaved(
        samples,
        spec.sample_rate,
        spec.channels,
    ))
}
