//! Mixer: sums variable-length buffers into one, zero-padding the short ones.

use crate::error::MixError;

use super::buffer::AudioBuffer;

/// A summing mixer that accumulates whole buffers in f64.
///
/// The output is as long as the longest input; shorter inputs contribute
/// silence past their end. Nothing is clipped here, so the sum may exceed
/// full scale until the master is normalized and quantized.
#[derive(Debug, Clone)]
pub struct Mixer {
    sample_rate: u32,
    channels: u16,
    buffer: Vec<f64>,
    inputs: usize,
}

impl Mixer {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Mixer {
            sample_rate,
            channels,
            buffer: Vec::new(),
            inputs: 0,
        }
    }

    /// Add one buffer, growing the mix if the input is longer.
    pub fn add(&mut self, input: &AudioBuffer) -> Result<(), MixError> {
        if input.sample_rate() != self.sample_rate {
            return Err(MixError::SampleRateMismatch {
                expected: self.sample_rate,
                found: input.sample_rate(),
            });
        }
        if input.channels() != self.channels {
            return Err(MixError::ChannelMismatch {
                expected: self.channels,
                found: input.channels(),
            });
        }

        let samples = input.samples();
        if samples.len() > self.buffer.len() {
            self.buffer.resize(samples.len(), 0.0);
        }
        for (acc, &s) in self.buffer.iter_mut().zip(samples) {
            *acc += s as f64;
        }
        self.inputs += 1;
        Ok(())
    }

    /// Number of buffers added so far.
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn frame_count(&self) -> usize {
        self.buffer.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.inputs == 0
    }

    /// The mixed signal.
    pub fn output(&self) -> AudioBuffer {
        let samples = self.buffer.iter().map(|&s| s as f32).collect();
        AudioBuffer::from_interleaved(samples, self.sample_rate, self.channels)
    }
}

/// Sum `buffers` in the given order. All inputs must share sample rate and
/// channel count.
pub fn mix(buffers: &[AudioBuffer]) -> Result<AudioBuffer, MixError> {
    let first = buffers.first().ok_or(MixError::NoInputs)?;
    let mut mixer = Mixer::new(first.sample_rate(), first.channels());
    for buffer in buffers {
        mixer.add(buffer)?;
    }
    Ok(mixer.output())
}
