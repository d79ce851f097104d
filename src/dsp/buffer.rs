//! AudioBuffer: interleaved f32 PCM frames with a fixed channel count.

/// A block of audio addressed as `[frame][channel]`.
///
/// Samples are stored interleaved, so every channel always holds the same
/// number of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// A buffer of `frames` frames of silence.
    pub fn silent(frames: usize, sample_rate: u32, channels: u16) -> Self {
        assert!(channels > 0, "an audio buffer needs at least one channel");
        AudioBuffer {
            samples: vec![0.0; frames * channels as usize],
            sample_rate,
            channels,
        }
    }

    /// Wrap interleaved samples. A trailing partial frame is discarded.
    pub fn from_interleaved(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        assert!(channels > 0, "an audio buffer needs at least one channel");
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        AudioBuffer {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Copy one mono signal onto every channel.
    pub fn from_mono(mono: &[f32], sample_rate: u32, channels: u16) -> Self {
        let mut buffer = AudioBuffer::silent(mono.len(), sample_rate, channels);
        for (frame, &s) in buffer.frames_mut().zip(mono) {
            frame.fill(s);
        }
        buffer
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// All samples, interleaved.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// The samples of frame `index`, one per channel.
    pub fn frame(&self, index: usize) -> &[f32] {
        let ch = self.channels as usize;
        &self.samples[index * ch..(index + 1) * ch]
    }

    pub fn frames(&self) -> std::slice::ChunksExact<'_, f32> {
        self.samples.chunks_exact(self.channels as usize)
    }

    pub fn frames_mut(&mut self) -> std::slice::ChunksExactMut<'_, f32> {
        self.samples.chunks_exact_mut(self.channels as usize)
    }

    /// Iterate a single channel.
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = f32> + '_ {
        self.frames().map(move |frame| frame[channel])
    }

    /// Zero-pad or truncate to exactly `frames` frames.
    pub fn fit_to_frames(&mut self, frames: usize) {
        self.samples.resize(frames * self.channels as usize, 0.0);
    }

    /// Multiply every sample by `gain`.
    pub fn apply_gain(&mut self, gain: f64) {
        for s in self.samples.iter_mut() {
            *s = (*s as f64 * gain) as f32;
        }
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }

    /// Clamp every sample to [-1.0, 1.0] and return how many were out of range.
    pub fn clip(&mut self) -> usize {
        let mut clipped = 0;
        for s in self.samples.iter_mut() {
            if s.abs() > 1.0 {
                *s = s.clamp(-1.0, 1.0);
                clipped += 1;
            }
        }
        clipped
    }
}
