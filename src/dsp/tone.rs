//! Tone instrument: polyphonic oscillator voices shaped by a linear ADSR.
//!
//! This is the one synthesis capability shipped in-crate. A note-on opens
//! a voice keyed by (channel, key); a note-off, or a note-on with velocity
//! zero, releases every sounding voice with that key. The mono result is
//! copied to every output channel.

use std::f64::consts::TAU;

use crate::config::{EnvelopeConfig, ToneConfig, Waveform};
use crate::midi::MidiEvent;
use crate::registry::{SynthError, Synthesizer};

use super::buffer::AudioBuffer;

/// Equal-tempered frequency of a MIDI key, A4 (69) = 440 Hz.
pub fn key_to_frequency(key: u8) -> f64 {
    440.0 * 2.0_f64.powf((key as f64 - 69.0) / 12.0)
}

/// PolyBLEP correction at a waveform discontinuity.
///
/// `t` is the phase in [0, 1), `dt` the phase increment per sample.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

fn oscillate(waveform: Waveform, phase: f64, inc: f64) -> f64 {
    match waveform {
        Waveform::Sine => (TAU * phase).sin(),
        Waveform::Sawtooth => 2.0 * phase - 1.0 - poly_blep(phase, inc),
        Waveform::Square => {
            let naive = if phase < 0.5 { 1.0 } else { -1.0 };
            naive + poly_blep(phase, inc) - poly_blep((phase + 0.5) % 1.0, inc)
        }
        Waveform::Triangle => {
            if phase < 0.5 {
                4.0 * phase - 1.0
            } else {
                3.0 - 4.0 * phase
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Attack,
    Decay,
    Sustain,
    Release,
    Done,
}

/// Linear ADSR measured in samples.
#[derive(Debug, Clone)]
struct Envelope {
    attack: usize,
    decay: usize,
    sustain: f64,
    release: usize,
    stage: Stage,
    pos: usize,
    level: f64,
    release_from: f64,
}

impl Envelope {
    fn new(config: &EnvelopeConfig, sample_rate: f64) -> Self {
        let samples = |seconds: f64| (seconds.max(0.0) * sample_rate) as usize;
        Envelope {
            attack: samples(config.attack),
            decay: samples(config.decay),
            sustain: config.sustain.clamp(0.0, 1.0),
            release: samples(config.release),
            stage: Stage::Attack,
            pos: 0,
            level: 0.0,
            release_from: 0.0,
        }
    }

    fn next(&mut self) -> f64 {
        loop {
            let (len, from, to) = match self.stage {
                Stage::Attack => (self.attack, 0.0, 1.0),
                Stage::Decay => (self.decay, 1.0, self.sustain),
                Stage::Release => (self.release, self.release_from, 0.0),
                Stage::Sustain => {
                    self.level = self.sustain;
                    return self.level;
                }
                Stage::Done => return 0.0,
            };
            if self.pos < len {
                self.level = from + (to - from) * self.pos as f64 / len as f64;
                self.pos += 1;
                return self.level;
            }
            self.pos = 0;
            self.stage = match self.stage {
                Stage::Attack => Stage::Decay,
                Stage::Decay => Stage::Sustain,
                _ => Stage::Done,
            };
        }
    }

    fn release(&mut self) {
        if matches!(self.stage, Stage::Release | Stage::Done) {
            return;
        }
        self.release_from = self.level;
        self.stage = Stage::Release;
        self.pos = 0;
    }

    fn is_finished(&self) -> bool {
        self.stage == Stage::Done
    }
}

#[derive(Debug, Clone)]
struct Voice {
    channel: u8,
    key: u8,
    phase: f64,
    inc: f64,
    amplitude: f64,
    envelope: Envelope,
}

impl Voice {
    fn next_sample(&mut self, waveform: Waveform) -> f64 {
        let s = oscillate(waveform, self.phase, self.inc);
        self.phase += self.inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        s * self.envelope.next() * self.amplitude
    }
}

/// A configurable oscillator instrument.
#[derive(Debug, Clone)]
pub struct ToneSynth {
    config: ToneConfig,
}

impl ToneSynth {
    pub fn new(config: ToneConfig) -> Self {
        ToneSynth { config }
    }

    /// Render `frames` mono samples from time-ordered note events.
    pub fn render_mono(&self, events: &[MidiEvent], frames: usize, sample_rate: u32) -> Vec<f32> {
        let sr = sample_rate as f64;
        let mut out = Vec::with_capacity(frames);
        let mut voices: Vec<Voice> = Vec::new();
        let mut pending = events.iter().peekable();

        for i in 0..frames {
            while let Some(event) = pending.next_if(|e| (e.time * sr).round() as usize <= i) {
                if event.is_note_on() {
                    voices.push(Voice {
                        channel: event.channel(),
                        key: event.key(),
                        phase: 0.0,
                        inc: key_to_frequency(event.key()) / sr,
                        amplitude: event.velocity() as f64 / 127.0 * self.config.gain,
                        envelope: Envelope::new(&self.config.envelope, sr),
                    });
                } else if event.is_note_off() {
                    voices
                        .iter_mut()
                        .filter(|v| v.channel == event.channel() && v.key == event.key())
                        .for_each(|v| v.envelope.release());
                }
            }

            let mut sum = 0.0;
            for voice in voices.iter_mut() {
                sum += voice.next_sample(self.config.waveform);
            }
            out.push(sum as f32);

            voices.retain(|v| !v.envelope.is_finished());
        }
        out
    }
}

impl Synthesizer for ToneSynth {
    fn synthesize(
        &self,
        events: &[MidiEvent],
        duration: f64,
        sample_rate: u32,
        channels: u16,
    ) -> Result<AudioBuffer, SynthError> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(SynthError::new(format!("invalid duration {duration}")));
        }
        let frames = (duration * sample_rate as f64).round() as usize;
        let mono = self.render_mono(events, frames, sample_rate);
        Ok(AudioBuffer::from_mono(&mono, sample_rate, channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on(time: f64, key: u8, vel: u8) -> MidiEvent {
        MidiEvent {
            bytes: [0x90, key, vel],
            time,
        }
    }

    fn off(time: f64, key: u8) -> MidiEvent {
        MidiEvent {
            bytes: [0x80, key, 0],
            time,
        }
    }

    fn short_tone() -> ToneSynth {
        ToneSynth::new(ToneConfig {
            waveform: Waveform::Sine,
            envelope: EnvelopeConfig {
                attack: 0.001,
                decay: 0.001,
                sustain: 0.5,
                release: 0.05,
            },
            gain: 1.0,
        })
    }

    #[test]
    fn a4_is_440() {
        assert!((key_to_frequency(69) - 440.0).abs() < 1e-10);
        assert!((key_to_frequency(60) - 261.6256).abs() < 1e-3);
    }

    #[test]
    fn frame_count_matches_duration() {
        let out = short_tone().synthesize(&[], 1.5, 8000, 2).unwrap();
        assert_eq!(out.frame_count(), 12_000);
        assert_eq!(out.channels(), 2);
        assert!(out.samples().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn note_sounds_from_its_start_time() {
        let sr = 8000;
        let mono = short_tone().render_mono(&[on(0.5, 69, 127), off(0.8, 69)], sr as usize, sr);

        assert!(mono[..4000].iter().all(|&s| s == 0.0), "nothing before the note-on");
        assert!(
            mono[4000..6400].iter().any(|s| s.abs() > 0.1),
            "the note should be audible while held"
        );
    }

    #[test]
    fn voice_silent_after_release() {
        let sr = 8000;
        let mono = short_tone().render_mono(&[on(0.0, 60, 100), off(0.1, 60)], sr as usize, sr);

        // 0.1 s held + 0.05 s release; give it a little slack
        assert!(mono[1300..].iter().all(|&s| s == 0.0), "voice should have finished");
    }

    #[test]
    fn velocity_zero_note_on_releases() {
        let sr = 8000;
        let mono = short_tone().render_mono(&[on(0.0, 60, 100), on(0.1, 60, 0)], sr as usize, sr);
        assert!(mono[1300..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn output_bounded_by_gain() {
        let sr = 44100;
        let synth = ToneSynth::new(ToneConfig {
            waveform: Waveform::Square,
            gain: 0.5,
            ..ToneConfig::default()
        });
        let mono = synth.render_mono(&[on(0.0, 81, 127)], sr as usize, sr);
        for &s in &mono {
            assert!(s.abs() <= 0.76, "square voice out of range: {s}");
        }
    }

    #[test]
    fn rendering_is_deterministic() {
        let events = [on(0.0, 60, 90), on(0.25, 64, 90), off(0.5, 60), off(0.75, 64)];
        let a = short_tone().synthesize(&events, 1.0, 22050, 2).unwrap();
        let b = short_tone().synthesize(&events, 1.0, 22050, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn channels_carry_the_same_signal() {
        let out = short_tone().synthesize(&[on(0.0, 72, 100)], 0.2, 8000, 2).unwrap();
        for frame in out.frames() {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn negative_duration_is_rejected() {
        assert!(short_tone().synthesize(&[], -1.0, 8000, 2).is_err());
    }

    #[test]
    fn envelope_stays_in_range() {
        let mut env = Envelope::new(&EnvelopeConfig::default(), 44100.0);
        for _ in 0..10_000 {
            let s = env.next();
            assert!((0.0..=1.0).contains(&s), "envelope out of range: {s}");
        }
        env.release();
        for _ in 0..20_000 {
            env.next();
        }
        assert!(env.is_finished());
    }
}
