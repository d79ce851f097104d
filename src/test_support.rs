//! Fixtures shared by the unit tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use midly::num::{u15, u28, u4, u7};
use midly::{Format, Header, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};

use crate::dsp::buffer::AudioBuffer;
use crate::midi::MidiEvent;
use crate::registry::{SynthError, Synthesizer};

pub fn note_on(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(vel),
            },
        },
    }
}

pub fn note_off(delta: u32, key: u8) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            },
        },
    }
}

/// Serialize tracks into Standard MIDI File bytes.
pub fn smf_bytes(ticks_per_beat: u16, tracks: Vec<Track<'static>>) -> Vec<u8> {
    let format = if tracks.len() > 1 {
        Format::Parallel
    } else {
        Format::SingleTrack
    };
    let smf = Smf {
        header: Header::new(format, Timing::Metrical(u15::new(ticks_per_beat))),
        tracks,
    };
    let mut out = Vec::new();
    smf.write(&mut out).expect("failed to write test MIDI");
    out
}

/// Write a one-note stem lasting `seconds` (at 480 ticks per beat, 120 BPM).
pub fn write_stem(dir: &Path, file_name: &str, seconds: f64) -> PathBuf {
    let ticks = (seconds * 960.0).round() as u32;
    let bytes = smf_bytes(480, vec![vec![note_on(0, 60, 100), note_off(ticks, 60)]]);
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(file_name);
    fs::write(&path, bytes).unwrap();
    path
}

/// A stereo (or n-channel) sine at `freq` Hz and linear `amplitude`.
pub fn sine(freq: f64, amplitude: f64, seconds: f64, sample_rate: u32, channels: u16) -> AudioBuffer {
    let frames = (seconds * sample_rate as f64).round() as usize;
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for i in 0..frames {
        let t = i as f64 / sample_rate as f64;
        let s = (amplitude * (2.0 * std::f64::consts::PI * freq * t).sin()) as f32;
        for _ in 0..channels {
            samples.push(s);
        }
    }
    AudioBuffer::from_interleaved(samples, sample_rate, channels)
}

/// Deterministic synthesizer that counts its invocations and emits a fixed
/// sine regardless of the events.
pub struct CountingSynth {
    pub calls: AtomicUsize,
    pub frequency: f64,
}

impl CountingSynth {
    pub fn new(frequency: f64) -> Self {
        CountingSynth {
            calls: AtomicUsize::new(0),
            frequency,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Synthesizer for CountingSynth {
    fn synthesize(
        &self,
        _events: &[MidiEvent],
        duration: f64,
        sample_rate: u32,
        channels: u16,
    ) -> Result<AudioBuffer, SynthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(sine(self.frequency, 0.25, duration, sample_rate, channels))
    }
}

/// Synthesizer that always fails.
pub struct BrokenSynth;

impl Synthesizer for BrokenSynth {
    fn synthesize(
        &self,
        _events: &[MidiEvent],
        _duration: f64,
        _sample_rate: u32,
        _channels: u16,
    ) -> Result<AudioBuffer, SynthError> {
        Err(SynthError::new("plugin crashed"))
    }
}
