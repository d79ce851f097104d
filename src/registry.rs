//! Synthesis capabilities and the registry that maps MIDI program numbers
//! to them.
//!
//! The registry is built once and handed to the orchestrator; nothing here
//! is global, so tests can register deterministic fakes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::config::ToneConfig;
use crate::dsp::buffer::AudioBuffer;
use crate::dsp::tone::ToneSynth;
use crate::midi::MidiEvent;

/// A synthesizer gave up on a stem.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SynthError {
    pub message: String,
}

impl SynthError {
    pub fn new(message: impl Into<String>) -> Self {
        SynthError {
            message: message.into(),
        }
    }
}

/// Something that renders one instrument's note events to audio.
///
/// The returned buffer should hold `duration * sample_rate` frames, give or
/// take one frame of rounding, at the requested rate and channel count.
pub trait Synthesizer: Send + Sync {
    fn synthesize(
        &self,
        events: &[MidiEvent],
        duration: f64,
        sample_rate: u32,
        channels: u16,
    ) -> Result<AudioBuffer, SynthError>;
}

/// Program number → synthesizer.
#[derive(Clone, Default)]
pub struct InstrumentRegistry {
    instruments: BTreeMap<u8, Arc<dyn Synthesizer>>,
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry of tone instruments built from configuration.
    pub fn from_tones(tones: &BTreeMap<u8, ToneConfig>) -> Self {
        let mut registry = Self::new();
        for (&program, config) in tones {
            registry.register(program, Arc::new(ToneSynth::new(config.clone())));
        }
        registry
    }

    /// Register (or replace) the synthesizer for `program`.
    pub fn register(&mut self, program: u8, synth: Arc<dyn Synthesizer>) {
        self.instruments.insert(program, synth);
    }

    pub fn get(&self, program: u8) -> Option<&Arc<dyn Synthesizer>> {
        self.instruments.get(&program)
    }

    pub fn contains(&self, program: u8) -> bool {
        self.instruments.contains_key(&program)
    }

    pub fn programs(&self) -> impl Iterator<Item = u8> + '_ {
        self.instruments.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

impl fmt::Debug for InstrumentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentRegistry")
            .field("programs", &self.programs().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CountingSynth;

    #[test]
    fn lookup_by_program() {
        let mut registry = InstrumentRegistry::new();
        registry.register(5, Arc::new(CountingSynth::new(440.0)));

        assert!(registry.contains(5));
        assert!(registry.get(6).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registered_synth_is_invoked() {
        let synth = Arc::new(CountingSynth::new(440.0));
        let mut registry = InstrumentRegistry::new();
        registry.register(0, synth.clone());

        let out = registry
            .get(0)
            .unwrap()
            .synthesize(&[], 0.5, 8000, 2)
            .unwrap();
        assert_eq!(out.frame_count(), 4000);
        assert_eq!(synth.calls(), 1);
    }

    #[test]
    fn tones_from_config() {
        let mut tones = BTreeMap::new();
        tones.insert(0, ToneConfig::default());
        tones.insert(33, ToneConfig::default());
        let registry = InstrumentRegistry::from_tones(&tones);

        assert_eq!(registry.programs().collect::<Vec<_>>(), vec![0, 33]);
        assert_eq!(format!("{registry:?}"), "InstrumentRegistry { programs: [0, 33] }");
    }
}
