//! Offline stem rendering for MIDI song collections.
//!
//! Every song directory holds one MIDI file per instrument. Each stem is
//! decoded to timed events, synthesized by the instrument registered for
//! its program number, normalized to a common loudness, then mixed into a
//! master that is normalized again and written as a 16-bit WAV.

pub mod config;
pub mod dsp;
pub mod error;
pub mod midi;
pub mod orchestrator;
pub mod registry;
pub mod song;

#[cfg(test)]
mod test_support;

pub use config::RenderConfig;
pub use orchestrator::{JobState, Orchestrator, RunReport, SongOutcome};
pub use registry::{InstrumentRegistry, SynthError, Synthesizer};
pub use song::{SongRenderJob, discover};

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
