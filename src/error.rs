use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A MIDI stem could not be turned into a timed event list.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read stem {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid MIDI data: {0}")]
    Parse(#[from] midly::Error),
    #[error("SMPTE timecode timing is not supported")]
    TimecodeTiming,
    #[error("ticks per beat must be greater than zero")]
    ZeroTicksPerBeat,
}

/// Stem-level failures. The orchestrator always recovers from these by
/// dropping the stem and logging a warning.
#[derive(Debug, Error)]
pub enum StemError {
    #[error("corrupt stem {path}: {source}")]
    CorruptInput {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
    #[error("no synthesizer registered for program {program}")]
    UnmappedInstrument { program: u8 },
    #[error("stem name {path} does not start with a program number")]
    BadStemName { path: PathBuf },
    #[error("synthesizer for program {program} failed: {message}")]
    Synthesis { program: u8, message: String },
    #[error("intermediate stem file: {0}")]
    Intermediate(#[from] hound::Error),
}

/// The track mixer was handed buffers it cannot sum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MixError {
    #[error("nothing to mix")]
    NoInputs,
    #[error("sample rate mismatch: expected {expected} Hz, found {found} Hz")]
    SampleRateMismatch { expected: u32, found: u32 },
    #[error("channel count mismatch: expected {expected}, found {found}")]
    ChannelMismatch { expected: u16, found: u16 },
}

/// Song-level failures, reported per song without aborting the run.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("every stem of \"{song}\" was dropped")]
    EmptyJob { song: String },
    #[error("cannot write {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),
    #[error(transparent)]
    Mix(#[from] MixError),
    #[error("filesystem error: {0}")]
    Io(#[from] io::Error),
}

impl RenderError {
    /// True when the failure points at the environment (disk full,
    /// permissions) rather than at one song's inputs.
    pub fn is_systemic(&self) -> bool {
        matches!(self, RenderError::WriteFailure { .. })
    }
}

/// The JSON configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}
