//! Render orchestrator: takes one song from its stem directory to a
//! loudness-normalized master WAV.
//!
//! Per song: `Pending → StemsSynthesizing → Mixing → Normalizing → Done`,
//! or `Skipped` when the master already exists, or `Failed`.
//!
//! Stem-level problems (unparsable MIDI, unmapped program, synthesizer
//! failure) drop that stem with a warning. A song fails only when no stem
//! survives or a file cannot be written. A run never stops on a single
//! song's failure.

use std::collections::HashSet;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE, RenderConfig};
use crate::dsp::buffer::AudioBuffer;
use crate::dsp::loudness::{Normalization, normalize};
use crate::dsp::mixer::Mixer;
use crate::dsp::wav;
use crate::error::{RenderError, StemError};
use crate::midi;
use crate::registry::InstrumentRegistry;
use crate::song::{SongRenderJob, list_stems, parse_stem_name};

/// Lifecycle of one song job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    StemsSynthesizing,
    Mixing,
    Normalizing,
    Done,
    Skipped,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Skipped | JobState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The master file is already on disk.
    AlreadyRendered,
    /// Another worker in this process is rendering the same output path.
    ClaimedElsewhere,
}

/// A song that finished without error.
#[derive(Debug, Clone, PartialEq)]
pub enum SongOutcome {
    Rendered {
        path: PathBuf,
        /// Stems that made it into the mix.
        stems: usize,
        /// Stems dropped along the way.
        dropped: usize,
        /// Master samples clamped to full scale.
        clipped: usize,
    },
    Skipped(SkipReason),
}

/// Result of one song, with every state it passed through.
#[derive(Debug)]
pub struct SongReport {
    pub job: SongRenderJob,
    pub states: Vec<JobState>,
    pub result: Result<SongOutcome, RenderError>,
}

impl SongReport {
    pub fn state(&self) -> JobState {
        self.states.last().copied().unwrap_or(JobState::Pending)
    }
}

/// Results of a whole run, in job order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub songs: Vec<SongReport>,
}

impl RunReport {
    fn count(&self, state: JobState) -> usize {
        self.songs.iter().filter(|s| s.state() == state).count()
    }

    pub fn rendered(&self) -> usize {
        self.count(JobState::Done)
    }

    pub fn skipped(&self) -> usize {
        self.count(JobState::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(JobState::Failed)
    }

    /// Any failure that points at the environment rather than one song.
    pub fn has_systemic_failure(&self) -> bool {
        self.songs
            .iter()
            .any(|s| matches!(&s.result, Err(e) if e.is_systemic()))
    }
}

/// Records state transitions for one job.
struct Tracker<'a> {
    job: &'a SongRenderJob,
    states: Vec<JobState>,
}

impl<'a> Tracker<'a> {
    fn new(job: &'a SongRenderJob) -> Self {
        Tracker {
            job,
            states: vec![JobState::Pending],
        }
    }

    fn advance(&mut self, next: JobState) {
        debug!(
            artist = %self.job.artist,
            song = %self.job.song,
            from = ?self.states.last(),
            to = ?next,
            "job state"
        );
        self.states.push(next);
    }
}

/// Exclusive in-process claim on an output path, released on drop.
struct OutputClaim<'a> {
    claims: &'a Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl Drop for OutputClaim<'_> {
    fn drop(&mut self) {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}

/// Drives song jobs through decoding, synthesis, normalization and mixing.
pub struct Orchestrator {
    registry: InstrumentRegistry,
    sample_rate: u32,
    channels: u16,
    claims: Mutex<HashSet<PathBuf>>,
}

impl Orchestrator {
    /// 44.1 kHz stereo output.
    pub fn new(registry: InstrumentRegistry) -> Self {
        Orchestrator {
            registry,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            claims: Mutex::new(HashSet::new()),
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(InstrumentRegistry::from_tones(&config.instruments))
            .with_format(config.sample_rate, config.channels)
    }

    pub fn with_format(mut self, sample_rate: u32, channels: u16) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels.max(1);
        self
    }

    pub fn registry(&self) -> &InstrumentRegistry {
        &self.registry
    }

    /// Render jobs one after another.
    pub fn run(&self, jobs: &[SongRenderJob]) -> RunReport {
        let songs = jobs.iter().map(|job| self.render_song(job)).collect();
        let report = RunReport { songs };
        log_summary(&report);
        report
    }

    /// Render jobs on a pool of `workers` threads (0 = one per core).
    pub fn run_parallel(&self, jobs: &[SongRenderJob], workers: usize) -> RunReport {
        if workers == 1 {
            return self.run(jobs);
        }
        let pool = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool,
            Err(e) => {
                warn!(error = %e, "thread pool unavailable, rendering sequentially");
                return self.run(jobs);
            }
        };
        let songs = pool.install(|| jobs.par_iter().map(|job| self.render_song(job)).collect());
        let report = RunReport { songs };
        log_summary(&report);
        report
    }

    /// Render one song and report how it went.
    pub fn render_song(&self, job: &SongRenderJob) -> SongReport {
        let mut tracker = Tracker::new(job);
        let result = self.drive(job, &mut tracker);
        if let Err(e) = &result {
            error!(artist = %job.artist, song = %job.song, error = %e, "song failed");
            tracker.advance(JobState::Failed);
        }
        SongReport {
            job: job.clone(),
            states: tracker.states,
            result,
        }
    }

    fn claim(&self, path: &Path) -> Option<OutputClaim<'_>> {
        let mut claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
        if !claims.insert(path.to_path_buf()) {
            return None;
        }
        Some(OutputClaim {
            claims: &self.claims,
            path: path.to_path_buf(),
        })
    }

    fn drive(&self, job: &SongRenderJob, tracker: &mut Tracker) -> Result<SongOutcome, RenderError> {
        let Some(_claim) = self.claim(&job.output_path) else {
            debug!(path = %job.output_path.display(), "output claimed by another worker");
            tracker.advance(JobState::Skipped);
            return Ok(SongOutcome::Skipped(SkipReason::ClaimedElsewhere));
        };
        if job.output_path.exists() {
            debug!(path = %job.output_path.display(), "already rendered");
            tracker.advance(JobState::Skipped);
            return Ok(SongOutcome::Skipped(SkipReason::AlreadyRendered));
        }

        info!("Rendering {}...", job.label());
        tracker.advance(JobState::StemsSynthesizing);

        let workdir = tempfile::Builder::new().prefix("stemwalker-").tempdir()?;
        let stems = list_stems(&job.stem_dir)?;
        let mut rendered = Vec::with_capacity(stems.len());
        for path in &stems {
            let audio = match self.render_stem(job, path) {
                Ok(audio) => audio,
                Err(e) => {
                    warn!(stem = %path.display(), error = %e, "dropping stem");
                    continue;
                }
            };
            if let Some(out) = write_intermediate(workdir.path(), path, &audio)? {
                rendered.push(out);
            }
        }
        let dropped = stems.len() - rendered.len();
        if rendered.is_empty() {
            return Err(RenderError::EmptyJob { song: job.label() });
        }

        tracker.advance(JobState::Mixing);
        rendered.sort();
        let mut mixer = Mixer::new(self.sample_rate, self.channels);
        for path in &rendered {
            mixer.add(&wav::read(path)?)?;
        }
        let mut master = mixer.output();

        tracker.advance(JobState::Normalizing);
        if let Normalization::Applied { measured_lufs, gain_db } = normalize(&mut master) {
            debug!(lufs = measured_lufs, gain_db, "master normalized");
        }
        let clipped = master.clip();
        if clipped > 0 {
            warn!(
                song = %job.song,
                clipped,
                "master exceeds full scale after normalization, clipping"
            );
        }
        self.write_master(&job.output_path, &master)?;

        tracker.advance(JobState::Done);
        info!(
            path = %job.output_path.display(),
            stems = rendered.len(),
            dropped,
            frames = master.frame_count(),
            "song rendered"
        );
        Ok(SongOutcome::Rendered {
            path: job.output_path.clone(),
            stems: rendered.len(),
            dropped,
            clipped,
        })
    }

    /// Decode, synthesize and normalize one stem.
    fn render_stem(&self, job: &SongRenderJob, path: &Path) -> Result<AudioBuffer, StemError> {
        let (program, name) = parse_stem_name(path).ok_or_else(|| StemError::BadStemName {
            path: path.to_path_buf(),
        })?;
        let synth = self
            .registry
            .get(program)
            .ok_or(StemError::UnmappedInstrument { program })?;

        let stem = midi::decode(path).map_err(|source| StemError::CorruptInput {
            path: path.to_path_buf(),
            source,
        })?;
        let duration = job.duration.unwrap_or(stem.length);
        debug!(program, instrument = %name, events = stem.events.len(), duration, "synthesizing");

        let mut audio = synth
            .synthesize(&stem.events, duration, self.sample_rate, self.channels)
            .map_err(|e| StemError::Synthesis {
                program,
                message: e.message,
            })?;
        self.conform(&mut audio, program, duration)?;

        match normalize(&mut audio) {
            Normalization::Applied { measured_lufs, gain_db } => {
                debug!(program, lufs = measured_lufs, gain_db, "stem normalized")
            }
            Normalization::Silent => debug!(program, "stem is silent, left as is"),
        }
        Ok(audio)
    }

    /// Check a synthesizer's output format and hold it to its duration.
    fn conform(&self, audio: &mut AudioBuffer, program: u8, duration: f64) -> Result<(), StemError> {
        if audio.sample_rate() != self.sample_rate || audio.channels() != self.channels {
            return Err(StemError::Synthesis {
                program,
                message: format!(
                    "returned {} Hz / {} ch, expected {} Hz / {} ch",
                    audio.sample_rate(),
                    audio.channels(),
                    self.sample_rate,
                    self.channels
                ),
            });
        }
        let expected = (duration * self.sample_rate as f64).round() as usize;
        if audio.frame_count().abs_diff(expected) > 1 {
            warn!(
                program,
                frames = audio.frame_count(),
                expected,
                "synthesizer output length is off, fitting to duration"
            );
            audio.fit_to_frames(expected);
        }
        Ok(())
    }

    /// Write to a hidden temporary file beside `path`, then rename into place.
    fn write_master(&self, path: &Path, master: &AudioBuffer) -> Result<(), RenderError> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let write_failure = |source| RenderError::WriteFailure {
            path: path.to_path_buf(),
            source,
        };

        fs::create_dir_all(dir).map_err(write_failure)?;
        let mut partial = tempfile::Builder::new()
            .prefix(".stemwalker-")
            .suffix(".wav.partial")
            .tempfile_in(dir)
            .map_err(write_failure)?;

        wav::write_pcm16(BufWriter::new(partial.as_file_mut()), master).map_err(|e| match e {
            hound::Error::IoError(source) => write_failure(source),
            other => RenderError::Wav(other),
        })?;
        partial.persist(path).map_err(|e| write_failure(e.error))?;
        Ok(())
    }
}

/// Write a normalized stem into `workdir` as `<file name>.wav`.
///
/// The full file name keeps `x.mid` and `x.midi` apart. An I/O failure
/// fails the song; any other encoding problem drops just this stem.
fn write_intermediate(
    workdir: &Path,
    stem: &Path,
    audio: &AudioBuffer,
) -> Result<Option<PathBuf>, RenderError> {
    let file_name = stem.file_name().unwrap_or_default().to_string_lossy();
    let out = workdir.join(format!("{file_name}.wav"));
    match wav::write_float(&out, audio) {
        Ok(()) => Ok(Some(out)),
        Err(hound::Error::IoError(source)) => Err(RenderError::WriteFailure { path: out, source }),
        Err(e) => {
            let e = StemError::Intermediate(e);
            warn!(stem = %stem.display(), error = %e, "dropping stem");
            Ok(None)
        }
    }
}

fn log_summary(report: &RunReport) {
    info!(
        rendered = report.rendered(),
        skipped = report.skipped(),
        failed = report.failed(),
        "render run finished"
    );
}
