//! Song discovery over the `<root>/<artist>/<song>/` stem tree.
//!
//! The directory tree is the job queue: one song directory holds one MIDI
//! stem per instrument, named `<program>_<instrument>.<ext>`. A sidecar
//! `<root>/<artist>/<song>.json` may supply display names and a duration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

/// Optional per-song sidecar written by the upstream dataset tooling.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SongMetadata {
    #[serde(rename = "Artist")]
    pub artist: Option<String>,
    #[serde(rename = "Song")]
    pub song: Option<String>,
    pub duration_ms: Option<f64>,
}

impl SongMetadata {
    /// Read a sidecar; a missing file is `Ok(None)`.
    pub fn load(path: &Path) -> io::Result<Option<Self>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// One song to render.
#[derive(Debug, Clone, PartialEq)]
pub struct SongRenderJob {
    pub artist: String,
    pub song: String,
    pub stem_dir: PathBuf,
    pub output_path: PathBuf,
    /// Shared stem length in seconds, when the sidecar provides one.
    pub duration: Option<f64>,
}

impl SongRenderJob {
    /// Build a job for `stem_dir`, naming the output `<output_root>/<artist>/<song>.wav`.
    pub fn new(artist: &str, song: &str, stem_dir: PathBuf, output_root: &Path) -> Self {
        let output_path = output_root
            .join(sanitize(artist))
            .join(format!("{}.wav", sanitize(song)));
        SongRenderJob {
            artist: artist.to_string(),
            song: song.to_string(),
            stem_dir,
            output_path,
            duration: None,
        }
    }

    /// `"<song>" by <artist>`
    pub fn label(&self) -> String {
        format!("\"{}\" by {}", self.song, self.artist)
    }
}

/// Keep names from escaping their directory.
fn sanitize(name: &str) -> String {
    match name {
        "" => "_".to_string(),
        "." | ".." => name.replace('.', "_"),
        _ => name.replace(['/', '\\'], "_"),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Sorted sub-directories of `dir`, skipping hidden entries.
fn sorted_dirs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() && !file_name(&path).starts_with('.') {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Every song directory under `input_root`, in sorted artist/song order.
pub fn discover(input_root: &Path, output_root: &Path) -> io::Result<Vec<SongRenderJob>> {
    let mut jobs = Vec::new();
    for artist_dir in sorted_dirs(input_root)? {
        let artist = file_name(&artist_dir);
        for song_dir in sorted_dirs(&artist_dir)? {
            let song = file_name(&song_dir);
            let sidecar = artist_dir.join(format!("{song}.json"));
            let metadata = SongMetadata::load(&sidecar).unwrap_or_else(|e| {
                warn!(path = %sidecar.display(), error = %e, "ignoring unreadable song metadata");
                None
            });
            let metadata = metadata.unwrap_or_default();

            let mut job = SongRenderJob::new(
                metadata.artist.as_deref().unwrap_or(&artist),
                metadata.song.as_deref().unwrap_or(&song),
                song_dir,
                output_root,
            );
            job.duration = metadata.duration_ms.map(|ms| ms / 1000.0);
            jobs.push(job);
        }
    }
    Ok(jobs)
}

/// Stem files of one song in sorted order, skipping hidden files.
pub fn list_stems(stem_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut stems = Vec::new();
    for entry in fs::read_dir(stem_dir)? {
        let path = entry?.path();
        if path.is_file() && !file_name(&path).starts_with('.') {
            stems.push(path);
        }
    }
    stems.sort();
    Ok(stems)
}

/// Split `<program>_<instrument>.<ext>` into its program number and name.
pub fn parse_stem_name(path: &Path) -> Option<(u8, String)> {
    let stem = path.file_stem()?.to_str()?;
    let (program, name) = match stem.split_once('_') {
        Some((program, name)) => (program, name),
        None => (stem, ""),
    };
    if program.is_empty() || !program.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let program: u8 = program.parse().ok()?;
    if program > 127 {
        return None;
    }
    Some((program, name.to_string()))
}
