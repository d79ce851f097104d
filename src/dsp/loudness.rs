//! Loudness normalizer: ITU-R BS.1770 integrated loudness with absolute
//! and relative gating, and gain correction to a fixed LUFS target.
//!
//! Measurement runs in three steps:
//! 1. K-weight every channel (`KWeighting`).
//! 2. Slice into 400 ms blocks with 75% overlap and take the channel-weighted
//!    mean-square energy of each block.
//! 3. Gate at −70 LUFS, then at 10 LU below the mean of what survived, and
//!    average the remaining block energies.
//!
//! Energies are accumulated per 100 ms hop, and each block is the sum of
//! four consecutive hops, so memory stays proportional to the number of
//! hops rather than the number of samples.

use tracing::debug;

use super::buffer::AudioBuffer;
use super::filter::KWeighting;

/// Every stem and every master is brought to this level.
pub const TARGET_LUFS: f64 = -12.0;

/// Blocks quieter than this are never part of the measurement.
pub const ABSOLUTE_GATE_LUFS: f64 = -70.0;

/// Offset of the relative gate below the absolute-gated loudness.
pub const RELATIVE_GATE_LU: f64 = -10.0;

const BLOCK_SECONDS: f64 = 0.4;
const OVERLAP: f64 = 0.75;

/// Convert a weighted mean-square energy to LUFS. Zero energy is −∞.
pub fn energy_to_lufs(energy: f64) -> f64 {
    -0.691 + 10.0 * energy.log10()
}

/// Channel weighting for the L, R, C, Ls, Rs layout: surrounds get +1.5 dB.
pub fn channel_weight(index: usize) -> f64 {
    match index {
        3 | 4 => 1.41,
        _ => 1.0,
    }
}

/// Gated integrated-loudness meter for one sample rate.
#[derive(Debug, Clone)]
pub struct LoudnessMeter {
    sample_rate: u32,
    hop: usize,
    hops_per_block: usize,
}

impl LoudnessMeter {
    pub fn new(sample_rate: u32) -> Self {
        let hop = (sample_rate as f64 * BLOCK_SECONDS * (1.0 - OVERLAP)).round() as usize;
        LoudnessMeter {
            sample_rate,
            hop: hop.max(1),
            hops_per_block: (1.0 / (1.0 - OVERLAP)).round() as usize,
        }
    }

    /// Samples per measurement block.
    pub fn block_len(&self) -> usize {
        self.hop * self.hops_per_block
    }

    /// Channel-weighted mean-square energy of every block.
    ///
    /// A final partial block is kept once the buffer reaches past the middle
    /// of that block's last hop; it counts as silence past the end.
    pub fn block_energies(&self, buffer: &AudioBuffer) -> Vec<f64> {
        let channels = buffer.channels() as usize;
        let mut filters = vec![KWeighting::new(self.sample_rate as f64); channels];
        let weights: Vec<f64> = (0..channels).map(channel_weight).collect();

        let mut hops = Vec::with_capacity(buffer.frame_count() / self.hop + 1);
        let mut acc = 0.0_f64;
        let mut filled = 0;
        for frame in buffer.frames() {
            for (c, &sample) in frame.iter().enumerate() {
                let y = filters[c].process(sample as f64);
                acc += weights[c] * y * y;
            }
            filled += 1;
            if filled == self.hop {
                hops.push(acc);
                acc = 0.0;
                filled = 0;
            }
        }

        if filled > 0 {
            hops.push(acc);
        }

        let block_len = self.block_len();
        let frames = buffer.frame_count();
        if frames < block_len {
            return Vec::new();
        }
        // Block count rounds half to even; the last block may run past the
        // end and is still divided by the full block length.
        let span = frames as f64 / self.hop as f64 - self.hops_per_block as f64;
        let blocks = span.round_ties_even() as usize + 1;
        (0..blocks)
            .map(|j| {
                let end = (j + self.hops_per_block).min(hops.len());
                hops[j..end].iter().sum::<f64>() / block_len as f64
            })
            .collect()
    }

    /// Integrated loudness in LUFS, or −∞ when no block survives gating.
    pub fn integrated_loudness(&self, buffer: &AudioBuffer) -> f64 {
        let blocks = self.block_energies(buffer);

        let above_absolute: Vec<f64> = blocks
            .into_iter()
            .filter(|&z| energy_to_lufs(z) >= ABSOLUTE_GATE_LUFS)
            .collect();
        if above_absolute.is_empty() {
            return f64::NEG_INFINITY;
        }

        let relative_gate = energy_to_lufs(mean(&above_absolute)) + RELATIVE_GATE_LU;
        let gated: Vec<f64> = above_absolute
            .into_iter()
            .filter(|&z| energy_to_lufs(z) >= relative_gate)
            .collect();
        if gated.is_empty() {
            return f64::NEG_INFINITY;
        }

        energy_to_lufs(mean(&gated))
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// What `normalize` did to a buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalization {
    Applied { measured_lufs: f64, gain_db: f64 },
    /// Nothing survived gating; the buffer was left untouched.
    Silent,
}

/// Measure `buffer` and rescale it in place to `TARGET_LUFS`.
pub fn normalize(buffer: &mut AudioBuffer) -> Normalization {
    normalize_to(buffer, TARGET_LUFS)
}

/// Measure `buffer` and rescale it in place to `target_lufs`.
pub fn normalize_to(buffer: &mut AudioBuffer, target_lufs: f64) -> Normalization {
    let measured = LoudnessMeter::new(buffer.sample_rate()).integrated_loudness(buffer);
    if !measured.is_finite() {
        debug!(frames = buffer.frame_count(), "loudness below gate, gain skipped");
        return Normalization::Silent;
    }

    let gain_db = target_lufs - measured;
    buffer.apply_gain(10.0_f64.powf(gain_db / 20.0));
    debug!(lufs = measured, gain_db, "loudness normalized");
    Normalization::Applied {
        measured_lufs: measured,
        gain_db,
    }
}
