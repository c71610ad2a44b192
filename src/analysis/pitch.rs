//! Per-hop fundamental frequency tracking.
//!
//! The tracker slides a window across the whole buffer and hands each window to a
//! [`PitchEstimator`]. The default estimator is YIN (de Cheveigné & Kawahara, 2002):
//!
//! 1. **Difference function** - d(τ) = Σ(x[j] - x[j+τ])²
//! 2. **Cumulative mean normalized difference** - d'(τ)
//! 3. **Absolute threshold** - first dip below the threshold, walked to its local minimum
//! 4. **Parabolic interpolation** - sub-sample period

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    pub hop_size: usize,
    pub chunk_size: usize,
    /// YIN absolute threshold (lower = stricter).
    pub threshold: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            hop_size: 512,
            chunk_size: 2048,
            threshold: 0.1,
        }
    }
}

/// One analysis hop. `freq` is `None` (serialized as `null`) when unvoiced.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PitchFrame {
    pub time: f64,
    pub freq: Option<f32>,
    pub confidence: u8,
}

/// Replaceable fundamental-frequency strategy.
///
/// Must tolerate short windows (the last hop of a buffer is truncated) and
/// report "nothing found" as `None`, never by panicking.
pub trait PitchEstimator: Send + Sync {
    fn estimate(&self, window: &[f32]) -> Option<f32>;
}

pub struct Yin {
    sample_rate: f64,
    threshold: f32,
}

impl Yin {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_threshold(sample_rate, 0.1)
    }

    pub fn with_threshold(sample_rate: u32, threshold: f32) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            threshold: threshold.clamp(0.01, 0.5),
        }
    }
}

impl PitchEstimator for Yin {
    fn estimate(&self, window: &[f32]) -> Option<f32> {
        let half = window.len() / 2;
        if half < 3 || self.sample_rate <= 0.0 {
            return None;
        }

        // d(τ) over a window of `half` samples
        let mut diff = vec![0.0f32; half];
        for (tau, d) in diff.iter_mut().enumerate().skip(1) {
            *d = (0..half)
                .map(|j| {
                    let delta = window[j] - window[j + tau];
                    delta * delta
                })
                .sum();
        }

        // d'(τ) = d(τ) / ((1/τ) Σ d(j)), d'(0) = 1
        let mut cmnd = vec![1.0f32; half];
        let mut running_sum = 0.0f32;
        for tau in 1..half {
            running_sum += diff[tau];
            cmnd[tau] = if running_sum > 1e-10 {
                diff[tau] * tau as f32 / running_sum
            } else {
                1.0
            };
        }

        // First τ under the threshold, then follow it down to the local minimum
        let mut tau = 2;
        let found = loop {
            if tau >= half {
                break None;
            }
            if cmnd[tau] < self.threshold {
                while tau + 1 < half && cmnd[tau + 1] < cmnd[tau] {
                    tau += 1;
                }
                break Some(tau);
            }
            tau += 1;
        }?;

        let period = parabolic_interpolation(&cmnd, found);
        if period <= 0.0 {
            return None;
        }
        Some((self.sample_rate / period) as f32)
    }
}

fn parabolic_interpolation(cmnd: &[f32], tau: usize) -> f64 {
    if tau < 1 || tau + 1 >= cmnd.len() {
        return tau as f64;
    }

    let s0 = cmnd[tau - 1] as f64;
    let s1 = cmnd[tau] as f64;
    let s2 = cmnd[tau + 1] as f64;

    let denominator = 2.0 * (2.0 * s1 - s2 - s0);
    if denominator.abs() > 1e-10 {
        tau as f64 + (s2 - s0) / denominator
    } else {
        tau as f64
    }
}

/// Estimate pitch at every hop. Produces `ceil(len / hop_size)` frames; the
/// trailing windows are shorter than `chunk_size` and passed through as-is.
pub fn track_pitch(
    samples: &[f32],
    sample_rate: u32,
    hop_size: usize,
    chunk_size: usize,
    estimator: &dyn PitchEstimator,
) -> Vec<PitchFrame> {
    let started = std::time::Instant::now();
    if hop_size == 0 || sample_rate == 0 {
        log::warn!("Pitch tracking skipped: hop_size={} sample_rate={}", hop_size, sample_rate);
        return Vec::new();
    }

    let num_frames = samples.len().div_ceil(hop_size);
    let frames: Vec<PitchFrame> = (0..num_frames)
        .into_par_iter()
        .map(|idx| {
            let start = idx * hop_size;
            let end = (start + chunk_size).min(samples.len());
            let freq = estimator.estimate(&samples[start..end]);
            PitchFrame {
                time: start as f64 / sample_rate as f64,
                freq,
                confidence: u8::from(freq.is_some()),
            }
        })
        .collect();

    log::info!(
        "Extracted pitch for {} frames ({} voiced) in {}ms",
        frames.len(),
        frames.iter().filter(|f| f.freq.is_some()).count(),
        started.elapsed().as_millis()
    );

    frames
}
