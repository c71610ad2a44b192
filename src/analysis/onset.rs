use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::Deserialize;

use super::hann_window;

/// Tunables for spectral-flux onset detection.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    pub frame_size: usize,
    pub hop_size: usize,
    /// Radius (in hops) of the moving-average smoother.
    pub smoothing_radius: usize,
    /// Radius (in hops) of the local mean subtracted by the adaptive threshold.
    pub threshold_radius: usize,
    /// Minimum spacing between accepted onsets, in seconds.
    pub min_interval: f64,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 512,
            smoothing_radius: 3,
            threshold_radius: 16,
            min_interval: 0.05,
        }
    }
}

/// Every intermediate series of one detection run, one value per hop.
#[derive(Clone, Debug, Default)]
pub struct OnsetAnalysis {
    pub flux: Vec<f32>,
    pub smoothed: Vec<f32>,
    pub thresholded: Vec<f32>,
    /// Onset times in seconds, strictly increasing.
    pub onsets: Vec<f64>,
}

pub struct OnsetDetector {
    config: OnsetConfig,
}

impl OnsetDetector {
    pub fn new(config: OnsetConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OnsetConfig {
        &self.config
    }

    /// Onset timestamps in seconds. Empty when the buffer is shorter than a frame.
    pub fn detect(&self, samples: &[f32], sample_rate: u32) -> Vec<f64> {
        self.analyze(samples, sample_rate).onsets
    }

    pub fn analyze(&self, samples: &[f32], sample_rate: u32) -> OnsetAnalysis {
        let started = std::time::Instant::now();
        let cfg = &self.config;

        if cfg.frame_size == 0 || cfg.hop_size == 0 || sample_rate == 0 {
            log::warn!("Onset detection skipped: degenerate configuration {:?}", cfg);
            return OnsetAnalysis::default();
        }

        let magnitudes = magnitude_frames(samples, cfg.frame_size, cfg.hop_size);
        let flux = spectral_flux(&magnitudes);
        let smoothed = smooth(&flux, cfg.smoothing_radius);
        let thresholded = adaptive_threshold(&smoothed, cfg.threshold_radius);
        let onsets = pick_peaks(&thresholded, cfg.hop_size, sample_rate, cfg.min_interval);

        log::info!(
            "Extracted {} onsets from {} frames in {}ms",
            onsets.len(),
            flux.len(),
            started.elapsed().as_millis()
        );

        OnsetAnalysis {
            flux,
            smoothed,
            thresholded,
            onsets,
        }
    }
}

impl Default for OnsetDetector {
    fn default() -> Self {
        Self::new(OnsetConfig::default())
    }
}

/// Hann-windowed magnitude spectra (`frame_size / 2` bins) for every frame that
/// ends strictly before the last sample.
pub fn magnitude_frames(samples: &[f32], frame_size: usize, hop_size: usize) -> Vec<Vec<f32>> {
    if frame_size == 0 || hop_size == 0 || samples.len() <= frame_size {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(frame_size);
    let hann = hann_window(frame_size);
    let num_frames = (samples.len() - frame_size - 1) / hop_size + 1;

    (0..num_frames)
        .into_par_iter()
        .map(|frame_idx| {
            let pos = frame_idx * hop_size;
            let mut buffer: Vec<Complex<f32>> = samples[pos..pos + frame_size]
                .iter()
                .zip(&hann)
                .map(|(&s, &w)| Complex::new(s * w, 0.0))
                .collect();
            fft.process(&mut buffer);
            buffer[..frame_size / 2].iter().map(|c| c.norm()).collect()
        })
        .collect()
}

/// Half-wave rectified frame-to-frame magnitude increase. The first frame is
/// compared against silence.
pub fn spectral_flux(magnitudes: &[Vec<f32>]) -> Vec<f32> {
    let mut prev: &[f32] = &[];
    magnitudes
        .iter()
        .map(|cur| {
            let flux: f32 = cur
                .iter()
                .enumerate()
                .map(|(k, &m)| (m - prev.get(k).copied().unwrap_or(0.0)).max(0.0))
                .sum();
            prev = cur.as_slice();
            flux
        })
        .collect()
}

/// Mean of `data` over `[i - radius, i + radius]`, clipped at the edges.
fn local_mean(data: &[f32], i: usize, radius: usize) -> f32 {
    let start = i.saturating_sub(radius);
    let end = (i + radius + 1).min(data.len());
    data[start..end].iter().sum::<f32>() / (end - start) as f32
}

pub fn smooth(data: &[f32], radius: usize) -> Vec<f32> {
    (0..data.len()).map(|i| local_mean(data, i, radius)).collect()
}

/// Subtract the local mean; negative results clamp to zero.
pub fn adaptive_threshold(data: &[f32], radius: usize) -> Vec<f32> {
    data.iter()
        .enumerate()
        .map(|(i, &v)| (v - local_mean(data, i, radius)).max(0.0))
        .collect()
}

/// Strict local maxima above zero, converted to seconds. Greedy left to right:
/// a candidate closer than `min_interval` to the last accepted onset is dropped.
pub fn pick_peaks(data: &[f32], hop_size: usize, sample_rate: u32, min_interval: f64) -> Vec<f64> {
    let mut onsets: Vec<f64> = Vec::new();
    if data.len() < 3 {
        return onsets;
    }

    for i in 1..data.len() - 1 {
        let v = data[i];
        if v > data[i - 1] && v > data[i + 1] && v > 0.0 {
            let time = (i * hop_size) as f64 / sample_rate as f64;
            let far_enough = onsets.last().map_or(true, |&last| time - last >= min_interval);
            if far_enough {
                onsets.push(time);
            }
        }
    }

    onsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn clicks(sample_rate: u32, seconds: f64, every: f64) -> Vec<f32> {
        let len = (sample_rate as f64 * seconds) as usize;
        let period = (sample_rate as f64 * every) as usize;
        let mut samples = vec![0.0f32; len];
        for start in (period / 2..len).step_by(period) {
            // short decaying noise burst
            for j in 0..256.min(len - start) {
                let sign = if (j * 7919) % 3 == 0 { -1.0 } else { 1.0 };
                samples[start + j] = sign * (1.0 - j as f32 / 256.0);
            }
        }
        samples
    }

    #[test]
    fn short_buffer_yields_nothing() {
        let detector = OnsetDetector::default();
        assert!(detector.detect(&vec![0.5; 2047], 44100).is_empty());
        assert!(detector.detect(&[], 44100).is_empty());
    }

    #[test]
    fn frames_must_end_before_the_buffer() {
        assert!(magnitude_frames(&vec![0.0; 2048], 2048, 512).is_empty());
        assert_eq!(magnitude_frames(&vec![0.0; 2049], 2048, 512).len(), 1);
        // an exact multiple of the hop does not add a trailing frame
        assert_eq!(magnitude_frames(&vec![0.0; 2048 + 512], 2048, 512).len(), 1);
        assert_eq!(magnitude_frames(&vec![0.0; 2048 + 513], 2048, 512).len(), 2);
        assert_eq!(magnitude_frames(&vec![0.0; 2048 + 512 * 4], 2048, 512).len(), 4);
    }

    #[test]
    fn silence_has_no_onsets() {
        let detector = OnsetDetector::default();
        let analysis = detector.analyze(&vec![0.0; 44100], 44100);
        assert_eq!(analysis.flux.len(), (44100 - 2048 - 1) / 512 + 1);
        assert!(analysis.onsets.is_empty());
    }

    #[test]
    fn detects_regular_clicks() {
        let sr = 44100;
        let samples = clicks(sr, 4.0, 0.5);
        let onsets = OnsetDetector::default().detect(&samples, sr);

        assert!(onsets.windows(2).all(|w| w[1] > w[0]));
        assert!(onsets.windows(2).all(|w| w[1] - w[0] >= 0.05));
        // one onset near every click (the frame containing it starts up to a frame earlier)
        for k in 0..8 {
            let click = 0.25 + k as f64 * 0.5;
            assert!(
                onsets.iter().any(|&t| (t - click).abs() < 0.06),
                "no onset near {} in {:?}",
                click,
                onsets
            );
        }
    }

    #[test]
    fn first_frame_flux_compares_against_silence() {
        let flux = spectral_flux(&[vec![1.0, 2.0], vec![0.5, 3.0]]);
        assert_eq!(flux, vec![3.0, 1.0]);
    }

    #[test]
    fn smoothing_shrinks_window_at_edges() {
        let s = smooth(&[3.0, 0.0, 0.0, 0.0, 0.0], 1);
        assert_abs_diff_eq!(s[0], 1.5);
        assert_abs_diff_eq!(s[1], 1.0);
        assert_abs_diff_eq!(s[4], 0.0);
    }

    #[test]
    fn threshold_clamps_negative() {
        let t = adaptive_threshold(&[0.0, 4.0, 0.0], 1);
        assert_eq!(t[0], 0.0);
        assert_abs_diff_eq!(t[1], 4.0 - 4.0 / 3.0);
        assert_eq!(t[2], 0.0);
    }

    #[test]
    fn close_peaks_keep_only_the_first() {
        // hop of 441 samples at 44.1kHz = 10ms per index; peaks at 10ms and 20ms
        let data = [0.0, 1.0, 0.0, 2.0, 0.0, 0.0];
        let onsets = pick_peaks(&data, 441, 44100, 0.05);
        assert_eq!(onsets.len(), 1);
        assert_abs_diff_eq!(onsets[0], 0.01, epsilon = 1e-12);
    }

    #[test]
    fn plateaus_are_not_peaks() {
        assert!(pick_peaks(&[0.0, 1.0, 1.0, 0.0], 512, 44100, 0.05).is_empty());
        assert!(pick_peaks(&[1.0, 0.0], 512, 44100, 0.05).is_empty());
    }
}
