pub mod coordinator;
pub mod onset;
pub mod pitch;
pub mod tempo;
pub mod worker;

use serde::Deserialize;

pub use coordinator::{AnalysisCoordinator, AnalysisResults};
pub use onset::{OnsetAnalysis, OnsetConfig, OnsetDetector};
pub use pitch::{track_pitch, PitchConfig, PitchEstimator, PitchFrame, Yin};
pub use tempo::estimate_tempo;
pub use worker::{AnalysisKind, AnalysisPayload, AnalysisRequest, AnalysisResponse, AnalysisWorker};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub onset: OnsetConfig,
    pub pitch: PitchConfig,
}

pub(crate) fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}
