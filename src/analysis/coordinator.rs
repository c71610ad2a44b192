use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::pitch::PitchFrame;
use super::tempo::estimate_tempo;
use super::worker::{AnalysisKind, AnalysisPayload, AnalysisRequest, AnalysisResponse, AnalysisWorker};
use super::AnalysisConfig;
use crate::audio::AudioAsset;
use crate::error::Result;

/// Latest accepted result per analysis kind.
#[derive(Clone, Debug, Default, Serialize)]
pub struct AnalysisResults {
    pub onsets: Option<Vec<f64>>,
    pub pitch: Option<Vec<PitchFrame>>,
    pub bpm: Option<f32>,
}

/// Dispatches analysis to background workers and relays the results.
///
/// Onset and tempo requests share one worker (serialized), pitch has its own, so
/// the two expensive passes run side by side. Only the most recent request per
/// kind is honoured; anything older is discarded when it arrives.
pub struct AnalysisCoordinator {
    onset_worker: AnalysisWorker,
    pitch_worker: AnalysisWorker,
    next_token: u64,
    outstanding: HashMap<AnalysisKind, u64>,
    results: AnalysisResults,
}

impl AnalysisCoordinator {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        Ok(Self {
            onset_worker: AnalysisWorker::spawn("onset", config.clone())?,
            pitch_worker: AnalysisWorker::spawn("pitch", config)?,
            next_token: 1,
            outstanding: HashMap::new(),
            results: AnalysisResults::default(),
        })
    }

    fn worker_for(&self, kind: AnalysisKind) -> &AnalysisWorker {
        match kind {
            AnalysisKind::Onset | AnalysisKind::Tempo => &self.onset_worker,
            AnalysisKind::Pitch => &self.pitch_worker,
        }
    }

    /// Post one request; returns its token. Supersedes any outstanding request of the same kind.
    pub fn submit(&mut self, kind: AnalysisKind, buffer: Arc<[f32]>, sample_rate: u32) -> Result<u64> {
        let token = self.next_token;
        self.next_token += 1;

        self.worker_for(kind).post(AnalysisRequest {
            token,
            kind,
            buffer,
            sample_rate,
        })?;

        if let Some(previous) = self.outstanding.insert(kind, token) {
            log::debug!("{:?} request #{} superseded by #{}", kind, previous, token);
        }
        Ok(token)
    }

    /// Downmix `asset` once and dispatch every requested kind against it.
    pub fn analyze(&mut self, asset: &AudioAsset, kinds: &[AnalysisKind]) -> Result<()> {
        let buffer: Arc<[f32]> = asset.mono().into();
        for &kind in kinds {
            self.submit(kind, buffer.clone(), asset.sample_rate())?;
        }
        Ok(())
    }

    /// Drain finished work without blocking. Returns the kinds that were updated.
    pub fn poll(&mut self) -> Vec<AnalysisKind> {
        let mut updated = Vec::new();
        while let Some(response) = self.onset_worker.try_recv() {
            updated.extend(self.accept(response));
        }
        while let Some(response) = self.pitch_worker.try_recv() {
            updated.extend(self.accept(response));
        }
        updated
    }

    /// Block until nothing is outstanding or `timeout` passes. Returns `true` when idle.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let slice = Duration::from_millis(10);

        while !self.is_idle() {
            if Instant::now() >= deadline {
                return false;
            }
            if let Some(response) = self.onset_worker.recv_timeout(slice) {
                self.accept(response);
            }
            if let Some(response) = self.pitch_worker.recv_timeout(slice) {
                self.accept(response);
            }
        }
        true
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding.is_empty()
    }

    pub fn is_pending(&self, kind: AnalysisKind) -> bool {
        self.outstanding.contains_key(&kind)
    }

    pub fn results(&self) -> &AnalysisResults {
        &self.results
    }

    /// Forget every result (e.g. when the audio is cleared). In-flight work
    /// will be discarded on arrival.
    pub fn reset(&mut self) {
        self.outstanding.clear();
        self.results = AnalysisResults::default();
    }

    fn accept(&mut self, response: AnalysisResponse) -> Option<AnalysisKind> {
        let kind = response.payload.kind();
        if self.outstanding.get(&kind) != Some(&response.token) {
            log::debug!("Dropping stale {:?} response #{}", kind, response.token);
            return None;
        }
        self.outstanding.remove(&kind);

        match response.payload {
            AnalysisPayload::Onset(onsets) => {
                self.results.bpm = estimate_tempo(&onsets);
                self.results.onsets = Some(onsets);
            }
            AnalysisPayload::Pitch(frames) => {
                self.results.pitch = Some(frames);
            }
            AnalysisPayload::Tempo(tempo) => {
                self.results.bpm = tempo.bpm;
                self.results.onsets = Some(tempo.onsets);
            }
        }
        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn burst_track(sample_rate: u32) -> Vec<f32> {
        let mut samples = vec![0.0f32; sample_rate as usize * 3];
        for k in 0..6 {
            let start = sample_rate as usize / 4 + k * sample_rate as usize / 2;
            for j in 0..200 {
                samples[start + j] = if j % 2 == 0 { 0.9 } else { -0.9 };
            }
        }
        samples
    }

    #[test]
    fn stale_responses_are_ignored() {
        let mut coordinator = AnalysisCoordinator::new(AnalysisConfig::default()).unwrap();
        let sr = 22050;

        let first = coordinator.submit(AnalysisKind::Onset, burst_track(sr).into(), sr).unwrap();
        let second = coordinator
            .submit(AnalysisKind::Onset, vec![0.0f32; sr as usize].into(), sr)
            .unwrap();
        assert!(second > first);

        assert!(coordinator.wait(Duration::from_secs(30)));
        // only the silent (latest) buffer's result survives
        assert_eq!(coordinator.results().onsets, Some(vec![]));
        assert_eq!(coordinator.results().bpm, None);
    }

    #[test]
    fn analyzes_asset_on_both_workers() {
        let sr = 22050;
        let asset = AudioAsset::from_mono(burst_track(sr), sr).unwrap();
        let mut coordinator = AnalysisCoordinator::new(AnalysisConfig::default()).unwrap();

        coordinator
            .analyze(&asset, &[AnalysisKind::Onset, AnalysisKind::Pitch])
            .unwrap();
        assert!(coordinator.is_pending(AnalysisKind::Pitch));
        assert!(coordinator.wait(Duration::from_secs(60)));

        let results = coordinator.results();
        let onsets = results.onsets.as_ref().unwrap();
        assert!(!onsets.is_empty());
        let pitch = results.pitch.as_ref().unwrap();
        assert_eq!(pitch.len(), asset.frames().div_ceil(512));
    }

    #[test]
    fn reset_discards_in_flight_work() {
        let mut coordinator = AnalysisCoordinator::new(AnalysisConfig::default()).unwrap();
        coordinator
            .submit(AnalysisKind::Tempo, vec![0.0f32; 8192].into(), 8000)
            .unwrap();
        coordinator.reset();
        assert!(coordinator.is_idle());

        std::thread::sleep(Duration::from_millis(200));
        assert!(coordinator.poll().is_empty());
        assert!(coordinator.results().onsets.is_none());
    }
}
