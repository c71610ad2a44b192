//! Background analysis worker.
//!
//! Keeps DSP off the playback path. Each worker owns one named thread and
//! talks to it over a request/response channel pair. A request always runs to
//! completion; callers drop responses they no longer care about by comparing
//! the `token` they were handed when posting.

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::onset::OnsetDetector;
use super::pitch::{track_pitch, PitchFrame, Yin};
use super::tempo::estimate_tempo;
use super::AnalysisConfig;
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Onset,
    Pitch,
    Tempo,
}

/// `{"token":1,"type":"onset","buffer":[..],"sampleRate":44100}`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub token: u64,
    #[serde(rename = "type")]
    pub kind: AnalysisKind,
    pub buffer: Arc<[f32]>,
    pub sample_rate: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TempoEstimate {
    pub bpm: Option<f32>,
    pub onsets: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum AnalysisPayload {
    Onset(Vec<f64>),
    Pitch(Vec<PitchFrame>),
    Tempo(TempoEstimate),
}

impl AnalysisPayload {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisPayload::Onset(_) => AnalysisKind::Onset,
            AnalysisPayload::Pitch(_) => AnalysisKind::Pitch,
            AnalysisPayload::Tempo(_) => AnalysisKind::Tempo,
        }
    }
}

/// `{"token":1,"type":"onset","data":[..]}`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisResponse {
    pub token: u64,
    #[serde(flatten)]
    pub payload: AnalysisPayload,
}

/// Run one request synchronously on the calling thread.
pub fn run_request(config: &AnalysisConfig, request: &AnalysisRequest) -> AnalysisResponse {
    let samples = &request.buffer[..];
    let sr = request.sample_rate;

    let payload = match request.kind {
        AnalysisKind::Onset => {
            AnalysisPayload::Onset(OnsetDetector::new(config.onset.clone()).detect(samples, sr))
        }
        AnalysisKind::Pitch => {
            let yin = Yin::with_threshold(sr, config.pitch.threshold);
            AnalysisPayload::Pitch(track_pitch(
                samples,
                sr,
                config.pitch.hop_size,
                config.pitch.chunk_size,
                &yin,
            ))
        }
        AnalysisKind::Tempo => {
            let onsets = OnsetDetector::new(config.onset.clone()).detect(samples, sr);
            AnalysisPayload::Tempo(TempoEstimate {
                bpm: estimate_tempo(&onsets),
                onsets,
            })
        }
    };

    AnalysisResponse {
        token: request.token,
        payload,
    }
}

/// Handle to a background analysis thread
pub struct AnalysisWorker {
    name: &'static str,
    tx: Sender<AnalysisRequest>,
    rx: Receiver<AnalysisResponse>,
    /// Detached on drop: closing `tx` lets the thread finish its current run and exit
    _handle: JoinHandle<()>,
}

impl AnalysisWorker {
    pub fn spawn(name: &'static str, config: AnalysisConfig) -> Result<Self> {
        let (request_tx, request_rx) = std::sync::mpsc::channel::<AnalysisRequest>();
        let (result_tx, result_rx) = std::sync::mpsc::channel::<AnalysisResponse>();

        let handle = thread::Builder::new()
            .name(format!("analysis-{}", name))
            .spawn(move || worker_thread(name, request_rx, result_tx, config))?;

        log::info!("Analysis worker '{}' spawned", name);

        Ok(Self {
            name,
            tx: request_tx,
            rx: result_rx,
            _handle: handle,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Queue a request (non-blocking)
    pub fn post(&self, request: AnalysisRequest) -> Result<()> {
        self.tx
            .send(request)
            .map_err(|_| Error::WorkerDisconnected(self.name))
    }

    /// Try to receive a finished response (non-blocking)
    pub fn try_recv(&self) -> Option<AnalysisResponse> {
        match self.rx.try_recv() {
            Ok(response) => Some(response),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                log::error!("Analysis worker '{}' disconnected unexpectedly", self.name);
                None
            }
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<AnalysisResponse> {
        match self.rx.recv_timeout(timeout) {
            Ok(response) => Some(response),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                log::error!("Analysis worker '{}' disconnected unexpectedly", self.name);
                None
            }
        }
    }
}

fn worker_thread(
    name: &'static str,
    rx: Receiver<AnalysisRequest>,
    tx: Sender<AnalysisResponse>,
    config: AnalysisConfig,
) {
    log::debug!("Analysis worker '{}' started", name);

    while let Ok(request) = rx.recv() {
        log::debug!(
            "Worker '{}': {:?} request #{} ({} samples @ {}Hz)",
            name,
            request.kind,
            request.token,
            request.buffer.len(),
            request.sample_rate
        );
        let response = run_request(&config, &request);
        if tx.send(response).is_err() {
            break;
        }
    }

    log::debug!("Analysis worker '{}' shutting down", name);
}
