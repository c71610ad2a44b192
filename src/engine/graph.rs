//! The rendering side of the engine.
//!
//! Topology is fixed: source → pitch-shift → gain → analyser → output. Sources
//! are one-shot: the engine creates a fresh one for every `play()` and stops it
//! on every pause, so a source never outlives the parameters it was started with.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::audio::AudioAsset;

/// Samples kept by the analyser for peak metering.
pub const ANALYSER_SIZE: usize = 2048;

pub type SourceId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphEvent {
    /// A source stopped producing audio, either because it ran off the end of
    /// its buffer or because it was stopped explicitly.
    SourceEnded(SourceId),
}

/// Everything the playback engine needs from an audio backend.
pub trait AudioGraph {
    /// Monotonic clock in seconds.
    fn now(&self) -> f64;

    /// New, not yet started source bound to `asset`, resampled by `rate`.
    fn create_source(&mut self, asset: Arc<AudioAsset>, rate: f64) -> SourceId;

    /// Loop `[start, end)` (buffer-time seconds) on a created source.
    fn set_source_loop(&mut self, id: SourceId, start: f64, end: f64);

    /// Start at `offset` buffer-time seconds.
    fn start_source(&mut self, id: SourceId, offset: f64);

    /// Stop a source. Emits `SourceEnded` if it was still running.
    fn stop_source(&mut self, id: SourceId);

    /// Pitch ratio for the pitch-shift stage (1.0 = unchanged).
    fn set_pitch(&mut self, ratio: f64);

    fn set_gain(&mut self, gain: f64);

    /// Most recent analyser window (time domain).
    fn time_domain(&self) -> Vec<f32>;

    /// Drain completion events raised since the last call.
    fn drain_events(&mut self) -> Vec<GraphEvent>;
}

/// Black-box pitch/time node: pitch control plus real-time processing.
pub trait PitchShifter: Send {
    fn set_pitch(&mut self, ratio: f64);
    fn pitch(&self) -> f64;
    fn process(&mut self, block: &mut [f32]);
}

/// Records the requested ratio and leaves audio untouched.
#[derive(Debug)]
pub struct Passthrough {
    ratio: f64,
}

impl Default for Passthrough {
    fn default() -> Self {
        Self { ratio: 1.0 }
    }
}

impl PitchShifter for Passthrough {
    fn set_pitch(&mut self, ratio: f64) {
        self.ratio = ratio;
    }

    fn pitch(&self) -> f64 {
        self.ratio
    }

    fn process(&mut self, _block: &mut [f32]) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SourceState {
    Created,
    Running,
    Finished,
}

struct Source {
    id: SourceId,
    asset: Arc<AudioAsset>,
    /// Buffer frames advanced per output frame.
    step: f64,
    /// Loop bounds in buffer frames.
    loop_frames: Option<(f64, f64)>,
    cursor: f64,
    state: SourceState,
}

impl Source {
    fn next_sample(&mut self) -> Option<f32> {
        if let Some((start, end)) = self.loop_frames {
            let len = end - start;
            if len > 0.0 && self.cursor >= end {
                self.cursor = start + (self.cursor - start) % len;
            }
        }

        let frames = self.asset.frames();
        if self.cursor >= frames as f64 {
            return None;
        }

        // linear interpolation between neighbouring frames
        let idx = self.cursor as usize;
        let frac = (self.cursor - idx as f64) as f32;
        let a = self.asset.mono_frame(idx);
        let b = if idx + 1 < frames { self.asset.mono_frame(idx + 1) } else { a };
        self.cursor += self.step;
        Some(a + (b - a) * frac)
    }
}

/// Pull-based software renderer. The clock advances only as frames are
/// rendered, which keeps it deterministic for offline bounces and tests.
pub struct SoftwareGraph<P: PitchShifter = Passthrough> {
    sample_rate: u32,
    frames_rendered: u64,
    next_id: SourceId,
    sources: Vec<Source>,
    pitch_shift: P,
    gain: f32,
    analyser: VecDeque<f32>,
    events: Vec<GraphEvent>,
}

impl SoftwareGraph<Passthrough> {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_pitch_shifter(sample_rate, Passthrough::default())
    }
}

impl<P: PitchShifter> SoftwareGraph<P> {
    pub fn with_pitch_shifter(sample_rate: u32, pitch_shift: P) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frames_rendered: 0,
            next_id: 1,
            sources: Vec::new(),
            pitch_shift,
            gain: 1.0,
            analyser: VecDeque::with_capacity(ANALYSER_SIZE),
            events: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn pitch_shifter(&self) -> &P {
        &self.pitch_shift
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Number of sources currently producing audio.
    pub fn running_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.state == SourceState::Running).count()
    }

    /// Render `frames` mono output frames and advance the clock.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames];

        for source in self.sources.iter_mut().filter(|s| s.state == SourceState::Running) {
            for slot in out.iter_mut() {
                match source.next_sample() {
                    Some(s) => *slot += s,
                    None => {
                        source.state = SourceState::Finished;
                        self.events.push(GraphEvent::SourceEnded(source.id));
                        break;
                    }
                }
            }
        }
        self.sources.retain(|s| s.state != SourceState::Finished);

        self.pitch_shift.process(&mut out);
        for s in out.iter_mut() {
            *s *= self.gain;
        }

        for &s in out.iter().skip(frames.saturating_sub(ANALYSER_SIZE)) {
            if self.analyser.len() == ANALYSER_SIZE {
                self.analyser.pop_front();
            }
            self.analyser.push_back(s);
        }

        self.frames_rendered += frames as u64;
        out
    }

    /// Render and discard `seconds` of output.
    pub fn advance(&mut self, seconds: f64) {
        let frames = (seconds * self.sample_rate as f64).round() as usize;
        self.render(frames);
    }

    fn source_mut(&mut self, id: SourceId) -> Option<&mut Source> {
        self.sources.iter_mut().find(|s| s.id == id)
    }
}

impl<P: PitchShifter> AudioGraph for SoftwareGraph<P> {
    fn now(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    fn create_source(&mut self, asset: Arc<AudioAsset>, rate: f64) -> SourceId {
        let id = self.next_id;
        self.next_id += 1;
        let step = rate * asset.sample_rate() as f64 / self.sample_rate as f64;
        self.sources.push(Source {
            id,
            asset,
            step,
            loop_frames: None,
            cursor: 0.0,
            state: SourceState::Created,
        });
        id
    }

    fn set_source_loop(&mut self, id: SourceId, start: f64, end: f64) {
        if let Some(source) = self.source_mut(id) {
            let sr = source.asset.sample_rate() as f64;
            source.loop_frames = Some((start * sr, end * sr));
        }
    }

    fn start_source(&mut self, id: SourceId, offset: f64) {
        if let Some(source) = self.source_mut(id) {
            if source.state == SourceState::Created {
                source.cursor = (offset * source.asset.sample_rate() as f64).max(0.0);
                source.state = SourceState::Running;
            }
        }
    }

    fn stop_source(&mut self, id: SourceId) {
        let Some(pos) = self.sources.iter().position(|s| s.id == id) else {
            return;
        };
        let source = self.sources.remove(pos);
        if source.state == SourceState::Running {
            self.events.push(GraphEvent::SourceEnded(id));
        }
    }

    fn set_pitch(&mut self, ratio: f64) {
        self.pitch_shift.set_pitch(ratio);
    }

    fn set_gain(&mut self, gain: f64) {
        self.gain = gain as f32;
    }

    fn time_domain(&self) -> Vec<f32> {
        self.analyser.iter().copied().collect()
    }

    fn drain_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ramp(frames: usize, sample_rate: u32) -> Arc<AudioAsset> {
        let samples = (0..frames).map(|i| i as f32 / frames as f32).collect();
        Arc::new(AudioAsset::from_mono(samples, sample_rate).unwrap())
    }

    #[test]
    fn clock_follows_rendered_frames() {
        let mut graph = SoftwareGraph::new(1000);
        assert_eq!(graph.now(), 0.0);
        graph.render(250);
        assert_abs_diff_eq!(graph.now(), 0.25);
        graph.advance(1.0);
        assert_abs_diff_eq!(graph.now(), 1.25);
    }

    #[test]
    fn source_plays_to_end_and_reports_once() {
        let mut graph = SoftwareGraph::new(1000);
        let id = graph.create_source(ramp(500, 1000), 1.0);
        graph.start_source(id, 0.0);

        let out = graph.render(400);
        assert_abs_diff_eq!(out[100], 0.2);
        assert!(graph.drain_events().is_empty());

        let out = graph.render(400);
        assert_eq!(out[150], 0.0);
        assert_eq!(graph.drain_events(), vec![GraphEvent::SourceEnded(id)]);
        assert_eq!(graph.running_sources(), 0);

        // stopping a finished source is silent
        graph.stop_source(id);
        assert!(graph.drain_events().is_empty());
    }

    #[test]
    fn rate_and_offset_scale_the_cursor() {
        let mut graph = SoftwareGraph::new(1000);
        let id = graph.create_source(ramp(1000, 1000), 2.0);
        graph.start_source(id, 0.25);
        let out = graph.render(10);
        assert_abs_diff_eq!(out[0], 0.25);
        assert_abs_diff_eq!(out[5], 0.26, epsilon = 1e-6);
    }

    #[test]
    fn looping_source_never_ends() {
        let mut graph = SoftwareGraph::new(1000);
        let id = graph.create_source(ramp(1000, 1000), 1.0);
        graph.set_source_loop(id, 0.2, 0.4);
        graph.start_source(id, 0.0);
        graph.render(5000);
        assert!(graph.drain_events().is_empty());
        let out = graph.render(1);
        assert!(out[0] >= 0.2 && out[0] < 0.4);
    }

    #[test]
    fn explicit_stop_reports_running_source() {
        let mut graph = SoftwareGraph::new(1000);
        let created = graph.create_source(ramp(100, 1000), 1.0);
        graph.stop_source(created);
        assert!(graph.drain_events().is_empty());

        let running = graph.create_source(ramp(100, 1000), 1.0);
        graph.start_source(running, 0.0);
        graph.stop_source(running);
        assert_eq!(graph.drain_events(), vec![GraphEvent::SourceEnded(running)]);
    }

    #[test]
    fn gain_and_analyser() {
        let mut graph = SoftwareGraph::new(1000);
        graph.set_gain(0.5);
        let id = graph.create_source(Arc::new(AudioAsset::from_mono(vec![0.8; 100], 1000).unwrap()), 1.0);
        graph.start_source(id, 0.0);
        graph.render(50);
        let window = graph.time_domain();
        assert_eq!(window.len(), 50);
        assert_abs_diff_eq!(window[10], 0.4);
        graph.set_pitch(0.5);
        assert_eq!(graph.pitch_shifter().pitch(), 0.5);
    }
}
