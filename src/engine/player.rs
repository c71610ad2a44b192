use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::graph::{AudioGraph, GraphEvent, SourceId};
use super::state::{self, LoopRegion, PlaybackState, Transport};
use super::ticker::Ticker;
use crate::audio::{decode_bytes, AudioAsset};
use crate::config::PlaybackConfig;
use crate::error::Result;
use crate::parameter::Parameter;

/// What a position tick publishes to observers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PositionSnapshot {
    /// Playback-time seconds.
    pub position: f64,
    /// Playback-time seconds.
    pub duration: f64,
    pub playing: bool,
    pub looping: bool,
    pub peak: f32,
}

/// Transport state machine over an [`AudioGraph`].
///
/// Owns the loaded asset, the playback state and the graph. Every live mutation goes
/// through [`PlaybackEngine::do_during_playback`]: the running source is torn down and
/// a fresh one is started with the new parameters.
pub struct PlaybackEngine<G: AudioGraph> {
    graph: G,
    asset: Option<Arc<AudioAsset>>,
    state: PlaybackState,
    source: Option<SourceId>,
    /// Swallow exactly one completion event (the one caused by an internal restart).
    suppress_ended: bool,
    ticker: Option<Ticker>,
    tick_interval: Duration,
    speed: Parameter,
    volume: Parameter,
}

impl<G: AudioGraph> PlaybackEngine<G> {
    pub fn new(mut graph: G, config: &PlaybackConfig) -> Self {
        let volume = config.volume.clamp(config.volume.default_value);
        graph.set_gain(volume);
        graph.set_pitch(1.0);

        Self {
            graph,
            asset: None,
            state: PlaybackState {
                volume,
                ..PlaybackState::default()
            },
            source: None,
            suppress_ended: false,
            ticker: None,
            tick_interval: config.tick_interval(),
            speed: config.speed,
            volume: config.volume,
        }
    }

    /// Decode `bytes` and make the result the current asset. On failure the
    /// previously loaded asset (if any) stays untouched.
    pub fn load_audio(&mut self, bytes: Vec<u8>, extension: Option<&str>) -> Result<()> {
        let asset = decode_bytes(bytes, extension)?;
        self.load_asset(asset);
        Ok(())
    }

    /// Replace the current asset. Transport and loop state start over; speed
    /// and volume carry across tracks.
    pub fn load_asset(&mut self, asset: impl Into<Arc<AudioAsset>>) {
        let asset = asset.into();
        self.reset_track_state();
        log::info!(
            "Loaded asset: {:.2}s, {} ch @ {}Hz",
            asset.duration(),
            asset.num_channels(),
            asset.sample_rate()
        );
        self.asset = Some(asset);
    }

    pub fn clear_audio(&mut self) {
        self.reset_track_state();
        self.asset = None;
    }

    fn reset_track_state(&mut self) {
        self.stop();
        self.state.loop_region = None;
        self.state.loop_enabled = false;
    }

    pub fn asset(&self) -> Option<&Arc<AudioAsset>> {
        self.asset.as_ref()
    }

    pub fn play(&mut self) {
        if self.state.is_playing() {
            return;
        }
        let Some(asset) = self.asset.clone() else {
            return;
        };

        let rate = self.state.playback_rate;
        let id = self.graph.create_source(asset, rate);
        if let Some(region) = self.state.active_loop() {
            let region = region.to_buffer_time(rate);
            self.graph.set_source_loop(id, region.start, region.end);
        }

        self.state.start_time = self.graph.now();
        self.graph.start_source(id, self.state.offset * rate);
        self.source = Some(id);
        self.state.transport = Transport::Playing;
        self.start_clock();

        log::debug!("play: source {} at {:.3}s (rate {})", id, self.state.offset, rate);
    }

    pub fn pause(&mut self) {
        if !self.state.is_playing() {
            return;
        }

        self.state.offset = self.playback_position();
        if let Some(id) = self.source.take() {
            self.graph.stop_source(id);
        }
        self.state.transport = Transport::Paused;
        self.stop_clock();

        log::debug!("pause at {:.3}s", self.state.offset);
    }

    pub fn stop(&mut self) {
        if let Some(id) = self.source.take() {
            self.graph.stop_source(id);
        }
        self.state.offset = 0.0;
        self.state.transport = Transport::Stopped;
        self.stop_clock();
    }

    /// Move the idle playhead. A stopped engine becomes paused once it holds a
    /// position other than the start.
    fn set_offset(&mut self, offset: f64) {
        self.state.offset = offset;
        if self.state.transport == Transport::Stopped && offset != 0.0 {
            self.state.transport = Transport::Paused;
        }
    }

    pub fn toggle_play(&mut self) {
        if self.state.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Run `f` against a quiesced engine: pause if playing (suppressing the
    /// completion that pause causes), apply `f`, then resume.
    pub fn do_during_playback<F: FnOnce(&mut Self)>(&mut self, f: F) {
        let was_playing = self.state.is_playing();
        if was_playing {
            self.suppress_ended = true;
            self.pause();
        }
        f(self);
        if was_playing {
            self.play();
        }
    }

    /// Jump to `time` (playback seconds), clamped to the track or, while looping,
    /// to the loop region.
    pub fn seek_to(&mut self, time: f64) {
        if self.asset.is_none() {
            return;
        }
        let target = match self.state.active_loop() {
            Some(region) => region.clamp(time),
            None => time.max(0.0).min(self.duration()),
        };
        self.do_during_playback(|engine| engine.set_offset(target));
    }

    pub fn seek_by(&mut self, delta: f64) {
        self.seek_to(self.playback_position() + delta);
    }

    /// Change speed while keeping the absolute buffer position, and compensate
    /// pitch so it is perceived unchanged.
    pub fn set_playback_speed(&mut self, rate: f64) {
        if !rate.is_finite() || rate <= 0.0 {
            log::warn!("Ignoring invalid playback speed {}", rate);
            return;
        }

        let captured = self.buffer_position();
        self.do_during_playback(|engine| {
            engine.state.playback_rate = rate;
            engine.set_offset(captured / rate);
        });
        self.graph.set_pitch(1.0 / rate);
    }

    pub fn increase_speed(&mut self) {
        self.set_playback_speed(self.speed.increment(self.state.playback_rate));
    }

    pub fn decrease_speed(&mut self) {
        self.set_playback_speed(self.speed.decrement(self.state.playback_rate));
    }

    pub fn set_volume(&mut self, volume: f64) {
        let volume = self.volume.clamp(volume);
        self.state.volume = volume;
        self.graph.set_gain(volume);
    }

    pub fn increase_volume(&mut self) {
        self.set_volume(self.volume.increment(self.state.volume));
    }

    pub fn decrease_volume(&mut self) {
        self.set_volume(self.volume.decrement(self.state.volume));
    }

    /// Set and enable a loop, moving the playhead to its start.
    pub fn set_loop(&mut self, start: f64, end: f64) {
        self.do_during_playback(|engine| {
            engine.state.loop_region = Some(LoopRegion::new(start, end));
            engine.state.loop_enabled = true;
            engine.set_offset(start);
        });
    }

    /// Replace the loop bounds. Takes effect immediately only while looping is
    /// enabled; otherwise the region is stored for later.
    pub fn update_loop(&mut self, start: f64, end: f64) {
        let region = LoopRegion::new(start, end);
        if self.state.loop_enabled {
            self.do_during_playback(|engine| engine.state.loop_region = Some(region));
        } else {
            self.state.loop_region = Some(region);
        }
    }

    pub fn clear_loop(&mut self) {
        self.do_during_playback(|engine| {
            engine.state.loop_region = None;
            engine.state.loop_enabled = false;
        });
    }

    pub fn toggle_looping(&mut self) {
        self.do_during_playback(|engine| engine.state.loop_enabled = !engine.state.loop_enabled);
    }

    /// Transition function for graph notifications.
    pub fn handle_event(&mut self, event: GraphEvent) {
        match event {
            GraphEvent::SourceEnded(id) => {
                if self.suppress_ended {
                    self.suppress_ended = false;
                    log::debug!("Suppressed completion of source {}", id);
                    return;
                }
                if self.state.is_playing() && self.source == Some(id) {
                    log::debug!("Source {} reached the end of the buffer", id);
                    // freeze at the end rather than rewinding
                    self.pause();
                }
            }
        }
    }

    /// Process pending graph events and sample the position.
    pub fn tick(&mut self) -> PositionSnapshot {
        for event in self.graph.drain_events() {
            self.handle_event(event);
        }
        self.snapshot()
    }

    /// Like [`tick`](Self::tick), but only yields a snapshot when the position
    /// ticker fired or the transport changed.
    pub fn poll(&mut self) -> Option<PositionSnapshot> {
        let due = self.ticker.as_ref().is_some_and(|t| t.take_due());
        let before = self.state.transport;
        for event in self.graph.drain_events() {
            self.handle_event(event);
        }
        (due || self.state.transport != before).then(|| self.snapshot())
    }

    pub fn is_clock_running(&self) -> bool {
        self.ticker.as_ref().is_some_and(Ticker::is_running)
    }

    fn start_clock(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        match Ticker::start(self.tick_interval) {
            Ok(ticker) => self.ticker = Some(ticker),
            Err(e) => log::warn!("Failed to start position ticker: {}", e),
        }
    }

    fn stop_clock(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }

    fn buffer_duration(&self) -> f64 {
        self.asset.as_ref().map_or(0.0, |a| a.duration())
    }

    /// Track length in playback time.
    pub fn duration(&self) -> f64 {
        self.buffer_duration() / self.state.playback_rate
    }

    pub fn buffer_position(&self) -> f64 {
        if self.asset.is_none() {
            return 0.0;
        }
        state::buffer_position(&self.state, self.graph.now(), self.buffer_duration())
    }

    pub fn playback_position(&self) -> f64 {
        self.buffer_position() / self.state.playback_rate
    }

    /// Absolute peak of the latest analyser window; 0 when not playing.
    pub fn peak(&self) -> f32 {
        if !self.state.is_playing() {
            return 0.0;
        }
        self.graph
            .time_domain()
            .iter()
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    pub fn snapshot(&self) -> PositionSnapshot {
        PositionSnapshot {
            position: self.playback_position(),
            duration: self.duration(),
            playing: self.state.is_playing(),
            looping: self.state.loop_enabled,
            peak: self.peak(),
        }
    }

    pub fn playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn transport(&self) -> Transport {
        self.state.transport
    }

    pub fn playback_speed(&self) -> f64 {
        self.state.playback_rate
    }

    pub fn volume(&self) -> f64 {
        self.state.volume
    }

    pub fn loop_region(&self) -> Option<LoopRegion> {
        self.state.loop_region
    }

    pub fn looping_enabled(&self) -> bool {
        self.state.loop_enabled
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }
}
