//! Plain playback state plus the pure functions that derive positions from it.
//!
//! Two time bases never mix here:
//! - buffer time: seconds of decoded audio consumed
//! - playback time: seconds as heard, `buffer = playback × rate`
//!
//! `offset`, loop bounds and everything external are playback time. Conversions
//! always go through the current `playback_rate`.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Transport {
    Stopped,
    Playing,
    /// Like `Stopped`, but `offset` is kept.
    Paused,
}

/// Loop bounds in playback-time seconds. Not validated: `end <= start` is a
/// degenerate region that never folds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LoopRegion {
    pub start: f64,
    pub end: f64,
}

impl LoopRegion {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_degenerate(&self) -> bool {
        self.len() <= 0.0
    }

    /// Same region expressed in buffer time.
    pub fn to_buffer_time(&self, rate: f64) -> LoopRegion {
        LoopRegion::new(self.start * rate, self.end * rate)
    }

    /// Map a position at or past `end` back into `[start, end)`. Positions
    /// before `start` pass through, as do all positions of a degenerate region.
    pub fn fold(&self, pos: f64) -> f64 {
        let len = self.len();
        if len <= 0.0 || pos < self.end {
            return pos;
        }
        self.start + (pos - self.start) % len
    }

    /// Clamp into `[start, end]`; an inverted region resolves to `end`.
    pub fn clamp(&self, pos: f64) -> f64 {
        pos.max(self.start).min(self.end)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlaybackState {
    pub transport: Transport,
    /// Playback-time anchor: the paused position, or where the current source started.
    pub offset: f64,
    /// Clock time of the last `play()`.
    pub start_time: f64,
    pub playback_rate: f64,
    pub volume: f64,
    pub loop_region: Option<LoopRegion>,
    pub loop_enabled: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            transport: Transport::Stopped,
            offset: 0.0,
            start_time: 0.0,
            playback_rate: 1.0,
            volume: 1.0,
            loop_region: None,
            loop_enabled: false,
        }
    }
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        self.transport == Transport::Playing
    }

    /// The loop region, if looping is switched on and a region is set.
    pub fn active_loop(&self) -> Option<LoopRegion> {
        self.loop_region.filter(|_| self.loop_enabled)
    }
}

/// Current position in buffer time, clamped to `[0, buffer_duration]`.
pub fn buffer_position(state: &PlaybackState, now: f64, buffer_duration: f64) -> f64 {
    let rate = state.playback_rate;
    let mut pos = state.offset * rate;

    if state.is_playing() {
        pos += (now - state.start_time) * rate;
        if let Some(region) = state.active_loop() {
            pos = region.to_buffer_time(rate).fold(pos);
        }
    }

    pos.max(0.0).min(buffer_duration.max(0.0))
}

/// Current position in playback time.
pub fn playback_position(state: &PlaybackState, now: f64, buffer_duration: f64) -> f64 {
    buffer_position(state, now, buffer_duration) / state.playback_rate
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn playing(offset: f64, rate: f64) -> PlaybackState {
        PlaybackState {
            transport: Transport::Playing,
            offset,
            start_time: 10.0,
            playback_rate: rate,
            ..PlaybackState::default()
        }
    }

    #[test]
    fn idle_position_is_offset_times_rate() {
        for rate in [0.25, 0.5, 1.0, 1.5, 3.0] {
            for offset in [0.0, 1.0, 7.5] {
                let state = PlaybackState {
                    transport: Transport::Paused,
                    offset,
                    playback_rate: rate,
                    ..PlaybackState::default()
                };
                assert_abs_diff_eq!(buffer_position(&state, 123.0, 100.0), offset * rate);
                assert_abs_diff_eq!(playback_position(&state, 123.0, 100.0), offset, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn playing_position_advances_with_rate() {
        let state = playing(1.0, 2.0);
        // (1.0 + 0.5) * 2.0
        assert_abs_diff_eq!(buffer_position(&state, 10.5, 100.0), 3.0);
    }

    #[test]
    fn position_clamps_to_buffer() {
        let state = playing(0.0, 1.0);
        assert_abs_diff_eq!(buffer_position(&state, 60.0, 4.0), 4.0);
        assert_abs_diff_eq!(buffer_position(&state, 0.0, 4.0), 0.0);
    }

    #[test]
    fn loop_folding() {
        let mut state = playing(0.0, 1.0);
        state.loop_region = Some(LoopRegion::new(2.0, 5.0));
        state.loop_enabled = true;

        assert_abs_diff_eq!(buffer_position(&state, 14.0, 100.0), 4.0);
        assert_abs_diff_eq!(buffer_position(&state, 15.0, 100.0), 2.0);
        assert_abs_diff_eq!(buffer_position(&state, 16.0, 100.0), 3.0);
        assert_abs_diff_eq!(buffer_position(&state, 19.5, 100.0), 3.5);

        state.loop_enabled = false;
        assert_abs_diff_eq!(buffer_position(&state, 16.0, 100.0), 6.0);
    }

    #[test]
    fn degenerate_loop_does_not_fold() {
        let mut state = playing(0.0, 1.0);
        state.loop_region = Some(LoopRegion::new(5.0, 2.0));
        state.loop_enabled = true;
        assert_abs_diff_eq!(buffer_position(&state, 17.0, 100.0), 7.0);

        state.loop_region = Some(LoopRegion::new(3.0, 3.0));
        assert_abs_diff_eq!(buffer_position(&state, 17.0, 100.0), 7.0);
    }

    #[test]
    fn loop_folds_in_buffer_time() {
        let mut state = playing(0.0, 2.0);
        // playback 1..2 → buffer 2..4
        state.loop_region = Some(LoopRegion::new(1.0, 2.0));
        state.loop_enabled = true;
        // buffer 5.0 → 2 + (3 % 2) = 3.0
        assert_abs_diff_eq!(buffer_position(&state, 12.5, 100.0), 3.0);
        assert_abs_diff_eq!(playback_position(&state, 12.5, 100.0), 1.5);
    }

    #[test]
    fn region_clamp_never_panics() {
        assert_eq!(LoopRegion::new(2.0, 5.0).clamp(9.0), 5.0);
        assert_eq!(LoopRegion::new(2.0, 5.0).clamp(-1.0), 2.0);
        assert_eq!(LoopRegion::new(5.0, 2.0).clamp(3.0), 2.0);
    }
}
