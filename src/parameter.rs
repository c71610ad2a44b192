use serde::Deserialize;

/// Bounded, steppable numeric range used by the speed and volume controls.
///
/// Holds only the descriptor, never the value itself. Every helper is a pure
/// transform; out-of-range input is clamped rather than rejected.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Parameter {
    pub default_value: f64,
    pub min: f64,
    pub max: f64,
    /// Step used by increment/decrement (hotkeys).
    pub step: f64,
    /// Step used by continuous controls (sliders).
    pub slider_step: f64,
}

impl Default for Parameter {
    fn default() -> Self {
        Self {
            default_value: 0.0,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            step: 1.0,
            slider_step: 0.01,
        }
    }
}

impl Parameter {
    pub fn new(min: f64, max: f64, step: f64) -> Self {
        Self {
            min,
            max,
            step,
            ..Self::default()
        }
    }

    pub fn with_default(mut self, default_value: f64) -> Self {
        self.default_value = default_value;
        self
    }

    pub fn with_slider_step(mut self, slider_step: f64) -> Self {
        self.slider_step = slider_step;
        self
    }

    /// Playback speed: 0.25x to 4x in 0.05 steps.
    pub fn speed() -> Self {
        Self::new(0.25, 4.0, 0.05).with_default(1.0)
    }

    /// Output gain: silent to +6 dB-ish in 0.1 steps.
    pub fn volume() -> Self {
        Self::new(0.0, 2.0, 0.1).with_default(1.0)
    }

    pub fn to_nearest_step(&self, v: f64) -> f64 {
        if self.step <= 0.0 || !self.step.is_finite() {
            return v;
        }
        (v / self.step).round() * self.step
    }

    pub fn increment(&self, v: f64) -> f64 {
        self.clamp(self.to_nearest_step((v + self.step).min(self.max)))
    }

    pub fn decrement(&self, v: f64) -> f64 {
        self.clamp(self.to_nearest_step((v - self.step).max(self.min)))
    }

    pub fn clamp(&self, v: f64) -> f64 {
        // max-then-min so a misconfigured (inverted) range never panics
        v.max(self.min).min(self.max)
    }

    /// `(min, max, step)` for a slider widget.
    pub fn slider_range(&self) -> (f64, f64, f64) {
        (self.min, self.max, self.slider_step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn defaults_are_unbounded() {
        let p = Parameter::default();
        assert_eq!(p.step, 1.0);
        assert_eq!(p.increment(1e12), 1e12 + 1.0);
        assert_eq!(p.decrement(-41.3), -42.0);
    }

    #[test]
    fn increment_rounds_and_clamps_at_max() {
        let p = Parameter::new(0.0, 2.0, 0.1);
        assert_abs_diff_eq!(p.increment(1.95), 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.increment(1.0), 1.1, epsilon = 1e-9);
    }

    #[test]
    fn repeated_increments_never_exceed_max() {
        for p in [Parameter::new(0.0, 2.0, 0.1), Parameter::new(0.0, 1.95, 0.1)] {
            let mut v = 0.0;
            for _ in 0..50 {
                v = p.increment(v);
                assert!(v <= p.max, "{} exceeded {}", v, p.max);
            }
            assert!(v > p.max - p.step);
        }
    }

    #[test]
    fn decrement_clamps_at_min() {
        let p = Parameter::volume();
        assert_abs_diff_eq!(p.decrement(0.04), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.decrement(-3.0), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.decrement(1.0), 0.9, epsilon = 1e-9);
    }

    #[test]
    fn to_nearest_step_snaps() {
        let p = Parameter::speed();
        assert_abs_diff_eq!(p.to_nearest_step(1.02), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.to_nearest_step(1.03), 1.05, epsilon = 1e-9);
    }

    #[test]
    fn slider_range_uses_slider_step() {
        let p = Parameter::new(0.0, 1.0, 0.25).with_slider_step(0.001);
        assert_eq!(p.slider_range(), (0.0, 1.0, 0.001));
    }
}
