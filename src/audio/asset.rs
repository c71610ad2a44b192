use crate::error::DecodeError;

/// Immutable decoded PCM buffer (planar channels).
#[derive(Clone, Debug)]
pub struct AudioAsset {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioAsset {
    /// Build from planar channel data. All channels are truncated to the
    /// shortest one; zero frames or a zero sample rate is rejected.
    pub fn from_channels(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, DecodeError> {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        if frames == 0 || sample_rate == 0 {
            return Err(DecodeError::Empty);
        }
        for ch in &mut channels {
            ch.truncate(frames);
        }
        Ok(Self { channels, sample_rate })
    }

    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self, DecodeError> {
        Self::from_channels(vec![samples], sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    /// Length in buffer-time seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, idx: usize) -> Option<&[f32]> {
        self.channels.get(idx).map(Vec::as_slice)
    }

    /// Average of all channels at one frame.
    pub fn mono_frame(&self, frame: usize) -> f32 {
        let sum: f32 = self.channels.iter().map(|ch| ch[frame]).sum();
        sum / self.channels.len() as f32
    }

    /// Downmix to mono, as fed to the analysis pipeline.
    pub fn mono(&self) -> Vec<f32> {
        if self.channels.len() == 1 {
            return self.channels[0].clone();
        }
        (0..self.frames()).map(|i| self.mono_frame(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rejects_empty() {
        assert!(matches!(AudioAsset::from_mono(vec![], 44100), Err(DecodeError::Empty)));
        assert!(matches!(AudioAsset::from_channels(vec![], 44100), Err(DecodeError::Empty)));
        assert!(matches!(AudioAsset::from_mono(vec![0.0; 10], 0), Err(DecodeError::Empty)));
    }

    #[test]
    fn duration_and_downmix() {
        let asset = AudioAsset::from_channels(vec![vec![1.0; 22050], vec![0.0; 22051]], 44100).unwrap();
        assert_eq!(asset.frames(), 22050);
        assert_abs_diff_eq!(asset.duration(), 0.5);
        let mono = asset.mono();
        assert_eq!(mono.len(), 22050);
        assert_abs_diff_eq!(mono[100], 0.5);
    }
}
