//! Audio playback and analysis core: a transport state machine over a swappable
//! audio graph, plus onset, pitch and tempo analysis run on background workers.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod parameter;

pub use audio::AudioAsset;
pub use engine::PlaybackEngine;
pub use error::{DecodeError, Error, Result};
pub use parameter::Parameter;
