pub mod graph;
pub mod player;
pub mod state;
pub mod ticker;

pub use graph::{AudioGraph, GraphEvent, Passthrough, PitchShifter, SoftwareGraph, SourceId};
pub use player::{PlaybackEngine, PositionSnapshot};
pub use state::{LoopRegion, PlaybackState, Transport};
pub use ticker::Ticker;
