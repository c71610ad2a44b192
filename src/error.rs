use thiserror::Error;

/// Failure to turn raw bytes into a usable [`AudioAsset`](crate::audio::AudioAsset).
///
/// Fatal for the load attempt only: whatever asset was loaded before stays loaded.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unrecognised audio format: {0}")]
    Probe(#[source] symphonia::core::errors::Error),

    #[error("no decodable audio track found")]
    NoTrack,

    #[error("audio track has no sample rate")]
    UnknownSampleRate,

    #[error("decoder failure: {0}")]
    Codec(#[source] symphonia::core::errors::Error),

    #[error("audio decoded to zero frames")]
    Empty,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),

    #[error("analysis worker '{0}' disconnected")]
    WorkerDisconnected(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
