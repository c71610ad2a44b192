pub mod asset;
pub mod decode;

pub use asset::AudioAsset;
pub use decode::decode_bytes;
