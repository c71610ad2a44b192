use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::asset::AudioAsset;
use crate::error::DecodeError;

/// Decode an in-memory encoded file (WAV, MP3, FLAC, OGG, AAC) into an [`AudioAsset`].
///
/// `extension` is only a probing hint.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<AudioAsset, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(DecodeError::Probe)?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.ok_or(DecodeError::UnknownSampleRate)?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(DecodeError::Codec)?;

    // sized from the first decoded buffer; codec params may omit the layout
    let mut channels: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(DecodeError::Codec(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::warn!("Skipping undecodable packet: {}", msg);
                continue;
            }
            Err(e) => return Err(DecodeError::Codec(e)),
        };

        let spec = *decoded.spec();
        let num_channels = spec.channels.count().max(1);
        let num_frames = decoded.frames();
        if num_frames == 0 {
            continue;
        }
        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        deinterleave(&mut channels, sample_buf.samples(), num_channels);
    }

    let asset = AudioAsset::from_channels(channels, sample_rate)?;

    log::info!(
        "Decoded audio: {} frames x {} ch, {}Hz, {:.1}s",
        asset.frames(),
        asset.num_channels(),
        sample_rate,
        asset.duration()
    );

    Ok(asset)
}

/// Append interleaved `samples` with a stride of `num_channels` to planar
/// `channels`, allocating them on first use.
fn deinterleave(channels: &mut Vec<Vec<f32>>, samples: &[f32], num_channels: usize) {
    if channels.is_empty() {
        *channels = vec![Vec::new(); num_channels];
    } else if channels.len() != num_channels {
        log::warn!(
            "Channel count changed mid-stream ({} -> {}), keeping {}",
            channels.len(),
            num_channels,
            channels.len()
        );
    }

    for frame in samples.chunks(num_channels) {
        for (ch, &s) in channels.iter_mut().zip(frame) {
            ch.push(s);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Encode interleaved 16-bit PCM as an in-memory WAV file.
    pub(crate) fn wav_bytes(samples: &[f32], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_stereo_wav() {
        let interleaved: Vec<f32> = (0..8000).flat_map(|i| [(i % 100) as f32 / 200.0, 0.0]).collect();
        let asset = decode_bytes(wav_bytes(&interleaved, 2, 8000), Some("wav")).unwrap();
        assert_eq!(asset.num_channels(), 2);
        assert_eq!(asset.sample_rate(), 8000);
        assert_eq!(asset.frames(), 8000);
        assert!(asset.channel(1).unwrap().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn deinterleave_uses_buffer_stride() {
        let mut channels = Vec::new();
        deinterleave(&mut channels, &[0.1, -0.1, 0.2, -0.2], 2);
        deinterleave(&mut channels, &[0.3, -0.3], 2);
        assert_eq!(channels, vec![vec![0.1, 0.2, 0.3], vec![-0.1, -0.2, -0.3]]);
    }

    #[test]
    fn garbage_is_a_probe_error() {
        let err = decode_bytes(b"definitely not audio".to_vec(), None).unwrap_err();
        assert!(matches!(err, DecodeError::Probe(_)));
    }

    #[test]
    fn empty_wav_is_rejected() {
        assert!(decode_bytes(wav_bytes(&[], 1, 44100), Some("wav")).is_err());
    }
}
