use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use varispeed::config::PlaybackConfig;
use varispeed::engine::{PlaybackEngine, SoftwareGraph};
use varispeed::AudioAsset;

pub struct BounceOptions {
    pub speed: Option<f64>,
    pub volume: Option<f64>,
    pub start: f64,
    pub loop_region: Option<(f64, f64)>,
    pub seconds: Option<f64>,
}

/// Play `asset` through the engine on a software graph and record the mono
/// output to a 32-bit float WAV. Returns the number of frames written.
pub fn bounce(asset: AudioAsset, config: &PlaybackConfig, opts: &BounceOptions, output: &Path) -> Result<u64> {
    let sample_rate = config.sample_rate;
    let mut engine = PlaybackEngine::new(SoftwareGraph::new(sample_rate), config);
    engine.load_asset(asset);

    if let Some(speed) = opts.speed {
        engine.set_playback_speed(speed);
    }
    if let Some(volume) = opts.volume {
        engine.set_volume(volume);
    }
    if let Some((start, end)) = opts.loop_region {
        engine.set_loop(start, end);
    }
    engine.seek_to(opts.start);

    let seconds = match opts.seconds {
        Some(s) => s.max(0.0),
        None if engine.looping_enabled() => {
            anyhow::bail!("--seconds is required when bouncing a loop")
        }
        None => engine.duration() - engine.playback_position(),
    };
    let total_frames = (seconds * sample_rate as f64).round() as u64;

    log::info!(
        "Bouncing {:.2}s from {:.2}s at {}x (volume {:.2})",
        seconds,
        engine.playback_position(),
        engine.playback_speed(),
        engine.volume()
    );

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(output, spec)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let pb = ProgressBar::new(total_frames);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")?
            .progress_chars("=>-"),
    );

    let block = config.block_size.max(1) as u64;
    let mut written = 0u64;
    engine.play();

    while written < total_frames && engine.playing() {
        let frames = block.min(total_frames - written);
        let out = engine.graph_mut().render(frames as usize);
        for s in out {
            writer.write_sample(s)?;
        }
        written += frames;
        pb.set_position(written);

        let snapshot = engine.tick();
        if !snapshot.playing {
            log::debug!("Reached the end of the track at {:.3}s", snapshot.position);
        }
    }

    engine.stop();
    writer.finalize().context("Failed to finalize WAV output")?;
    pb.finish_and_clear();

    log::info!("Wrote {} frames to {}", written, output.display());
    Ok(written)
}
