mod bounce;
mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use cli::{Cli, Command};
use varispeed::analysis::AnalysisCoordinator;
use varispeed::audio::decode_bytes;
use varispeed::config::{self, Config};
use varispeed::AudioAsset;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Command::Analyze {
            input,
            kind,
            output,
            timeout,
        } => {
            let asset = read_audio(&input)?;
            let started = Instant::now();

            let mut coordinator = AnalysisCoordinator::new(config.analysis.clone())?;
            coordinator.analyze(&asset, &kind.kinds())?;

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::default_spinner().template("{spinner} {msg} [{elapsed}]")?);
            spinner.set_message(format!("Analyzing {}", input.display()));
            spinner.enable_steady_tick(Duration::from_millis(100));

            let finished = coordinator.wait(Duration::from_secs(timeout));
            spinner.finish_and_clear();
            if !finished {
                anyhow::bail!("Analysis did not finish within {}s", timeout);
            }
            log::info!("Analysis took {:.2?}", started.elapsed());

            let results = coordinator.results();
            if let Some(bpm) = results.bpm {
                log::info!("Tempo: {:.1} BPM", bpm);
            }
            let json = serde_json::to_string_pretty(results)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    log::info!("Results written to {}", path.display());
                }
                None => println!("{}", json),
            }
        }
        Command::Bounce {
            input,
            output,
            speed,
            volume,
            start,
            loop_start,
            loop_end,
            seconds,
        } => {
            let asset = read_audio(&input)?;
            let opts = bounce::BounceOptions {
                speed,
                volume,
                start,
                loop_region: loop_start.zip(loop_end),
                seconds,
            };
            bounce::bounce(asset, &config.playback, &opts, &output)?;
        }
    }

    Ok(())
}

/// Explicit `--config`, else `varispeed.toml` in the working directory, else the global config.
fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        let cfg = config::load_config(path)?;
        log::info!("Loaded config from {}", path.display());
        return Ok(cfg);
    }

    let discovered = discover_config();
    if let Some(ref path) = discovered {
        match config::load_config(path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                return Ok(cfg);
            }
            Err(err) => log::warn!("{:#}", err),
        }
    }
    Ok(Config::default())
}

fn discover_config() -> Option<PathBuf> {
    let local = PathBuf::from("varispeed.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("varispeed").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("varispeed").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

fn read_audio(path: &Path) -> Result<AudioAsset> {
    if !path.exists() {
        anyhow::bail!("Input file not found: {}", path.display());
    }
    log::info!("Decoding {}", path.display());
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let extension = path.extension().and_then(|e| e.to_str());
    let asset = decode_bytes(bytes, extension)
        .with_context(|| format!("Failed to decode {}", path.display()))?;
    Ok(asset)
}
