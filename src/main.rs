mod audio;
mod cli;
mod config;
mod encode;
mod error;
mod render;
mod scene;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::PathBuf;

use audio::cache::FeatureCache;
use audio::extract::WindowedExtractor;
use audio::sampler::TimeSeriesSampler;
use cli::Cli;
use encode::ffmpeg::{EncodeOptions, FfmpegEncoder};
use render::canvas::Canvas;
use render::scene::SceneRenderer;
use scene::Scene;

const PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg} ({eta} remaining)";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect stemviz.toml / global config
    let config_path = cli
        .config
        .clone()
        .or_else(detect_config)
        .context("No project file found; pass --config or create stemviz.toml")?;
    let cfg = config::load_config(&config_path)?;
    log::info!("Loaded config from {}", config_path.display());

    // Merge: config values apply only when CLI is at its default
    if cli.width == config::default_width() { cli.width = cfg.output.width; }
    if cli.height == config::default_height() { cli.height = cfg.output.height; }
    if cli.fps == config::default_fps() { cli.fps = cfg.output.fps; }
    if cli.crf == config::default_crf() { cli.crf = cfg.output.crf; }
    if cli.codec == config::default_codec() { cli.codec = cfg.output.codec.clone(); }
    if cli.pix_fmt == config::default_pix_fmt() { cli.pix_fmt = cfg.output.pix_fmt.clone(); }
    if cli.duration.is_none() { cli.duration = cfg.output.duration; }
    if cli.audio.is_none() { cli.audio = cfg.output.audio.clone(); }

    if cli.fps == 0 {
        anyhow::bail!("--fps must be positive");
    }

    let stem_names = cfg.stem_names();
    let scene = Scene::from_config(&cfg.layers, &stem_names)?;

    log::info!("stemviz - stem-driven music visualizer");
    log::info!("Stems: {}", stem_names.join(", "));
    log::info!("Output: {}", cli.output.display());
    log::info!("Resolution: {}x{} @ {}fps", cli.width, cli.height, cli.fps);

    // 1. Analyze stems (cached next to each stem file)
    let cache = FeatureCache::new(cfg.cache.enabled && !cli.no_cache, cli.refresh_cache);
    let extractor = WindowedExtractor;

    let pb = ProgressBar::new(cfg.stems.len() as u64);
    pb.set_style(ProgressStyle::default_bar().template(PROGRESS_TEMPLATE)?.progress_chars("=>-"));
    pb.set_message("stems");

    let results: Vec<_> = cfg
        .stems
        .par_iter()
        .map(|stem| {
            let result = cache.load_or_compute(&stem.path, cli.fps, &extractor);
            pb.inc(1);
            result
        })
        .collect();
    pb.finish_and_clear();

    let mut samplers = Vec::with_capacity(results.len());
    let mut failed = 0;
    for (stem, result) in cfg.stems.iter().zip(results) {
        match result {
            Ok(features) => {
                let sampler = TimeSeriesSampler::new(features);
                log::info!(
                    "{}: {} frames ({:.1}s), {} spectrum bins",
                    stem.name,
                    sampler.frame_count(),
                    sampler.duration_s(),
                    sampler.spectrum_bins()
                );
                samplers.push(sampler);
            }
            Err(err) => {
                log::error!("Stem '{}' ({}): {}", stem.name, stem.path.display(), err);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} stems failed analysis", failed, cfg.stems.len());
    }

    if cli.analyze_only {
        log::info!("Analysis complete, skipping render");
        return Ok(());
    }

    // 2. Work out the video length
    let duration = cli
        .duration
        .unwrap_or_else(|| samplers.iter().map(TimeSeriesSampler::duration_s).fold(0.0, f64::max));
    let total_frames = video_frames(duration, cli.fps);
    log::info!("Total frames: {}, Duration: {:.1}s", total_frames, duration);

    // 3. Start FFmpeg encoder
    log::info!("Starting FFmpeg encoder...");
    let mut encoder = FfmpegEncoder::new(
        &cli.output,
        &EncodeOptions {
            width: cli.width,
            height: cli.height,
            fps: cli.fps,
            codec: cli.codec.clone(),
            pix_fmt: cli.pix_fmt.clone(),
            crf: cli.crf,
            bitrate: cli.bitrate.clone(),
            audio: cli.audio.clone(),
        },
    )?;

    // 4. Render loop
    let mut canvas = Canvas::new(cli.width, cli.height);
    let mut renderer = SceneRenderer::new(scene);

    let pb = ProgressBar::new(total_frames);
    pb.set_style(ProgressStyle::default_bar().template(PROGRESS_TEMPLATE)?.progress_chars("=>-"));
    pb.set_message("frames");

    for frame_idx in 0..total_frames {
        let time_s = frame_idx as f64 / cli.fps as f64;
        renderer.draw(&mut canvas, &samplers, time_s);
        encoder.write_frame(canvas.pixels())?;
        pb.set_position(frame_idx + 1);
    }

    pb.finish_with_message("Rendering complete");

    // 5. Finish encoding
    log::info!("Finishing encoding...");
    encoder.finish()?;

    log::info!("Done! Output: {}", cli.output.display());
    Ok(())
}

fn detect_config() -> Option<PathBuf> {
    let local = PathBuf::from("stemviz.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("stemviz").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("stemviz").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

/// Frames needed to cover `duration_s`, including a final partial frame.
fn video_frames(duration_s: f64, fps: u32) -> u64 {
    (duration_s * fps as f64).ceil().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_frames_rounds_partial_frame_up() {
        assert_eq!(video_frames(10.0, 30), 300);
        assert_eq!(video_frames(1.01, 30), 31);
        assert_eq!(video_frames(0.0, 30), 0);
    }
}
