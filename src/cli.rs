use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stemviz", about = "Render a video driven by the loudness of a song's stems")]
pub struct Cli {
    /// Project file (TOML). Defaults to ./stemviz.toml or the user config.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output video file
    #[arg(short, long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// Video width in pixels
    #[arg(long, default_value_t = 1920)]
    pub width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = 1080)]
    pub height: u32,

    /// Frames per second (also the analysis frame rate)
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// H.264 CRF quality (0-51, lower = better). Ignored when --bitrate is set.
    #[arg(long, default_value_t = 25)]
    pub crf: u32,

    /// Video bitrate (e.g. 2400k, 5M). When set, uses -b:v instead of -crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// Video length in seconds (defaults to the longest stem)
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Mixed-down audio to mux into the video
    #[arg(short, long)]
    pub audio: Option<PathBuf>,

    /// Analyze without reading or writing feature caches
    #[arg(long)]
    pub no_cache: bool,

    /// Recompute features and overwrite existing caches
    #[arg(long)]
    pub refresh_cache: bool,

    /// Analyze and cache stems, then exit without rendering
    #[arg(long)]
    pub analyze_only: bool,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,
}
