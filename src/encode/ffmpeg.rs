use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

/// Output settings for the encoder.
#[derive(Clone, Debug)]
pub struct EncodeOptions {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    pub bitrate: Option<String>,
    /// Mixed-down song to mux under the video.
    pub audio: Option<PathBuf>,
}

/// Streams raw RGBA frames into an ffmpeg child process.
pub struct FfmpegEncoder {
    child: Child,
    frame_bytes: usize,
}

impl FfmpegEncoder {
    pub fn new(output_path: &Path, options: &EncodeOptions) -> Result<Self> {
        let args = build_args(output_path, options);

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            options.width,
            options.height,
            options.fps,
            options.codec
        );

        Ok(Self {
            child,
            frame_bytes: (options.width * options.height * 4) as usize,
        })
    }

    pub fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        if rgba_pixels.len() != self.frame_bytes {
            anyhow::bail!(
                "Frame is {} bytes, encoder expects {}",
                rgba_pixels.len(),
                self.frame_bytes
            );
        }
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(rgba_pixels).context("Failed to write frame to ffmpeg")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        // Close stdin to signal EOF
        drop(self.child.stdin.take());

        let output = self.child.wait_with_output().context("Failed to wait for ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("FFmpeg encoding complete");
        Ok(())
    }
}

fn build_args(output_path: &Path, options: &EncodeOptions) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgba".into(),
        "-video_size".into(), format!("{}x{}", options.width, options.height),
        "-framerate".into(), options.fps.to_string(),
        "-i".into(), "pipe:0".into(),
    ];

    if let Some(ref audio) = options.audio {
        args.extend(["-i".into(), audio.to_string_lossy().into_owned()]);
    }

    args.extend([
        "-c:v".into(), options.codec.clone(),
        "-pix_fmt".into(), options.pix_fmt.clone(),
    ]);

    if let Some(ref br) = options.bitrate {
        args.extend(["-b:v".to_string(), br.clone()]);
    } else {
        args.extend(["-crf".to_string(), options.crf.to_string()]);
        args.extend(["-preset".to_string(), "medium".to_string()]);
    }

    if options.audio.is_some() {
        args.extend([
            "-c:a".into(), "aac".into(),
            "-b:a".into(), "192k".into(),
            "-shortest".into(),
        ]);
    }

    args.push(output_path.to_string_lossy().into_owned());
    args
}
