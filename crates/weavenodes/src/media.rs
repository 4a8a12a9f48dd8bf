//! ffmpeg/ffprobe backed media transforms.

use crate::config::{ImageLimits, ServiceConfig};
use crate::images::{fetch_error, is_http_url, parse_data_url, read_capped};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use weavecore::services::{CropParams, MediaTransform};
use weavecore::ServiceError;

/// Pixel rectangle handed to ffmpeg's crop filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Converts a percent crop into pixels, clamped inside a `width` x `height` image.
///
/// The origin always lands on a pixel of the image, so the result is at least 1x1.
pub fn crop_rect(params: CropParams, width: u32, height: u32) -> CropRect {
    let scale = |percent: f64, dim: u32| (percent / 100.0 * dim as f64).round();
    let clamp = |value: f64, lo: f64, hi: f64| value.max(lo).min(hi.max(lo)) as u32;

    let x = clamp(scale(params.x, width), 0.0, width.saturating_sub(1) as f64);
    let y = clamp(scale(params.y, height), 0.0, height.saturating_sub(1) as f64);
    CropRect {
        x,
        y,
        width: clamp(scale(params.width, width), 1.0, (width - x) as f64),
        height: clamp(scale(params.height, height), 1.0, (height - y) as f64),
    }
}

/// Seconds into a video of `duration` seconds for `"N%"` or plain seconds.
///
/// Both forms are clamped into the video; unparsable input means the start.
pub fn resolve_timestamp(timestamp: &str, duration: f64) -> f64 {
    let timestamp = timestamp.trim();
    let duration = duration.max(0.0);
    match timestamp.strip_suffix('%') {
        Some(percent) => {
            let percent = percent.trim().parse::<f64>().unwrap_or(0.0).clamp(0.0, 100.0);
            percent / 100.0 * duration
        }
        None => timestamp.parse::<f64>().unwrap_or(0.0).clamp(0.0, duration),
    }
}

pub struct FfmpegMedia {
    client: reqwest::Client,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    work_dir: PathBuf,
    downloads: ImageLimits,
    process_timeout: Duration,
}

impl FfmpegMedia {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
            work_dir: config.work_dir.clone(),
            downloads: config.images.clone(),
            process_timeout: config.media_timeout,
        }
    }

    fn scratch(&self, prefix: &str, extension: &str) -> PathBuf {
        self.work_dir
            .join(format!("{}-{}.{}", prefix, uuid::Uuid::new_v4(), extension))
    }

    /// Writes the source (http(s) or `data:` URL) to a scratch file.
    async fn materialize(&self, source: &str, prefix: &str) -> Result<PathBuf, ServiceError> {
        let bytes = if let Some(inline) = source.starts_with("data:").then(|| parse_data_url(source)).flatten() {
            STANDARD
                .decode(inline.data.as_bytes())
                .map_err(|e| ServiceError::InvalidResponse(format!("bad data URL: {}", e)))?
        } else if is_http_url(source) {
            let seconds = self.downloads.fetch_timeout.as_secs();
            let response = self
                .client
                .get(source)
                .timeout(self.downloads.fetch_timeout)
                .send()
                .await
                .map_err(|e| fetch_error(e, seconds))?;
            if !response.status().is_success() {
                return Err(ServiceError::Http {
                    status: response.status().as_u16(),
                    message: format!("failed to fetch {}", source),
                });
            }
            read_capped(response, self.downloads.max_bytes, seconds).await?
        } else {
            return Err(ServiceError::InvalidResponse(
                "source must be an http(s) or data URL".to_string(),
            ));
        };

        let path = self.scratch(prefix, "bin");
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ServiceError::Unavailable(format!("cannot write scratch file: {}", e)))?;
        Ok(path)
    }

    /// Runs `program` to completion; a child still running after the timeout is killed.
    async fn run(&self, program: &Path, args: &[String]) -> Result<Vec<u8>, ServiceError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.process_timeout, command.output())
            .await
            .map_err(|_| {
                tracing::warn!(program = %program.display(), "media process timed out");
                ServiceError::Timeout {
                    seconds: self.process_timeout.as_secs(),
                }
            })?
            .map_err(|e| ServiceError::Unavailable(format!("failed to spawn {}: {}", program.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.lines().last().unwrap_or_default().to_string();
            return Err(ServiceError::InvalidResponse(format!(
                "{} exited with {}: {}",
                program.display(),
                output.status,
                tail
            )));
        }
        Ok(output.stdout)
    }

    async fn probe(&self, input: &Path, entries: &str, stream: bool) -> Result<String, ServiceError> {
        let mut args = vec!["-v".to_string(), "error".to_string()];
        if stream {
            args.extend(["-select_streams".to_string(), "v:0".to_string()]);
        }
        args.extend([
            "-show_entries".to_string(),
            entries.to_string(),
            "-of".to_string(),
            "csv=p=0:s=x".to_string(),
            input.display().to_string(),
        ]);
        let stdout = self.run(&self.ffprobe, &args).await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    async fn dimensions(&self, input: &Path) -> Result<(u32, u32), ServiceError> {
        let raw = self.probe(input, "stream=width,height", true).await?;
        let parsed = raw.split_once('x').and_then(|(w, h)| {
            Some((w.trim().parse::<u32>().ok()?, h.trim().parse::<u32>().ok()?))
        });
        match parsed {
            Some((w, h)) if w > 0 && h > 0 => Ok((w, h)),
            _ => Err(ServiceError::InvalidResponse("Invalid image dimensions".to_string())),
        }
    }

    async fn duration(&self, input: &Path) -> Result<f64, ServiceError> {
        let raw = self.probe(input, "format=duration", false).await?;
        Ok(raw.parse::<f64>().unwrap_or(0.0))
    }

    async fn to_png_data_url(&self, output: &Path) -> Result<String, ServiceError> {
        let bytes = tokio::fs::read(output)
            .await
            .map_err(|e| ServiceError::InvalidResponse(format!("missing ffmpeg output: {}", e)))?;
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(bytes)))
    }
}

async fn cleanup(paths: &[&Path]) {
    for path in paths {
        let _ = tokio::fs::remove_file(path).await;
    }
}

#[async_trait]
impl MediaTransform for FfmpegMedia {
    async fn crop_image(&self, image_url: &str, params: CropParams) -> Result<String, ServiceError> {
        let input = self.materialize(image_url, "crop-input").await?;
        let output = self.scratch("crop-output", "png");

        let result = async {
            let (width, height) = self.dimensions(&input).await?;
            let rect = crop_rect(params, width, height);
            tracing::debug!(?rect, width, height, "cropping image");
            let args = vec![
                "-y".to_string(),
                "-i".to_string(),
                input.display().to_string(),
                "-vf".to_string(),
                format!("crop={}:{}:{}:{}", rect.width, rect.height, rect.x, rect.y),
                output.display().to_string(),
            ];
            self.run(&self.ffmpeg, &args).await?;
            self.to_png_data_url(&output).await
        }
        .await;

        cleanup(&[input.as_path(), output.as_path()]).await;
        result
    }

    async fn extract_frame(&self, video_url: &str, timestamp: &str) -> Result<String, ServiceError> {
        let input = self.materialize(video_url, "frame-input").await?;
        let output = self.scratch("frame-output", "png");

        let result = async {
            let duration = self.duration(&input).await?;
            let seconds = resolve_timestamp(timestamp, duration);
            tracing::debug!(seconds, duration, "extracting frame");
            let args = vec![
                "-y".to_string(),
                "-ss".to_string(),
                format!("{:.3}", seconds),
                "-i".to_string(),
                input.display().to_string(),
                "-frames:v".to_string(),
                "1".to_string(),
                "-f".to_string(),
                "image2".to_string(),
                output.display().to_string(),
            ];
            self.run(&self.ffmpeg, &args).await?;
            self.to_png_data_url(&output).await
        }
        .await;

        cleanup(&[input.as_path(), output.as_path()]).await;
        result
    }
}
