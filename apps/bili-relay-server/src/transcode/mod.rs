//! Local transcoding via ffmpeg
//!
//! Re-encodes a file from the upload directory with the platform's
//! recommended H.264/AAC settings before it is relayed.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::config::TranscodeConfig;

/// Prefix for transcoded outputs
pub const OUTPUT_PREFIX: &str = "bilibili_";

/// Transcoding errors
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Unknown quality preset: {0}")]
    UnknownQuality(String),

    #[error("Unknown resolution: {0}")]
    UnknownResolution(String),

    #[error("Input file not found: {0}")]
    InputNotFound(String),

    #[error("Failed to run ffmpeg: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("ffmpeg exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Encoder preset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Suited to 1080p sources
    High,
    /// Suited to 720p sources
    Medium,
    /// Fast encode
    #[default]
    Low,
}

impl FromStr for Quality {
    type Err = TranscodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" | "" => Ok(Self::Low),
            other => Err(TranscodeError::UnknownQuality(other.to_string())),
        }
    }
}

struct Preset {
    speed: &'static str,
    crf: &'static str,
    audio_bitrate: &'static str,
    sample_rate: &'static str,
    maxrate: &'static str,
    bufsize: &'static str,
}

impl Quality {
    fn preset(self) -> Preset {
        match self {
            Quality::High => Preset {
                speed: "slow",
                crf: "19",
                audio_bitrate: "320k",
                sample_rate: "48000",
                maxrate: "6000k",
                bufsize: "12000k",
            },
            Quality::Medium => Preset {
                speed: "medium",
                crf: "23",
                audio_bitrate: "192k",
                sample_rate: "44100",
                maxrate: "4000k",
                bufsize: "8000k",
            },
            Quality::Low => Preset {
                speed: "fast",
                crf: "28",
                audio_bitrate: "128k",
                sample_rate: "44100",
                maxrate: "2000k",
                bufsize: "4000k",
            },
        }
    }
}

/// Output height; width follows the aspect ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
}

impl Resolution {
    fn height(self) -> u32 {
        match self {
            Resolution::P1080 => 1080,
            Resolution::P720 => 720,
            Resolution::P480 => 480,
        }
    }
}

impl FromStr for Resolution {
    type Err = TranscodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1080p" => Ok(Self::P1080),
            "720p" => Ok(Self::P720),
            "480p" => Ok(Self::P480),
            other => Err(TranscodeError::UnknownResolution(other.to_string())),
        }
    }
}

/// Options for one transcode run
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscodeOptions {
    pub quality: Quality,
    pub resolution: Option<Resolution>,
}

/// Build the ffmpeg argument list for `input -> output`
pub fn build_args(input: &Path, output: &Path, options: TranscodeOptions) -> Vec<String> {
    let preset = options.quality.preset();

    let mut args: Vec<String> = vec![
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-y".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        preset.speed.into(),
        "-crf".into(),
        preset.crf.into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        preset.audio_bitrate.into(),
        "-ar".into(),
        preset.sample_rate.into(),
        "-maxrate".into(),
        preset.maxrate.into(),
        "-bufsize".into(),
        preset.bufsize.into(),
    ];

    if let Some(resolution) = options.resolution {
        args.push("-vf".into());
        args.push(format!("scale=-2:{}", resolution.height()));
    }

    args.extend(
        ["-pix_fmt", "yuv420p", "-movflags", "+faststart"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(output.to_string_lossy().into_owned());

    args
}

/// Reject anything that could escape the upload directory
fn validate_filename(filename: &str) -> Result<(), TranscodeError> {
    if filename.is_empty()
        || filename.contains("..")
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains('\0')
    {
        return Err(TranscodeError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// Runs ffmpeg against files in the configured directories
#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg_bin: String,
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl Transcoder {
    pub fn new(config: &TranscodeConfig) -> Self {
        Self {
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            input_dir: config.input_dir.clone(),
            output_dir: config.output_dir.clone(),
        }
    }

    /// Whether the ffmpeg binary can be executed
    pub async fn is_available(&self) -> bool {
        match Command::new(&self.ffmpeg_bin).arg("-version").output().await {
            Ok(output) => output.status.success(),
            Err(e) => {
                tracing::warn!(ffmpeg = %self.ffmpeg_bin, error = %e, "ffmpeg not available");
                false
            }
        }
    }

    /// Transcode `filename`, returning the output filename
    #[tracing::instrument(skip(self), fields(ffmpeg = %self.ffmpeg_bin))]
    pub async fn transcode(
        &self,
        filename: &str,
        options: TranscodeOptions,
    ) -> Result<String, TranscodeError> {
        validate_filename(filename)?;

        let input = self.input_dir.join(filename);
        if !tokio::fs::try_exists(&input).await.unwrap_or(false) {
            return Err(TranscodeError::InputNotFound(filename.to_string()));
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let output_name = format!("{}{}", OUTPUT_PREFIX, filename);
        let output = self.output_dir.join(&output_name);

        let args = build_args(&input, &output, options);
        tracing::info!(args = %args.join(" "), "Running ffmpeg");

        let start = std::time::Instant::now();
        let result = Command::new(&self.ffmpeg_bin)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
            return Err(TranscodeError::Failed {
                status: result.status.to_string(),
                stderr: tail,
            });
        }

        tracing::info!(
            output = %output_name,
            duration_ms = start.elapsed().as_millis(),
            "Transcode completed"
        );

        Ok(output_name)
    }
}
