use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::domain::DownloadItemError;

const PROGRESS_MARKER: &str = "[progress]";
const OUTPUT_MARKER: &str = "[output]";
const PARTIAL_SUFFIX: &str = ".downloading";

static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[progress\]\s*(\d+(?:\.\d+)?)%").expect("progress pattern is valid")
});

/// Target audio format; everything but `Best` is converted by ffmpeg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Best,
    #[default]
    Mp3,
    Flac,
    Wav,
    M4a,
    Aac,
    Alac,
    Opus,
    Vorbis,
}

impl AudioFormat {
    /// Value passed to `--audio-format`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Best => "best",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
            AudioFormat::M4a => "m4a",
            AudioFormat::Aac => "aac",
            AudioFormat::Alac => "alac",
            AudioFormat::Opus => "opus",
            AudioFormat::Vorbis => "vorbis",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to fetch and where the finished file goes (`{directory}/{file_stem}.{ext}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub source_url: String,
    pub directory: PathBuf,
    pub file_stem: String,
}

/// External engine that turns a cloudcast page URL into an audio file on disk.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetches one item. `progress` receives fractions in `0.0..=1.0`.
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &(dyn Fn(f32) + Send + Sync),
    ) -> Result<PathBuf, DownloadItemError>;
}

/// Runs `yt-dlp` once per item.
///
/// No timeout is applied to the child process: a hung engine stalls the run until the
/// process is killed from outside.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    binary: PathBuf,
    ffmpeg_location: Option<PathBuf>,
    audio_format: AudioFormat,
}

impl YtDlpFetcher {
    pub fn new(binary: impl Into<PathBuf>, audio_format: AudioFormat) -> Self {
        Self {
            binary: binary.into(),
            ffmpeg_location: None,
            audio_format,
        }
    }

    pub fn with_ffmpeg_location(mut self, location: Option<PathBuf>) -> Self {
        self.ffmpeg_location = location;
        self
    }

    fn arguments(&self, request: &FetchRequest) -> Vec<String> {
        let template = request.directory.join(format!(
            "{}{PARTIAL_SUFFIX}.%(ext)s",
            request.file_stem.replace('%', "%%")
        ));

        #[rustfmt::skip]
        let mut args: Vec<String> = [
            request.source_url.as_str(),
            "--no-playlist",
            "--newline",
            "--progress",
            "--color", "no_color",
            "--no-continue",
            "--force-overwrites",
            "--abort-on-error",
            "--retries", "0",
            "--fragment-retries", "0",
            "--format", "bestaudio/best",
            "--extract-audio",
            "--audio-format", self.audio_format.as_str(),
            "--progress-template", "download:[progress] %(progress._percent_str)s",
            "--print", "after_move:[output] %(filepath)s",
            "--output",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        args.push(template.to_string_lossy().into_owned());

        if let Some(location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.to_string_lossy().into_owned());
        }
        args
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(
        &self,
        request: &FetchRequest,
        progress: &(dyn Fn(f32) + Send + Sync),
    ) -> Result<PathBuf, DownloadItemError> {
        tracing::debug!(url = %request.source_url, stem = %request.file_stem, "starting media engine");

        let mut child = Command::new(&self.binary)
            .args(self.arguments(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DownloadItemError::Spawn(format!("{}: {}", self.binary.display(), e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadItemError::Spawn("engine stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadItemError::Spawn("engine stderr not captured".to_string()))?;

        let read_stdout = async {
            let mut lines = BufReader::new(stdout).lines();
            let mut produced = None;
            while let Some(line) = lines.next_line().await? {
                if let Some(fraction) = parse_progress(&line) {
                    progress(fraction);
                } else if let Some(path) = line.strip_prefix(OUTPUT_MARKER) {
                    produced = Some(PathBuf::from(path.trim()));
                } else {
                    tracing::trace!(line = %line, "engine output");
                }
            }
            Ok::<_, std::io::Error>(produced)
        };

        let read_stderr = async {
            let mut lines = BufReader::new(stderr).lines();
            let mut last_error: Option<String> = None;
            while let Some(line) = lines.next_line().await? {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                tracing::debug!(line = %line, "engine diagnostics");
                let is_error = line.starts_with("ERROR:");
                let has_error = last_error.as_deref().is_some_and(|l| l.starts_with("ERROR:"));
                if is_error || !has_error {
                    last_error = Some(line.to_string());
                }
            }
            Ok::<_, std::io::Error>(last_error)
        };

        let (produced, last_error) = match tokio::try_join!(read_stdout, read_stderr) {
            Ok(output) => output,
            Err(e) => {
                if let Err(kill_error) = child.kill().await {
                    tracing::warn!(error = %kill_error, "could not stop media engine");
                }
                remove_partials(&request.directory, &request.file_stem).await;
                return Err(e.into());
            }
        };
        let status = child.wait().await?;

        if !status.success() {
            remove_partials(&request.directory, &request.file_stem).await;
            return Err(DownloadItemError::Engine {
                code: status.code(),
                message: last_error.unwrap_or_else(|| "no error output".to_string()),
            });
        }

        let produced = match produced {
            Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => path,
            missing => {
                remove_partials(&request.directory, &request.file_stem).await;
                let expected = missing.unwrap_or_else(|| {
                    request
                        .directory
                        .join(format!("{}{PARTIAL_SUFFIX}", request.file_stem))
                });
                return Err(DownloadItemError::MissingOutput(expected));
            }
        };

        let extension = produced
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or(self.audio_format.as_str())
            .to_string();
        let destination = request
            .directory
            .join(format!("{}.{}", request.file_stem, extension));

        if let Err(e) = tokio::fs::rename(&produced, &destination).await {
            remove_partials(&request.directory, &request.file_stem).await;
            return Err(e.into());
        }
        Ok(destination)
    }
}

/// Fraction from a `[progress]  42.1%` line.
pub fn parse_progress(line: &str) -> Option<f32> {
    if !line.starts_with(PROGRESS_MARKER) {
        return None;
    }
    let caps = PROGRESS_RE.captures(line)?;
    let percent: f32 = caps[1].parse().ok()?;
    Some((percent / 100.0).clamp(0.0, 1.0))
}

async fn remove_partials(directory: &Path, file_stem: &str) {
    let prefix = format!("{file_stem}{PARTIAL_SUFFIX}");
    let Ok(mut entries) = tokio::fs::read_dir(directory).await else {
        return;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                tracing::warn!(path = %entry.path().display(), error = %e, "could not remove partial download");
            }
        }
    }
}
