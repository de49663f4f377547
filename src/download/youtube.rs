use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{anyhow, Context};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use url::Url;

use indicatif::ProgressStyle;
use tracing::{debug, info, instrument, trace, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use super::*;

use crate::config::tool_config::ToolConfig;

/// Number of stderr lines kept for error messages
const STDERR_TAIL_LINES: usize = 5;

/// Drives the yt-dlp executable
#[derive(Debug, Clone)]
pub struct YtDlp {
    config: ToolConfig,
}

impl YtDlp {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    /// Arguments of the metadata query, with the same extra params as the download
    fn info_args(&self, url: &Url) -> Vec<String> {
        let mut args: Vec<String> = ["-J", "--no-playlist", "--no-warnings", "--color", "no_color"]
            .into_iter()
            .map(String::from)
            .collect();
        args.extend(self.config.params.iter().cloned());
        args.push(url.as_str().to_string());
        args
    }

    fn download_args(&self, job: &DownloadJob) -> Result<Vec<String>> {
        let mut args: Vec<String> = [
            // Force new lines
            "--newline",
            // Keep the progress output, --print would silence it
            "--progress",
            // Get all available variables using: yt-dlp --progress-template '%(progress)#j'
            "--progress-template",
            "%(progress)#j",
            // Disable colors for easier parsing
            "--color",
            "no_color",
            "--no-playlist",
            // Report where the final file ended up
            "--no-simulate",
            "--print",
            "after_move:filepath",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        args.push("--merge-output-format".to_string());
        args.push(self.config.merge_output_format.clone());
        args.push("-f".to_string());
        args.push(job.selector.clone());
        if let Some(ffmpeg) = &self.config.ffmpeg {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.to_str().context("Invalid ffmpeg path")?.to_string());
        }
        args.extend(self.config.params.iter().cloned());
        args.push("-o".to_string());
        args.push(
            job.output_template
                .to_str()
                .context("Invalid output path")?
                .to_string(),
        );
        args.push(job.url.as_str().to_string());
        Ok(args)
    }
}

impl VideoSource for YtDlp {
    /// Lists the formats of a video without downloading it.
    #[instrument(skip(self, url))]
    async fn fetch_info(&self, url: &Url) -> Result<VideoInfo> {
        Span::current().pb_set_style(
            &ProgressStyle::default_spinner().template("{spinner:.green} Fetching formats: {msg}")?,
        );
        Span::current().pb_set_message(url.as_str());

        let mut cmd = Command::new(&self.config.yt_dlp);
        cmd.args(self.info_args(url));
        debug!("yt-dlp params: {:?}", cmd);

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to start {}", self.config.yt_dlp.display()))?;
        if !output.status.success() {
            return Err(anyhow!(
                "yt-dlp could not fetch video information ({}):\n{}",
                output.status,
                stderr_tail(&output.stderr)
            ));
        }

        let info: VideoInfo = serde_json::from_slice(&output.stdout)
            .context("Could not parse the video information returned by yt-dlp")?;
        debug!("Found {} formats for {}", info.formats.len(), info.id);
        Ok(info)
    }

    async fn ensure_merge_tool(&self) -> Result<()> {
        let ffmpeg = self.config.ffmpeg_binary();
        let status = Command::new(&ffmpeg)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(anyhow!(
                "{} exited with status {}, it is required to merge audio and video",
                ffmpeg.display(),
                status
            )),
            Err(e) => Err(anyhow!(e).context(format!(
                "{} could not be started, it is required to merge audio and video",
                ffmpeg.display()
            ))),
        }
    }

    /// Downloads a video using yt-dlp and displays a progress bar.
    #[instrument(skip(self, job), fields(resolution = %job.resolution))]
    async fn download(&self, job: &DownloadJob) -> Result<PathBuf> {
        ensure_dir_exists(&job.output_dir)
            .await
            .with_context(|| format!("Could not create {}", job.output_dir.display()))?;

        let mut cmd = Command::new(&self.config.yt_dlp);
        cmd.args(self.download_args(job)?);
        debug!("yt-dlp params: {:?}", cmd);

        // Spawn the process
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to start yt-dlp")?;

        // Drain stderr separately, a full pipe would block yt-dlp
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        Span::current().pb_set_style(
            &ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% ({eta})  {msg}",
                )?
                .progress_chars("#>-"),
        );
        Span::current().pb_set_message(&job.title);
        Span::current().pb_set_length(1000);
        Span::current().pb_set_position(0);

        // Process yt-dlp's stdout line by line.
        let mut extractor = ProgressExtractor::default();
        if let Some(stdout) = child.stdout.take() {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();

            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        // Don't leave yt-dlp downloading in the background
                        let _ = child.kill().await;
                        return Err(anyhow!(e).context("Failed to read the output of yt-dlp"));
                    }
                };
                extractor.push_new_line(line);
                Span::current().pb_set_position((extractor.percentage * 10.0) as u64);
            }
        }

        // Wait for yt-dlp to finish
        let status = child
            .wait()
            .await
            .context("yt-dlp process encountered an error")?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };
        if !status.success() {
            return Err(anyhow!(
                "yt-dlp failed to download the requested video ({}):\n{}",
                status,
                stderr_tail(&stderr)
            ));
        }

        let path = extractor
            .printed_path
            .map(PathBuf::from)
            .unwrap_or_else(|| job.expected_path.clone());
        info!("Saved {}", path.display());
        Ok(path)
    }
}

/// Last lines of a tool's stderr, without colors
fn stderr_tail(stderr: &[u8]) -> String {
    let plain = strip_ansi_escapes::strip(stderr);
    let text = String::from_utf8_lossy(&plain);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Helper to extract the percentage and the printed file path from the yt-dlp output
#[derive(Debug, Default)]
struct ProgressExtractor {
    pub percentage: f32,
    pub printed_path: Option<String>,
    current_string: String,
    in_object: bool,
}
impl ProgressExtractor {
    fn push_new_line(&mut self, line: String) {
        if line == "{" {
            self.current_string = line;
            self.in_object = true;
        } else if !self.in_object {
            // Anything outside of a progress object comes from --print
            if !line.trim().is_empty() {
                self.printed_path = Some(line);
            }
        } else if line == "}" {
            self.in_object = false;
            self.current_string.push_str(&line);
            trace!("{}", self.current_string);

            let value: Value = match serde_json::from_str(&self.current_string) {
                Ok(val) => val,
                Err(_) => return,
            };
            let Some(val) = percentage_of(&value) else {
                return;
            };
            trace!("Extracted percentage: {}", val);

            // Merged downloads restart at 0 for the audio stream
            self.percentage = if (val - self.percentage).abs() < 50.0 {
                self.percentage.max(val)
            } else {
                val
            };
        } else {
            self.current_string.push_str(&line);
        }
    }
}

fn percentage_of(value: &Value) -> Option<f32> {
    let downloaded = value.get("downloaded_bytes").and_then(Value::as_f64);
    let total = value
        .get("total_bytes")
        .and_then(Value::as_f64)
        .or_else(|| value.get("total_bytes_estimate").and_then(Value::as_f64));
    if let (Some(downloaded), Some(total)) = (downloaded, total) {
        if total > 0.0 {
            return Some(((downloaded / total) * 100.0).clamp(0.0, 100.0) as f32);
        }
    }

    let mut percent_string: String = value
        .get("_percent_str")?
        .as_str()?
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if percent_string.ends_with('%') {
        percent_string.pop();
    }
    percent_string.parse().ok()
}
