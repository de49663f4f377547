use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

use crate::Result;

/// Reads the tool config, or returns the defaults when no path is given
pub fn read_config<P: AsRef<Path>>(path: Option<P>) -> Result<ToolConfig> {
    let Some(path) = path else {
        return Ok(ToolConfig::default());
    };
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: ToolConfig = serde_yml::from_str(&contents)
        .with_context(|| "Could not parse config (There is most likely an error in the config)")?;
    debug!("Read config: {:?}", config);
    Ok(config)
}

#[cfg(windows)]
const FFMPEG_NAME: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const FFMPEG_NAME: &str = "ffmpeg";

/// External tools and the parameters they are called with
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// yt-dlp executable
    pub yt_dlp: PathBuf,
    /// ffmpeg executable or the directory containing it, passed to yt-dlp via
    /// `--ffmpeg-location` when set
    pub ffmpeg: Option<PathBuf>,
    /// Container used when audio and video get merged
    pub merge_output_format: String,
    /// Extra arguments for every download
    pub params: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            yt_dlp: PathBuf::from("yt-dlp"),
            ffmpeg: None,
            merge_output_format: "mp4".to_string(),
            params: Vec::new(),
        }
    }
}

impl ToolConfig {
    /// Binary probed before a merge
    pub fn ffmpeg_binary(&self) -> PathBuf {
        match &self.ffmpeg {
            Some(path) if path.is_dir() => path.join(FFMPEG_NAME),
            Some(path) => path.clone(),
            None => PathBuf::from(FFMPEG_NAME),
        }
    }
}
