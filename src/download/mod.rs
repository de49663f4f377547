pub mod youtube;

use std::path::{Path, PathBuf};

use tokio::fs;
use url::Url;

use crate::formats::{format_selector, output_stem, output_template, Resolution, VideoInfo};
use crate::Result;

/// Ensures that the directory specified by the given `Path` exists.
async fn ensure_dir_exists(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    Ok(())
}

/// Everything the backend needs to fetch one video at one resolution
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadJob {
    pub url: Url,
    pub title: String,
    pub resolution: Resolution,
    pub selector: String,
    pub output_dir: PathBuf,
    pub output_template: PathBuf,
    /// Best guess of the written file, used when yt-dlp does not report it
    pub expected_path: PathBuf,
}

impl DownloadJob {
    pub fn new(
        url: &Url,
        info: &VideoInfo,
        resolution: Resolution,
        output_dir: &Path,
        extension: &str,
    ) -> Self {
        Self {
            url: url.clone(),
            title: info.title.clone(),
            resolution,
            selector: format_selector(resolution),
            output_dir: output_dir.to_path_buf(),
            output_template: output_template(output_dir, &info.title, resolution),
            expected_path: output_dir.join(format!(
                "{}.{}",
                output_stem(&info.title, resolution),
                extension
            )),
        }
    }
}

/// Something that can list the formats of a video and download one of them
pub trait VideoSource {
    async fn fetch_info(&self, url: &Url) -> Result<VideoInfo>;

    /// Fails if separate audio and video streams could not be merged
    async fn ensure_merge_tool(&self) -> Result<()>;

    /// Returns the path of the written file
    async fn download(&self, job: &DownloadJob) -> Result<PathBuf>;
}
