use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::{debug, info, warn};
use url::Url;

use crate::download::{DownloadJob, VideoSource};
use crate::formats::{
    available_resolutions, expected_extension, needs_merge, FormatDescriptor, Resolution,
    ResolutionOption,
};
use crate::prompt::ResolutionPrompt;
use crate::Result;

/// One invocation of the downloader
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: Url,
    pub resolution: Option<Resolution>,
    pub output_dir: PathBuf,
    pub merge_output_format: String,
}

/// Uses the requested resolution if the video has it, otherwise asks.
pub fn choose_resolution<P: ResolutionPrompt>(
    requested: Option<Resolution>,
    available: &BTreeMap<Resolution, FormatDescriptor>,
    prompt: &mut P,
) -> Result<Resolution> {
    if available.is_empty() {
        bail!("No supported resolutions (360p to 4K) were found for this video.");
    }

    if let Some(resolution) = requested {
        if available.contains_key(&resolution) {
            return Ok(resolution);
        }
        warn!(
            "Requested resolution {} is not available for this video. You will need to choose an available option.",
            resolution
        );
    }

    let options = ResolutionOption::from_available(available);
    prompt.choose(&options)
}

/// Fetches the format list, settles on a resolution and downloads the video.
pub async fn run<S: VideoSource, P: ResolutionPrompt>(
    request: &DownloadRequest,
    source: &S,
    prompt: &mut P,
) -> Result<PathBuf> {
    let info = source
        .fetch_info(&request.url)
        .await
        .with_context(|| format!("Failed to get formats for {}", request.url))?;
    let available = available_resolutions(&info.formats);

    let resolution = choose_resolution(request.resolution, &available, prompt)?;
    info!("Downloading \"{}\" at {}", info.title, resolution);
    if let Some(fmt) = available.get(&resolution) {
        debug!("Representative format for {}: {}", resolution, fmt.format_id);
    }

    if needs_merge(&info.formats, resolution) {
        source.ensure_merge_tool().await?;
    }

    let extension = expected_extension(&info.formats, resolution, &request.merge_output_format);
    let job = DownloadJob::new(
        &request.url,
        &info,
        resolution,
        &request.output_dir,
        &extension,
    );
    source.download(&job).await
}
