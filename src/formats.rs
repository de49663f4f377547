use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};

/// Resolutions that can be requested, from 360p up to 4K
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum Resolution {
    #[value(name = "360", alias = "360p")]
    P360,
    #[value(name = "480", alias = "480p")]
    P480,
    #[value(name = "720", alias = "720p")]
    P720,
    #[value(name = "1080", alias = "1080p")]
    P1080,
    #[value(name = "1440", alias = "1440p")]
    P1440,
    #[value(name = "2160", alias = "2160p")]
    P2160,
}

impl Resolution {
    pub const ALL: [Resolution; 6] = [
        Resolution::P360,
        Resolution::P480,
        Resolution::P720,
        Resolution::P1080,
        Resolution::P1440,
        Resolution::P2160,
    ];

    /// Vertical pixel count
    pub fn height(self) -> u32 {
        match self {
            Resolution::P360 => 360,
            Resolution::P480 => 480,
            Resolution::P720 => 720,
            Resolution::P1080 => 1080,
            Resolution::P1440 => 1440,
            Resolution::P2160 => 2160,
        }
    }

    pub fn from_height(height: u32) -> Option<Resolution> {
        Resolution::ALL.into_iter().find(|r| r.height() == height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p", self.height())
    }
}

/// Video metadata as returned by `yt-dlp -J`
#[derive(Debug, Clone, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub formats: Vec<FormatDescriptor>,
}

/// One entry of the `formats` array
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FormatDescriptor {
    pub format_id: String,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default, deserialize_with = "lenient_bytes")]
    pub filesize: Option<u64>,
    #[serde(default, deserialize_with = "lenient_bytes")]
    pub filesize_approx: Option<u64>,
}

// yt-dlp sometimes reports sizes as floats
fn lenient_bytes<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64))
}

impl FormatDescriptor {
    pub fn is_audio_only(&self) -> bool {
        self.vcodec.as_deref() == Some("none")
    }

    /// Has a video stream but no audio, so it has to be merged
    pub fn is_video_only(&self) -> bool {
        !self.is_audio_only() && self.acodec.as_deref() == Some("none")
    }

    /// Exact size if known, otherwise the estimate
    pub fn size_bytes(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }
}

/// Maps every supported resolution found in `formats` to a representative format.
///
/// Audio-only entries and entries without a height are ignored. When several
/// formats share a height, the one with the largest known `filesize` wins.
pub fn available_resolutions(formats: &[FormatDescriptor]) -> BTreeMap<Resolution, FormatDescriptor> {
    let mut matches: BTreeMap<Resolution, FormatDescriptor> = BTreeMap::new();
    for fmt in formats {
        if fmt.is_audio_only() {
            continue;
        }
        let Some(resolution) = fmt.height.and_then(Resolution::from_height) else {
            continue;
        };
        match matches.get(&resolution) {
            None => {
                matches.insert(resolution, fmt.clone());
            }
            Some(current) => {
                let size = fmt.filesize.unwrap_or(0);
                if size > 0 && size > current.filesize.unwrap_or(0) {
                    matches.insert(resolution, fmt.clone());
                }
            }
        }
    }
    matches
}

/// True when the selector for `resolution` would combine separate streams
pub fn needs_merge(formats: &[FormatDescriptor], resolution: Resolution) -> bool {
    formats
        .iter()
        .any(|f| f.height == Some(resolution.height()) && f.is_video_only())
}

/// Extension the downloaded file will most likely get.
///
/// Merged streams end up in `merge_format`. Otherwise yt-dlp picks the best
/// single file at that height, and formats are listed from worst to best.
pub fn expected_extension(
    formats: &[FormatDescriptor],
    resolution: Resolution,
    merge_format: &str,
) -> String {
    if needs_merge(formats, resolution) {
        return merge_format.to_string();
    }
    formats
        .iter()
        .rev()
        .filter(|f| f.height == Some(resolution.height()) && !f.is_audio_only())
        .find_map(|f| f.ext.clone())
        .unwrap_or_else(|| merge_format.to_string())
}

/// An entry of the interactive resolution list
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionOption {
    pub resolution: Resolution,
    pub representative: FormatDescriptor,
}

impl ResolutionOption {
    pub fn from_available(available: &BTreeMap<Resolution, FormatDescriptor>) -> Vec<ResolutionOption> {
        available
            .iter()
            .map(|(resolution, fmt)| ResolutionOption {
                resolution: *resolution,
                representative: fmt.clone(),
            })
            .collect()
    }

    pub fn label(&self) -> String {
        match self.representative.size_bytes() {
            Some(bytes) if bytes > 0 => {
                let mb = bytes as f64 / (1024.0 * 1024.0);
                format!("{} (~{:.1} MB)", self.resolution, mb)
            }
            _ => self.resolution.to_string(),
        }
    }
}

/// yt-dlp format string that targets exactly `resolution`, preferring mp4/m4a
pub fn format_selector(resolution: Resolution) -> String {
    let h = resolution.height();
    format!(
        "bestvideo[height={h}][ext=mp4]+bestaudio[ext=m4a]/bestvideo[height={h}]+bestaudio/best[height={h}]"
    )
}

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f\x7f]"#).expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// File name without extension: `<title> [<height>p]`
pub fn output_stem(title: &str, resolution: Resolution) -> String {
    let cleaned = WHITESPACE.replace_all(title, " ");
    let cleaned = UNSAFE_CHARS.replace_all(&cleaned, "_");
    let cleaned = cleaned.trim().trim_end_matches(['.', ' ']);
    let title = if cleaned.is_empty() { "video" } else { cleaned };
    format!("{} [{}]", title, resolution)
}

/// yt-dlp output template inside `dir`, the extension is left to yt-dlp
pub fn output_template(dir: &Path, title: &str, resolution: Resolution) -> PathBuf {
    let stem = output_stem(title, resolution).replace('%', "%%");
    dir.join(format!("{}.%(ext)s", stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: &str, height: u32, filesize: Option<u64>) -> FormatDescriptor {
        FormatDescriptor {
            format_id: id.to_string(),
            height: Some(height),
            vcodec: Some("avc1.640028".to_string()),
            acodec: Some("none".to_string()),
            filesize,
            ..Default::default()
        }
    }

    fn audio(id: &str) -> FormatDescriptor {
        FormatDescriptor {
            format_id: id.to_string(),
            vcodec: Some("none".to_string()),
            acodec: Some("mp4a.40.2".to_string()),
            filesize: Some(3_000_000),
            ..Default::default()
        }
    }

    #[test]
    fn filters_to_supported_heights() {
        let formats = vec![
            audio("140"),
            video("160", 144, None),
            video("133", 240, None),
            video("134", 360, Some(1)),
            video("136", 720, Some(1)),
            video("137", 1080, Some(1)),
            video("571", 4320, Some(1)),
            FormatDescriptor {
                format_id: "sb0".to_string(),
                vcodec: Some("none".to_string()),
                height: Some(1080),
                ..Default::default()
            },
            FormatDescriptor {
                format_id: "nh".to_string(),
                ..Default::default()
            },
        ];

        let available = available_resolutions(&formats);
        let keys: Vec<_> = available.keys().copied().collect();
        assert_eq!(keys, vec![Resolution::P360, Resolution::P720, Resolution::P1080]);
        assert_eq!(available[&Resolution::P1080].format_id, "137");
    }

    #[test]
    fn prefers_larger_known_filesize() {
        let formats = vec![
            video("a", 720, None),
            video("b", 720, Some(10)),
            video("c", 720, None),
            video("d", 720, Some(5)),
            video("e", 720, Some(20)),
        ];
        let available = available_resolutions(&formats);
        assert_eq!(available[&Resolution::P720].format_id, "e");
    }

    #[test]
    fn merge_needed_only_for_video_only_formats() {
        let progressive = FormatDescriptor {
            format_id: "18".to_string(),
            height: Some(360),
            vcodec: Some("avc1".to_string()),
            acodec: Some("mp4a".to_string()),
            ..Default::default()
        };
        let formats = vec![progressive, video("137", 1080, None)];
        assert!(!needs_merge(&formats, Resolution::P360));
        assert!(needs_merge(&formats, Resolution::P1080));
        assert!(!needs_merge(&formats, Resolution::P2160));
    }

    #[test]
    fn extension_follows_merge_or_single_file() {
        let progressive = |id: &str, ext: &str| FormatDescriptor {
            format_id: id.to_string(),
            ext: Some(ext.to_string()),
            height: Some(360),
            vcodec: Some("avc1".to_string()),
            acodec: Some("mp4a".to_string()),
            ..Default::default()
        };
        let formats = vec![
            progressive("43", "mp4"),
            progressive("18", "webm"),
            FormatDescriptor {
                ext: Some("webm".to_string()),
                ..video("248", 1080, None)
            },
        ];
        assert_eq!(expected_extension(&formats, Resolution::P1080, "mkv"), "mkv");
        assert_eq!(expected_extension(&formats, Resolution::P360, "mp4"), "webm");
        assert_eq!(expected_extension(&formats, Resolution::P720, "mp4"), "mp4");
    }

    #[test]
    fn selector_targets_height() {
        assert_eq!(
            format_selector(Resolution::P1080),
            "bestvideo[height=1080][ext=mp4]+bestaudio[ext=m4a]/bestvideo[height=1080]+bestaudio/best[height=1080]"
        );
    }

    #[test]
    fn option_label_shows_size() {
        let option = ResolutionOption {
            resolution: Resolution::P720,
            representative: video("136", 720, Some(5 * 1024 * 1024 + 100 * 1024)),
        };
        assert_eq!(option.label(), "720p (~5.1 MB)");

        let approx = ResolutionOption {
            resolution: Resolution::P480,
            representative: FormatDescriptor {
                filesize_approx: Some(1024 * 1024),
                ..video("135", 480, None)
            },
        };
        assert_eq!(approx.label(), "480p (~1.0 MB)");

        let unknown = ResolutionOption {
            resolution: Resolution::P360,
            representative: video("134", 360, None),
        };
        assert_eq!(unknown.label(), "360p");
    }

    #[test]
    fn output_name_is_deterministic() {
        let a = output_stem("My Video: Part 1/2", Resolution::P1080);
        let b = output_stem("My Video: Part 1/2", Resolution::P1080);
        assert_eq!(a, b);
        assert_eq!(a, "My Video_ Part 1_2 [1080p]");
        assert_eq!(output_stem("  ...  ", Resolution::P360), "video [360p]");
        assert_eq!(output_stem("a\n\tb.", Resolution::P480), "a b [480p]");
    }

    #[test]
    fn template_escapes_percent() {
        let path = output_template(Path::new("out"), "100% real", Resolution::P720);
        assert_eq!(path, Path::new("out").join("100%% real [720p].%(ext)s"));
    }

    #[test]
    fn parses_ytdlp_json() {
        let json = r#"{
            "id": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "formats": [
                {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "filesize": 3433514},
                {"format_id": "137", "ext": "mp4", "height": 1080, "width": 1920,
                 "vcodec": "avc1.640028", "acodec": "none", "filesize": null, "filesize_approx": 80123456.7},
                {"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none"}
            ]
        }"#;
        let info: VideoInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.id, "dQw4w9WgXcQ");
        assert_eq!(info.formats.len(), 3);
        assert_eq!(info.formats[1].size_bytes(), Some(80123456));
        let available = available_resolutions(&info.formats);
        assert_eq!(available.len(), 1);
        assert!(available.contains_key(&Resolution::P1080));
    }

    #[test]
    fn missing_formats_is_empty() {
        let info: VideoInfo = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert!(info.formats.is_empty());
    }
}
