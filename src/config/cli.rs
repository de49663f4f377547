use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use url::Url;

use crate::formats::Resolution;
use crate::Result;

#[derive(Parser, Debug)]
#[clap(
    name = "downloader",
    author,
    version,
    about = "Download a YouTube video with a chosen quality"
)]
pub struct Cli {
    #[clap(help = "YouTube video URL")]
    pub url: Url,

    #[clap(
        short,
        long,
        value_enum,
        help = "Target resolution (in p). If omitted, the available options are prompted"
    )]
    pub resolution: Option<Resolution>,

    #[clap(
        short,
        long,
        help = "Directory where the downloaded file should be saved [default: current directory]"
    )]
    pub output: Option<PathBuf>,

    #[clap(short, long, help = "Path to a yt-dlp/ffmpeg tool config (YAML)")]
    pub config: Option<PathBuf>,

    #[clap(long, help = "Disable animations")]
    pub no_animation: bool,
}

impl Cli {
    /// Output directory, falling back to the current working directory
    pub fn output_dir(&self) -> Result<PathBuf> {
        match &self.output {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("Could not determine the current directory"),
        }
    }
}
