mod app;
mod config;
mod download;
mod formats;
mod prompt;

use std::io::{self, IsTerminal};

// Animations and logging
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::app::DownloadRequest;
use crate::config::{cli, tool_config};
use crate::download::youtube::YtDlp;
use crate::prompt::{LinePrompt, TerminalPrompt};

pub type Result<T> = anyhow::Result<T>;

fn init_logging(animations: bool) {
    let subscriber = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    );
    if animations {
        let indicatif_layer = IndicatifLayer::new();
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(indicatif_layer.get_stderr_writer())
                    .compact(),
            )
            .with(indicatif_layer)
            .init();
    } else {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .compact(),
            )
            .init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> crate::Result<()> {
    let cli = <cli::Cli as clap::Parser>::parse();

    // Start logging
    init_logging(!cli.no_animation);

    let tools = tool_config::read_config(cli.config.as_ref())?;
    let request = DownloadRequest {
        url: cli.url.clone(),
        resolution: cli.resolution,
        output_dir: cli.output_dir()?,
        merge_output_format: tools.merge_output_format.clone(),
    };
    let source = YtDlp::new(tools);

    let path = if io::stdin().is_terminal() && io::stderr().is_terminal() {
        app::run(&request, &source, &mut TerminalPrompt).await?
    } else {
        let mut prompt = LinePrompt::new(io::stdin().lock(), io::stderr());
        app::run(&request, &source, &mut prompt).await?
    };

    println!("{}", path.display());
    Ok(())
}
