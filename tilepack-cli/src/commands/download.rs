//! Download command - fetch a region and follow its progress.
//!
//! Ctrl+C suspends the pack instead of aborting it; `tilepack resume <id>`
//! picks it up again.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tilepack::offline::{ProgressEvent, RegionDownload};
use tilepack::region::{RegionDefinition, RegionId};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::common::{metadata_from_pairs, parse_bounds};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the download command.
pub struct DownloadArgs {
    pub bounds: String,
    pub style: String,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub meta: Vec<String>,
    pub json: bool,
}

/// Run the download command.
pub async fn run(runner: &CliRunner, args: DownloadArgs) -> Result<(), CliError> {
    runner.log_startup("download");

    let bounds = parse_bounds(&args.bounds)?;
    let metadata = metadata_from_pairs(&args.meta)?;
    let definition = RegionDefinition::new(bounds, args.style, args.min_zoom, args.max_zoom);

    let download = runner.manager().download(definition, metadata).await?;
    if args.json {
        println!("{}", download.record.to_json());
    } else {
        println!(
            "Downloading region {} ({})",
            style(download.record.id()).cyan(),
            download.progress.name()
        );
    }

    follow(runner, download, args.json).await
}

/// Run the resume command.
pub async fn resume(runner: &CliRunner, id: RegionId, json: bool) -> Result<(), CliError> {
    runner.log_startup("resume");

    let download = runner.manager().resume_region(id).await?;
    if !json {
        println!("Resuming region {}", style(id).cyan());
    }

    follow(runner, download, json).await
}

/// Follow a download until its terminal event or Ctrl+C.
async fn follow(
    runner: &CliRunner,
    mut download: RegionDownload,
    json: bool,
) -> Result<(), CliError> {
    let id = download.record.id();

    let interrupted = CancellationToken::new();
    let handler_token = interrupted.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .map_err(|e| CliError::Signal(e.to_string()))?;

    if !runner.config().engine.simulate && !json {
        println!("Engine simulation is disabled; progress only advances when the engine reports it.");
    }

    let bar = if json {
        ProgressBar::hidden()
    } else {
        progress_bar()
    };

    loop {
        tokio::select! {
            _ = interrupted.cancelled() => {
                bar.abandon_with_message("interrupted");
                runner.manager().suspend_region(id).await?;
                info!(region_id = id, "Download suspended by user");
                if !json {
                    println!();
                    println!("Region {} suspended. Resume with: tilepack resume {}", id, id);
                }
                return Ok(());
            }

            event = download.progress.recv() => {
                let Some(event) = event else { break };
                if json {
                    println!("{}", event.to_json());
                }
                match event {
                    ProgressEvent::Start => bar.set_message("downloading"),
                    ProgressEvent::Progress { progress } => bar.set_position(progress.round() as u64),
                    ProgressEvent::Success => bar.finish_with_message("complete"),
                    ProgressEvent::Error { code, .. } => bar.abandon_with_message(code),
                }
            }
        }
    }

    download.completion.wait().await?;
    if !json {
        println!("{} Region {} downloaded", style("✓").green(), id);
    }
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% | {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░"),
    );
    bar
}
