//! CLI Command Handlers
//!
//! Implements the CLI commands on top of the transfer coordinator.
//! Each handler takes CLI args and Output, returns ExitCode.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::cli::{ConfigCmd, ExitCode, Output, PlayCmd, PlayableResponse, StoppedResponse};
use crate::config::Config;
use crate::models::{Quality, Retention, TransferEvent, TransferRequest};
use crate::stream::{
    BandwidthPolicy, CoordinatorCommand, CoordinatorOptions, SubtitleClient, TorrentResolver,
    TransferCoordinator, WebtorrentEngine,
};

// =============================================================================
// Play Command
// =============================================================================

pub async fn play_cmd(cmd: PlayCmd, config: &Config, output: &Output) -> ExitCode {
    let Some(quality) = cmd.pick_quality(config.quality()) else {
        return output.error("No sources given", ExitCode::InvalidArgs);
    };

    let destination = cmd.out.clone().unwrap_or_else(|| config.downloads_dir());
    let request = build_request(&cmd, quality, destination);
    let retention = if cmd.keep {
        Retention::Keep
    } else {
        Retention::Discard
    };

    let engine = Arc::new(WebtorrentEngine::with_path(config.webtorrent_path()));
    let resolver = TorrentResolver::new(config.torrents_dir());
    let bandwidth = BandwidthPolicy::new(Arc::new(config.clone()));
    let options = CoordinatorOptions {
        buffering_threshold: config.buffering_threshold(),
        subtitle_dir: Some(config.subtitles_dir()),
        ..Default::default()
    };

    let (coordinator, mut events) = TransferCoordinator::new(engine, resolver, bandwidth, options);
    let coordinator = coordinator.with_subtitles(Arc::new(SubtitleClient::new()));

    let (commands, inbox) = mpsc::channel(4);
    let server = tokio::spawn(coordinator.serve(inbox));

    output.info(format!(
        "Resolving {} ({})...",
        request.display_name(),
        quality
    ));

    let (reply, started) = oneshot::channel();
    if commands
        .send(CoordinatorCommand::Start { request, reply })
        .await
        .is_err()
    {
        return output.error("Coordinator stopped unexpectedly", ExitCode::Error);
    }

    let ticket = match started.await {
        Ok(Ok(ticket)) => ticket,
        Ok(Err(e)) => {
            let code = ExitCode::from(&e);
            shutdown(commands, server).await;
            return output.error(e.to_string(), code);
        }
        Err(_) => {
            shutdown(commands, server).await;
            return output.error("Coordinator stopped unexpectedly", ExitCode::Error);
        }
    };

    output.info(format!("Transfer {} started, buffering...", ticket.transfer));
    if let Some(subtitle) = &ticket.subtitle {
        output.info(format!("Subtitle saved to {}", subtitle.display()));
    }

    let code = loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break ExitCode::Success;
                };
                match event {
                    TransferEvent::ProgressUpdated { percent, .. } => {
                        output.info(format!("{:.1}%", percent));
                    }
                    TransferEvent::PlayableFileFound { transfer, ready } => {
                        let progress = ready.progress.borrow().progress;
                        output.info(format!("Ready to play: {}", ready.path.display()));
                        let response = PlayableResponse {
                            status: "playable",
                            transfer: transfer.to_string(),
                            path: ready.path.clone(),
                            progress,
                            subtitle: ticket.subtitle.clone(),
                        };
                        if let Err(e) = output.print(response) {
                            debug!("Failed to print playable event: {}", e);
                        }
                    }
                    TransferEvent::TransferFailed { reason, .. } => {
                        break output.error(reason, ExitCode::TransferFailed);
                    }
                    other => debug!(?other, "Transfer event"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                output.info("Stopping...");
                let _ = commands.send(CoordinatorCommand::Stop { retention }).await;
                let response = StoppedResponse {
                    status: "stopped",
                    transfer: ticket.transfer.to_string(),
                    kept: retention == Retention::Keep,
                };
                if let Err(e) = output.print(response) {
                    debug!("Failed to print stop event: {}", e);
                }
                break ExitCode::Success;
            }
        }
    };

    shutdown(commands, server).await;
    code
}

fn build_request(cmd: &PlayCmd, quality: Quality, destination: PathBuf) -> TransferRequest {
    let mut request = cmd.sources.iter().fold(
        TransferRequest::new(&cmd.content_id, quality, destination),
        |request, (quality, url)| request.with_source(*quality, url),
    );
    if let Some(title) = &cmd.title {
        request = request.with_title(title);
    }
    if let Some(subtitle) = cmd.subtitle() {
        request = request.with_subtitle(subtitle);
    }
    request
}

/// Close the command channel and wait for the coordinator to tear down
async fn shutdown(commands: mpsc::Sender<CoordinatorCommand>, server: tokio::task::JoinHandle<()>) {
    drop(commands);
    if let Err(e) = server.await {
        debug!("Coordinator task ended abnormally: {}", e);
    }
}

// =============================================================================
// Config Command
// =============================================================================

/// Effective settings as printed by `config show`
#[derive(Debug, Serialize)]
pub struct ConfigView {
    pub path: Option<PathBuf>,
    pub upload_limit: String,
    pub download_limit: String,
    pub buffering_threshold: f64,
    pub preferred_quality: Option<String>,
    pub download_dir: PathBuf,
    pub torrent_dir: PathBuf,
    pub subtitle_dir: PathBuf,
    pub webtorrent_path: String,
}

impl ConfigView {
    pub fn new(config: &Config, path: Option<&Path>) -> Self {
        let limits = BandwidthPolicy::new(Arc::new(config.clone())).resolve();
        Self {
            path: path.map(Path::to_path_buf),
            upload_limit: limits.upload.to_string(),
            download_limit: limits.download.to_string(),
            buffering_threshold: config.buffering_threshold(),
            preferred_quality: config.quality().map(|q| q.to_string()),
            download_dir: config.downloads_dir(),
            torrent_dir: config.torrents_dir(),
            subtitle_dir: config.subtitles_dir(),
            webtorrent_path: config.webtorrent_path().to_string(),
        }
    }
}

pub fn config_cmd(
    cmd: ConfigCmd,
    mut config: Config,
    path: Option<&Path>,
    output: &Output,
) -> ExitCode {
    match cmd {
        ConfigCmd::Show => print_config(&config, path, output),
        ConfigCmd::SetLimits(limits) => {
            if limits.upload.is_none() && limits.download.is_none() {
                return output.error(
                    "Pass --upload and/or --download (KB/s, 0 = unlimited)",
                    ExitCode::InvalidArgs,
                );
            }
            if let Some(upload) = limits.upload {
                config.upload_limit_kbps = Some(upload);
            }
            if let Some(download) = limits.download {
                config.download_limit_kbps = Some(download);
            }

            let saved = match path {
                Some(path) => config.save_to(path),
                None => config.save(),
            };
            if let Err(e) = saved {
                return output.error(format!("Failed to save config: {:#}", e), ExitCode::Error);
            }
            print_config(&config, path, output)
        }
    }
}

fn print_config(config: &Config, path: Option<&Path>, output: &Output) -> ExitCode {
    let path = path.map(Path::to_path_buf).or_else(Config::path);
    match output.print(ConfigView::new(config, path.as_deref())) {
        Ok(()) => ExitCode::Success,
        Err(e) => output.error(e.to_string(), ExitCode::Error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RateLimit;

    #[test]
    fn test_config_view_reports_limits() {
        let config = Config {
            upload_limit_kbps: Some(100),
            download_limit_kbps: Some(0),
            ..Default::default()
        };
        let view = ConfigView::new(&config, None);
        assert_eq!(view.upload_limit, RateLimit::BytesPerSec(100 * 1024).to_string());
        assert_eq!(view.download_limit, "unlimited");
        assert_eq!(view.buffering_threshold, 5.0);
    }

    #[test]
    fn test_set_limits_writes_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let output = Output {
            json: true,
            quiet: true,
        };

        let code = config_cmd(
            ConfigCmd::SetLimits(crate::cli::SetLimitsCmd {
                upload: Some(50),
                download: None,
            }),
            Config::default(),
            Some(&path),
            &output,
        );
        assert_eq!(code, ExitCode::Success);

        let saved = Config::load_from(&path).expect("saved config");
        assert_eq!(saved.upload_limit_kbps, Some(50));
        assert_eq!(saved.download_limit_kbps, None);
    }

    #[test]
    fn test_build_request_carries_all_sources() {
        use clap::Parser;
        let cli = crate::cli::Cli::parse_from([
            "torrentplay",
            "play",
            "tt1",
            "-s",
            "720p=http://a",
            "-s",
            "1080p=http://b",
            "--title",
            "Movie",
            "--subtitle-url",
            "http://subs/1",
            "--subtitle-lang",
            "eng",
        ]);
        let crate::cli::Command::Play(cmd) = cli.command else {
            panic!("Expected Play command");
        };

        let request = build_request(&cmd, Quality::HD720p, PathBuf::from("/tmp/out"));
        assert_eq!(request.source_url(), Some("http://a"));
        assert_eq!(request.sources.len(), 2);
        assert_eq!(request.display_name(), "Movie");
        assert_eq!(request.subtitle.map(|s| s.language), Some("eng".to_string()));
    }
}
