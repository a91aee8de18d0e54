//! Progress monitor
//!
//! Polls a transfer once per tick, publishes progress/rate/peer/seed
//! observations, and announces the playable media file once enough of the
//! front of the file has arrived.
//!
//! ```text
//! Downloading ──progress ≥ threshold && media file found──▶ Buffered
//!      │                                                       │
//!      └──────────────── cancellation ──────────▶ Stopped ◀────┘
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::TransferError;
use crate::models::{PlaybackReady, TransferEvent, TransferStatus};
use crate::stream::session::TransferHandle;

/// Time between status samples
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Percent complete considered safe to start playback
pub const DEFAULT_BUFFERING_THRESHOLD: f64 = 5.0;

/// Extensions recognized as playable media
pub const MEDIA_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi"];

/// Receives monitor observations; must not block
pub trait TransferObserver: Send + Sync {
    fn notify(&self, event: TransferEvent);
}

impl TransferObserver for mpsc::UnboundedSender<TransferEvent> {
    fn notify(&self, event: TransferEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.send(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Downloading,
    Buffered,
}

/// Tick loop configuration
#[derive(Debug, Clone, Copy)]
pub struct ProgressMonitor {
    tick_interval: Duration,
    buffering_threshold: f64,
}

impl Default for ProgressMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL, DEFAULT_BUFFERING_THRESHOLD)
    }
}

impl ProgressMonitor {
    /// `buffering_threshold` is a percentage in [0, 100]
    pub fn new(tick_interval: Duration, buffering_threshold: f64) -> Self {
        Self {
            tick_interval,
            buffering_threshold: buffering_threshold.clamp(0.0, 100.0),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn buffering_threshold(&self) -> f64 {
        self.buffering_threshold
    }

    /// Run until `cancel` fires or the engine faults
    ///
    /// Returns `Ok(())` on cancellation. Never deletes files.
    pub async fn run(
        &self,
        handle: &mut TransferHandle,
        observer: &dyn TransferObserver,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let transfer = handle.id();
        let (status_tx, status_rx) = watch::channel(TransferStatus::default());
        let mut phase = MonitorPhase::Downloading;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let raw = handle.status().await?;
            let status = TransferStatus::from_raw(&raw);
            status_tx.send_replace(status.clone());

            observer.notify(TransferEvent::ProgressUpdated {
                transfer,
                percent: status.progress,
            });
            observer.notify(TransferEvent::RateUpdated {
                transfer,
                kbps: status.download_rate_kbps,
            });
            observer.notify(TransferEvent::PeerCountUpdated {
                transfer,
                peers: status.peers,
            });
            observer.notify(TransferEvent::SeedCountUpdated {
                transfer,
                seeds: status.seeds,
            });

            if cancel.is_cancelled() {
                break;
            }

            handle.flush_cache().await?;
            if handle.needs_resume_data() {
                if let Err(e) = handle.save_resume_data().await {
                    warn!(transfer = %transfer, "Resume data save failed: {}", e);
                }
            }

            if phase == MonitorPhase::Downloading && status.progress >= self.buffering_threshold {
                if let Some(path) = find_playable_file(&status.save_path, &status.name) {
                    info!(transfer = %transfer, path = %path.display(), "Buffered, media is playable");
                    phase = MonitorPhase::Buffered;
                    observer.notify(TransferEvent::PlayableFileFound {
                        transfer,
                        ready: PlaybackReady {
                            path,
                            progress: status_rx.clone(),
                        },
                    });
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.tick_interval) => {}
            }
        }

        debug!(transfer = %transfer, ?phase, "Monitor stopped");
        Ok(())
    }
}

/// First media file under `save_path` whose relative path mentions `name`
///
/// Order is whatever the directory listing yields, so with several matching
/// files the pick is only as stable as the filesystem's enumeration order.
pub fn find_playable_file(save_path: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(save_path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .find(|path| {
            let relative = path.strip_prefix(save_path).unwrap_or(path);
            is_media_file(path) && relative.to_string_lossy().contains(name)
        })
        .map(|path| std::path::absolute(&path).unwrap_or(path))
}

fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            MEDIA_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}
