//! Lifecycle controller
//!
//! The single authority over whether a transfer is running. It owns the
//! active transfer (cancellation token, background task, announced playable
//! file) and is the only place transfers are started, stopped and cleaned up.
//! At most one transfer is active per coordinator; starting another first
//! stops the current one and waits for its teardown.

use parking_lot::Mutex;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{CleanupError, StartError};
use crate::models::{Retention, TransferEvent, TransferId, TransferRequest};
use crate::stream::bandwidth::BandwidthPolicy;
use crate::stream::engine::Engine;
use crate::stream::monitor::{
    ProgressMonitor, TransferObserver, DEFAULT_BUFFERING_THRESHOLD, DEFAULT_TICK_INTERVAL,
};
use crate::stream::resolver::{sanitize_file_stem, TorrentResolver};
use crate::stream::session::{TransferSession, DEFAULT_LISTEN_PORTS};
use crate::stream::subtitles::SubtitleFetcher;

/// Tunables for every transfer the coordinator runs
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub tick_interval: Duration,
    /// Percent complete before the media file is announced
    pub buffering_threshold: f64,
    pub listen_ports: RangeInclusive<u16>,
    /// Root for per-content subtitle directories
    pub subtitle_dir: Option<PathBuf>,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            buffering_threshold: DEFAULT_BUFFERING_THRESHOLD,
            listen_ports: DEFAULT_LISTEN_PORTS,
            subtitle_dir: None,
        }
    }
}

/// Returned by a successful `start`
#[derive(Debug, Clone)]
pub struct TransferTicket {
    pub transfer: TransferId,
    pub descriptor: PathBuf,
    pub subtitle: Option<PathBuf>,
}

/// Requests accepted by [`TransferCoordinator::serve`]
#[derive(Debug)]
pub enum CoordinatorCommand {
    Start {
        request: TransferRequest,
        reply: oneshot::Sender<Result<TransferTicket, StartError>>,
    },
    Stop {
        retention: Retention,
    },
}

struct ActiveTransfer {
    id: TransferId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    playable: Arc<Mutex<Option<PathBuf>>>,
}

/// Forwards monitor events and remembers the announced media file
#[derive(Clone)]
struct Relay {
    events: mpsc::UnboundedSender<TransferEvent>,
    playable: Arc<Mutex<Option<PathBuf>>>,
}

impl TransferObserver for Relay {
    fn notify(&self, event: TransferEvent) {
        if let TransferEvent::PlayableFileFound { ready, .. } = &event {
            *self.playable.lock() = Some(ready.path.clone());
        }
        let _ = self.events.send(event);
    }
}

pub struct TransferCoordinator {
    engine: Arc<dyn Engine>,
    resolver: TorrentResolver,
    bandwidth: BandwidthPolicy,
    subtitles: Option<Arc<dyn SubtitleFetcher>>,
    options: CoordinatorOptions,
    events: mpsc::UnboundedSender<TransferEvent>,
    active: Option<ActiveTransfer>,
}

impl TransferCoordinator {
    /// Create a coordinator and the receiving end of its event stream
    pub fn new(
        engine: Arc<dyn Engine>,
        resolver: TorrentResolver,
        bandwidth: BandwidthPolicy,
        options: CoordinatorOptions,
    ) -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            engine,
            resolver,
            bandwidth,
            subtitles: None,
            options,
            events,
            active: None,
        };
        (coordinator, rx)
    }

    pub fn with_subtitles(mut self, fetcher: Arc<dyn SubtitleFetcher>) -> Self {
        self.subtitles = Some(fetcher);
        self
    }

    /// Whether a transfer is running (its monitor has not exited)
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.task.is_finished())
    }

    pub fn active_transfer(&self) -> Option<TransferId> {
        self.active.as_ref().map(|active| active.id)
    }

    /// Media file announced for the current transfer, if any
    pub fn playable_path(&self) -> Option<PathBuf> {
        self.active
            .as_ref()
            .and_then(|active| active.playable.lock().clone())
    }

    /// Start a transfer, stopping any transfer already running
    ///
    /// Resolution and session setup happen before this returns; the tick
    /// loop runs on a background task.
    pub async fn start(&mut self, request: TransferRequest) -> Result<TransferTicket, StartError> {
        self.stop().await;

        info!(
            content = %request.content_id,
            title = request.display_name(),
            quality = %request.quality,
            "Starting transfer"
        );

        let limits = self.bandwidth.resolve();
        let descriptor = self.resolver.resolve(&request).await?;
        let subtitle = self.fetch_subtitle(&request).await;

        let mut handle = TransferSession::new(self.engine.as_ref())
            .with_listen_ports(self.options.listen_ports.clone())
            .open(&descriptor, &request.destination, limits)
            .await?;
        let id = handle.id();

        let cancel = CancellationToken::new();
        let relay = Relay {
            events: self.events.clone(),
            playable: Arc::new(Mutex::new(None)),
        };
        let playable = Arc::clone(&relay.playable);
        let monitor =
            ProgressMonitor::new(self.options.tick_interval, self.options.buffering_threshold);

        let monitor_cancel = cancel.clone();
        let monitor_relay = relay.clone();
        let task = tokio::spawn(async move {
            // The handle lives on its own task so a panicking tick still drops it.
            let run = tokio::spawn(async move {
                let result = monitor.run(&mut handle, &monitor_relay, &monitor_cancel).await;
                handle.close().await;
                result
            });

            let failure = match run.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => Some(format!("monitor task aborted: {}", e)),
            };

            if let Some(reason) = failure {
                warn!(transfer = %id, "Transfer failed: {}", reason);
                let path = relay.playable.lock().take();
                if let Some(path) = path {
                    log_cleanup(delete_playable(&path).await);
                }
                let _ = relay.events.send(TransferEvent::TransferFailed {
                    transfer: id,
                    reason,
                });
            }
        });

        self.active = Some(ActiveTransfer {
            id,
            cancel,
            task,
            playable,
        });

        Ok(TransferTicket {
            transfer: id,
            descriptor,
            subtitle,
        })
    }

    /// Stop the active transfer and delete its media file
    pub async fn stop(&mut self) {
        self.stop_with(Retention::Discard).await;
    }

    /// Stop the active transfer; a no-op when nothing is running
    pub async fn stop_with(&mut self, retention: Retention) {
        let Some(active) = self.active.take() else {
            return;
        };

        info!(transfer = %active.id, ?retention, "Stopping transfer");
        active.cancel.cancel();
        if let Err(e) = active.task.await {
            warn!(transfer = %active.id, "Transfer task ended abnormally: {}", e);
        }

        let path = active.playable.lock().take();
        if let (Some(path), Retention::Discard) = (path, retention) {
            log_cleanup(delete_playable(&path).await);
        }
    }

    /// Process commands until the channel closes, then stop
    pub async fn serve(mut self, mut commands: mpsc::Receiver<CoordinatorCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                CoordinatorCommand::Start { request, reply } => {
                    let result = self.start(request).await;
                    let _ = reply.send(result);
                }
                CoordinatorCommand::Stop { retention } => self.stop_with(retention).await,
            }
        }
        self.stop().await;
    }

    async fn fetch_subtitle(&self, request: &TransferRequest) -> Option<PathBuf> {
        let selection = request.subtitle.as_ref()?;
        let fetcher = self.subtitles.as_ref()?;
        let root = self.options.subtitle_dir.as_ref()?;
        let dir = root.join(sanitize_file_stem(&request.content_id));

        match fetcher.fetch_to(&dir, selection).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(content = %request.content_id, "Subtitle fetch failed: {:#}", e);
                None
            }
        }
    }
}

/// Remove a partial media file; a file that is already gone is fine
async fn delete_playable(path: &Path) -> Result<(), CleanupError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CleanupError::DeleteFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn log_cleanup(result: Result<(), CleanupError>) {
    if let Err(e) = result {
        warn!("{}", e);
    }
}
