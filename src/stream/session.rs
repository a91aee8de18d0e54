//! Transfer session
//!
//! Opens one engine session and one torrent handle for a single playback
//! attempt, and bundles them into a [`TransferHandle`] that is the only owner
//! of the raw engine objects.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::models::{BandwidthLimits, RawStatus, TransferId};
use crate::stream::descriptor::TorrentDescriptor;
use crate::stream::engine::{
    AddTorrentParams, Engine, EngineError, EngineSession, EngineTorrent,
};

/// Default peer listening range
pub const DEFAULT_LISTEN_PORTS: RangeInclusive<u16> = 6881..=6889;

/// Exclusively owned session + torrent pair for one transfer
///
/// `close` releases both in order; dropping the handle releases them too.
pub struct TransferHandle {
    id: TransferId,
    name: String,
    save_path: PathBuf,
    torrent: Box<dyn EngineTorrent>,
    session: Box<dyn EngineSession>,
}

impl TransferHandle {
    pub fn id(&self) -> TransferId {
        self.id
    }

    /// Declared torrent name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    pub async fn status(&mut self) -> Result<RawStatus, EngineError> {
        self.torrent.status().await
    }

    pub async fn flush_cache(&mut self) -> Result<(), EngineError> {
        self.torrent.flush_cache().await
    }

    pub fn needs_resume_data(&self) -> bool {
        self.torrent.needs_resume_data()
    }

    pub async fn save_resume_data(&mut self) -> Result<(), EngineError> {
        self.torrent.save_resume_data().await
    }

    /// Remove the torrent and shut the session down
    pub async fn close(mut self) {
        if let Err(e) = self.torrent.remove().await {
            warn!(transfer = %self.id, "Failed to remove torrent: {}", e);
        }
        self.session.shutdown().await;
        debug!(transfer = %self.id, "Transfer handle released");
    }
}

/// Opens transfer sessions against an engine
pub struct TransferSession<'a> {
    engine: &'a dyn Engine,
    listen_ports: RangeInclusive<u16>,
}

impl<'a> TransferSession<'a> {
    pub fn new(engine: &'a dyn Engine) -> Self {
        Self {
            engine,
            listen_ports: DEFAULT_LISTEN_PORTS,
        }
    }

    pub fn with_listen_ports(mut self, ports: RangeInclusive<u16>) -> Self {
        self.listen_ports = ports;
        self
    }

    /// Open a sequential, rate-limited transfer for `descriptor_path`
    pub async fn open(
        &self,
        descriptor_path: &Path,
        destination: &Path,
        limits: BandwidthLimits,
    ) -> Result<TransferHandle, SessionError> {
        let invalid = |reason: String| SessionError::InvalidDescriptor {
            path: descriptor_path.to_path_buf(),
            reason,
        };
        let bytes = tokio::fs::read(descriptor_path)
            .await
            .map_err(|e| invalid(e.to_string()))?;
        let descriptor =
            TorrentDescriptor::from_bytes(&bytes).map_err(|e| invalid(e.to_string()))?;

        let mut session = self
            .engine
            .create_session()
            .await
            .map_err(SessionError::AddFailed)?;

        let configured = self
            .configure(session.as_mut(), descriptor_path, descriptor, destination, limits)
            .await;

        match configured {
            Ok((torrent, name)) => {
                info!(
                    torrent = %name,
                    save_path = %destination.display(),
                    upload = %limits.upload,
                    download = %limits.download,
                    "Transfer session opened"
                );
                Ok(TransferHandle {
                    id: TransferId::new(),
                    name,
                    save_path: destination.to_path_buf(),
                    torrent,
                    session,
                })
            }
            Err(e) => {
                session.shutdown().await;
                Err(e)
            }
        }
    }

    async fn configure(
        &self,
        session: &mut dyn EngineSession,
        descriptor_path: &Path,
        descriptor: TorrentDescriptor,
        destination: &Path,
        limits: BandwidthLimits,
    ) -> Result<(Box<dyn EngineTorrent>, String), SessionError> {
        match session.listen_on(self.listen_ports.clone()).await {
            Ok(port) => debug!(port, "Listening for peers"),
            Err(EngineError::PortInUse { start, end }) => {
                warn!("Ports {}-{} busy, letting the engine pick", start, end);
            }
            Err(e) => return Err(SessionError::AddFailed(e)),
        }

        let name = descriptor.name().to_string();
        let mut torrent = session
            .add_torrent(AddTorrentParams {
                descriptor_path: descriptor_path.to_path_buf(),
                descriptor,
                save_path: destination.to_path_buf(),
            })
            .await
            .map_err(|e| match e {
                EngineError::InvalidTorrent(reason) => SessionError::InvalidDescriptor {
                    path: descriptor_path.to_path_buf(),
                    reason,
                },
                other => SessionError::AddFailed(other),
            })?;

        if let Err(e) = apply_settings(torrent.as_mut(), limits).await {
            let _ = torrent.remove().await;
            return Err(SessionError::AddFailed(e));
        }

        Ok((torrent, name))
    }
}

async fn apply_settings(
    torrent: &mut dyn EngineTorrent,
    limits: BandwidthLimits,
) -> Result<(), EngineError> {
    torrent.set_upload_limit(limits.upload).await?;
    torrent.set_download_limit(limits.download).await?;
    // Pieces in file order so the front of the media completes first.
    torrent.set_sequential_download(true).await
}
