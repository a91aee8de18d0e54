//! Transfer engine primitive
//!
//! The coordinator never speaks the peer wire protocol itself. It drives an
//! engine through three layers: an [`Engine`] creates sessions, an
//! [`EngineSession`] listens for peers and accepts torrents, and an
//! [`EngineTorrent`] is the per-torrent handle (limits, sequential mode,
//! status, resume data).
//!
//! - `stub`: in-memory scripted engine for tests and dry runs
//! - `webtorrent`: drives the `webtorrent` CLI as a subprocess

use async_trait::async_trait;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::{RateLimit, RawStatus};
use crate::stream::descriptor::TorrentDescriptor;

pub mod stub;
pub mod webtorrent;

pub use stub::StubEngine;
pub use webtorrent::WebtorrentEngine;

/// Errors reported by an engine implementation
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Ports {start}-{end} are already in use")]
    PortInUse { start: u16, end: u16 },
    #[error("Invalid torrent: {0}")]
    InvalidTorrent(String),
    #[error("Engine rejected request: {0}")]
    Rejected(String),
    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Engine fault: {0}")]
    Fault(String),
}

/// Parameters for adding a torrent to a session
#[derive(Debug, Clone)]
pub struct AddTorrentParams {
    pub descriptor_path: PathBuf,
    pub descriptor: TorrentDescriptor,
    pub save_path: PathBuf,
}

#[async_trait]
pub trait Engine: Send + Sync {
    async fn create_session(&self) -> Result<Box<dyn EngineSession>, EngineError>;
}

#[async_trait]
pub trait EngineSession: Send {
    /// Bind the peer listener somewhere in `ports`, returning the chosen port
    async fn listen_on(&mut self, ports: RangeInclusive<u16>) -> Result<u16, EngineError>;
    async fn add_torrent(
        &mut self,
        params: AddTorrentParams,
    ) -> Result<Box<dyn EngineTorrent>, EngineError>;
    /// Release the session. Must be safe to call more than once.
    async fn shutdown(&mut self);
}

#[async_trait]
pub trait EngineTorrent: Send {
    async fn set_upload_limit(&mut self, limit: RateLimit) -> Result<(), EngineError>;
    async fn set_download_limit(&mut self, limit: RateLimit) -> Result<(), EngineError>;
    async fn set_sequential_download(&mut self, enabled: bool) -> Result<(), EngineError>;
    async fn status(&mut self) -> Result<RawStatus, EngineError>;
    async fn flush_cache(&mut self) -> Result<(), EngineError>;
    fn needs_resume_data(&self) -> bool;
    /// Ask the engine to checkpoint resume data; completion is not awaited
    async fn save_resume_data(&mut self) -> Result<(), EngineError>;
    /// Remove the torrent from its session, keeping downloaded data
    async fn remove(&mut self) -> Result<(), EngineError>;
}
