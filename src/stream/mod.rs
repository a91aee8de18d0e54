//! Streaming transfer coordinator
//!
//! - Bandwidth: user caps resolved into byte-rate limits
//! - Resolver: fetches the `.torrent` descriptor over HTTP
//! - Session: opens a sequential, rate-limited engine transfer
//! - Monitor: per-tick status, buffering detection, playable file
//! - Controller: start/stop lifecycle and cleanup
//! - Engine: the injected transfer primitive and its adapters
//! - Subtitles: optional pre-transfer subtitle download

pub mod bandwidth;
pub mod controller;
pub mod descriptor;
pub mod engine;
pub mod monitor;
pub mod resolver;
pub mod session;
pub mod subtitles;

pub use bandwidth::{BandwidthPolicy, FixedSettings, SettingsProvider};
pub use controller::{CoordinatorCommand, CoordinatorOptions, TransferCoordinator, TransferTicket};
pub use engine::{Engine, StubEngine, WebtorrentEngine};
pub use monitor::{ProgressMonitor, TransferObserver};
pub use resolver::TorrentResolver;
pub use session::{TransferHandle, TransferSession};
pub use subtitles::{SubtitleClient, SubtitleFetcher};
