//! torrentplay - play a torrent while it downloads
//!
//! Resolves a torrent descriptor, drives a transfer engine in sequential
//! mode, and announces a locally playable media file as soon as enough of it
//! has arrived.
//!
//! # Modules
//!
//! - `models` - Requests, limits, status samples and events
//! - `error` - Error taxonomy
//! - `config` - Settings file and directory layout
//! - `stream` - Resolver, session, monitor, controller and engines
//! - `cli` - Command line definitions and output helpers
//! - `commands` - CLI command handlers

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod stream;

// Re-export commonly used types
pub use config::Config;
pub use error::{CleanupError, ResolveError, SessionError, StartError, TransferError};
pub use models::{
    BandwidthLimits, PlaybackReady, Quality, RateLimit, Retention, SubtitleSelection,
    TransferEvent, TransferId, TransferRequest, TransferStatus,
};
pub use stream::{CoordinatorOptions, TransferCoordinator, TransferTicket};
