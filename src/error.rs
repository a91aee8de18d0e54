//! Error taxonomy for the transfer coordinator
//!
//! Start-time failures (`ResolveError`, `SessionError`) are surfaced to the
//! caller of `start`. Run-time failures (`TransferError`) are published as
//! `TransferFailed` events. `CleanupError` is never propagated: cleanup is
//! advisory, so callers log it and move on.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::Quality;
use crate::stream::engine::EngineError;

/// Errors while fetching a torrent descriptor
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No {0} source available for this title")]
    QualityUnavailable(Quality),
    #[error("Failed to fetch descriptor from {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("Failed to write descriptor to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors while opening an engine session for a descriptor
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid torrent descriptor {path}: {reason}")]
    InvalidDescriptor { path: PathBuf, reason: String },
    #[error("Engine rejected the torrent: {0}")]
    AddFailed(#[source] EngineError),
}

/// Errors that end a running transfer
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Transfer engine fault: {0}")]
    EngineFault(#[from] EngineError),
}

/// Errors that prevent a transfer from starting
#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Advisory cleanup failures, logged and swallowed
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Could not delete {path}: {source}")]
    DeleteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
