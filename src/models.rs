//! Data structures shared across the transfer coordinator
//!
//! Organized by domain:
//! - **Request**: what the user asked to play and where it may come from
//! - **Limits**: bandwidth caps applied to a transfer
//! - **Status**: per-tick observations of a running transfer
//! - **Events**: the closed set of notifications the coordinator publishes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::sync::watch;
use uuid::Uuid;

// =============================================================================
// Request Models
// =============================================================================

/// Video quality tier a source is published in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "480p")]
    SD480p,
    #[serde(rename = "720p")]
    HD720p,
    #[serde(rename = "1080p")]
    FHD1080p,
    #[serde(rename = "2160p")]
    UHD4K,
}

impl Quality {
    /// Parse quality from a loose string (e.g., "4K", "1080p", "FHD")
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let s_lower = s.to_lowercase();
        if s_lower.contains("4k") || s_lower.contains("2160p") || s_lower.contains("uhd") {
            Some(Quality::UHD4K)
        } else if s_lower.contains("1080p") || s_lower.contains("fhd") {
            Some(Quality::FHD1080p)
        } else if s_lower.contains("720p") || s_lower.contains("hd") && !s_lower.contains("hdcam")
        {
            Some(Quality::HD720p)
        } else if s_lower.contains("480p") || s_lower.contains("sd") {
            Some(Quality::SD480p)
        } else {
            None
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::UHD4K => write!(f, "2160p"),
            Quality::FHD1080p => write!(f, "1080p"),
            Quality::HD720p => write!(f, "720p"),
            Quality::SD480p => write!(f, "480p"),
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quality::from_str_loose(s).ok_or_else(|| format!("unknown quality '{}'", s))
    }
}

/// Subtitle picked by the user before playback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleSelection {
    pub id: String,
    pub language: String,
    pub url: String,
}

/// What to play, from where, and where to put it
///
/// Immutable once handed to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Stable content identity (e.g. an IMDB id)
    pub content_id: String,
    pub title: Option<String>,
    /// Descriptor URLs keyed by the quality they deliver
    pub sources: BTreeMap<Quality, String>,
    pub quality: Quality,
    /// Directory the engine saves media data into
    pub destination: PathBuf,
    pub subtitle: Option<SubtitleSelection>,
}

impl TransferRequest {
    /// Create a request with no sources yet
    pub fn new(
        content_id: impl Into<String>,
        quality: Quality,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            content_id: content_id.into(),
            title: None,
            sources: BTreeMap::new(),
            quality,
            destination: destination.into(),
            subtitle: None,
        }
    }

    /// Add a descriptor source for a quality tier
    pub fn with_source(mut self, quality: Quality, url: impl Into<String>) -> Self {
        self.sources.insert(quality, url.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_subtitle(mut self, subtitle: SubtitleSelection) -> Self {
        self.subtitle = Some(subtitle);
        self
    }

    /// Source URL for the requested quality, if one was published
    pub fn source_url(&self) -> Option<&str> {
        self.sources.get(&self.quality).map(String::as_str)
    }

    /// Name shown in logs: title when known, content id otherwise
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.content_id)
    }
}

// =============================================================================
// Bandwidth Models
// =============================================================================

/// A single direction's rate cap in bytes per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RateLimit {
    #[default]
    Unlimited,
    BytesPerSec(u64),
}

impl RateLimit {
    /// Build a cap from a KB/s setting; zero or absent means unlimited
    pub fn from_kbps(kbps: Option<u32>) -> Self {
        match kbps {
            Some(0) | None => RateLimit::Unlimited,
            Some(k) => RateLimit::BytesPerSec(u64::from(k) * 1024),
        }
    }

    pub fn bytes_per_sec(&self) -> Option<u64> {
        match self {
            RateLimit::Unlimited => None,
            RateLimit::BytesPerSec(b) => Some(*b),
        }
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimit::Unlimited => write!(f, "unlimited"),
            RateLimit::BytesPerSec(b) => write!(f, "{} KB/s", b / 1024),
        }
    }
}

/// Upload and download caps applied to a transfer at start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BandwidthLimits {
    pub upload: RateLimit,
    pub download: RateLimit,
}

impl BandwidthLimits {
    pub const UNLIMITED: BandwidthLimits = BandwidthLimits {
        upload: RateLimit::Unlimited,
        download: RateLimit::Unlimited,
    };
}

// =============================================================================
// Transfer Status Models
// =============================================================================

/// Identity of one transfer generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(pub Uuid);

impl TransferId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Absolute counters read from the engine on one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawStatus {
    pub bytes_done: u64,
    pub bytes_wanted: u64,
    /// Download rate in bytes per second
    pub download_rate: u64,
    pub num_seeds: u32,
    pub num_peers: u32,
    pub save_path: PathBuf,
    /// Declared torrent name
    pub name: String,
}

/// One sampled observation of a transfer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransferStatus {
    /// Percent complete in [0, 100]
    pub progress: f64,
    /// Download rate in KB/s, rounded
    pub download_rate_kbps: u64,
    pub seeds: u32,
    pub peers: u32,
    pub save_path: PathBuf,
    pub name: String,
}

impl TransferStatus {
    /// Derive an observation from a raw engine sample
    ///
    /// Each sample is authoritative; nothing is carried over from previous ticks.
    pub fn from_raw(raw: &RawStatus) -> Self {
        let progress = if raw.bytes_wanted == 0 {
            0.0
        } else {
            // multiply first so whole percentages stay exact
            (raw.bytes_done as f64 * 100.0 / raw.bytes_wanted as f64).clamp(0.0, 100.0)
        };

        Self {
            progress,
            download_rate_kbps: (raw.download_rate as f64 / 1024.0).round() as u64,
            seeds: raw.num_seeds,
            peers: raw.num_peers,
            save_path: raw.save_path.clone(),
            name: raw.name.clone(),
        }
    }

    /// Format download rate for display
    pub fn format_rate(&self) -> String {
        if self.download_rate_kbps >= 1024 {
            format!("{:.1} MB/s", self.download_rate_kbps as f64 / 1024.0)
        } else {
            format!("{} KB/s", self.download_rate_kbps)
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}% @ {} ({} peers, {} seeds)",
            self.progress,
            self.format_rate(),
            self.peers,
            self.seeds
        )
    }
}

// =============================================================================
// Events
// =============================================================================

/// Announced once per transfer when the media file is ready to open
#[derive(Debug, Clone)]
pub struct PlaybackReady {
    pub path: PathBuf,
    /// Keeps reporting transfer status after playback starts
    pub progress: watch::Receiver<TransferStatus>,
}

/// Notifications published by the coordinator
#[derive(Debug, Clone)]
pub enum TransferEvent {
    ProgressUpdated { transfer: TransferId, percent: f64 },
    RateUpdated { transfer: TransferId, kbps: u64 },
    PeerCountUpdated { transfer: TransferId, peers: u32 },
    SeedCountUpdated { transfer: TransferId, seeds: u32 },
    PlayableFileFound { transfer: TransferId, ready: PlaybackReady },
    TransferFailed { transfer: TransferId, reason: String },
}

impl TransferEvent {
    /// Transfer generation this event belongs to
    pub fn transfer(&self) -> TransferId {
        match self {
            TransferEvent::ProgressUpdated { transfer, .. }
            | TransferEvent::RateUpdated { transfer, .. }
            | TransferEvent::PeerCountUpdated { transfer, .. }
            | TransferEvent::SeedCountUpdated { transfer, .. }
            | TransferEvent::PlayableFileFound { transfer, .. }
            | TransferEvent::TransferFailed { transfer, .. } => *transfer,
        }
    }
}

/// What happens to the playable file when a transfer stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retention {
    /// Delete the partial media file
    #[default]
    Discard,
    /// Leave the media file on disk
    Keep,
}
