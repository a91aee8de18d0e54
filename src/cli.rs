//! CLI - Command Line Interface for torrentplay
//!
//! Thin front end over the transfer coordinator. All output is
//! JSON-parseable when `--json` is set or stdout is not a terminal.
//!
//! # Examples
//!
//! ```bash
//! # Stream a title, buffering the 1080p source
//! torrentplay play tt1877830 \
//!     --source 1080p=https://example.com/batman.1080p.torrent \
//!     --source 720p=https://example.com/batman.720p.torrent \
//!     --quality 1080p
//!
//! # Cap bandwidth for future transfers
//! torrentplay config set-limits --upload 100 --download 0
//! ```

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::error::{ResolveError, StartError};
use crate::models::{Quality, SubtitleSelection};

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments
    InvalidArgs = 2,
    /// Network error
    NetworkError = 3,
    /// Requested quality has no source
    QualityUnavailable = 4,
    /// Transfer ended with an engine fault
    TransferFailed = 5,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

impl From<&StartError> for ExitCode {
    fn from(err: &StartError) -> ExitCode {
        match err {
            StartError::Resolve(ResolveError::QualityUnavailable(_)) => {
                ExitCode::QualityUnavailable
            }
            StartError::Resolve(ResolveError::Network { .. }) => ExitCode::NetworkError,
            StartError::Resolve(ResolveError::Io { .. }) => ExitCode::Error,
            StartError::Session(_) => ExitCode::TransferFailed,
        }
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// torrentplay - stream torrents into a local media file
#[derive(Parser, Debug)]
#[command(
    name = "torrentplay",
    version,
    author = "Gorka & Hermes",
    about = "Buffer a torrent sequentially and hand the media file to your player",
    long_about = "Fetches a torrent descriptor for the chosen quality, downloads it \
                  in piece order under bandwidth caps, and reports the media file \
                  path once enough of it has arrived to start playback.",
    after_help = "EXAMPLES:\n\
                  torrentplay play tt1877830 --source 1080p=URL     Stream a title\n\
                  torrentplay config show --json                    Show settings\n\
                  torrentplay config set-limits --upload 100        Cap upload at 100 KB/s"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a title sequentially and report when it is playable
    #[command(visible_alias = "p")]
    Play(PlayCmd),

    /// Show or change settings
    #[command(subcommand)]
    Config(ConfigCmd),
}

// =============================================================================
// Play Command
// =============================================================================

/// Stream a title from one of its published torrent sources
#[derive(Args, Debug)]
pub struct PlayCmd {
    /// Content identifier (e.g. tt1877830)
    #[arg(required = true)]
    pub content_id: String,

    /// Descriptor source as QUALITY=URL (repeatable)
    #[arg(long = "source", short = 's', value_parser = parse_source, required = true)]
    pub sources: Vec<(Quality, String)>,

    /// Quality to stream (defaults to the configured preference, then the best source)
    #[arg(long, short = 'Q')]
    pub quality: Option<Quality>,

    /// Directory to save media into
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,

    /// Title used in output
    #[arg(long, short = 't')]
    pub title: Option<String>,

    /// Subtitle file URL to fetch before playback
    #[arg(long, requires = "subtitle_lang")]
    pub subtitle_url: Option<String>,

    /// Language code for the subtitle (e.g. eng)
    #[arg(long, requires = "subtitle_url")]
    pub subtitle_lang: Option<String>,

    /// Keep the downloaded media when stopping
    #[arg(long, short = 'k')]
    pub keep: bool,
}

impl PlayCmd {
    /// Pick the quality to stream: explicit flag, then preference, then best source
    pub fn pick_quality(&self, preferred: Option<Quality>) -> Option<Quality> {
        self.quality
            .or_else(|| {
                preferred.filter(|q| self.sources.iter().any(|(source, _)| source == q))
            })
            .or_else(|| self.sources.iter().map(|(q, _)| *q).max())
    }

    /// Subtitle selection from the `--subtitle-*` flags
    pub fn subtitle(&self) -> Option<SubtitleSelection> {
        let url = self.subtitle_url.clone()?;
        let language = self.subtitle_lang.clone()?;
        Some(SubtitleSelection {
            id: self.content_id.clone(),
            language,
            url,
        })
    }
}

/// Parse a `QUALITY=URL` source argument
pub fn parse_source(s: &str) -> Result<(Quality, String), String> {
    let (quality, url) = s
        .split_once('=')
        .ok_or_else(|| format!("expected QUALITY=URL, got '{}'", s))?;
    let quality: Quality = quality.trim().parse()?;
    let url = url.trim();
    if url.is_empty() {
        return Err(format!("missing URL for {}", quality));
    }
    Ok((quality, url.to_string()))
}

// =============================================================================
// Config Command
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum ConfigCmd {
    /// Print the effective configuration
    Show,

    /// Set bandwidth caps in KB/s (0 = unlimited)
    SetLimits(SetLimitsCmd),
}

#[derive(Args, Debug)]
pub struct SetLimitsCmd {
    /// Upload cap in KB/s
    #[arg(long, short = 'u')]
    pub upload: Option<u32>,

    /// Download cap in KB/s
    #[arg(long, short = 'd')]
    pub download: Option<u32>,
}

// =============================================================================
// JSON Output Types
// =============================================================================

/// Generic JSON output wrapper with status
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    /// Create success output with data
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: 0,
        }
    }

    /// Create error output (no data)
    pub fn error_msg(msg: impl Into<String>, code: ExitCode) -> JsonOutput<()> {
        JsonOutput::<()> {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

/// Emitted once the media file can be opened by a player
#[derive(Debug, Serialize, Deserialize)]
pub struct PlayableResponse {
    pub status: &'static str,
    pub transfer: String,
    pub path: PathBuf,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<PathBuf>,
}

/// Emitted when a transfer ends
#[derive(Debug, Serialize, Deserialize)]
pub struct StoppedResponse {
    pub status: &'static str,
    pub transfer: String,
    pub kept: bool,
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Output handler for consistent formatting
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Print success data
    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if self.json {
            let output = JsonOutput::success(data);
            println!("{}", serde_json::to_string(&output)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Ok(())
    }

    /// Print error and return exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, code);
            if let Ok(json) = serde_json::to_string(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Print info message (suppressed in quiet mode)
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
