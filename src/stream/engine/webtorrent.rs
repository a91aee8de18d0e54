//! Engine backed by webtorrent-cli
//!
//! Each torrent runs as a `webtorrent download` subprocess. Limits and the
//! listen port are passed on the command line, so the process is launched
//! lazily on the first status read, after the session has configured the
//! handle. Progress is scraped from the CLI's status screen.
//!
//! The status screen shows connected and total peers but never a seed
//! count, so `RawStatus::num_seeds` is always 0 for this engine.

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use std::net::TcpListener;
use std::ops::RangeInclusive;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{AddTorrentParams, Engine, EngineError, EngineSession, EngineTorrent};
use crate::models::{RateLimit, RawStatus};

/// Engine that shells out to the `webtorrent` binary
pub struct WebtorrentEngine {
    webtorrent_path: String,
}

impl WebtorrentEngine {
    pub fn new() -> Self {
        Self {
            webtorrent_path: "webtorrent".to_string(),
        }
    }

    /// Create with custom webtorrent path
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            webtorrent_path: path.into(),
        }
    }
}

impl Default for WebtorrentEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for WebtorrentEngine {
    async fn create_session(&self) -> Result<Box<dyn EngineSession>, EngineError> {
        Ok(Box::new(WebtorrentSession {
            webtorrent_path: self.webtorrent_path.clone(),
            port: None,
        }))
    }
}

struct WebtorrentSession {
    webtorrent_path: String,
    port: Option<u16>,
}

#[async_trait]
impl EngineSession for WebtorrentSession {
    async fn listen_on(&mut self, ports: RangeInclusive<u16>) -> Result<u16, EngineError> {
        let (start, end) = (*ports.start(), *ports.end());
        // Find a free port; the subprocess binds it for real.
        for port in ports {
            if TcpListener::bind(("0.0.0.0", port)).is_ok() {
                self.port = Some(port);
                return Ok(port);
            }
        }
        Err(EngineError::PortInUse { start, end })
    }

    async fn add_torrent(
        &mut self,
        params: AddTorrentParams,
    ) -> Result<Box<dyn EngineTorrent>, EngineError> {
        if !params.descriptor_path.is_file() {
            return Err(EngineError::InvalidTorrent(format!(
                "{} does not exist",
                params.descriptor_path.display()
            )));
        }
        std::fs::create_dir_all(&params.save_path)?;

        Ok(Box::new(WebtorrentTorrent {
            webtorrent_path: self.webtorrent_path.clone(),
            port: self.port,
            params,
            upload: RateLimit::Unlimited,
            download: RateLimit::Unlimited,
            sequential: false,
            child: None,
            reader: None,
            progress: Arc::new(Mutex::new(WebtorrentProgress::default())),
        }))
    }

    async fn shutdown(&mut self) {
        self.port = None;
    }
}

struct WebtorrentTorrent {
    webtorrent_path: String,
    port: Option<u16>,
    params: AddTorrentParams,
    upload: RateLimit,
    download: RateLimit,
    sequential: bool,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    progress: Arc<Mutex<WebtorrentProgress>>,
}

impl WebtorrentTorrent {
    fn ensure_configurable(&self) -> Result<(), EngineError> {
        if self.child.is_some() {
            return Err(EngineError::Rejected(
                "webtorrent settings are fixed once the transfer is running".to_string(),
            ));
        }
        Ok(())
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.webtorrent_path);
        cmd.arg("download")
            .arg(&self.params.descriptor_path)
            .arg("--out")
            .arg(&self.params.save_path);
        if let Some(port) = self.port {
            cmd.arg("--torrent-port").arg(port.to_string());
        }
        if let Some(kbps) = limit_kbps(self.download) {
            cmd.arg("--download-limit").arg(kbps.to_string());
        }
        if let Some(kbps) = limit_kbps(self.upload) {
            cmd.arg("--upload-limit").arg(kbps.to_string());
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    fn ensure_started(&mut self) -> Result<(), EngineError> {
        if self.child.is_some() {
            return Ok(());
        }

        debug!(
            descriptor = %self.params.descriptor_path.display(),
            sequential = self.sequential,
            "launching webtorrent"
        );
        let mut child = self.build_command().spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::Fault(
                    "webtorrent not found. Install with: npm install -g webtorrent-cli"
                        .to_string(),
                )
            } else {
                EngineError::Io(e)
            }
        })?;

        if let Some(stdout) = child.stdout.take() {
            let progress = Arc::clone(&self.progress);
            self.reader = Some(tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    progress.lock().apply_line(&line);
                }
            }));
        }

        self.child = Some(child);
        Ok(())
    }
}

#[async_trait]
impl EngineTorrent for WebtorrentTorrent {
    async fn set_upload_limit(&mut self, limit: RateLimit) -> Result<(), EngineError> {
        self.ensure_configurable()?;
        self.upload = limit;
        Ok(())
    }

    async fn set_download_limit(&mut self, limit: RateLimit) -> Result<(), EngineError> {
        self.ensure_configurable()?;
        self.download = limit;
        Ok(())
    }

    async fn set_sequential_download(&mut self, enabled: bool) -> Result<(), EngineError> {
        self.ensure_configurable()?;
        // webtorrent has no flag for this; its reader prioritizes pieces in stream order.
        self.sequential = enabled;
        Ok(())
    }

    async fn status(&mut self) -> Result<RawStatus, EngineError> {
        self.ensure_started()?;

        if let Some(child) = self.child.as_mut() {
            if let Some(exit) = child.try_wait()? {
                if !exit.success() {
                    return Err(EngineError::Fault(format!("webtorrent exited with {}", exit)));
                }
            }
        }

        let progress = self.progress.lock().clone();
        let bytes_wanted = if progress.total > 0 {
            progress.total
        } else {
            self.params.descriptor.total_length()
        };

        Ok(RawStatus {
            bytes_done: progress.downloaded.min(bytes_wanted),
            bytes_wanted,
            download_rate: progress.speed,
            // not reported by webtorrent
            num_seeds: 0,
            num_peers: progress.peers,
            save_path: self.params.save_path.clone(),
            name: self.params.descriptor.name().to_string(),
        })
    }

    async fn flush_cache(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn needs_resume_data(&self) -> bool {
        false
    }

    async fn save_resume_data(&mut self) -> Result<(), EngineError> {
        Err(EngineError::Rejected(
            "webtorrent does not support resume data".to_string(),
        ))
    }

    async fn remove(&mut self) -> Result<(), EngineError> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!("Failed to stop webtorrent: {}", e);
            }
        }
        Ok(())
    }
}

/// Counters scraped from the webtorrent status screen
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebtorrentProgress {
    pub speed: u64,
    pub downloaded: u64,
    pub total: u64,
    pub peers: u32,
}

impl WebtorrentProgress {
    /// Update with whatever counters one status line carries
    ///
    /// The screen looks like
    /// `Speed: 1.2 MB/s Downloaded: 50.1 MB/700 MB Uploaded: 0 B` and
    /// `Running time: 1 minute  Time remaining: 2 minutes  Peers: 3 / 27`.
    pub fn apply_line(&mut self, line: &str) {
        let line = strip_ansi(line);

        if let Some(speed) = parse_speed(&line) {
            self.speed = speed;
        }
        if let Some((done, total)) = parse_downloaded(&line) {
            self.downloaded = done;
            self.total = total;
        }
        if let Some(peers) = parse_peers(&line) {
            self.peers = peers;
        }
    }
}

/// webtorrent takes limits in kB/s (1024 bytes); a nonzero cap never rounds to unlimited
fn limit_kbps(limit: RateLimit) -> Option<u64> {
    limit.bytes_per_sec().map(|bps| (bps / 1024).max(1))
}

/// Remove terminal color and cursor escapes
pub fn strip_ansi(line: &str) -> String {
    match Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]") {
        Ok(re) => re.replace_all(line, "").into_owned(),
        Err(_) => line.to_string(),
    }
}

/// Parse download speed: "Speed: 1.2 MB/s" -> 1200000 bytes/sec
pub fn parse_speed(line: &str) -> Option<u64> {
    let re = Regex::new(r"Speed:\s*([\d.]+)\s*(B|kB|KB|MB|GB|TB)/s").ok()?;
    let caps = re.captures(line)?;
    to_bytes(caps.get(1)?.as_str(), caps.get(2)?.as_str())
}

/// Parse downloaded and total: "Downloaded: 50 MB/700 MB" -> (50000000, 700000000)
pub fn parse_downloaded(line: &str) -> Option<(u64, u64)> {
    let re = Regex::new(
        r"Downloaded:\s*([\d.]+)\s*(B|kB|KB|MB|GB|TB)\s*/\s*([\d.]+)\s*(B|kB|KB|MB|GB|TB)",
    )
    .ok()?;
    let caps = re.captures(line)?;
    let done = to_bytes(caps.get(1)?.as_str(), caps.get(2)?.as_str())?;
    let total = to_bytes(caps.get(3)?.as_str(), caps.get(4)?.as_str())?;
    Some((done, total))
}

/// Parse swarm size: "Peers: 3 / 27" -> 27
pub fn parse_peers(line: &str) -> Option<u32> {
    let re = Regex::new(r"Peers:\s*(\d+)\s*/\s*(\d+)").ok()?;
    let caps = re.captures(line)?;
    caps.get(2)?.as_str().parse().ok()
}

/// webtorrent prints decimal (SI) units
fn to_bytes(value: &str, unit: &str) -> Option<u64> {
    let value: f64 = value.parse().ok()?;
    let multiplier: f64 = match unit {
        "B" => 1.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };
    Some((value * multiplier) as u64)
}
