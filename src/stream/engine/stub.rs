//! In-memory engine double
//!
//! Replays a scripted sequence of counter samples and records every call in
//! a shared ledger so tests can assert on limits, sequential mode, resume
//! saves and resource release.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;

use super::{AddTorrentParams, Engine, EngineError, EngineSession, EngineTorrent};
use crate::models::{RateLimit, RawStatus};

/// One scripted tick of engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StubSample {
    pub bytes_done: u64,
    pub bytes_wanted: u64,
    pub download_rate: u64,
    pub seeds: u32,
    pub peers: u32,
}

impl StubSample {
    /// Sample at `percent` of a 1000-byte torrent
    pub fn at_percent(percent: u64) -> Self {
        Self {
            bytes_done: percent * 10,
            bytes_wanted: 1000,
            download_rate: 0,
            seeds: 0,
            peers: 0,
        }
    }

    pub fn with_rate(mut self, bytes_per_sec: u64) -> Self {
        self.download_rate = bytes_per_sec;
        self
    }

    pub fn with_swarm(mut self, seeds: u32, peers: u32) -> Self {
        self.seeds = seeds;
        self.peers = peers;
        self
    }
}

/// Everything the stub has been asked to do
#[derive(Debug, Clone, Default)]
pub struct StubLedger {
    pub sessions_created: usize,
    pub sessions_open: usize,
    pub listen_ports: Vec<u16>,
    pub torrents_added: usize,
    pub torrents_open: usize,
    pub save_paths: Vec<PathBuf>,
    pub upload_limit: Option<RateLimit>,
    pub download_limit: Option<RateLimit>,
    pub sequential: Option<bool>,
    pub status_reads: usize,
    pub flushes: usize,
    pub resume_saves: usize,
}

#[derive(Debug, Clone, Default)]
struct StubScript {
    samples: Vec<StubSample>,
    fail_after: Option<usize>,
    ports_taken: bool,
    reject_add: Option<String>,
    needs_resume: bool,
    resume_fails: bool,
}

/// Scripted engine; clones share the same script and ledger
#[derive(Debug, Clone, Default)]
pub struct StubEngine {
    script: Arc<Mutex<StubScript>>,
    ledger: Arc<Mutex<StubLedger>>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples returned by successive status reads; the last one repeats
    pub fn with_samples(self, samples: impl IntoIterator<Item = StubSample>) -> Self {
        self.script.lock().samples = samples.into_iter().collect();
        self
    }

    /// Status reads after the first `reads` return a fault
    pub fn failing_after(self, reads: usize) -> Self {
        self.script.lock().fail_after = Some(reads);
        self
    }

    /// Every listen attempt reports the port range as taken
    pub fn with_ports_taken(self) -> Self {
        self.script.lock().ports_taken = true;
        self
    }

    pub fn rejecting_adds(self, reason: impl Into<String>) -> Self {
        self.script.lock().reject_add = Some(reason.into());
        self
    }

    /// Torrents report that resume data should be saved on every tick
    pub fn needing_resume_data(self) -> Self {
        self.script.lock().needs_resume = true;
        self
    }

    pub fn failing_resume_saves(self) -> Self {
        self.script.lock().resume_fails = true;
        self
    }

    /// Snapshot of the calls made so far
    pub fn ledger(&self) -> StubLedger {
        self.ledger.lock().clone()
    }
}

#[async_trait]
impl Engine for StubEngine {
    async fn create_session(&self) -> Result<Box<dyn EngineSession>, EngineError> {
        {
            let mut ledger = self.ledger.lock();
            ledger.sessions_created += 1;
            ledger.sessions_open += 1;
        }
        Ok(Box::new(StubSession {
            script: self.script.lock().clone(),
            ledger: Arc::clone(&self.ledger),
            closed: false,
        }))
    }
}

struct StubSession {
    script: StubScript,
    ledger: Arc<Mutex<StubLedger>>,
    closed: bool,
}

impl StubSession {
    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.ledger.lock().sessions_open -= 1;
        }
    }
}

impl Drop for StubSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl EngineSession for StubSession {
    async fn listen_on(&mut self, ports: RangeInclusive<u16>) -> Result<u16, EngineError> {
        if self.script.ports_taken {
            return Err(EngineError::PortInUse {
                start: *ports.start(),
                end: *ports.end(),
            });
        }
        let port = *ports.start();
        self.ledger.lock().listen_ports.push(port);
        Ok(port)
    }

    async fn add_torrent(
        &mut self,
        params: AddTorrentParams,
    ) -> Result<Box<dyn EngineTorrent>, EngineError> {
        if let Some(reason) = &self.script.reject_add {
            return Err(EngineError::Rejected(reason.clone()));
        }
        {
            let mut ledger = self.ledger.lock();
            ledger.torrents_added += 1;
            ledger.torrents_open += 1;
            ledger.save_paths.push(params.save_path.clone());
        }
        Ok(Box::new(StubTorrent {
            script: self.script.clone(),
            ledger: Arc::clone(&self.ledger),
            name: params.descriptor.name().to_string(),
            save_path: params.save_path,
            reads: 0,
            removed: false,
        }))
    }

    async fn shutdown(&mut self) {
        self.release();
    }
}

struct StubTorrent {
    script: StubScript,
    ledger: Arc<Mutex<StubLedger>>,
    name: String,
    save_path: PathBuf,
    reads: usize,
    removed: bool,
}

impl StubTorrent {
    fn release(&mut self) {
        if !self.removed {
            self.removed = true;
            self.ledger.lock().torrents_open -= 1;
        }
    }
}

impl Drop for StubTorrent {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl EngineTorrent for StubTorrent {
    async fn set_upload_limit(&mut self, limit: RateLimit) -> Result<(), EngineError> {
        self.ledger.lock().upload_limit = Some(limit);
        Ok(())
    }

    async fn set_download_limit(&mut self, limit: RateLimit) -> Result<(), EngineError> {
        self.ledger.lock().download_limit = Some(limit);
        Ok(())
    }

    async fn set_sequential_download(&mut self, enabled: bool) -> Result<(), EngineError> {
        self.ledger.lock().sequential = Some(enabled);
        Ok(())
    }

    async fn status(&mut self) -> Result<RawStatus, EngineError> {
        self.ledger.lock().status_reads += 1;

        if let Some(limit) = self.script.fail_after {
            if self.reads >= limit {
                return Err(EngineError::Fault("scripted status failure".to_string()));
            }
        }

        let sample = self
            .script
            .samples
            .get(self.reads)
            .or_else(|| self.script.samples.last())
            .copied()
            .unwrap_or_default();
        self.reads += 1;

        Ok(RawStatus {
            bytes_done: sample.bytes_done,
            bytes_wanted: sample.bytes_wanted,
            download_rate: sample.download_rate,
            num_seeds: sample.seeds,
            num_peers: sample.peers,
            save_path: self.save_path.clone(),
            name: self.name.clone(),
        })
    }

    async fn flush_cache(&mut self) -> Result<(), EngineError> {
        self.ledger.lock().flushes += 1;
        Ok(())
    }

    fn needs_resume_data(&self) -> bool {
        self.script.needs_resume
    }

    async fn save_resume_data(&mut self) -> Result<(), EngineError> {
        self.ledger.lock().resume_saves += 1;
        if self.script.resume_fails {
            return Err(EngineError::Fault("scripted resume failure".to_string()));
        }
        Ok(())
    }

    async fn remove(&mut self) -> Result<(), EngineError> {
        self.release();
        Ok(())
    }
}
