//! Bandwidth policy
//!
//! Turns the user's KB/s settings into byte-rate caps for a transfer.

use std::sync::Arc;

use crate::models::{BandwidthLimits, RateLimit};

/// Source of user bandwidth settings (KB/s; zero or absent means unlimited)
pub trait SettingsProvider: Send + Sync {
    fn upload_limit_kbps(&self) -> Option<u32>;
    fn download_limit_kbps(&self) -> Option<u32>;
}

/// Fixed settings, handy for tests and one-off runs
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSettings {
    pub upload_kbps: Option<u32>,
    pub download_kbps: Option<u32>,
}

impl SettingsProvider for FixedSettings {
    fn upload_limit_kbps(&self) -> Option<u32> {
        self.upload_kbps
    }

    fn download_limit_kbps(&self) -> Option<u32> {
        self.download_kbps
    }
}

/// Resolves current settings into limits, read once per transfer start
#[derive(Clone)]
pub struct BandwidthPolicy {
    settings: Option<Arc<dyn SettingsProvider>>,
}

impl BandwidthPolicy {
    pub fn new(settings: Arc<dyn SettingsProvider>) -> Self {
        Self {
            settings: Some(settings),
        }
    }

    /// Policy with no settings behind it; always unlimited
    pub fn unlimited() -> Self {
        Self { settings: None }
    }

    pub fn resolve(&self) -> BandwidthLimits {
        match &self.settings {
            Some(settings) => BandwidthLimits {
                upload: RateLimit::from_kbps(settings.upload_limit_kbps()),
                download: RateLimit::from_kbps(settings.download_limit_kbps()),
            },
            None => BandwidthLimits::UNLIMITED,
        }
    }
}
