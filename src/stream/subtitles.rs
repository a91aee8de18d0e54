//! Subtitle pre-fetch
//!
//! Optional step before a transfer starts: download the subtitle the user
//! picked into a per-content directory. Failures here never block playback.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::models::SubtitleSelection;
use crate::stream::resolver::sanitize_file_stem;

/// Collaborator that stores a selected subtitle under `dir`
#[async_trait]
pub trait SubtitleFetcher: Send + Sync {
    async fn fetch_to(&self, dir: &Path, selection: &SubtitleSelection) -> Result<PathBuf>;
}

/// Downloads subtitle files over HTTP
pub struct SubtitleClient {
    client: reqwest::Client,
}

impl SubtitleClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Get the file name a selection is stored under
    pub fn file_name(selection: &SubtitleSelection) -> String {
        format!(
            "{}_{}.srt",
            sanitize_file_stem(&selection.language),
            sanitize_file_stem(&selection.id)
        )
    }
}

impl Default for SubtitleClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubtitleFetcher for SubtitleClient {
    async fn fetch_to(&self, dir: &Path, selection: &SubtitleSelection) -> Result<PathBuf> {
        let path = dir.join(Self::file_name(selection));
        if path.exists() {
            return Ok(path);
        }

        let response = self
            .client
            .get(&selection.url)
            .send()
            .await
            .context("Failed to fetch subtitle")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Failed to download subtitle: {}",
                response.status()
            ));
        }

        let content = response
            .bytes()
            .await
            .context("Failed to read subtitle body")?;

        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        tokio::fs::write(&path, &content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_is_safe() {
        let selection = SubtitleSelection {
            id: "55419|Some.Release/x".to_string(),
            language: "eng".to_string(),
            url: "http://example.com/sub".to_string(),
        };
        assert_eq!(SubtitleClient::file_name(&selection), "eng_55419_Some_Release_x.srt");
    }

    #[test]
    fn test_file_name_flattens_language() {
        let selection = SubtitleSelection {
            id: "1".to_string(),
            language: "../../etc/cron.d/x".to_string(),
            url: "http://example.com/sub".to_string(),
        };
        let name = SubtitleClient::file_name(&selection);
        assert_eq!(name, "______etc_cron_d_x_1.srt");
        assert!(!name.contains('/'));
    }
}
