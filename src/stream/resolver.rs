//! Torrent descriptor resolver
//!
//! Downloads the `.torrent` for a request's quality into a per-content file.
//! The body is written to a hidden `.part` sibling first and renamed into
//! place, so callers never see a half-written descriptor.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ResolveError;
use crate::models::TransferRequest;

/// Largest descriptor body accepted from a source
pub const MAX_DESCRIPTOR_BYTES: u64 = 8 * 1024 * 1024;

/// Fetches descriptors over HTTP into `torrent_dir`
pub struct TorrentResolver {
    client: reqwest::Client,
    torrent_dir: PathBuf,
    max_size: u64,
}

impl TorrentResolver {
    pub fn new(torrent_dir: impl Into<PathBuf>) -> Self {
        Self::with_client(reqwest::Client::new(), torrent_dir)
    }

    /// Create with a preconfigured HTTP client
    pub fn with_client(client: reqwest::Client, torrent_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            torrent_dir: torrent_dir.into(),
            max_size: MAX_DESCRIPTOR_BYTES,
        }
    }

    /// Override the body size limit
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    pub fn torrent_dir(&self) -> &Path {
        &self.torrent_dir
    }

    /// Where the descriptor for `content_id` lands
    pub fn descriptor_path(&self, content_id: &str) -> PathBuf {
        self.torrent_dir
            .join(format!("{}.torrent", sanitize_file_stem(content_id)))
    }

    /// Download the descriptor for the request's chosen quality
    pub async fn resolve(&self, request: &TransferRequest) -> Result<PathBuf, ResolveError> {
        let url = request
            .source_url()
            .ok_or(ResolveError::QualityUnavailable(request.quality))?;

        let body = self.fetch(url).await?;

        let target = self.descriptor_path(&request.content_id);
        let part = self.torrent_dir.join(format!(
            ".{}.torrent.part",
            sanitize_file_stem(&request.content_id)
        ));

        tokio::fs::create_dir_all(&self.torrent_dir)
            .await
            .map_err(|source| ResolveError::Io {
                path: self.torrent_dir.clone(),
                source,
            })?;

        if let Err(source) = tokio::fs::write(&part, &body).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(ResolveError::Io { path: part, source });
        }
        if let Err(source) = tokio::fs::rename(&part, &target).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(ResolveError::Io {
                path: target,
                source,
            });
        }

        info!(
            content = %request.content_id,
            quality = %request.quality,
            path = %target.display(),
            "Descriptor resolved"
        );
        Ok(target)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ResolveError> {
        debug!(url, "Fetching descriptor");
        let network = |reason: String| ResolveError::Network {
            url: url.to_string(),
            reason,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(network(format!("HTTP {}", status)));
        }

        let too_large = || network(format!("descriptor exceeds {} bytes", self.max_size));
        if response.content_length().is_some_and(|len| len > self.max_size) {
            return Err(too_large());
        }

        // Content-Length may be absent; count while reading
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| network(e.to_string()))?
        {
            if (body.len() + chunk.len()) as u64 > self.max_size {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

/// Keep ids usable as a single path component
pub(crate) fn sanitize_file_stem(id: &str) -> String {
    let stem: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "content".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_path_is_deterministic() {
        let resolver = TorrentResolver::new("/tmp/torrents");
        assert_eq!(
            resolver.descriptor_path("tt0111161"),
            PathBuf::from("/tmp/torrents/tt0111161.torrent")
        );
        assert_eq!(
            resolver.descriptor_path("tt0111161"),
            resolver.descriptor_path("tt0111161")
        );
    }

    #[test]
    fn test_sanitize_blocks_traversal() {
        assert_eq!(sanitize_file_stem("../../etc/passwd"), "______etc_passwd");
        assert_eq!(sanitize_file_stem(""), "content");
        assert_eq!(sanitize_file_stem("tt-1_2"), "tt-1_2");
    }
}
