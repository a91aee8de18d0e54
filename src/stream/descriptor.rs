//! Torrent descriptor parsing
//!
//! Only the fields the coordinator needs are modeled: the declared name (used
//! to find the playable file) and the file layout (used for total size).

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TorrentDescriptor {
    pub info: Info,
    #[serde(default)]
    pub announce: Option<String>,
    #[serde(rename = "announce-list", default)]
    pub announce_list: Option<Vec<Vec<String>>>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Info {
    pub name: String,
    #[serde(rename = "piece length")]
    pub piece_length: i64,
    #[serde(with = "serde_bytes")]
    pub pieces: Vec<u8>,
    // single-file torrents
    #[serde(default)]
    pub length: Option<i64>,
    // multi-file torrents
    #[serde(default)]
    pub files: Option<Vec<InfoFile>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InfoFile {
    pub length: i64,
    pub path: Vec<String>,
}

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("bencode parsing error: {0}")]
    Bencode(#[from] serde_bencode::Error),
    #[error("torrent has an empty name")]
    EmptyName,
    #[error("torrent declares neither length nor files")]
    NoFiles,
    #[error("pieces field length {0} is not a multiple of 20")]
    BadPieces(usize),
}

impl TorrentDescriptor {
    /// Parse and sanity-check a bencoded `.torrent`
    pub fn from_bytes(data: &[u8]) -> Result<Self, DescriptorError> {
        let descriptor: TorrentDescriptor = serde_bencode::from_bytes(data)?;

        if descriptor.info.name.trim().is_empty() {
            return Err(DescriptorError::EmptyName);
        }
        if descriptor.info.pieces.len() % 20 != 0 {
            return Err(DescriptorError::BadPieces(descriptor.info.pieces.len()));
        }
        let has_files = descriptor
            .info
            .files
            .as_ref()
            .is_some_and(|files| !files.is_empty());
        if descriptor.info.length.is_none() && !has_files {
            return Err(DescriptorError::NoFiles);
        }

        Ok(descriptor)
    }

    /// Declared torrent name
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Total payload size in bytes
    pub fn total_length(&self) -> u64 {
        match &self.info.files {
            Some(files) if !files.is_empty() => {
                files.iter().map(|f| f.length.max(0) as u64).sum()
            }
            _ => self.info.length.unwrap_or(0).max(0) as u64,
        }
    }

    /// Number of payload files
    pub fn file_count(&self) -> usize {
        match &self.info.files {
            Some(files) if !files.is_empty() => files.len(),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_file(name: &str, length: i64) -> Vec<u8> {
        format!(
            "d8:announce20:http://tracker/annce4:infod6:lengthi{}e4:name{}:{}12:piece lengthi16384e6:pieces20:aaaaaaaaaaaaaaaaaaaaee",
            length,
            name.len(),
            name
        )
        .into_bytes()
    }

    #[test]
    fn test_parse_single_file() {
        let descriptor = TorrentDescriptor::from_bytes(&single_file("Movie.2010.mp4", 4096))
            .expect("valid descriptor");
        assert_eq!(descriptor.name(), "Movie.2010.mp4");
        assert_eq!(descriptor.total_length(), 4096);
        assert_eq!(descriptor.file_count(), 1);
        assert_eq!(descriptor.announce.as_deref(), Some("http://tracker/annce"));
    }

    #[test]
    fn test_parse_multi_file() {
        let data = b"d4:infod5:filesld6:lengthi100e4:pathl9:movie.mkveed6:lengthi20e4:pathl8:subs.srteee4:name5:Movie12:piece lengthi16384e6:pieces20:bbbbbbbbbbbbbbbbbbbbee";
        let descriptor = TorrentDescriptor::from_bytes(data).expect("valid descriptor");
        assert_eq!(descriptor.name(), "Movie");
        assert_eq!(descriptor.total_length(), 120);
        assert_eq!(descriptor.file_count(), 2);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            TorrentDescriptor::from_bytes(b"<html>not found</html>"),
            Err(DescriptorError::Bencode(_))
        ));
    }

    #[test]
    fn test_missing_layout_is_rejected() {
        let data = b"d4:infod4:name5:Movie12:piece lengthi16384e6:pieces20:ccccccccccccccccccccee";
        assert!(matches!(
            TorrentDescriptor::from_bytes(data),
            Err(DescriptorError::NoFiles)
        ));
    }

    #[test]
    fn test_error_messages() {
        let garbage = TorrentDescriptor::from_bytes(b"<html>not found</html>")
            .expect_err("garbage must not parse");
        assert!(garbage.to_string().starts_with("bencode parsing error: "));
        assert!(std::error::Error::source(&garbage).is_some());
        assert_eq!(
            DescriptorError::BadPieces(7).to_string(),
            "pieces field length 7 is not a multiple of 20"
        );
        assert_eq!(
            DescriptorError::NoFiles.to_string(),
            "torrent declares neither length nor files"
        );
    }
}
