//! Torrent Resolver Tests
//!
//! Descriptor download against a mocked HTTP source.

use mockito::Server;
use torrentplay::models::{Quality, TransferRequest};
use torrentplay::stream::TorrentResolver;
use torrentplay::ResolveError;

const DESCRIPTOR: &[u8] =
    b"d4:infod6:lengthi1000e4:name9:Movie.mp412:piece lengthi16384e6:pieces20:aaaaaaaaaaaaaaaaaaaaee";

fn request(server_url: &str, quality: Quality) -> TransferRequest {
    TransferRequest::new("tt1877830", quality, "/tmp/unused")
        .with_source(Quality::FHD1080p, format!("{}/movie.1080p.torrent", server_url))
}

// =============================================================================
// Success Paths
// =============================================================================

/// Test: descriptor lands at `<dir>/<content id>.torrent`
#[tokio::test]
async fn test_resolve_writes_descriptor() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/movie.1080p.torrent")
        .with_status(200)
        .with_header("content-type", "application/x-bittorrent")
        .with_body(DESCRIPTOR)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let torrents = dir.path().join("torrents");
    let resolver = TorrentResolver::new(&torrents);

    let path = resolver
        .resolve(&request(&server.url(), Quality::FHD1080p))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(path, torrents.join("tt1877830.torrent"));
    assert_eq!(std::fs::read(&path).unwrap(), DESCRIPTOR);
}

/// Test: a second resolve replaces the previous descriptor
#[tokio::test]
async fn test_resolve_overwrites_existing() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/movie.1080p.torrent")
        .with_status(200)
        .with_body(DESCRIPTOR)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let resolver = TorrentResolver::new(dir.path());
    let target = resolver.descriptor_path("tt1877830");
    std::fs::write(&target, b"stale").unwrap();

    let path = resolver
        .resolve(&request(&server.url(), Quality::FHD1080p))
        .await
        .unwrap();

    assert_eq!(path, target);
    assert_eq!(std::fs::read(&path).unwrap(), DESCRIPTOR);
}

/// Test: no `.part` file survives a successful resolve
#[tokio::test]
async fn test_resolve_leaves_no_partial_file() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/movie.1080p.torrent")
        .with_status(200)
        .with_body(DESCRIPTOR)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let resolver = TorrentResolver::new(dir.path());
    resolver
        .resolve(&request(&server.url(), Quality::FHD1080p))
        .await
        .unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["tt1877830.torrent".to_string()]);
}

// =============================================================================
// Failure Paths
// =============================================================================

/// Test: asking for a quality with no source fails before any request
#[tokio::test]
async fn test_missing_quality_is_unavailable() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let resolver = TorrentResolver::new(dir.path());
    let result = resolver
        .resolve(&request(&server.url(), Quality::HD720p))
        .await;

    mock.assert_async().await;
    assert!(matches!(
        result,
        Err(ResolveError::QualityUnavailable(Quality::HD720p))
    ));
    assert!(!resolver.descriptor_path("tt1877830").exists());
}

/// Test: HTTP errors surface as network failures and write nothing
#[tokio::test]
async fn test_http_error_is_network_failure() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/movie.1080p.torrent")
        .with_status(404)
        .with_body("not found")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let resolver = TorrentResolver::new(dir.path());
    let result = resolver
        .resolve(&request(&server.url(), Quality::FHD1080p))
        .await;

    match result {
        Err(ResolveError::Network { url, reason }) => {
            assert!(url.ends_with("/movie.1080p.torrent"));
            assert!(reason.contains("404"), "reason was {}", reason);
        }
        other => panic!("Expected network error, got {:?}", other),
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

/// Test: an unreachable host is a network failure
#[tokio::test]
async fn test_unreachable_host_is_network_failure() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = TorrentResolver::new(dir.path());
    let request = TransferRequest::new("tt1", Quality::HD720p, "/tmp/unused")
        .with_source(Quality::HD720p, "http://127.0.0.1:1/movie.torrent");

    let result = resolver.resolve(&request).await;
    assert!(matches!(result, Err(ResolveError::Network { .. })));
}

/// Test: a body over the size limit is a network failure and writes nothing
#[tokio::test]
async fn test_oversized_descriptor_is_network_failure() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/movie.1080p.torrent")
        .with_status(200)
        .with_body(vec![b'x'; 4097])
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let resolver = TorrentResolver::new(dir.path()).with_max_size(4096);
    let result = resolver
        .resolve(&request(&server.url(), Quality::FHD1080p))
        .await;

    match result {
        Err(ResolveError::Network { reason, .. }) => {
            assert!(reason.contains("4096"), "reason was {}", reason);
        }
        other => panic!("Expected network error, got {:?}", other),
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

/// Test: a body at the size limit is accepted
#[tokio::test]
async fn test_descriptor_at_size_limit_is_accepted() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/movie.1080p.torrent")
        .with_status(200)
        .with_body(DESCRIPTOR)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let resolver = TorrentResolver::new(dir.path()).with_max_size(DESCRIPTOR.len() as u64);
    let path = resolver
        .resolve(&request(&server.url(), Quality::FHD1080p))
        .await
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), DESCRIPTOR);
}

/// Test: an unusable torrent directory is an io failure
#[tokio::test]
async fn test_torrent_dir_not_a_directory_is_io_failure() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/movie.1080p.torrent")
        .with_status(200)
        .with_body(DESCRIPTOR)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("torrents");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let resolver = TorrentResolver::new(&blocker);

    let result = resolver
        .resolve(&request(&server.url(), Quality::FHD1080p))
        .await;

    assert!(matches!(result, Err(ResolveError::Io { .. })), "got {:?}", result);
    assert!(!resolver.descriptor_path("tt1877830").exists());
    assert!(!blocker.join(".tt1877830.torrent.part").exists());
    assert_eq!(std::fs::read(&blocker).unwrap(), b"not a directory");
}

/// Test: a failed rename removes the partial file
#[tokio::test]
async fn test_failed_rename_leaves_no_partial_file() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/movie.1080p.torrent")
        .with_status(200)
        .with_body(DESCRIPTOR)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let resolver = TorrentResolver::new(dir.path());
    // A non-empty directory where the descriptor should land
    let target = resolver.descriptor_path("tt1877830");
    std::fs::create_dir_all(target.join("occupied")).unwrap();

    let result = resolver
        .resolve(&request(&server.url(), Quality::FHD1080p))
        .await;

    match result {
        Err(ResolveError::Io { path, .. }) => assert_eq!(path, target),
        other => panic!("Expected io error, got {:?}", other),
    }
    assert!(!dir.path().join(".tt1877830.torrent.part").exists());
    assert!(target.is_dir());
}

/// Test: content ids are flattened into a single safe file name
#[test]
fn test_descriptor_path_is_sanitized() {
    let resolver = TorrentResolver::new("/cache/torrents");
    let path = resolver.descriptor_path("../show/s01e02");
    assert_eq!(path.parent().unwrap(), std::path::Path::new("/cache/torrents"));
    assert!(!path.to_string_lossy().contains(".."));
}
