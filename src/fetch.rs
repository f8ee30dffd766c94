// src/fetch.rs

//! Artifact acquisition
//!
//! Obtains the raw bytes for a classified target: local files are read
//! directly, remote URLs are fetched with a single HTTP GET. Failures are
//! typed so the caller can map them to stable exit codes; in particular a
//! 404-class response surfaces as [`Error::RemoteNotFound`], distinct from
//! every other transport failure.
//!
//! No retries happen here. Retry policy belongs to the repository metadata
//! client, not to one-shot artifact fetches.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use tracing::debug;

use crate::error::{Error, Result};
use crate::target::Target;

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Where an artifact's bytes came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    LocalFile,
    RemoteUrl,
}

/// Fetched package bytes plus provenance
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    /// Normalized origin the bytes were read from (path or URL)
    pub origin: String,
    pub kind: SourceKind,
}

impl Artifact {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One-shot artifact fetcher over local filesystem and HTTP
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Fetch the bytes for a classified target.
    ///
    /// Package-name targets carry no artifact location and are resolved by
    /// the repository layer instead; asking this fetcher for one is an
    /// invocation error.
    pub fn fetch(&self, target: &Target) -> Result<Artifact> {
        match target {
            Target::LocalFile { path } => self.read_local(path),
            Target::RemoteUrl { url } => self.fetch_remote(url),
            Target::PackageName { name } => Err(Error::InitError(format!(
                "Package name '{}' has no artifact location to fetch",
                name
            ))),
        }
    }

    fn read_local(&self, path: &Path) -> Result<Artifact> {
        debug!("Reading local package file: {}", path.display());

        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::LocalNotFound(path.to_path_buf()),
            ErrorKind::PermissionDenied => Error::PermissionDenied(path.to_path_buf()),
            _ => Error::Io(e),
        })?;

        Ok(Artifact {
            bytes,
            origin: path.display().to_string(),
            kind: SourceKind::LocalFile,
        })
    }

    fn fetch_remote(&self, url: &str) -> Result<Artifact> {
        debug!("Fetching remote package: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::RemoteTransport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(err) = status_error(response.status(), url) {
            return Err(err);
        }

        let bytes = response.bytes().map_err(|e| Error::RemoteTransport {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Artifact {
            bytes: bytes.to_vec(),
            origin: url.to_string(),
            kind: SourceKind::RemoteUrl,
        })
    }
}

/// Map a non-success HTTP status to its error kind.
///
/// 404 and 410 mean the artifact does not exist at that URL; everything
/// else non-2xx is transport-class.
fn status_error(status: StatusCode, url: &str) -> Option<Error> {
    if status.is_success() {
        None
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        Some(Error::RemoteNotFound(url.to_string()))
    } else {
        Some(Error::RemoteTransport {
            url: url.to_string(),
            reason: format!("HTTP {}", status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::classify;
    use std::fs;
    use std::path::PathBuf;

    #[test]
    fn test_read_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.rpm");
        fs::write(&file, b"package bytes").unwrap();

        let fetcher = Fetcher::new().unwrap();
        let artifact = fetcher
            .fetch(&Target::LocalFile { path: file.clone() })
            .unwrap();

        assert_eq!(artifact.bytes, b"package bytes");
        assert_eq!(artifact.kind, SourceKind::LocalFile);
        assert_eq!(artifact.origin, file.display().to_string());
    }

    #[test]
    fn test_local_not_found() {
        let fetcher = Fetcher::new().unwrap();
        let result = fetcher.fetch(&Target::LocalFile {
            path: PathBuf::from("/no/such/file.rpm"),
        });

        assert!(matches!(result, Err(Error::LocalNotFound(_))));
    }

    #[test]
    fn test_dotted_and_plain_paths_fetch_same_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("pkgs");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("x.rpm"), b"same bytes").unwrap();

        let fetcher = Fetcher::new().unwrap();
        let dotted = fetcher
            .fetch(&classify("pkgs/../pkgs/x.rpm", dir.path()))
            .unwrap();
        let plain = fetcher.fetch(&classify("pkgs/x.rpm", dir.path())).unwrap();

        assert_eq!(dotted.bytes, plain.bytes);
        assert_eq!(dotted.origin, plain.origin);
    }

    #[test]
    fn test_package_name_is_not_fetchable() {
        let fetcher = Fetcher::new().unwrap();
        let result = fetcher.fetch(&Target::PackageName {
            name: "foo".to_string(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_remote_404_is_remote_not_found() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/doesnotexist.rpm")
            .with_status(404)
            .create();

        let fetcher = Fetcher::new().unwrap();
        let url = format!("{}/doesnotexist.rpm", server.url());
        let result = fetcher.fetch(&Target::RemoteUrl { url: url.clone() });

        match result {
            Err(Error::RemoteNotFound(u)) => assert_eq!(u, url),
            other => panic!("expected RemoteNotFound, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_remote_server_error_is_transport() {
        let mut server = mockito::Server::new();
        let _m = server.mock("GET", "/x.rpm").with_status(500).create();

        let fetcher = Fetcher::new().unwrap();
        let result = fetcher.fetch(&Target::RemoteUrl {
            url: format!("{}/x.rpm", server.url()),
        });

        assert!(matches!(result, Err(Error::RemoteTransport { .. })));
    }

    #[test]
    fn test_remote_success_returns_body() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/pkgs/x.rpm")
            .with_status(200)
            .with_body("remote package bytes")
            .create();

        let fetcher = Fetcher::new().unwrap();
        let artifact = fetcher
            .fetch(&Target::RemoteUrl {
                url: format!("{}/pkgs/x.rpm", server.url()),
            })
            .unwrap();

        assert_eq!(artifact.bytes, b"remote package bytes");
        assert_eq!(artifact.kind, SourceKind::RemoteUrl);
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(status_error(StatusCode::OK, "u").is_none());
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "u"),
            Some(Error::RemoteNotFound(_))
        ));
        assert!(matches!(
            status_error(StatusCode::GONE, "u"),
            Some(Error::RemoteNotFound(_))
        ));
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, "u"),
            Some(Error::RemoteTransport { .. })
        ));
    }
}
