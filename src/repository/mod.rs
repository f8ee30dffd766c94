// src/repository/mod.rs

//! Repository management and package downloading
//!
//! This module provides functionality for:
//! - Managing remote package repositories
//! - Synchronizing repository metadata (JSON index)
//! - Resolving bare package names to downloadable candidates
//! - Downloading packages and verifying checksums
//!
//! Metadata fetches retry on transport failure; one-shot artifact fetches
//! (see [`crate::fetch`]) do not.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::StatusCode;
use reqwest::blocking::Client;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::db::models::{Repository, RepositoryPackage};
use crate::error::{Error, Result};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed metadata fetches and downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Repository metadata format (simple JSON index)
#[derive(Debug, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub name: String,
    pub packages: Vec<PackageMetadata>,
}

/// Package metadata in repository index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    pub architecture: Option<String>,
    pub description: Option<String>,
    pub checksum: Option<String>,
    pub size: i64,
    pub download_url: String,
    pub dependencies: Option<Vec<String>>,
}

/// HTTP client wrapper with retry support
pub struct RepositoryClient {
    client: Client,
    max_retries: u32,
}

impl RepositoryClient {
    /// Create a new repository client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// Fetch repository metadata from URL with retry support
    pub fn fetch_metadata(&self, url: &str) -> Result<RepositoryMetadata> {
        let metadata_url = if url.ends_with('/') {
            format!("{}metadata.json", url)
        } else {
            format!("{}/metadata.json", url)
        };

        info!("Fetching repository metadata from {}", metadata_url);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(&metadata_url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::RemoteTransport {
                            url: metadata_url.clone(),
                            reason: format!("HTTP {}", response.status()),
                        });
                    }

                    let metadata: RepositoryMetadata = response.json().map_err(|e| {
                        Error::ParseError(format!("Failed to parse metadata JSON: {}", e))
                    })?;

                    info!(
                        "Fetched metadata for {} packages",
                        metadata.packages.len()
                    );
                    return Ok(metadata);
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::RemoteTransport {
                            url: metadata_url.clone(),
                            reason: format!("failed after {} attempts: {}", attempt, e),
                        });
                    }
                    warn!("Metadata fetch attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }

    /// Download a file to the specified path with retry support.
    ///
    /// Transport failures retry; HTTP status failures return immediately,
    /// with 404-class mapped to [`Error::RemoteNotFound`].
    pub fn download_file(&self, url: &str, dest_path: &Path) -> Result<()> {
        info!("Downloading {} to {}", url, dest_path.display());

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(mut response) => {
                    let status = response.status();
                    if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
                        return Err(Error::RemoteNotFound(url.to_string()));
                    }
                    if !status.is_success() {
                        return Err(Error::RemoteTransport {
                            url: url.to_string(),
                            reason: format!("HTTP {}", status),
                        });
                    }

                    // Write to a temp file, then rename into place
                    let temp_path = dest_path.with_extension("tmp");
                    let mut file = File::create(&temp_path)?;
                    io::copy(&mut response, &mut file).map_err(Error::Io)?;
                    fs::rename(&temp_path, dest_path)?;

                    debug!("Downloaded to {}", dest_path.display());
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::RemoteTransport {
                            url: url.to_string(),
                            reason: format!("failed after {} attempts: {}", attempt, e),
                        });
                    }
                    warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl Default for RepositoryClient {
    fn default() -> Self {
        Self::new().expect("Failed to create default repository client")
    }
}

/// Synchronize one repository's metadata into the database
pub fn sync_repository(conn: &Connection, repo: &mut Repository) -> Result<usize> {
    info!("Synchronizing repository: {}", repo.name);

    let repo_id = repo
        .id
        .ok_or_else(|| Error::InitError("Repository has no database ID".to_string()))?;

    let client = RepositoryClient::new()?;
    let metadata = client.fetch_metadata(&repo.url)?;

    // Replace the old index for this repository
    RepositoryPackage::delete_by_repository(conn, repo_id)?;

    let mut count = 0;
    for pkg_meta in metadata.packages {
        let deps_json = pkg_meta
            .dependencies
            .as_ref()
            .map(|deps| serde_json::to_string(deps).unwrap_or_default());

        let mut repo_pkg = RepositoryPackage::new(
            repo_id,
            pkg_meta.name,
            pkg_meta.version,
            pkg_meta.size,
            pkg_meta.download_url,
        );

        repo_pkg.architecture = pkg_meta.architecture;
        repo_pkg.description = pkg_meta.description;
        repo_pkg.checksum = pkg_meta.checksum;
        repo_pkg.dependencies = deps_json;

        repo_pkg.insert(conn)?;
        count += 1;
    }

    repo.last_sync = Some(current_timestamp());
    repo.update(conn)?;

    info!("Synchronized {} packages from repository {}", count, repo.name);
    Ok(count)
}

/// Synchronize every enabled repository; returns total indexed packages
pub fn sync_all(conn: &Connection) -> Result<usize> {
    let repos = Repository::list_enabled(conn)?;
    let mut total = 0;
    for mut repo in repos {
        total += sync_repository(conn, &mut repo)?;
    }
    Ok(total)
}

/// Check if repository metadata needs refresh
pub fn needs_sync(repo: &Repository) -> bool {
    match &repo.last_sync {
        None => true, // Never synced
        Some(last_sync) => match parse_timestamp(last_sync) {
            Ok(last_sync_time) => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();

                let age_seconds = now.saturating_sub(last_sync_time);
                age_seconds > repo.metadata_expire as u64
            }
            Err(_) => true, // Unreadable timestamp forces a sync
        },
    }
}

/// Resolve a bare package name to its repository candidate.
///
/// The candidate carries the download URL and published checksum; the
/// artifact itself is downloaded at transaction apply time.
pub fn resolve_package(conn: &Connection, name: &str) -> Result<RepositoryPackage> {
    RepositoryPackage::find_candidate(conn, name)?
        .ok_or_else(|| Error::NoSuchPackage(name.to_string()))
}

/// Download a repository candidate into `dest_dir` and verify it.
///
/// With `gpgcheck` active a candidate without a published checksum is
/// refused; with it disabled the missing checksum downgrades to a warning.
pub fn download_package(
    repo_pkg: &RepositoryPackage,
    dest_dir: &Path,
    gpgcheck: bool,
) -> Result<PathBuf> {
    let client = RepositoryClient::new()?;

    let default_filename = format!("{}-{}.rpm", repo_pkg.name, repo_pkg.version);
    let filename = repo_pkg
        .download_url
        .split('/')
        .next_back()
        .filter(|s| !s.is_empty())
        .unwrap_or(&default_filename);

    let dest_path = dest_dir.join(filename);

    client.download_file(&repo_pkg.download_url, &dest_path)?;

    match &repo_pkg.checksum {
        Some(expected) => verify_checksum(&dest_path, expected)?,
        None if gpgcheck => {
            return Err(Error::MissingChecksum(repo_pkg.name.clone()));
        }
        None => {
            warn!(
                "No checksum published for {}; skipping verification",
                repo_pkg.name
            );
        }
    }

    Ok(dest_path)
}

/// Verify file checksum matches expected value
fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    use sha2::{Digest, Sha256};

    debug!("Verifying checksum for {}", path.display());

    let mut file = File::open(path)?;

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;

    let actual = format!("{:x}", hasher.finalize());

    if actual != expected {
        return Err(Error::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }

    debug!("Checksum verified: {}", expected);
    Ok(())
}

/// Get current timestamp as ISO 8601 string
fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Parse ISO 8601 timestamp to Unix seconds
fn parse_timestamp(timestamp: &str) -> Result<u64> {
    use chrono::DateTime;

    let dt = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| Error::ParseError(format!("Invalid timestamp: {}", e)))?;

    Ok(dt.timestamp() as u64)
}

/// Add a new repository to the database
pub fn add_repository(
    conn: &Connection,
    name: String,
    url: String,
    enabled: bool,
    priority: i32,
) -> Result<Repository> {
    if Repository::find_by_name(conn, &name)?.is_some() {
        return Err(Error::ConflictError(format!(
            "Repository '{}' already exists",
            name
        )));
    }

    let mut repo = Repository::new(name, url);
    repo.enabled = enabled;
    repo.priority = priority;

    repo.insert(conn)?;

    info!("Added repository: {} ({})", repo.name, repo.url);
    Ok(repo)
}

/// Remove a repository from the database
pub fn remove_repository(conn: &Connection, name: &str) -> Result<()> {
    let repo = Repository::find_by_name(conn, name)?
        .ok_or_else(|| Error::NotFoundError(format!("Repository '{}' not found", name)))?;
    let repo_id = repo
        .id
        .ok_or_else(|| Error::InitError("Repository has no database ID".to_string()))?;

    Repository::delete(conn, repo_id)?;
    info!("Removed repository: {}", name);
    Ok(())
}

/// Enable or disable a repository
pub fn set_repository_enabled(conn: &Connection, name: &str, enabled: bool) -> Result<()> {
    let mut repo = Repository::find_by_name(conn, name)?
        .ok_or_else(|| Error::NotFoundError(format!("Repository '{}' not found", name)))?;

    repo.enabled = enabled;
    repo.update(conn)?;

    info!(
        "Repository '{}' {}",
        name,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// Search for packages across all enabled repositories
pub fn search_packages(conn: &Connection, pattern: &str) -> Result<Vec<RepositoryPackage>> {
    let packages = RepositoryPackage::search(conn, pattern)?;
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("PRAGMA foreign_keys = ON", []).unwrap();
        schema::migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_add_repository() {
        let conn = test_conn();

        let repo = add_repository(
            &conn,
            "test-repo".to_string(),
            "https://example.com/repo".to_string(),
            true,
            10,
        )
        .unwrap();

        assert_eq!(repo.name, "test-repo");
        assert_eq!(repo.url, "https://example.com/repo");
        assert!(repo.enabled);
        assert_eq!(repo.priority, 10);
    }

    #[test]
    fn test_add_duplicate_repository() {
        let conn = test_conn();

        add_repository(
            &conn,
            "test-repo".to_string(),
            "https://example.com/repo".to_string(),
            true,
            10,
        )
        .unwrap();

        let result = add_repository(
            &conn,
            "test-repo".to_string(),
            "https://example.com/other".to_string(),
            true,
            10,
        );

        assert!(matches!(result, Err(Error::ConflictError(_))));
    }

    #[test]
    fn test_remove_repository() {
        let conn = test_conn();

        add_repository(
            &conn,
            "test-repo".to_string(),
            "https://example.com/repo".to_string(),
            true,
            10,
        )
        .unwrap();

        remove_repository(&conn, "test-repo").unwrap();

        let found = Repository::find_by_name(&conn, "test-repo").unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_enable_disable_repository() {
        let conn = test_conn();

        add_repository(
            &conn,
            "test-repo".to_string(),
            "https://example.com/repo".to_string(),
            true,
            10,
        )
        .unwrap();

        set_repository_enabled(&conn, "test-repo", false).unwrap();
        let repo = Repository::find_by_name(&conn, "test-repo").unwrap().unwrap();
        assert!(!repo.enabled);

        set_repository_enabled(&conn, "test-repo", true).unwrap();
        let repo = Repository::find_by_name(&conn, "test-repo").unwrap().unwrap();
        assert!(repo.enabled);
    }

    #[test]
    fn test_needs_sync() {
        let repo_never_synced = Repository::new("test".to_string(), "url".to_string());
        assert!(needs_sync(&repo_never_synced));

        let mut repo_recently_synced = Repository::new("test".to_string(), "url".to_string());
        repo_recently_synced.last_sync = Some(current_timestamp());
        repo_recently_synced.metadata_expire = 3600; // 1 hour
        assert!(!needs_sync(&repo_recently_synced));
    }

    #[test]
    fn test_timestamp_functions() {
        let ts = current_timestamp();
        let parsed = parse_timestamp(&ts).unwrap();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        // Should be within a few seconds
        assert!((now as i64 - parsed as i64).abs() < 5);
    }

    #[test]
    fn test_resolve_unknown_package() {
        let conn = test_conn();
        let result = resolve_package(&conn, "no-such-package");
        assert!(matches!(result, Err(Error::NoSuchPackage(_))));
    }

    #[test]
    fn test_sync_and_resolve() {
        let conn = test_conn();

        let mut server = mockito::Server::new();
        let body = serde_json::json!({
            "name": "photon-test",
            "packages": [{
                "name": "pkgtest-one",
                "version": "1.0.1-1",
                "architecture": "x86_64",
                "description": "test package",
                "checksum": null,
                "size": 1234,
                "download_url": format!("{}/pkgs/pkgtest-one-1.0.1-1.rpm", server.url()),
                "dependencies": null,
            }]
        });
        let _m = server
            .mock("GET", "/metadata.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create();

        let mut repo =
            add_repository(&conn, "photon-test".to_string(), server.url(), true, 0).unwrap();
        let count = sync_repository(&conn, &mut repo).unwrap();
        assert_eq!(count, 1);
        assert!(repo.last_sync.is_some());

        let candidate = resolve_package(&conn, "pkgtest-one").unwrap();
        assert_eq!(candidate.version, "1.0.1-1");
        assert!(candidate.download_url.ends_with("pkgtest-one-1.0.1-1.rpm"));
    }

    #[test]
    fn test_download_package_verifies_checksum() {
        use sha2::{Digest, Sha256};

        let mut server = mockito::Server::new();
        let body = b"package payload".to_vec();
        let digest = format!("{:x}", Sha256::digest(&body));

        let _m = server
            .mock("GET", "/pkgs/good.rpm")
            .with_status(200)
            .with_body(body)
            .create();

        let dir = tempfile::tempdir().unwrap();
        let mut repo_pkg = RepositoryPackage::new(
            1,
            "good".to_string(),
            "1.0-1".to_string(),
            15,
            format!("{}/pkgs/good.rpm", server.url()),
        );
        repo_pkg.checksum = Some(digest);

        let path = download_package(&repo_pkg, dir.path(), true).unwrap();
        assert!(path.exists());
        assert_eq!(path.file_name().unwrap(), "good.rpm");
    }

    #[test]
    fn test_download_package_rejects_bad_checksum() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/pkgs/bad.rpm")
            .with_status(200)
            .with_body("tampered payload")
            .create();

        let dir = tempfile::tempdir().unwrap();
        let mut repo_pkg = RepositoryPackage::new(
            1,
            "bad".to_string(),
            "1.0-1".to_string(),
            16,
            format!("{}/pkgs/bad.rpm", server.url()),
        );
        repo_pkg.checksum = Some("0".repeat(64));

        let result = download_package(&repo_pkg, dir.path(), true);
        assert!(matches!(result, Err(Error::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_download_package_missing_checksum_policy() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/pkgs/nochk.rpm")
            .with_status(200)
            .with_body("payload")
            .expect_at_least(1)
            .create();

        let dir = tempfile::tempdir().unwrap();
        let repo_pkg = RepositoryPackage::new(
            1,
            "nochk".to_string(),
            "1.0-1".to_string(),
            7,
            format!("{}/pkgs/nochk.rpm", server.url()),
        );

        // gpgcheck active: refuse
        let strict = download_package(&repo_pkg, dir.path(), true);
        assert!(matches!(strict, Err(Error::MissingChecksum(_))));

        // --nogpgcheck: proceed with a warning
        let relaxed = download_package(&repo_pkg, dir.path(), false);
        assert!(relaxed.is_ok());
    }

    #[test]
    fn test_download_404_is_remote_not_found() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/pkgs/gone.rpm")
            .with_status(404)
            .create();

        let dir = tempfile::tempdir().unwrap();
        let repo_pkg = RepositoryPackage::new(
            1,
            "gone".to_string(),
            "1.0-1".to_string(),
            1,
            format!("{}/pkgs/gone.rpm", server.url()),
        );

        let result = download_package(&repo_pkg, dir.path(), false);
        assert!(matches!(result, Err(Error::RemoteNotFound(_))));
    }
}
