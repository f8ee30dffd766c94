// src/db/models.rs

//! Data models for Quarry database entities
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading, updating, and deleting
//! records. All functions accept a `&Connection` and therefore also work
//! inside a `rusqlite::Transaction`.

use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::Result;

/// An installed package row
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub id: Option<i64>,
    pub name: String,
    pub version: String,
    pub architecture: Option<String>,
    pub description: Option<String>,
    pub installed_at: Option<String>,
    pub installed_by_tx_id: Option<i64>,
}

impl InstalledPackage {
    /// Create a new InstalledPackage
    pub fn new(name: String, version: String) -> Self {
        Self {
            id: None,
            name,
            version,
            architecture: None,
            description: None,
            installed_at: None,
            installed_by_tx_id: None,
        }
    }

    /// Insert this package into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO packages (name, version, architecture, description, installed_by_tx_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &self.name,
                &self.version,
                &self.architecture,
                &self.description,
                &self.installed_by_tx_id,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find installed packages by name (any architecture)
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, version, architecture, description, installed_at, installed_by_tx_id
             FROM packages WHERE name = ?1",
        )?;

        let packages = stmt
            .query_map([name], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(packages)
    }

    /// Find the installed package for a (name, architecture) pair.
    ///
    /// `IS` comparison makes a NULL architecture match a NULL column.
    pub fn find_by_name_arch(
        conn: &Connection,
        name: &str,
        architecture: Option<&str>,
    ) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, version, architecture, description, installed_at, installed_by_tx_id
             FROM packages WHERE name = ?1 AND architecture IS ?2",
        )?;

        let package = stmt
            .query_row(params![name, architecture], Self::from_row)
            .optional()?;

        Ok(package)
    }

    /// List all installed packages
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, version, architecture, description, installed_at, installed_by_tx_id
             FROM packages ORDER BY name, version",
        )?;

        let packages = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(packages)
    }

    /// Delete a package by ID (file rows cascade)
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM packages WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Convert a database row to an InstalledPackage
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            version: row.get(2)?,
            architecture: row.get(3)?,
            description: row.get(4)?,
            installed_at: row.get(5)?,
            installed_by_tx_id: row.get(6)?,
        })
    }
}

/// Transaction record status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Applied,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Applied => "applied",
            TxStatus::Failed => "failed",
        }
    }
}

impl FromStr for TxStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TxStatus::Pending),
            "applied" => Ok(TxStatus::Applied),
            "failed" => Ok(TxStatus::Failed),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

/// A recorded install/reinstall/erase operation
#[derive(Debug, Clone)]
pub struct TxRecord {
    pub id: Option<i64>,
    pub description: String,
    pub status: TxStatus,
    pub created_at: Option<String>,
    pub applied_at: Option<String>,
}

impl TxRecord {
    /// Create a new TxRecord
    pub fn new(description: String) -> Self {
        Self {
            id: None,
            description,
            status: TxStatus::Pending,
            created_at: None,
            applied_at: None,
        }
    }

    /// Insert this record into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO transactions (description, status) VALUES (?1, ?2)",
            params![&self.description, self.status.as_str()],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// List all transaction records, newest first
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, description, status, created_at, applied_at
             FROM transactions ORDER BY id DESC",
        )?;

        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Update the record status, stamping applied_at when it applies
    pub fn update_status(&mut self, conn: &Connection, new_status: TxStatus) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            crate::error::Error::InitError("Cannot update transaction without ID".to_string())
        })?;

        if new_status == TxStatus::Applied {
            conn.execute(
                "UPDATE transactions SET status = ?1, applied_at = CURRENT_TIMESTAMP WHERE id = ?2",
                params![new_status.as_str(), id],
            )?;
        } else {
            conn.execute(
                "UPDATE transactions SET status = ?1 WHERE id = ?2",
                params![new_status.as_str(), id],
            )?;
        }

        self.status = new_status;
        Ok(())
    }

    /// Convert a database row to a TxRecord
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let status_str: String = row.get(2)?;
        let status = status_str.parse::<TxStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        Ok(Self {
            id: Some(row.get(0)?),
            description: row.get(1)?,
            status,
            created_at: row.get(3)?,
            applied_at: row.get(4)?,
        })
    }
}

/// A tracked file belonging to an installed package
#[derive(Debug, Clone)]
pub struct FileRow {
    pub id: Option<i64>,
    pub path: String,
    pub sha256_hash: Option<String>,
    pub size: i64,
    pub mode: i32,
    pub package_id: i64,
    pub installed_at: Option<String>,
}

impl FileRow {
    /// Create a new FileRow
    pub fn new(
        path: String,
        sha256_hash: Option<String>,
        size: i64,
        mode: i32,
        package_id: i64,
    ) -> Self {
        Self {
            id: None,
            path,
            sha256_hash,
            size,
            mode,
            package_id,
            installed_at: None,
        }
    }

    /// Insert this file into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO files (path, sha256_hash, size, mode, package_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &self.path,
                &self.sha256_hash,
                &self.size,
                &self.mode,
                &self.package_id,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find all files belonging to a package
    pub fn find_by_package(conn: &Connection, package_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, path, sha256_hash, size, mode, package_id, installed_at
             FROM files WHERE package_id = ?1",
        )?;

        let files = stmt
            .query_map([package_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(files)
    }

    /// Convert a database row to a FileRow
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            path: row.get(1)?,
            sha256_hash: row.get(2)?,
            size: row.get(3)?,
            mode: row.get(4)?,
            package_id: row.get(5)?,
            installed_at: row.get(6)?,
        })
    }
}

/// A configured package repository
#[derive(Debug, Clone)]
pub struct Repository {
    pub id: Option<i64>,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub priority: i32,
    pub metadata_expire: i64,
    pub last_sync: Option<String>,
    pub created_at: Option<String>,
}

impl Repository {
    /// Create a new Repository
    pub fn new(name: String, url: String) -> Self {
        Self {
            id: None,
            name,
            url,
            enabled: true,
            priority: 0,
            metadata_expire: 3600,
            last_sync: None,
            created_at: None,
        }
    }

    /// Insert this repository into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO repositories (name, url, enabled, priority, metadata_expire, last_sync)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &self.name,
                &self.url,
                self.enabled as i32,
                self.priority,
                self.metadata_expire,
                &self.last_sync,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a repository by name
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, url, enabled, priority, metadata_expire, last_sync, created_at
             FROM repositories WHERE name = ?1",
        )?;

        let repo = stmt.query_row([name], Self::from_row).optional()?;

        Ok(repo)
    }

    /// List all repositories ordered by priority
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, url, enabled, priority, metadata_expire, last_sync, created_at
             FROM repositories ORDER BY priority, name",
        )?;

        let repos = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(repos)
    }

    /// List enabled repositories ordered by priority
    pub fn list_enabled(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, url, enabled, priority, metadata_expire, last_sync, created_at
             FROM repositories WHERE enabled = 1 ORDER BY priority, name",
        )?;

        let repos = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(repos)
    }

    /// Update repository attributes
    pub fn update(&self, conn: &Connection) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            crate::error::Error::InitError("Cannot update repository without ID".to_string())
        })?;

        conn.execute(
            "UPDATE repositories SET url = ?1, enabled = ?2, priority = ?3,
             metadata_expire = ?4, last_sync = ?5 WHERE id = ?6",
            params![
                &self.url,
                self.enabled as i32,
                self.priority,
                self.metadata_expire,
                &self.last_sync,
                id,
            ],
        )?;

        Ok(())
    }

    /// Delete a repository by ID (its package index cascades)
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM repositories WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Convert a database row to a Repository
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            url: row.get(2)?,
            enabled: row.get::<_, i32>(3)? != 0,
            priority: row.get(4)?,
            metadata_expire: row.get(5)?,
            last_sync: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

/// A package available from a repository index
#[derive(Debug, Clone)]
pub struct RepositoryPackage {
    pub id: Option<i64>,
    pub repository_id: i64,
    pub name: String,
    pub version: String,
    pub architecture: Option<String>,
    pub description: Option<String>,
    pub checksum: Option<String>,
    pub size: i64,
    pub download_url: String,
    pub dependencies: Option<String>,
}

impl RepositoryPackage {
    /// Create a new RepositoryPackage
    pub fn new(
        repository_id: i64,
        name: String,
        version: String,
        size: i64,
        download_url: String,
    ) -> Self {
        Self {
            id: None,
            repository_id,
            name,
            version,
            architecture: None,
            description: None,
            checksum: None,
            size,
            download_url,
            dependencies: None,
        }
    }

    /// Insert this package into the repository index
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO repository_packages
             (repository_id, name, version, architecture, description, checksum, size, download_url, dependencies)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &self.repository_id,
                &self.name,
                &self.version,
                &self.architecture,
                &self.description,
                &self.checksum,
                &self.size,
                &self.download_url,
                &self.dependencies,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Delete all index entries for a repository (before re-sync)
    pub fn delete_by_repository(conn: &Connection, repository_id: i64) -> Result<()> {
        conn.execute(
            "DELETE FROM repository_packages WHERE repository_id = ?1",
            [repository_id],
        )?;
        Ok(())
    }

    /// Find the best candidate for a package name across enabled
    /// repositories: lowest priority number wins, then newest sync.
    pub fn find_candidate(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT rp.id, rp.repository_id, rp.name, rp.version, rp.architecture,
                    rp.description, rp.checksum, rp.size, rp.download_url, rp.dependencies
             FROM repository_packages rp
             JOIN repositories r ON r.id = rp.repository_id
             WHERE rp.name = ?1 AND r.enabled = 1
             ORDER BY r.priority, rp.synced_at DESC
             LIMIT 1",
        )?;

        let package = stmt.query_row([name], Self::from_row).optional()?;

        Ok(package)
    }

    /// Search the index by name substring
    pub fn search(conn: &Connection, pattern: &str) -> Result<Vec<Self>> {
        let like = format!("%{}%", pattern);
        let mut stmt = conn.prepare(
            "SELECT rp.id, rp.repository_id, rp.name, rp.version, rp.architecture,
                    rp.description, rp.checksum, rp.size, rp.download_url, rp.dependencies
             FROM repository_packages rp
             JOIN repositories r ON r.id = rp.repository_id
             WHERE rp.name LIKE ?1 AND r.enabled = 1
             ORDER BY rp.name, rp.version",
        )?;

        let packages = stmt
            .query_map([like], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(packages)
    }

    /// Convert a database row to a RepositoryPackage
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            repository_id: row.get(1)?,
            name: row.get(2)?,
            version: row.get(3)?,
            architecture: row.get(4)?,
            description: row.get(5)?,
            checksum: row.get(6)?,
            size: row.get(7)?,
            download_url: row.get(8)?,
            dependencies: row.get(9)?,
        })
    }
}
