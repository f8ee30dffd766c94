// src/db/mod.rs

//! Database layer for Quarry
//!
//! This module handles all SQLite operations including:
//! - Database initialization and schema creation
//! - Connection management
//! - Transaction handling
//! - The exclusive lock serializing concurrent invocations

pub mod models;
pub mod schema;

use std::fs::{File, OpenOptions};
use std::path::Path;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Initialize a new Quarry database at the specified path
///
/// Creates the database file, sets pragmas, and applies all schema
/// migrations. Idempotent - calling it on an existing database is safe.
pub fn init(db_path: &str) -> Result<()> {
    debug!("Initializing database at: {}", db_path);

    // Create parent directories if they don't exist
    if let Some(parent) = Path::new(db_path).parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::InitError(format!("Failed to create database directory: {}", e)))?;
    }

    let conn = Connection::open(db_path)?;

    // Set pragmas for better performance and reliability
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    schema::migrate(&conn)?;

    info!("Database initialized successfully");
    Ok(())
}

/// Open an existing Quarry database
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        return Err(Error::DatabaseNotFound(db_path.to_string()));
    }

    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    Ok(conn)
}

/// Run a closure inside a database transaction.
///
/// Commits when the closure returns Ok; any error rolls the transaction
/// back and propagates.
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&rusqlite::Transaction) -> Result<T>,
{
    let tx = conn.transaction()?;
    let result = f(&tx)?;
    tx.commit()?;
    Ok(result)
}

/// Advisory write lock serializing plan application across invocations.
///
/// The lock lives in a sidecar file next to the database. Acquire with
/// [`try_lock_exclusive`]; the guard releases on drop.
pub fn lock_handle(db_path: &str) -> Result<fd_lock::RwLock<File>> {
    let lock_path = format!("{}.lock", db_path);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|e| Error::InitError(format!("Failed to open lock file {}: {}", lock_path, e)))?;

    Ok(fd_lock::RwLock::new(file))
}

/// Try to take the exclusive lock without blocking.
///
/// A lock already held by another process maps to [`Error::DatabaseLocked`].
pub fn try_lock_exclusive<'a>(
    lock: &'a mut fd_lock::RwLock<File>,
    db_path: &str,
) -> Result<fd_lock::RwLockWriteGuard<'a, File>> {
    lock.try_write().map_err(|e| {
        if e.kind() == std::io::ErrorKind::WouldBlock {
            Error::DatabaseLocked(db_path.to_string())
        } else {
            Error::Io(e)
        }
    })
}
