// src/lib.rs

//! Quarry Package Manager
//!
//! Package manager core for RPM artifacts: resolves heterogeneous install
//! targets (local paths, `file://` URIs, remote URLs, bare package names),
//! fetches and inspects package files, and drives install/reinstall
//! transactions against a local SQLite package database.
//!
//! # Architecture
//!
//! - Targets: every install specifier classifies into exactly one of
//!   LocalFile, RemoteUrl, or PackageName
//! - Planning: actions (Install, Reinstall, Skip) are decided once, before
//!   any database mutation; a bad target fails the whole invocation early
//! - Execution: entries apply in plan order, each atomic in its own
//!   database transaction, under an exclusive lock
//! - Exit codes: every fatal error kind maps to a distinct, stable code

pub mod db;
mod error;
pub mod fetch;
pub mod packages;
pub mod repository;
pub mod target;
pub mod transaction;

pub use error::{Error, Result};
