// src/packages/traits.rs

//! Common traits for package format parsers

use std::fmt;

use crate::error::Result;

/// Identity of a package: the join key against the installed database.
///
/// The version string is the full `[epoch:]version-release` reported by the
/// package headers; comparisons are exact-match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageIdentity {
    pub name: String,
    pub version: String,
    pub architecture: Option<String>,
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.architecture {
            Some(arch) => write!(f, "{}-{}.{}", self.name, self.version, arch),
            None => write!(f, "{}-{}", self.name, self.version),
        }
    }
}

/// Metadata about a file within a package
#[derive(Debug, Clone)]
pub struct PackageFile {
    pub path: String,
    pub size: i64,
    pub mode: i32,
    pub sha256: Option<String>,
}

/// Dependency information
#[derive(Debug, Clone)]
pub struct Dependency {
    pub name: String,
    pub version: Option<String>,
    pub dep_type: DependencyType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyType {
    Runtime,
    Build,
    Optional,
}

/// Common interface for package format parsers
pub trait PackageFormat {
    /// Parse a package from fetched bytes. `origin` is the path or URL the
    /// bytes came from, used in error messages.
    fn parse_bytes(data: &[u8], origin: &str) -> Result<Self>
    where
        Self: Sized;

    /// Get the package name
    fn name(&self) -> &str;

    /// Get the full package version (`[epoch:]version-release`)
    fn version(&self) -> &str;

    /// Get the package architecture (e.g., "x86_64", "aarch64")
    fn architecture(&self) -> Option<&str>;

    /// Get the package summary/description
    fn description(&self) -> Option<&str>;

    /// Get the list of files in the package
    fn files(&self) -> &[PackageFile];

    /// Get the list of dependencies
    fn dependencies(&self) -> &[Dependency];

    /// The identity used to join against the installed database
    fn identity(&self) -> PackageIdentity {
        PackageIdentity {
            name: self.name().to_string(),
            version: self.version().to_string(),
            architecture: self.architecture().map(|s| s.to_string()),
        }
    }
}
