// src/target/mod.rs

//! Install-target classification
//!
//! Every user-supplied install specifier resolves to exactly one [`Target`]
//! variant; classification is total and deterministic. The rules are an
//! ordered predicate chain, checked in priority order:
//!
//! 1. `file://` prefix: strip the scheme, treat the rest as a local path
//! 2. `http://` / `https://` prefix: remote URL
//! 3. contains a path separator: local file
//! 4. ends with `.rpm` and that exact file exists in the working
//!    directory: local file
//! 5. otherwise: package name, resolved against the enabled repositories
//!
//! Rule 4 is a deliberate ambiguity-resolution policy: a same-named `.rpm`
//! file in the working directory shadows repository lookup. A same-named
//! file without the extension does not qualify and stays a package name.
//! The only side effect here is the rule-4 existence check; nothing is
//! opened or read.

pub mod normalize;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::target::normalize::{normalize_path, normalize_url_str};

/// File extension that marks a package artifact on disk
pub const PACKAGE_EXTENSION: &str = ".rpm";

/// A classified install target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Package file on the local filesystem (absolute, normalized)
    LocalFile { path: PathBuf },
    /// Package file reachable over HTTP(S) (normalized URL)
    RemoteUrl { url: String },
    /// Bare package name to look up in the enabled repositories
    PackageName { name: String },
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::LocalFile { path } => write!(f, "{}", path.display()),
            Target::RemoteUrl { url } => write!(f, "{}", url),
            Target::PackageName { name } => write!(f, "{}", name),
        }
    }
}

/// Classify a raw install specifier.
///
/// `cwd` anchors relative paths and the rule-4 existence check; it must be
/// absolute. This function never fails: unresolvable strings classify as
/// package names and surface later as repository lookup errors.
pub fn classify(raw: &str, cwd: &Path) -> Target {
    if let Some(rest) = raw.strip_prefix("file://") {
        return Target::LocalFile {
            path: normalize_path(Path::new(rest), cwd),
        };
    }

    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Target::RemoteUrl {
            url: normalize_url_str(raw),
        };
    }

    if raw.contains('/') {
        return Target::LocalFile {
            path: normalize_path(Path::new(raw), cwd),
        };
    }

    if raw.ends_with(PACKAGE_EXTENSION) && cwd.join(raw).is_file() {
        return Target::LocalFile {
            path: normalize_path(Path::new(raw), cwd),
        };
    }

    Target::PackageName {
        name: raw.to_string(),
    }
}
