// src/target/normalize.rs

//! Lexical path and URL normalization
//!
//! Normalization never touches the filesystem: it must produce the same
//! answer for paths that do not exist yet or whose intermediate directories
//! have been removed. `..` and `.` segments are collapsed purely lexically,
//! with relative paths anchored at the caller's working directory.

use std::path::{Component, Path, PathBuf};
use url::Url;

/// Resolve a local path to an absolute, lexically collapsed form.
///
/// Relative paths are anchored at `cwd` (which must be absolute). `.`
/// segments are dropped and `..` segments pop the previous component;
/// a `..` at the root stays at the root. Idempotent.
pub fn normalize_path(path: &Path, cwd: &Path) -> PathBuf {
    let anchored = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let mut out = PathBuf::new();
    for component in anchored.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // pop() is a no-op at the root
                out.pop();
            }
            Component::Normal(segment) => out.push(segment),
        }
    }
    out
}

/// Normalize the path component of a URL string.
///
/// Parsing with the `url` crate applies standard dot-segment removal to the
/// path while leaving scheme, host, port, and query untouched. Strings that
/// do not parse as URLs are returned unchanged; the fetch layer reports
/// those as transport failures with the original spelling intact.
pub fn normalize_url_str(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => url.to_string(),
        Err(_) => raw.to_string(),
    }
}
