//! URI ↔ filesystem path conversion and normalization utilities.
//!
//! This crate provides consistent URI handling for the codenav ecosystem:
//!
//! - Converting between `file://` URIs and filesystem paths
//! - Windows drive-letter normalization
//! - Percent encoding/decoding (spaces, non-ASCII)
//! - Repository-relative path mapping with forward slashes
//!
//! The URI produced for a path is the canonical identity of that file for
//! the lifetime of a server session; round-trips must be exact.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

use std::path::{Path, PathBuf};
use url::Url;

/// Convert a `file://` URI to a filesystem path.
///
/// Properly handles percent-encoding and works with spaces, Windows drive
/// letters, and non-ASCII characters. Returns `None` if the URI is not a
/// valid `file://` URI.
///
/// # Examples
///
/// ```
/// use codenav_uri::uri_to_path;
///
/// assert!(uri_to_path("file:///tmp/lib.rs").is_some());
/// assert!(uri_to_path("file:///tmp/path%20with%20spaces/lib.rs").is_some());
/// assert!(uri_to_path("https://example.com").is_none());
/// ```
pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    let url = Url::parse(uri).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.to_file_path().ok()
}

/// Convert an absolute filesystem path to a `file://` URI.
///
/// Percent-encodes spaces and non-ASCII characters; on Windows the drive
/// letter appears after the leading slash (`file:///C:/...`).
///
/// # Errors
///
/// Returns an error if the path is relative or cannot be represented as a
/// URI.
pub fn path_to_uri<P: AsRef<Path>>(path: P) -> Result<String, String> {
    let path = path.as_ref();
    if !path.is_absolute() {
        return Err(format!("Cannot build a URI from relative path: {}", path.display()));
    }
    Url::from_file_path(path)
        .map(|url| url.to_string())
        .map_err(|_| format!("Failed to convert path to URI: {}", path.display()))
}

/// Normalize a URI to a consistent key for lookups.
///
/// On Windows the drive letter may arrive uppercase or lowercase depending
/// on the client; this lowers it so `file:///C:/x` and `file:///c:/x` map
/// to the same buffer.
///
/// # Examples
///
/// ```
/// use codenav_uri::uri_key;
///
/// assert_eq!(uri_key("file:///tmp/lib.rs"), "file:///tmp/lib.rs");
/// assert_eq!(uri_key("file:///C:/src/lib.rs"), "file:///c:/src/lib.rs");
/// assert_eq!(uri_key("not-a-uri"), "not-a-uri");
/// ```
pub fn uri_key(uri: &str) -> String {
    if let Ok(u) = Url::parse(uri) {
        let s = u.as_str().to_string();
        if let Some(rest) = s.strip_prefix("file:///") {
            // Windows drive letter pattern: single letter followed by colon
            if rest.len() > 1
                && rest.as_bytes()[1] == b':'
                && rest.as_bytes()[0].is_ascii_alphabetic()
            {
                return format!("file:///{}{}", rest[0..1].to_ascii_lowercase(), &rest[1..]);
            }
        }
        s
    } else {
        uri.to_string()
    }
}

/// Convert an absolute path to its repository-relative form.
///
/// The result always uses forward slashes, independent of platform. Returns
/// `None` when the path does not live under the repository root.
pub fn to_repository_relative(root: &Path, absolute: &Path) -> Option<String> {
    let rel = absolute.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in rel.components() {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    Some(out)
}

/// Join a repository-relative path (forward slashes) onto the root.
pub fn from_repository_relative(root: &Path, relative: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    path
}
