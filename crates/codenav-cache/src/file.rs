//! Versioned cache files.
//!
//! Each cache file is a serialized `[version_stamp, payload]` container.
//! The version stamp combines tool version, language-server identity, and
//! schema version; a mismatch on load discards the file so a new server or
//! schema can never surface stale data.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Write a versioned cache file atomically (temp file + rename).
pub fn save_cache<T: Serialize>(path: &Path, version: &str, payload: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let container = (version, payload);
    let bytes = serde_json::to_vec(&container)?;

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, path)?;
    debug!(path = %path.display(), version, "cache saved");
    Ok(())
}

/// Load a versioned cache file.
///
/// Returns `None` when the file is missing, unreadable, unparsable, or
/// carries a different version stamp; the caller rebuilds from the server
/// in every one of those cases.
pub fn load_cache<T: DeserializeOwned>(path: &Path, expected_version: &str) -> Option<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read cache file");
            return None;
        }
    };

    let (version, payload): (String, T) = match serde_json::from_slice(&bytes) {
        Ok(container) => container,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to parse cache file");
            return None;
        }
    };

    if version != expected_version {
        debug!(
            path = %path.display(),
            found = %version,
            expected = %expected_version,
            "cache version mismatch, discarding"
        );
        return None;
    }

    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symbols.json");
        let mut payload = HashMap::new();
        payload.insert("src/lib.rs".to_string(), vec![1, 2, 3]);

        save_cache(&path, "v1", &payload).unwrap();
        let loaded: HashMap<String, Vec<i32>> = load_cache(&path, "v1").unwrap();
        assert_eq!(loaded, payload);
    }

    #[test]
    fn version_mismatch_discards_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symbols.json");
        save_cache(&path, "tool-1.0:server-2.0:schema-3", &vec!["x"]).unwrap();

        let loaded: Option<Vec<String>> = load_cache(&path, "tool-1.0:server-2.1:schema-3");
        assert!(loaded.is_none());
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<Vec<String>> = load_cache(&dir.path().join("absent.json"), "v1");
        assert!(loaded.is_none());
    }

    #[test]
    fn corrupt_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, b"{ not json").unwrap();
        let loaded: Option<Vec<String>> = load_cache(&path, "v1");
        assert!(loaded.is_none());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deep/cache.json");
        save_cache(&path, "v1", &42u32).unwrap();
        assert_eq!(load_cache::<u32>(&path, "v1"), Some(42));
    }
}
