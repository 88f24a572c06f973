//! Cassette file writer

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::format::Cassette;
use crate::{ProxyError, Result};

/// Write the whole cassette to `path`.
///
/// The document goes to a sibling temporary file first, is synced, then
/// renamed over the target. A crash mid-write leaves the previous cassette
/// untouched.
///
/// # Errors
///
/// Returns error if serialization or any filesystem step fails
pub fn persist(path: &Path, cassette: &Cassette) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let yaml = serde_yaml::to_string(cassette)
        .map_err(|e| ProxyError::Other(format!("Failed to serialize cassette: {e}")))?;

    let tmp_path = temp_path(path);
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(yaml.as_bytes())?;
        file.sync_all()?;
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    debug!(
        path = %path.display(),
        interactions = cassette.len(),
        bytes = yaml.len(),
        "Persisted cassette"
    );

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::format::{Headers, Interaction, RecordedRequest, RecordedResponse, Status};
    use crate::storage::reader::load;
    use bytes::Bytes;
    use tempfile::TempDir;

    fn interaction(uri: &str) -> Interaction {
        Interaction::new(
            RecordedRequest::new("GET", uri, Headers::new(), Bytes::new()),
            RecordedResponse {
                status: Status {
                    code: 200,
                    message: "OK".to_string(),
                },
                headers: Headers::new(),
                body: Bytes::from_static(b"ok"),
            },
        )
    }

    #[test]
    fn test_persist_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rec_2024-01-01.yaml");

        let mut cassette = Cassette::default();
        cassette.append(interaction("http://a/1"));
        cassette.append(interaction("http://a/2"));
        persist(&path, &cassette).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded, cassette);
        assert_eq!(loaded.interactions[1].request.uri, "http://a/2");
    }

    #[test]
    fn test_persist_replaces_previous_and_leaves_no_temp() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rec_2024-01-01.yaml");

        let mut cassette = Cassette::default();
        cassette.append(interaction("http://a/1"));
        persist(&path, &cassette).unwrap();

        cassette.append(interaction("http://a/2"));
        persist(&path, &cassette).unwrap();

        assert_eq!(load(&path).unwrap().len(), 2);
        assert!(!temp_path(&path).exists());

        let files: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_persist_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("rec_2024-01-01.yaml");

        persist(&path, &Cassette::default()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_temp_path() {
        let path = Path::new("/cache/rec_2024-01-01.yaml");
        assert_eq!(temp_path(path), Path::new("/cache/rec_2024-01-01.yaml.tmp"));
    }
}
