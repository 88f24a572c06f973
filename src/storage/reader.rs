//! Cassette file reader

use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use super::format::Cassette;
use crate::{ProxyError, Result};

/// Load a cassette from disk.
///
/// A missing file yields an empty cassette: the first recording of a day
/// window creates it.
///
/// # Errors
///
/// Returns `CorruptCassette` if the file exists but cannot be parsed, or an
/// I/O error if it cannot be read
pub fn load(path: &Path) -> Result<Cassette> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "Cassette does not exist yet");
            return Ok(Cassette::default());
        }
        Err(e) => return Err(e.into()),
    };

    if content.trim().is_empty() {
        return Ok(Cassette::default());
    }

    let cassette: Cassette =
        serde_yaml::from_str(&content).map_err(|e| ProxyError::CorruptCassette {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    debug!(
        path = %path.display(),
        interactions = cassette.len(),
        "Loaded cassette"
    );

    Ok(cassette)
}
