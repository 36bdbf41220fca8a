use std::path::PathBuf;

use thiserror::Error;

/// Errors loading or saving one of the JSON documents (calibration, angle
/// ranges, gestures, configuration).
///
/// Callers are expected to log these and continue with empty or default data.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Reading or writing the file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File content is not the expected JSON shape.
    #[error("malformed document {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A map key that should be a number could not be parsed.
    #[error("invalid percent key '{key}' for segment '{segment}' in {path}")]
    InvalidPercentKey {
        path: PathBuf,
        segment: String,
        key: String,
    },

    /// Serializing the in-memory value failed.
    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PersistenceError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn malformed(path: &std::path::Path, source: serde_json::Error) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Read a JSON document, returning `Ok(None)` when the file does not exist.
pub(crate) fn read_optional_json<T: serde::de::DeserializeOwned>(
    path: &std::path::Path,
) -> Result<Option<T>, PersistenceError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PersistenceError::io(path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| PersistenceError::malformed(path, e))
}

/// Write a value as pretty-printed JSON, creating parent directories.
pub(crate) fn write_json<T: serde::Serialize>(
    path: &std::path::Path,
    value: &T,
) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PersistenceError::io(path, e))?;
    }
    std::fs::write(path, json).map_err(|e| PersistenceError::io(path, e))
}
