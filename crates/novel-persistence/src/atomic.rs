//! Atomic file operations for crash-safe commits.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{PersistenceError, Result};

/// Writes data to a file atomically.
///
/// The data goes to a temporary file in the target directory, is synced to
/// disk, and then renamed over the target path. Readers see either the old
/// content or the new content, never a mix.
///
/// # Errors
/// Returns an error if the directory cannot be created or the write or
/// rename fails. The target file is untouched in that case.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|source| PersistenceError::DirectoryError {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let write_error = |source: std::io::Error| PersistenceError::WriteError {
        path: path.to_path_buf(),
        source,
    };

    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(write_error)?;
    temp_file.write_all(data).map_err(write_error)?;
    temp_file.as_file().sync_all().map_err(write_error)?;
    temp_file
        .persist(path)
        .map_err(|e| write_error(e.error))?;

    Ok(())
}

/// Reads JSON from a file, returning `None` if the file doesn't exist.
pub fn read_json_optional<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceError::ReadError {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    Ok(Some(serde_json::from_slice(&data)?))
}
