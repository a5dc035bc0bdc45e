use crate::error::Result;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Parse a YAML document. An empty file yields `T::default()`.
pub fn read_yaml<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_yaml::from_str(&data)?)
}

/// Like [`read_yaml`], but a missing file is `None`.
pub fn read_optional_yaml<T: DeserializeOwned + Default>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    read_yaml(path).map(Some)
}
