//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path) and
//! the write-to-temp-then-rename primitive used for persisted state.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all_with_op(op: &'static str, path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| io_error(op, path, e))
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all(path: &Path) -> Result<()> {
    ensure_dir_all_with_op("creating directory", path).await
}

/// Temporary sibling path used while a file is being replaced.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace `path` with `contents` so that readers only ever observe the old
/// or the new file, never a partial write.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir_all(parent).await?;
    }

    let tmp = temp_sibling(path);
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| io_error("writing temporary file", &tmp, e))?;

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_error("renaming temporary file", path, e));
    }
    Ok(())
}

/// Count files in `dir` whose name starts with `prefix` and ends with `suffix`.
pub async fn count_files_matching(dir: &Path, prefix: &str, suffix: &str) -> Result<u64> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| io_error("reading directory", dir, e))?;

    let mut count = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| io_error("reading directory entry", dir, e))?
    {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(prefix) && name.ends_with(suffix) {
            count += 1;
        }
    }
    Ok(count)
}
