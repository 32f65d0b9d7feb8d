//! Plugin discovery — find candidate library files in a directory.

use std::path::{Path, PathBuf};

use crate::error::PluginError;

/// Shared-library extension for the current platform.
pub const PLUGIN_EXTENSION: &str = if cfg!(target_os = "windows") {
    "dll"
} else if cfg!(target_os = "macos") {
    "dylib"
} else {
    "so"
};

/// Whether `path` carries the platform library extension.
pub fn is_plugin_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PLUGIN_EXTENSION))
}

/// List plugin candidates in `dir`, sorted by file name.
///
/// Only regular files (or symlinks to them) with [`PLUGIN_EXTENSION`] are
/// returned; subdirectories are not scanned.
pub async fn discover_candidates(dir: &Path) -> Result<Vec<PathBuf>, PluginError> {
    if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
        return Err(PluginError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut candidates = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_plugin_file(&path) {
            continue;
        }
        // Follows symlinks, so a link into a build directory still counts.
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => candidates.push(path),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), "skipping unreadable plugin candidate: {e}");
            }
        }
    }

    candidates.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    tracing::debug!(
        dir = %dir.display(),
        count = candidates.len(),
        "plugin candidates discovered"
    );

    Ok(candidates)
}
