//! Output directory removal.

use std::path::{Path, PathBuf};

use aedris_core::path::{clean_path, is_filesystem_root};
use aedris_core::{AedrisError, BuildEnvironment, Result};
use tracing::{debug, info};

/// Drops directories nested inside another entry of the list.
pub fn outermost_dirs(dirs: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = dirs.into_iter().map(|dir| clean_path(&dir)).collect();
    dirs.sort();
    dirs.dedup();

    let mut outermost: Vec<PathBuf> = Vec::new();
    for dir in dirs {
        if !outermost.iter().any(|parent| dir.starts_with(parent)) {
            outermost.push(dir);
        }
    }
    outermost
}

/// Removes `dirs`. With `simulate` set, only logs what would be removed.
///
/// Refuses to touch a filesystem root. Returns the directories that were (or
/// would have been) removed.
pub async fn clean_outputs(dirs: &[PathBuf], env: &BuildEnvironment) -> Result<Vec<PathBuf>> {
    let dirs = outermost_dirs(dirs.iter().cloned());

    if let Some(root) = dirs.iter().find(|dir| is_filesystem_root(dir)) {
        return Err(AedrisError::RefuseRootRemoval(root.clone()));
    }

    let mut removed = Vec::new();
    for dir in dirs {
        if !exists(&dir).await {
            debug!(target: "aedris::clean", dir = %dir.display(), "nothing to clean");
            continue;
        }

        if env.simulate {
            info!(target: "aedris::clean", dir = %dir.display(), "would remove (simulated)");
        } else {
            info!(target: "aedris::clean", dir = %dir.display(), "removing");
            tokio::fs::remove_dir_all(&dir).await?;
        }
        removed.push(dir);
    }

    Ok(removed)
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
