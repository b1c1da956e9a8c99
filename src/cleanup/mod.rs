use anyhow::Context;
use std::path::{Path, PathBuf};

use crate::extract::DOWNLOAD_DIR_NAME;
use crate::Result;

/// Delete the raw `downloads` directory of every day under `output_dir`.
///
/// Processed files are left alone. Returns the directories that were removed.
pub fn remove_downloads(output_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs_err::read_dir(output_dir)
        .with_context(|| format!("Cannot read output directory {}", output_dir.display()))?;

    let mut removed = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }

        let downloads = entry.path().join(DOWNLOAD_DIR_NAME);
        if downloads.is_dir() {
            tracing::debug!("Removing {}", downloads.display());
            fs_err::remove_dir_all(&downloads)?;
            removed.push(downloads);
        }
    }

    removed.sort();
    Ok(removed)
}
