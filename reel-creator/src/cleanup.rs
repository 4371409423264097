use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// Removes `<temp_base>/<reel_id>`. A directory that is already gone is fine.
pub async fn cleanup_reel(temp_base: &Path, reel_id: &str) -> io::Result<()> {
    let dir = temp_base.join(reel_id);
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => {
            info!("Removed temp directory {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Temp directory {} already gone", dir.display());
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Empties `temp_base` but keeps the directory itself. Entries that cannot
/// be removed are logged and skipped. Returns how many were removed.
pub async fn cleanup_all(temp_base: &Path) -> io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(temp_base).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let result = if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => warn!("Could not remove {}: {}", path.display(), e),
        }
    }
    info!("Cleaned {} entries from {}", removed, temp_base.display());
    Ok(removed)
}
