use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::domain::AppError;

use super::extractor::ArchiveExtractor;

/// State reported by the browser for a download it manages itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserDownloadState {
    InProgress,
    Interrupted,
    Completed,
}

/// Receives the LiDAR explorer's own download notifications: redirects the
/// files into the pane's downloads folder and decompresses finished `.laz` tiles.
#[derive(Clone)]
pub struct LidarDownloadBridge {
    downloads_root: PathBuf,
    extractor: ArchiveExtractor,
    handled: Arc<Mutex<HashSet<PathBuf>>>,
}

impl LidarDownloadBridge {
    pub fn new(downloads_root: PathBuf, extractor: ArchiveExtractor) -> Self {
        Self {
            downloads_root,
            extractor,
            handled: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Rewrites the browser's suggested path into the downloads folder.
    pub fn download_starting(&self, suggested: &Path) -> Result<PathBuf, AppError> {
        std::fs::create_dir_all(&self.downloads_root)?;

        let file_name = suggested
            .file_name()
            .ok_or_else(|| AppError::Io(format!("No file name in {}", suggested.display())))?;
        let path = self.downloads_root.join(file_name);
        debug!(suggested = %suggested.display(), path = %path.display(), "redirecting browser download");
        Ok(path)
    }

    /// Returns the decompressed `.las` path the first time a `.laz` download
    /// completes. A failed decompression keeps the tile and lets a later
    /// completion retry it.
    pub async fn download_state_changed(
        &self,
        state: BrowserDownloadState,
        path: &Path,
    ) -> Result<Option<PathBuf>, AppError> {
        if state != BrowserDownloadState::Completed || !path.to_string_lossy().ends_with("laz") {
            return Ok(None);
        }

        let first = self
            .handled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.to_path_buf());
        if !first {
            return Ok(None);
        }

        info!(path = %path.display(), "decompressing point cloud");
        let result = self.extractor.decompress_laz(path).await;
        if result.is_err() {
            self.release(path);
        }
        result.map(Some)
    }

    fn release(&self, path: &Path) {
        self.handled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_redirected_into_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("LidarExplorerAddinDownloads");
        let bridge = LidarDownloadBridge::new(root.clone(), ArchiveExtractor::new(PathBuf::from("laszip")));

        let path = bridge
            .download_starting(Path::new("/home/user/Downloads/USGS_LPC_tile.laz"))
            .unwrap();
        assert_eq!(path, root.join("USGS_LPC_tile.laz"));
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_incomplete_or_other_downloads_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = LidarDownloadBridge::new(
            dir.path().to_path_buf(),
            ArchiveExtractor::new(dir.path().join("no-such-laszip")),
        );

        let tile = dir.path().join("tile.laz");
        assert_eq!(
            bridge
                .download_state_changed(BrowserDownloadState::InProgress, &tile)
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            bridge
                .download_state_changed(BrowserDownloadState::Completed, &dir.path().join("tile.zip"))
                .await
                .unwrap(),
            None
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_completed_laz_handled_once() {
        let dir = tempfile::tempdir().unwrap();
        let tile = dir.path().join("tile.laz");
        std::fs::write(&tile, b"compressed").unwrap();

        let bridge = LidarDownloadBridge::new(dir.path().to_path_buf(), ArchiveExtractor::new(PathBuf::from("true")));
        let output = bridge
            .download_state_changed(BrowserDownloadState::Completed, &tile)
            .await
            .unwrap();
        assert_eq!(output, Some(dir.path().join("tile.las")));
        assert!(!tile.exists());

        let again = bridge
            .download_state_changed(BrowserDownloadState::Completed, &tile)
            .await
            .unwrap();
        assert_eq!(again, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_decompression_can_be_retried() {
        let dir = tempfile::tempdir().unwrap();
        let tile = dir.path().join("tile.laz");
        std::fs::write(&tile, b"compressed").unwrap();

        let failing = LidarDownloadBridge::new(dir.path().to_path_buf(), ArchiveExtractor::new(PathBuf::from("false")));
        let first = failing
            .download_state_changed(BrowserDownloadState::Completed, &tile)
            .await;
        assert!(matches!(first, Err(AppError::DecompressionFailed { code: Some(1), .. })));
        assert!(tile.exists());

        // Same notification history, working laszip
        let fixed = LidarDownloadBridge {
            extractor: ArchiveExtractor::new(PathBuf::from("true")),
            ..failing.clone()
        };
        let second = fixed
            .download_state_changed(BrowserDownloadState::Completed, &tile)
            .await
            .unwrap();
        assert_eq!(second, Some(dir.path().join("tile.las")));
        assert!(!tile.exists());
    }
}
