use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    api::PortalClient,
    domain::{AppError, DownloadProgress, DownloadTarget, ProductFolder, UrlClassifier},
    utils::{ensure_dir, sanitize_filename, url_file_name},
};

/// Read/write buffer size for streaming a download to disk.
pub const CHUNK_SIZE: usize = 81_920;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Saved(ProductFolder),
    /// The file is not a recognizable product; holds the untouched downloads folder.
    NoProduct(PathBuf),
    Cancelled,
}

enum StreamEnd {
    Finished,
    Cancelled,
}

#[derive(Clone)]
pub struct StreamingDownloader {
    client: PortalClient,
    classifier: UrlClassifier,
    downloads_root: PathBuf,
}

impl StreamingDownloader {
    pub fn new(client: PortalClient, classifier: UrlClassifier, downloads_root: PathBuf) -> Self {
        Self {
            client,
            classifier,
            downloads_root,
        }
    }

    pub fn downloads_root(&self) -> &Path {
        &self.downloads_root
    }

    /// Downloads `target` into its product folder.
    ///
    /// Fills in `target.product_name` once the response names the file.
    /// Cancellation is checked before every chunk; a cancelled or failed
    /// transfer leaves no partial file behind.
    pub async fn download<F>(
        &self,
        target: &mut DownloadTarget,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<DownloadOutcome, AppError>
    where
        F: FnMut(&DownloadProgress),
    {
        let base_folder = ensure_dir(&self.downloads_root).await?;

        let response = self.client.open(&target.url).await?;
        let content_length = response.metadata.content_length;
        let flat = !self.classifier.uses_product_folders();

        let file_name = match response.metadata.file_name.clone() {
            Some(name) => name,
            None if flat => url_file_name(&target.url)
                .map(|name| sanitize_filename(&name))
                .ok_or(AppError::MissingHeader("content-disposition"))?,
            None => return Err(AppError::MissingHeader("content-disposition")),
        };

        let product_folder = if flat {
            base_folder.clone()
        } else {
            match self.classifier.product_name(&file_name) {
                Some(product) => {
                    let folder = base_folder.join(&product);
                    target.product_name = Some(product);
                    folder
                }
                None => {
                    info!(file_name, "response is not a recognized product, skipping");
                    return Ok(DownloadOutcome::NoProduct(base_folder));
                }
            }
        };

        ensure_dir(&product_folder).await?;
        let file_path = product_folder.join(&file_name);
        info!(
            path = %file_path.display(),
            content_length,
            content_type = %response.metadata.content_type,
            "downloading"
        );

        let mut file = tokio::fs::File::create(&file_path).await?;
        let mut reader = response.into_reader();
        let mut progress = DownloadProgress::new(Some(content_length));
        on_progress(&progress);

        let result = stream_to_file(&mut reader, &mut file, &mut progress, cancel, &mut on_progress).await;
        drop(file);

        match result {
            Ok(StreamEnd::Finished) => {
                debug!(bytes = progress.bytes_transferred, "download finished");
                Ok(DownloadOutcome::Saved(ProductFolder::new(product_folder, file_path)))
            }
            Ok(StreamEnd::Cancelled) => {
                info!(path = %file_path.display(), "download cancelled, removing partial file");
                tokio::fs::remove_file(&file_path).await?;
                Ok(DownloadOutcome::Cancelled)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&file_path).await {
                    warn!(path = %file_path.display(), error = %cleanup, "failed to remove partial file");
                }
                Err(e)
            }
        }
    }
}

async fn stream_to_file<R, F>(
    reader: &mut R,
    file: &mut tokio::fs::File,
    progress: &mut DownloadProgress,
    cancel: &CancellationToken,
    on_progress: &mut F,
) -> Result<StreamEnd, AppError>
where
    R: AsyncRead + Unpin + ?Sized,
    F: FnMut(&DownloadProgress),
{
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        if cancel.is_cancelled() {
            progress.cancelled = true;
            on_progress(progress);
            return Ok(StreamEnd::Cancelled);
        }

        let read = reader
            .read(&mut buffer)
            .await
            .map_err(|e| AppError::Network(e.to_string()))?;
        if read == 0 {
            break;
        }

        file.write_all(&buffer[..read])
            .await
            .map_err(|e| AppError::Io(format!("Write error: {}", e)))?;

        progress.advance(read as u64);
        on_progress(progress);
    }

    file.sync_all()
        .await
        .map_err(|e| AppError::Io(format!("Failed to sync file: {}", e)))?;

    Ok(StreamEnd::Finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AllowedRoot, PaneConfig, PaneKind, PaneProfile};
    use crate::domain::Provider;

    const SCENE: &str = "LC08_L1TP_123032_20200101_20200115_01_T1";

    fn downloader(server_url: &str, root: &Path, flat: bool) -> StreamingDownloader {
        let profile = PaneProfile::compile(&PaneConfig::for_kind(PaneKind::EarthExplorer)).unwrap();
        let allow_list = vec![AllowedRoot {
            prefix: server_url.to_string(),
            provider: Provider::DdsDownload,
        }];
        let pattern = if flat { None } else { profile.product_pattern };
        StreamingDownloader::new(
            PortalClient::new(),
            UrlClassifier::new(allow_list, pattern),
            root.to_path_buf(),
        )
    }

    fn target(url: String) -> DownloadTarget {
        DownloadTarget {
            url,
            provider: Some(Provider::DdsDownload),
            product_name: None,
        }
    }

    async fn serve(server: &mut mockito::ServerGuard, file_name: &str, body: Vec<u8>) -> mockito::Mock {
        server
            .mock("GET", "/download")
            .with_status(200)
            .with_header("content-type", "application/x-tar")
            .with_header(
                "content-disposition",
                &format!("attachment; filename=\"{}\"", file_name),
            )
            .with_body(body)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_download_into_product_folder() {
        let mut server = mockito::Server::new_async().await;
        let body: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let _mock = serve(&mut server, &format!("{}.tar", SCENE), body.clone()).await;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("Downloads");
        let downloader = downloader(&server.url(), &root, false);

        let mut target = target(format!("{}/download", server.url()));
        let mut percents = Vec::new();
        let outcome = downloader
            .download(&mut target, &CancellationToken::new(), |p| percents.push(p.percent))
            .await
            .unwrap();

        let DownloadOutcome::Saved(folder) = outcome else {
            panic!("expected a saved download, got {:?}", outcome);
        };
        assert_eq!(target.product_name.as_deref(), Some(SCENE));
        assert_eq!(folder.path, root.join(SCENE));

        let archive = folder.archive_path.unwrap();
        assert_eq!(archive, root.join(SCENE).join(format!("{}.tar", SCENE)));
        assert_eq!(std::fs::read(&archive).unwrap(), body);

        // 200 000 bytes in 80 KiB chunks is at least three reads.
        assert!(percents.len() >= 4);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert!(percents.iter().all(|p| *p <= 100));
        assert_eq!(percents.first(), Some(&0));
        assert_eq!(percents.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_unrecognized_file_name_writes_nothing() {
        let mut server = mockito::Server::new_async().await;
        let _mock = serve(&mut server, "readme.txt", b"hello".to_vec()).await;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("Downloads");
        let downloader = downloader(&server.url(), &root, false);

        let mut target = target(format!("{}/download", server.url()));
        let outcome = downloader
            .download(&mut target, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(outcome, DownloadOutcome::NoProduct(root.clone()));
        assert_eq!(target.product_name, None);
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_download_removes_partial_file() {
        let mut server = mockito::Server::new_async().await;
        let _mock = serve(&mut server, &format!("{}.tar", SCENE), vec![7u8; 300_000]).await;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("Downloads");
        let downloader = downloader(&server.url(), &root, false);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut saw_cancelled = false;
        let mut target = target(format!("{}/download", server.url()));
        let outcome = downloader
            .download(&mut target, &cancel, |p| {
                if p.bytes_transferred > 0 {
                    trigger.cancel();
                }
                saw_cancelled |= p.cancelled;
            })
            .await
            .unwrap();

        assert_eq!(outcome, DownloadOutcome::Cancelled);
        assert!(saw_cancelled);
        assert_eq!(std::fs::read_dir(root.join(SCENE)).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_disposition_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/download")
            .with_status(200)
            .with_header("content-type", "application/x-tar")
            .with_body("abc")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(&server.url(), dir.path(), false);
        let mut target = target(format!("{}/download", server.url()));
        let result = downloader
            .download(&mut target, &CancellationToken::new(), |_| {})
            .await;

        assert!(matches!(result, Err(AppError::MissingHeader("content-disposition"))));
    }

    #[tokio::test]
    async fn test_flat_download_names_file_from_url() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/LPC/USGS_LPC_tile.laz")
            .with_status(200)
            .with_header("content-type", "application/octet-stream")
            .with_body("points")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(&server.url(), dir.path(), true);
        let mut target = target(format!("{}/LPC/USGS_LPC_tile.laz", server.url()));
        let outcome = downloader
            .download(&mut target, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        let DownloadOutcome::Saved(folder) = outcome else {
            panic!("expected a saved download, got {:?}", outcome);
        };
        assert_eq!(folder.path, dir.path());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("USGS_LPC_tile.laz")).unwrap(),
            "points"
        );
    }
}
