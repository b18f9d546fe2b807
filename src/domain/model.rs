use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Download provider recognized from the root of an intercepted URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Provider {
    EarthExplorerBundle,
    CollectionDownload,
    DdsDownload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub url: String,
    pub provider: Option<Provider>,
    /// Filled in once the response headers name the downloaded file.
    pub product_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadProgress {
    pub bytes_transferred: u64,
    pub total_bytes: Option<u64>,
    pub percent: u8,
    pub cancelled: bool,
}

impl DownloadProgress {
    pub fn new(total_bytes: Option<u64>) -> Self {
        Self {
            total_bytes,
            ..Default::default()
        }
    }

    /// Records a transferred chunk. The percentage is clamped to 100 and
    /// never moves backwards, even if the server sends more than it announced.
    pub fn advance(&mut self, chunk_len: u64) {
        self.bytes_transferred += chunk_len;

        let percent = match self.total_bytes {
            Some(total) if total > 0 => (self.bytes_transferred.saturating_mul(100) / total).min(100) as u8,
            _ => 0,
        };
        self.percent = self.percent.max(percent);
    }

    pub fn fraction(&self) -> f32 {
        self.percent as f32 / 100.0
    }
}

/// Destination of one product on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductFolder {
    pub path: PathBuf,
    pub archive_path: Option<PathBuf>,
    pub extracted_files: Vec<PathBuf>,
}

impl ProductFolder {
    pub fn new(path: PathBuf, archive_path: PathBuf) -> Self {
        Self {
            path,
            archive_path: Some(archive_path),
            extracted_files: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Classifying,
    Downloading,
    Extracting,
    Dispatching,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The URL is not a recognized download link; ordinary browsing.
    Ignored,
    /// The response filename carries no product identifier. Nothing was written.
    NoProduct { base_folder: PathBuf },
    Cancelled,
    Completed { folder: PathBuf, bands: Vec<PathBuf> },
}
