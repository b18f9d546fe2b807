pub mod dispatcher;
pub mod download_coordinator;
pub mod downloader;
pub mod extractor;
pub mod lidar;

pub use download_coordinator::{PaneCoordinator, PipelineEvent};
pub use lidar::{BrowserDownloadState, LidarDownloadBridge};
