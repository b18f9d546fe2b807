use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::{
    api::PortalClient,
    config::PaneProfile,
    domain::{
        AppError, DownloadProgress, DownloadTarget, PipelineOutcome, PipelineStage, UrlClassifier,
    },
};

use super::{
    dispatcher::{BandDispatcher, CommandDispatcher, LogDispatcher, ToolDispatcher},
    downloader::{DownloadOutcome, StreamingDownloader},
    extractor::ArchiveExtractor,
    lidar::LidarDownloadBridge,
};

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Stage(PipelineStage),
    Progress(DownloadProgress),
}

/// Runs classify → download → extract → dispatch for one pane, one request at a time.
#[derive(Clone)]
pub struct PaneCoordinator {
    classifier: UrlClassifier,
    downloader: StreamingDownloader,
    extractor: ArchiveExtractor,
    bands: Option<BandDispatcher>,
    in_flight: Arc<AtomicBool>,
}

/// Held for the lifetime of one pipeline run; releases the pane on drop.
pub(crate) struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PaneCoordinator {
    pub fn new(profile: &PaneProfile, client: PortalClient, dispatcher: Arc<dyn ToolDispatcher>) -> Self {
        let classifier = UrlClassifier::new(profile.allow_list.clone(), profile.product_pattern.clone());
        let downloader = StreamingDownloader::new(client, classifier.clone(), profile.downloads_root.clone());
        let bands = profile
            .dispatch_bands
            .then(|| BandDispatcher::new(profile.band_pattern.clone(), profile.max_band, dispatcher));

        Self {
            classifier,
            downloader,
            extractor: ArchiveExtractor::new(profile.laszip_path.clone()),
            bands,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Uses the profile's tool command when one is configured, otherwise logs dispatches.
    pub fn from_profile(profile: &PaneProfile) -> Self {
        let dispatcher: Arc<dyn ToolDispatcher> = match &profile.tool_command {
            Some(command) => Arc::new(CommandDispatcher::new(command.clone())),
            None => Arc::new(LogDispatcher),
        };
        Self::new(profile, PortalClient::new(), dispatcher)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn downloads_root(&self) -> &Path {
        self.downloader.downloads_root()
    }

    pub fn lidar_bridge(&self) -> LidarDownloadBridge {
        LidarDownloadBridge::new(self.downloads_root().to_path_buf(), self.extractor.clone())
    }

    pub(crate) fn try_begin(&self) -> Option<InFlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(self.in_flight.clone()))
    }

    /// Handles a browser "new window" request.
    ///
    /// URLs outside the allow-list are ordinary browsing and yield
    /// [`PipelineOutcome::Ignored`] without touching the network or disk. A
    /// download request while another is running is rejected with
    /// [`AppError::Busy`].
    pub async fn handle_new_window<F>(
        &self,
        url: &str,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<PipelineOutcome, AppError>
    where
        F: FnMut(PipelineEvent),
    {
        let Some(target) = self.classifier.classify(url) else {
            return Ok(PipelineOutcome::Ignored);
        };

        let Some(_guard) = self.try_begin() else {
            warn!(url, "download already in progress, rejecting");
            return Err(AppError::Busy);
        };

        let span = info_span!("pipeline", url, provider = ?target.provider);
        let result = self
            .run(target, cancel, &mut on_event)
            .instrument(span)
            .await;

        if let Err(e) = &result {
            warn!(url, error = %e, "pipeline failed");
        }
        on_event(PipelineEvent::Stage(PipelineStage::Idle));
        result
    }

    async fn run<F>(
        &self,
        mut target: DownloadTarget,
        cancel: &CancellationToken,
        on_event: &mut F,
    ) -> Result<PipelineOutcome, AppError>
    where
        F: FnMut(PipelineEvent),
    {
        on_event(PipelineEvent::Stage(PipelineStage::Classifying));
        on_event(PipelineEvent::Stage(PipelineStage::Downloading));

        let outcome = self
            .downloader
            .download(&mut target, cancel, |progress| {
                on_event(PipelineEvent::Progress(*progress))
            })
            .await?;

        let folder = match outcome {
            DownloadOutcome::Saved(folder) => folder,
            DownloadOutcome::NoProduct(base_folder) => {
                return Ok(PipelineOutcome::NoProduct { base_folder });
            }
            DownloadOutcome::Cancelled => return Ok(PipelineOutcome::Cancelled),
        };

        on_event(PipelineEvent::Stage(PipelineStage::Extracting));
        let folder = self.extractor.extract_if_needed(folder).await?;

        let bands = match &self.bands {
            Some(dispatcher) => {
                on_event(PipelineEvent::Stage(PipelineStage::Dispatching));
                dispatcher.locate_and_dispatch(&folder.path).await?
            }
            None => Vec::new(),
        };

        info!(
            product = ?target.product_name,
            folder = %folder.path.display(),
            files = folder.extracted_files.len(),
            bands = bands.len(),
            "download complete"
        );
        Ok(PipelineOutcome::Completed {
            folder: folder.path,
            bands,
        })
    }
}
