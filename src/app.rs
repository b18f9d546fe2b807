use std::path::PathBuf;

use futures::StreamExt;
use iced::Task;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::{BrowserDownloadState, LidarDownloadBridge, PaneCoordinator, PipelineEvent};
use crate::config::{PaneConfig, PaneKind, PaneProfile};
use crate::domain::{AppError, PipelineOutcome, PipelineStage};
use crate::ui::{PaneMessage, PaneView};

pub struct PaneApp {
    view: PaneView,
    config: PaneConfig,
    coordinator: PaneCoordinator,
    // Cancels the in-flight download, if any
    cancel: Option<CancellationToken>,
    // Only the LiDAR pane receives the browser's own downloads
    lidar: Option<LidarDownloadBridge>,
}

impl Default for PaneApp {
    fn default() -> Self {
        Self::new()
    }
}

impl PaneApp {
    pub fn new() -> Self {
        let config = PaneConfig::from_env().unwrap_or_else(|e| {
            warn!(error = %e, "falling back to the EarthExplorer pane");
            PaneConfig::for_kind(PaneKind::EarthExplorer)
        });
        Self::with_config(config)
    }

    pub fn with_config(config: PaneConfig) -> Self {
        let profile = PaneProfile::compile(&config).unwrap_or_else(|e| {
            warn!(error = %e, "invalid pane configuration, using built-in profile");
            PaneProfile::builtin(config.kind)
        });
        info!(
            pane = profile.kind.title(),
            downloads = %profile.downloads_root.display(),
            "pane ready"
        );

        let coordinator = PaneCoordinator::from_profile(&profile);
        let lidar = lidar_bridge_for(&profile, &coordinator);
        let view = PaneView::new(
            config.kind.title(),
            &profile.start_url,
            coordinator.downloads_root().display().to_string(),
            lidar.is_some(),
        );

        Self {
            view,
            config,
            coordinator,
            cancel: None,
            lidar,
        }
    }
}

fn lidar_bridge_for(profile: &PaneProfile, coordinator: &PaneCoordinator) -> Option<LidarDownloadBridge> {
    (profile.kind == PaneKind::Lidar).then(|| coordinator.lidar_bridge())
}

#[derive(Debug, Clone)]
pub enum Message {
    UiMessage(PaneMessage),
    /// Stage changes and progress of the running pipeline
    Pipeline(PipelineEvent),
    /// Final result of one intercepted link
    PipelineFinished(Result<PipelineOutcome, AppError>),
    HomeFolderSelected(Option<PathBuf>),
    TileSelected(Option<PathBuf>),
    /// The browser is about to save a file at the suggested path
    BrowserDownloadStarting(PathBuf),
    BrowserDownloadStateChanged(BrowserDownloadState, PathBuf),
    PointCloudHandled(PathBuf, Result<Option<PathBuf>, AppError>),
}

pub fn title(app: &PaneApp) -> String {
    format!("{} Downloads", app.config.kind.title())
}

pub fn update(app: &mut PaneApp, message: Message) -> Task<Message> {
    match message {
        Message::UiMessage(ui_msg) => {
            app.view.update(ui_msg.clone());

            match ui_msg {
                PaneMessage::OpenPressed => return start_pipeline(app),
                PaneMessage::CancelPressed => {
                    if let Some(token) = &app.cancel {
                        app.view.status_message = "Cancelling...".to_string();
                        token.cancel();
                    }
                }
                PaneMessage::ChooseHomePressed => {
                    if !app.view.is_downloading {
                        return Task::perform(
                            async {
                                rfd::AsyncFileDialog::new()
                                    .pick_folder()
                                    .await
                                    .map(|handle| handle.path().to_path_buf())
                            },
                            Message::HomeFolderSelected,
                        );
                    }
                }
                PaneMessage::ImportPressed => {
                    if app.lidar.is_some() {
                        return Task::perform(
                            async {
                                rfd::AsyncFileDialog::new()
                                    .add_filter("Point cloud", &["laz", "las"])
                                    .pick_file()
                                    .await
                                    .map(|handle| handle.path().to_path_buf())
                            },
                            Message::TileSelected,
                        );
                    }
                }
                PaneMessage::NavInputChanged(_) => {}
            }
        }
        // Late events from a run that already finished
        Message::Pipeline(_) if app.cancel.is_none() => {}
        Message::Pipeline(event) => match event {
            PipelineEvent::Progress(progress) => {
                app.view.download_progress = progress.fraction();
                if progress.cancelled {
                    app.view.status_message = "Cancelled. Deleting download file...".to_string();
                } else {
                    app.view.status_message = format!("{}% Completed", progress.percent);
                }
            }
            PipelineEvent::Stage(stage) => {
                app.view.is_downloading = stage != PipelineStage::Idle;
                match stage {
                    PipelineStage::Classifying => {
                        app.view.status_message = "Requesting download...".to_string();
                    }
                    PipelineStage::Extracting => {
                        app.view.status_message = "Extracting archive...".to_string();
                    }
                    PipelineStage::Dispatching => {
                        app.view.status_message = "Opening composite bands tool...".to_string();
                    }
                    PipelineStage::Downloading | PipelineStage::Idle => {}
                }
            }
        },
        Message::PipelineFinished(result) => {
            app.view.is_downloading = false;
            app.view.download_progress = 0.0;
            app.cancel = None;
            app.view.status_message = match result {
                Ok(PipelineOutcome::Ignored) => "Not a recognized download link".to_string(),
                Ok(PipelineOutcome::NoProduct { base_folder }) => {
                    format!("No product found; nothing saved to {}", base_folder.display())
                }
                Ok(PipelineOutcome::Cancelled) => "Download cancelled".to_string(),
                Ok(PipelineOutcome::Completed { folder, bands }) => {
                    format!("Saved {} ({} bands)", folder.display(), bands.len())
                }
                Err(e) => format!("Download failed: {}", e),
            };
        }
        Message::HomeFolderSelected(Some(path)) => {
            let mut config = app.config.clone();
            config.home_folder = Some(path);
            match PaneProfile::compile(&config) {
                Ok(profile) => {
                    app.coordinator = PaneCoordinator::from_profile(&profile);
                    app.lidar = lidar_bridge_for(&profile, &app.coordinator);
                    app.view.downloads_root = profile.downloads_root.display().to_string();
                    app.config = config;
                }
                Err(e) => {
                    app.view.status_message = e.to_string();
                }
            }
        }
        Message::HomeFolderSelected(None) => {}
        Message::TileSelected(Some(path)) => {
            return update(app, Message::BrowserDownloadStarting(path));
        }
        Message::TileSelected(None) => {}
        Message::BrowserDownloadStarting(suggested) => {
            if let Some(bridge) = app.lidar.clone() {
                return browser_download_starting(app, bridge, suggested);
            }
        }
        Message::BrowserDownloadStateChanged(state, path) => {
            if let Some(bridge) = app.lidar.clone() {
                if state == BrowserDownloadState::Interrupted {
                    app.view.status_message = format!("Download of {} was interrupted", path.display());
                    return Task::none();
                }
                return Task::perform(
                    async move {
                        let result = bridge.download_state_changed(state, &path).await;
                        (path, result)
                    },
                    |(path, result)| Message::PointCloudHandled(path, result),
                );
            }
        }
        Message::PointCloudHandled(path, result) => {
            app.view.status_message = match result {
                Ok(Some(las)) => format!("Decompressed to {}", las.display()),
                Ok(None) => format!("Saved {}", path.display()),
                Err(e) => format!("Decompression failed: {}", e),
            };
        }
    }
    Task::none()
}

/// Redirects a browser download into the pane's folder and reports its
/// completion. The picked file stands in for the bytes the browser writes.
fn browser_download_starting(app: &mut PaneApp, bridge: LidarDownloadBridge, suggested: PathBuf) -> Task<Message> {
    let target = match bridge.download_starting(&suggested) {
        Ok(target) => target,
        Err(e) => {
            app.view.status_message = format!("Download failed: {}", e);
            return Task::none();
        }
    };
    app.view.status_message = format!("Saving to {}", target.display());

    Task::perform(
        async move {
            let state = if suggested == target {
                BrowserDownloadState::Completed
            } else {
                match tokio::fs::copy(&suggested, &target).await {
                    Ok(_) => BrowserDownloadState::Completed,
                    Err(e) => {
                        warn!(path = %target.display(), error = %e, "browser download interrupted");
                        BrowserDownloadState::Interrupted
                    }
                }
            };
            (state, target)
        },
        |(state, target)| Message::BrowserDownloadStateChanged(state, target),
    )
}

/// Treats the navigation field as a browser "new window" request.
fn start_pipeline(app: &mut PaneApp) -> Task<Message> {
    let url = app.view.nav_input.trim().to_string();
    if url.is_empty() {
        return Task::none();
    }
    if app.cancel.is_some() || app.coordinator.is_busy() {
        app.view.status_message = AppError::Busy.to_string();
        return Task::none();
    }

    let cancel = CancellationToken::new();
    app.cancel = Some(cancel.clone());

    let coordinator = app.coordinator.clone();
    let (tx, rx) = futures::channel::mpsc::unbounded();

    let run = Task::perform(
        async move {
            coordinator
                .handle_new_window(&url, &cancel, move |event| {
                    // The receiver only goes away when the pane does
                    let _ = tx.unbounded_send(event);
                })
                .await
        },
        Message::PipelineFinished,
    );

    Task::batch([Task::stream(rx.map(Message::Pipeline)), run])
}

pub fn view(app: &PaneApp) -> iced::Element<'_, Message> {
    app.view.view().map(Message::UiMessage)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pane(kind: PaneKind, home: &std::path::Path) -> PaneApp {
        let mut config = PaneConfig::for_kind(kind);
        config.home_folder = Some(home.to_path_buf());
        PaneApp::with_config(config)
    }

    #[test]
    fn test_only_lidar_pane_takes_browser_downloads() {
        let home = tempfile::tempdir().unwrap();
        let lidar = pane(PaneKind::Lidar, home.path());
        assert!(lidar.lidar.is_some());
        assert!(lidar.view.accepts_browser_downloads);

        let glovis = pane(PaneKind::GloVis, home.path());
        assert!(glovis.lidar.is_none());
        assert!(!glovis.view.accepts_browser_downloads);
    }

    #[test]
    fn test_browser_download_redirected_into_pane_folder() {
        let home = tempfile::tempdir().unwrap();
        let mut app = pane(PaneKind::Lidar, home.path());

        let _ = update(
            &mut app,
            Message::BrowserDownloadStarting(PathBuf::from("/tmp/browser/USGS_LPC_tile.laz")),
        );

        let root = home.path().join("LidarExplorerAddinDownloads");
        assert!(root.is_dir());
        assert_eq!(
            app.view.status_message,
            format!("Saving to {}", root.join("USGS_LPC_tile.laz").display())
        );
    }

    #[test]
    fn test_point_cloud_result_shown_in_status() {
        let home = tempfile::tempdir().unwrap();
        let mut app = pane(PaneKind::Lidar, home.path());
        let tile = home.path().join("tile.laz");

        let _ = update(
            &mut app,
            Message::BrowserDownloadStateChanged(BrowserDownloadState::Interrupted, tile.clone()),
        );
        assert!(app.view.status_message.contains("interrupted"));

        let _ = update(
            &mut app,
            Message::PointCloudHandled(
                tile.clone(),
                Err(AppError::DecompressionFailed {
                    path: tile.clone(),
                    code: Some(1),
                }),
            ),
        );
        assert!(app.view.status_message.starts_with("Decompression failed"));

        let las = home.path().join("tile.las");
        let _ = update(&mut app, Message::PointCloudHandled(tile, Ok(Some(las.clone()))));
        assert_eq!(app.view.status_message, format!("Decompressed to {}", las.display()));
    }
}
