use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;
use tokio::process::Command;
use tracing::info;

use crate::{config::ToolCommand, domain::AppError};

/// Geoprocessing tool that merges single-band rasters into one image.
pub const COMPOSITE_BANDS_TOOL: &str = "management.CompositeBands";

/// Hand-off point to the host application's tool runner.
pub trait ToolDispatcher: Send + Sync {
    fn dispatch<'a>(&'a self, tool: &'a str, inputs: &'a [PathBuf]) -> BoxFuture<'a, Result<(), AppError>>;
}

/// Only records the request in the log.
#[derive(Debug, Default, Clone)]
pub struct LogDispatcher;

impl ToolDispatcher for LogDispatcher {
    fn dispatch<'a>(&'a self, tool: &'a str, inputs: &'a [PathBuf]) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(async move {
            info!(tool, inputs = ?inputs, "tool requested");
            Ok(())
        })
    }
}

/// Runs an external program with the configured arguments followed by the inputs.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    command: ToolCommand,
}

impl CommandDispatcher {
    pub fn new(command: ToolCommand) -> Self {
        Self { command }
    }
}

impl ToolDispatcher for CommandDispatcher {
    fn dispatch<'a>(&'a self, tool: &'a str, inputs: &'a [PathBuf]) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(async move {
            info!(tool, program = %self.command.program.display(), inputs = inputs.len(), "running tool");

            let status = Command::new(&self.command.program)
                .args(&self.command.args)
                .args(inputs)
                .status()
                .await
                .map_err(|e| AppError::Dispatch(format!("Failed to start {}: {}", tool, e)))?;

            if status.success() {
                Ok(())
            } else {
                Err(AppError::Dispatch(format!("{} exited with {}", tool, status)))
            }
        })
    }
}

/// Locates band rasters in a product folder and hands them to the composite tool.
#[derive(Clone)]
pub struct BandDispatcher {
    band_pattern: Regex,
    max_band: u32,
    dispatcher: Arc<dyn ToolDispatcher>,
}

impl BandDispatcher {
    pub fn new(band_pattern: Regex, max_band: u32, dispatcher: Arc<dyn ToolDispatcher>) -> Self {
        Self {
            band_pattern,
            max_band,
            dispatcher,
        }
    }

    /// Files directly inside `folder` whose band index is below `max_band`,
    /// in listing order.
    pub async fn locate_bands(&self, folder: &Path) -> Result<Vec<PathBuf>, AppError> {
        let mut entries = tokio::fs::read_dir(folder).await?;
        let mut bands = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if self.band_index(&name).is_some_and(|band| band < self.max_band) {
                bands.push(entry.path());
            }
        }

        Ok(bands)
    }

    fn band_index(&self, file_name: &str) -> Option<u32> {
        self.band_pattern
            .captures(file_name)?
            .get(1)?
            .as_str()
            .parse()
            .ok()
    }

    /// The tool is invoked even when no bands were found.
    pub async fn locate_and_dispatch(&self, folder: &Path) -> Result<Vec<PathBuf>, AppError> {
        let bands = self.locate_bands(folder).await?;
        info!(folder = %folder.display(), bands = bands.len(), "dispatching composite bands");
        self.dispatcher.dispatch(COMPOSITE_BANDS_TOOL, &bands).await?;
        Ok(bands)
    }
}
