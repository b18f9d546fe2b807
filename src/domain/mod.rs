pub mod classifier;
pub mod error;
pub mod model;

pub use classifier::UrlClassifier;
pub use error::AppError;
pub use model::{
    DownloadProgress, DownloadTarget, PipelineOutcome, PipelineStage, ProductFolder, Provider,
};
