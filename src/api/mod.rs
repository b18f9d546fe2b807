pub mod client;
pub mod models;

pub use client::{ApiError, PortalClient, PortalResponse, Result};
pub use models::ResponseMetadata;
