use std::pin::Pin;

use futures::TryStreamExt;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, Response};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::utils::{content_disposition_filename, sanitize_filename};

use super::models::ResponseMetadata;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Download request failed: {0}")]
    Status(String),

    #[error("Response is missing the {0} header")]
    MissingHeader(&'static str),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// A download whose headers have arrived but whose body is still unread.
pub struct PortalResponse {
    pub metadata: ResponseMetadata,
    response: Response,
}

impl PortalResponse {
    /// Body as a byte reader, so callers choose their own chunk size.
    pub fn into_reader(self) -> Pin<Box<dyn AsyncRead + Send>> {
        let stream = self.response.bytes_stream().map_err(std::io::Error::other);
        Box::pin(StreamReader::new(stream))
    }
}

#[derive(Clone, Default)]
pub struct PortalClient {
    http: Client,
}

impl PortalClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    /// Issues the GET and returns as soon as the headers are read.
    pub async fn open(&self, url: &str) -> Result<PortalResponse> {
        let response = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| ApiError::Status(e.to_string()))?;

        let metadata = read_metadata(&response)?;
        tracing::debug!(
            url,
            content_length = metadata.content_length,
            content_type = %metadata.content_type,
            file_name = ?metadata.file_name,
            "download headers received"
        );

        Ok(PortalResponse { metadata, response })
    }
}

fn read_metadata(response: &Response) -> Result<ResponseMetadata> {
    let content_length = response
        .content_length()
        .ok_or(ApiError::MissingHeader("content-length"))?;

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::MissingHeader("content-type"))?;

    let file_name = response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(content_disposition_filename)
        .map(|name| sanitize_filename(&name));

    Ok(ResponseMetadata {
        content_length,
        content_type,
        file_name,
    })
}
