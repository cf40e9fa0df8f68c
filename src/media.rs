//! Remote file download for media sends

use crate::transport::MediaPayload;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Largest file accepted for a media send; the payload is inlined into the
/// page as base64, so it has to stay well below browser string limits
pub const MAX_DOWNLOAD_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Failed to create HTTP client: {0}")]
    Client(String),
    #[error("Invalid file URL: {0}")]
    InvalidUrl(String),
    #[error("Failed to download file: {0}")]
    Download(String),
    #[error("File download returned HTTP {0}")]
    Status(u16),
}

/// Downloads files referenced by URL and encodes them for the transport
#[derive(Clone)]
pub struct MediaFetcher {
    client: Client,
    max_bytes: u64,
}

impl MediaFetcher {
    pub fn new() -> Result<Self, MediaError> {
        let client = Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| MediaError::Client(e.to_string()))?;
        Ok(Self {
            client,
            max_bytes: MAX_DOWNLOAD_BYTES,
        })
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub async fn fetch(&self, file_url: &str) -> Result<MediaPayload, MediaError> {
        let url = reqwest::Url::parse(file_url).map_err(|e| MediaError::InvalidUrl(e.to_string()))?;

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| MediaError::Download(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::Status(status.as_u16()));
        }

        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty());

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(self.too_large(length));
            }
        }

        // Content-Length may be absent or wrong, so the cap also holds while reading
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| MediaError::Download(e.to_string()))?
        {
            bytes.extend_from_slice(&chunk);
            let read = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
            if read > self.max_bytes {
                return Err(self.too_large(read));
            }
        }

        let filename = file_name(&url);
        let mimetype = header_mime.unwrap_or_else(|| {
            mime_guess::from_path(filename.as_deref().unwrap_or(""))
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });

        Ok(MediaPayload {
            mimetype,
            data: STANDARD.encode(&bytes),
            filename,
        })
    }

    fn too_large(&self, size: u64) -> MediaError {
        MediaError::Download(format!(
            "file is larger than the {} byte limit (at least {size} bytes)",
            self.max_bytes
        ))
    }
}


fn file_name(url: &reqwest::Url) -> Option<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}
