//! Remote model retrieval

use std::io::Read;

use super::error::{Result, SeparationError};

/// Read buffer for streamed downloads
const CHUNK_SIZE: usize = 8192;

/// Remote source of model bytes
pub trait ModelFetcher: Send {
    /// Whether `url` is reachable and present
    ///
    /// A transport failure is reported as an error, a missing resource as
    /// `Ok(false)`.
    fn exists(&self, url: &str) -> Result<bool>;

    /// Download `url` completely
    ///
    /// `progress` receives `(bytes_so_far, total)` where `total` comes from
    /// Content-Length when the server sends it.
    fn fetch(&self, url: &str, progress: &mut dyn FnMut(u64, Option<u64>)) -> Result<Vec<u8>>;
}

/// Blocking HTTP fetcher
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpFetcher;

impl HttpFetcher {
    pub fn new() -> Self {
        Self
    }
}

impl ModelFetcher for HttpFetcher {
    fn exists(&self, url: &str) -> Result<bool> {
        match ureq::head(url).call() {
            Ok(response) => Ok((200..300).contains(&response.status())),
            Err(ureq::Error::Status(code, _)) => {
                log::debug!("HEAD {} returned {}", url, code);
                Ok(false)
            }
            Err(e) => Err(SeparationError::DownloadFailure(format!("{}: {}", url, e))),
        }
    }

    fn fetch(&self, url: &str, progress: &mut dyn FnMut(u64, Option<u64>)) -> Result<Vec<u8>> {
        log::info!("Downloading {}", url);

        let response = ureq::get(url)
            .call()
            .map_err(|e| SeparationError::DownloadFailure(format!("{}: {}", url, e)))?;

        let content_length: Option<u64> = response
            .header("Content-Length")
            .and_then(|s| s.parse().ok());

        let mut bytes = Vec::with_capacity(content_length.unwrap_or(0) as usize);
        let mut reader = response.into_reader();
        let mut buffer = [0u8; CHUNK_SIZE];

        loop {
            let read = reader
                .read(&mut buffer)
                .map_err(|e| SeparationError::DownloadFailure(format!("{}: {}", url, e)))?;
            if read == 0 {
                break;
            }
            bytes.extend_from_slice(&buffer[..read]);
            progress(bytes.len() as u64, content_length);
        }

        verify_length(url, bytes.len() as u64, content_length)?;

        log::info!("Downloaded {} ({} bytes)", url, bytes.len());
        Ok(bytes)
    }
}

/// Compare a finished download against the announced size
pub(crate) fn verify_length(url: &str, actual: u64, expected: Option<u64>) -> Result<()> {
    match expected {
        Some(expected) if expected != actual => Err(SeparationError::DownloadFailure(format!(
            "{}: download incomplete, expected {} bytes, got {}",
            url, expected, actual
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_length() {
        assert!(verify_length("u", 10, Some(10)).is_ok());
        assert!(verify_length("u", 10, None).is_ok());
        assert!(matches!(
            verify_length("u", 9, Some(10)),
            Err(SeparationError::DownloadFailure(_))
        ));
    }

    #[test]
    fn test_malformed_url_is_download_failure() {
        // Rejected while building the request, before any connection is attempted
        let fetcher = HttpFetcher::new();
        let mut calls = 0;
        let result = fetcher.fetch("not a url/vocals.onnx", &mut |_, _| calls += 1);
        assert!(matches!(result, Err(SeparationError::DownloadFailure(_))));
        assert_eq!(calls, 0);
        assert!(matches!(
            fetcher.exists("not a url/vocals.onnx"),
            Err(SeparationError::DownloadFailure(_))
        ));
    }
}
