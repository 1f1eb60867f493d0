use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// HTTP access used by the release feed and the installers.
pub trait Transport {
    fn get_text(&self, url: &str) -> Result<String, TransportError>;

    /// Stream `url` into `dest`, returning the number of bytes written.
    fn download(&self, url: &str, dest: &Path) -> Result<u64, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, TransportError> {
        // No overall timeout on the client: bundles are large, only queries
        // carry a deadline.
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent.to_string())
            .connect_timeout(timeout)
            .timeout(None)
            .build()
            .map_err(|source| TransportError::Request {
                url: String::new(),
                source,
            })?;
        Ok(Self { client, timeout })
    }
}

impl Transport for HttpTransport {
    fn get_text(&self, url: &str) -> Result<String, TransportError> {
        let request_err = |source: reqwest::Error| TransportError::Request {
            url: url.to_string(),
            source,
        };
        self.client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .timeout(self.timeout)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(reqwest::blocking::Response::text)
            .map_err(request_err)
    }

    fn download(&self, url: &str, dest: &Path) -> Result<u64, TransportError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;

        let mut file = File::create(dest).map_err(|source| TransportError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
        let written = response
            .copy_to(&mut file)
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;
        tracing::debug!("downloaded {written} bytes from {url} to {}", dest.display());
        Ok(written)
    }
}
