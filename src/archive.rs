use camino::{Utf8Path, Utf8PathBuf};
use reqwest::blocking::Client;
use tracing::debug;

use crate::config::Settings;
use crate::error::KiraError;
use crate::rcsb::agent_headers;

/// Byte transfer from the structure archive plus local decompression.
pub trait ArchiveClient: Send + Sync {
    /// Writes the resource at `url` to `destination`; returns the byte count.
    fn transfer(&self, url: &str, destination: &Utf8Path) -> Result<u64, KiraError>;

    /// Turns `<name>.gz` into `<name>`.
    fn decompress(&self, path: &Utf8Path) -> Result<Utf8PathBuf, KiraError> {
        crate::fs_util::gunzip(path)
    }
}

#[derive(Clone)]
pub struct ArchiveHttpClient {
    client: Client,
}

impl ArchiveHttpClient {
    pub fn new(settings: &Settings) -> Result<Self, KiraError> {
        let agent = format!("kira-pdb/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .default_headers(agent_headers(&agent, KiraError::ArchiveHttp)?)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| KiraError::ArchiveHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl ArchiveClient for ArchiveHttpClient {
    fn transfer(&self, url: &str, destination: &Utf8Path) -> Result<u64, KiraError> {
        debug!(url, destination = %destination, "archive.request");
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| KiraError::ArchiveHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(KiraError::ArchiveStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        crate::fs_util::write_stream_atomic(&mut response, destination)
    }
}
