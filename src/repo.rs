use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, warn};

use crate::descriptor::RepositoryDescriptor;
use crate::error::DebpullError;

/// An open artifact body plus the length the server declared for it.
pub struct ArtifactStream {
    pub reader: Box<dyn Read + Send>,
    pub content_length: Option<u64>,
}

pub trait RepoClient: Send + Sync {
    fn fetch_listing(&self, url: &str) -> Result<String, DebpullError>;
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, DebpullError>;
    fn open_artifact(&self, url: &str) -> Result<ArtifactStream, DebpullError>;
}

#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    pub user_agent: Option<String>,
    pub connect_timeout: Option<Duration>,
}

#[derive(Clone)]
pub struct RepoHttpClient {
    client: Client,
}

impl RepoHttpClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, DebpullError> {
        let agent = settings
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("debpull/{}", env!("CARGO_PKG_VERSION")));
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&agent).map_err(|err| DebpullError::Http(err.to_string()))?,
        );

        // artifacts can be large, so only the connect phase is bounded
        let mut builder = Client::builder().default_headers(headers).timeout(None::<Duration>);
        if let Some(timeout) = settings.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| DebpullError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, DebpullError> {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| DebpullError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(DebpullError::DownloadStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

impl RepoClient for RepoHttpClient {
    fn fetch_listing(&self, url: &str) -> Result<String, DebpullError> {
        self.get(url)?
            .text()
            .map_err(|err| DebpullError::Http(err.to_string()))
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, DebpullError> {
        let bytes = self
            .get(url)?
            .bytes()
            .map_err(|err| DebpullError::Http(err.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn open_artifact(&self, url: &str) -> Result<ArtifactStream, DebpullError> {
        let response = self.get(url)?;
        let content_length = response.content_length();
        Ok(ArtifactStream {
            reader: Box::new(response),
            content_length,
        })
    }
}

pub fn index_url(
    descriptor: &RepositoryDescriptor,
    distribution: &str,
    architecture: &str,
) -> String {
    format!(
        "{}/dists/{}/{}/binary-{}/Packages",
        descriptor.base_url(),
        distribution,
        descriptor.component(),
        architecture
    )
}

/// Downloads the `Packages` index, trying `Packages.gz` first and the
/// uncompressed file second.
pub fn fetch_index(
    client: &dyn RepoClient,
    descriptor: &RepositoryDescriptor,
    distribution: &str,
    architecture: &str,
) -> Result<String, DebpullError> {
    let plain_url = index_url(descriptor, distribution, architecture);
    let gz_url = format!("{plain_url}.gz");

    let gz_error = match client.fetch_bytes(&gz_url).and_then(|bytes| gunzip(&bytes)) {
        Ok(text) => return Ok(text),
        Err(err) => err,
    };
    warn!(url = %gz_url, error = %gz_error, "compressed index unavailable, trying uncompressed");

    let bytes = client
        .fetch_bytes(&plain_url)
        .map_err(|err| DebpullError::IndexUnavailable {
            url: plain_url.clone(),
            message: format!("{err}; {gz_url}: {gz_error}"),
        })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn gunzip(bytes: &[u8]) -> Result<String, DebpullError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|err| DebpullError::Http(format!("corrupt gzip index: {err}")))?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}
