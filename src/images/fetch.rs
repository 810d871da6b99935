//! Fetching remote images.
//!
//! The embedder talks to the network only through the [`Fetcher`] trait so
//! exports can run against an in-memory fake in tests. [`HttpFetcher`] is the
//! production implementation: a blocking `reqwest` client with a cookie store,
//! so images behind the same session cookies as the article page still load.

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::io::Read;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_USER_AGENT: &str = concat!("tsundoku-epub/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 15 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("reading response body failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("server answered with HTTP {0}")]
    Status(u16),
    #[error("response body is empty")]
    EmptyBody,
    #[error("image is {size} bytes, over the {limit}-byte limit")]
    TooLarge { size: usize, limit: usize },
    #[error("unsupported URL: {0}")]
    UnsupportedUrl(String),
    #[error("blob: URLs only exist inside the browser that created them")]
    Blob,
    #[error("malformed data: URL")]
    BadDataUrl,
    #[error("data: URL holds {0}, not an image")]
    NotAnImage(String),
}

/// What came back for one URL. Status handling is left to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type.to_string()),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOptions {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_bytes: usize,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

pub struct HttpFetcher {
    client: Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(options: &HttpOptions) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(options.user_agent.clone())
            .timeout(options.timeout)
            .cookie_store(true)
            .build()?;
        Ok(Self {
            client,
            max_bytes: options.max_bytes,
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "image/*,*/*;q=0.8")
            .send()?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if let Some(size) = declared.filter(|&size| size > self.max_bytes) {
            return Err(FetchError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        // One byte past the limit is enough to tell the body is too large.
        let mut body = Vec::new();
        response
            .take(self.max_bytes as u64 + 1)
            .read_to_end(&mut body)?;
        if body.len() > self.max_bytes {
            return Err(FetchError::TooLarge {
                size: body.len(),
                limit: self.max_bytes,
            });
        }

        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}
