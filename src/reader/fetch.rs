use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use url::Url;

use crate::error::ReaderError;

/// Pages larger than this are truncated; articles are far smaller.
const MAX_PAGE_BYTES: usize = 5 * 1024 * 1024;

const USER_AGENT: &str = concat!("WebsiteReader/", env!("CARGO_PKG_VERSION"));

/// Public CORS proxies tried in order before fetching the page directly.
///
/// `{url}` is replaced by the target URL as-is, `{url_encoded}` by the
/// percent-encoded target URL.
pub const DEFAULT_PROXIES: [&str; 3] = [
    "https://api.allorigins.win/raw?url={url_encoded}",
    "https://cors-anywhere.herokuapp.com/{url}",
    "https://crossorigin.me/{url}",
];

/// Fetches page markup through a fallback chain of proxies.
pub struct PageFetcher {
    client: reqwest::Client,
    proxies: Vec<String>,
}

impl PageFetcher {
    pub fn new(proxies: Vec<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(client, proxies))
    }

    pub fn with_client(client: reqwest::Client, proxies: Vec<String>) -> Self {
        Self { client, proxies }
    }

    /// Fetch `url`, trying each proxy first and the site itself last.
    pub async fn fetch(&self, url: &Url) -> Result<String, ReaderError> {
        for template in &self.proxies {
            let Some(proxy_url) = proxy_url(template, url) else {
                tracing::warn!("Skipping malformed proxy template: {}", template);
                continue;
            };
            match self.get(&proxy_url).await {
                Ok(Some(body)) => {
                    tracing::info!("Fetched {} via {}", url, proxy_url.host_str().unwrap_or("proxy"));
                    return Ok(body);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Proxy {} failed: {}", proxy_url, e),
            }
        }

        tracing::info!("All proxies failed, fetching {} directly", url);
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "text/html")
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ReaderError::Unreachable(e)
                } else {
                    ReaderError::Blocked
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReaderError::Http(status));
        }
        read_body(response).await.map_err(|e| {
            tracing::warn!("Failed to read page body: {:#}", e);
            ReaderError::Blocked
        })
    }

    /// `Ok(None)` for a non-success status.
    async fn get(&self, url: &Url) -> Result<Option<String>> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "text/html")
            .send()
            .await?;
        if !response.status().is_success() {
            tracing::warn!("Proxy {} answered {}", url, response.status());
            return Ok(None);
        }
        read_body(response).await.map(Some)
    }
}

fn proxy_url(template: &str, target: &Url) -> Option<Url> {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_str().as_bytes()).collect();
    let filled = template
        .replace("{url_encoded}", &encoded)
        .replace("{url}", target.as_str());
    Url::parse(&filled).ok()
}

async fn read_body(response: reqwest::Response) -> Result<String> {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Error reading page body")?;
        let room = MAX_PAGE_BYTES - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            tracing::warn!("Page truncated at {} bytes", MAX_PAGE_BYTES);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}
