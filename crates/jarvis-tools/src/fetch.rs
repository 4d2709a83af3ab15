use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use jarvis_gate::{Category, ConfirmationRequest};
use jarvis_resilience::{Classify, FailureKind, ResilienceError, service};
use url::Url;

use crate::config::FetchConfig;
use crate::executor::{ActionError, ActionExecutor, truncate_output};

/// Elements whose text is kept when reducing a page to readable text.
const READABLE_SELECTOR: &str = "h1, h2, h3, h4, h5, h6, p, li, pre, blockquote";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("response too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    #[error("failed to extract text: {0}")]
    Extract(String),
}

impl Classify for FetchError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Request(e) => e.failure_kind(),
            Self::Status(s) if *s == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                FailureKind::RateLimited
            }
            Self::Status(s) if s.is_server_error() => FailureKind::ServerError,
            Self::Status(_) => FailureKind::ClientError,
            Self::TooLarge { .. } | Self::Extract(_) => FailureKind::Other,
        }
    }
}

/// HTTP client that downloads a page and reduces it to plain text.
#[derive(Debug, Clone)]
pub struct WebFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
    max_text_chars: usize,
}

impl WebFetcher {
    #[must_use]
    pub fn new(config: &FetchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_body_bytes: config.max_body_bytes,
            max_text_chars: config.max_text_chars,
        }
    }

    /// One download attempt.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on transport failures, non-2xx statuses, oversized bodies, or a
    /// failed extraction task.
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        if let Some(len) = resp.content_length()
            && usize::try_from(len).unwrap_or(usize::MAX) > self.max_body_bytes
        {
            return Err(FetchError::TooLarge {
                size: usize::try_from(len).unwrap_or(usize::MAX),
                max: self.max_body_bytes,
            });
        }
        let bytes = resp.bytes().await?;
        if bytes.len() > self.max_body_bytes {
            return Err(FetchError::TooLarge {
                size: bytes.len(),
                max: self.max_body_bytes,
            });
        }

        let body = String::from_utf8_lossy(&bytes).into_owned();
        let max_chars = self.max_text_chars;
        tokio::task::spawn_blocking(move || extract_readable_text(&body, max_chars))
            .await
            .map_err(|e| FetchError::Extract(e.to_string()))
    }
}

/// Reduce an HTML document to readable text, one block element per line.
///
/// Pages without any block elements fall back to the whole document text.
#[must_use]
pub fn extract_readable_text(html: &str, max_chars: usize) -> String {
    let soup = scrape_core::Soup::parse(html);
    let mut blocks: Vec<String> = soup
        .find_all(READABLE_SELECTOR)
        .map(|tags| {
            tags.into_iter()
                .map(|tag| collapse_whitespace(&tag.text()))
                .filter(|text| !text.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if blocks.is_empty() {
        let whole = soup
            .find_all("body")
            .ok()
            .and_then(|tags| tags.into_iter().next())
            .map_or_else(|| html.to_owned(), |body| body.text());
        let whole = collapse_whitespace(&whole);
        if !whole.is_empty() {
            blocks.push(whole);
        }
    }

    truncate_output(&blocks.join("\n"), max_chars)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_private_ipv4(v4: Ipv4Addr) -> bool {
    v4.is_loopback()
        || v4.is_private()
        || v4.is_link_local()
        || v4.is_unspecified()
        || v4.is_broadcast()
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_ipv4(v4),
        IpAddr::V6(v6) => {
            if v6.is_loopback() || v6.is_unspecified() {
                return true;
            }
            let first = v6.segments()[0];
            // fe80::/10 link-local, fc00::/7 unique local
            if first & 0xffc0 == 0xfe80 || first & 0xfe00 == 0xfc00 {
                return true;
            }
            v6.to_ipv4_mapped().is_some_and(is_private_ipv4)
        }
    }
}

/// Loopback, private-range and link-local hosts, plus `localhost` names.
#[must_use]
pub fn is_private_host(host: &url::Host<&str>) -> bool {
    match host {
        url::Host::Domain(d) => {
            let d = d.trim_end_matches('.').to_ascii_lowercase();
            d == "localhost" || d.ends_with(".localhost")
        }
        url::Host::Ipv4(v4) => is_private_ipv4(*v4),
        url::Host::Ipv6(v6) => is_private_ip(IpAddr::V6(*v6)),
    }
}

/// Whitelist key for a URL: its host, with the port when one is given explicitly.
#[must_use]
pub fn url_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    }
}

impl ActionExecutor {
    /// Fetch `url` and return its readable text.
    ///
    /// The host is checked against the gate (category `web_urls`); the download is retried on
    /// transient failures and exhaustion marks the `web` service degraded.
    ///
    /// # Errors
    ///
    /// [`ActionError::Blocked`] for non-HTTP schemes and private hosts,
    /// [`ActionError::Offline`] in offline mode, a cancellation error when the gate declines,
    /// [`ActionError::RetryExhausted`] or [`ActionError::Fetch`] when the download fails.
    pub async fn fetch_web_page(&self, url: &str) -> Result<String, ActionError> {
        let parsed = Url::parse(url)
            .map_err(|e| ActionError::InvalidParams(format!("invalid URL {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ActionError::Blocked(format!(
                "scheme not allowed: {}",
                parsed.scheme()
            )));
        }
        let Some(host) = parsed.host() else {
            return Err(ActionError::InvalidParams(format!("URL has no host: {url}")));
        };
        if !self.allow_private_hosts && is_private_host(&host) {
            return Err(ActionError::Blocked(format!(
                "private/local host blocked: {}",
                parsed.host_str().unwrap_or_default()
            )));
        }
        if self.state().is_offline() {
            return Err(ActionError::Offline {
                url: url.to_owned(),
            });
        }

        self.confirm(ConfirmationRequest::new(
            Category::WebUrls,
            format!("Fetch web page: {url}"),
            url_key(&parsed),
        ))
        .await?;

        tracing::info!(url, "fetching web page");
        let text = self
            .web_guard
            .call(service::WEB, || self.fetcher.fetch_text(url))
            .await
            .map_err(|e| match e {
                ResilienceError::RetryExhausted { attempts, .. } => ActionError::RetryExhausted {
                    url: url.to_owned(),
                    attempts,
                },
                other => ActionError::Fetch(other.into_inner()),
            })?;
        tracing::info!(url, chars = text.chars().count(), "fetched web page");
        Ok(format!("Content from {url}:\n{text}"))
    }
}
