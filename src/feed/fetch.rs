use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use crate::error::FeedError;

static PROLOG_ENCODING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s*<\?xml[^>]*?\sencoding\s*=\s*["']([a-z0-9._:-]+)["']"#)
        .expect("valid regex")
});

/// Only the start of the document is searched for an XML declaration.
const PROLOG_WINDOW: usize = 256;

/// Anything that can hand back the raw text of a feed by URL.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FeedError>;
}

/// Settings for [`HttpFeedSource`].
#[derive(Debug, Clone)]
pub struct HttpFeedConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpFeedConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: concat!("feed-importer/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Fetches feeds over HTTP(S) with a single shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the client cannot be built (TLS backend
    /// initialisation).
    pub fn new(config: HttpFeedConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<String, FeedError> {
        let fetch_err = |source| FeedError::Fetch {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(fetch_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let header_charset = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(charset_param)
            .map(str::to_string);

        let bytes = response.bytes().await.map_err(fetch_err)?;
        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(decode_body(&bytes, header_charset.as_deref()))
    }
}

/// `charset` parameter of a `Content-Type` header value.
fn charset_param(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
            .filter(|v| !v.is_empty())
    })
}

fn prolog_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(PROLOG_WINDOW)]);
    let label = PROLOG_ENCODING_RE.captures(&head)?.get(1)?.as_str();
    Encoding::for_label(label.as_bytes())
}

/// Decode a feed body to text.
///
/// The encoding comes from a byte order mark, then the `Content-Type`
/// charset, then the XML declaration, else UTF-8. Undecodable bytes become
/// U+FFFD.
pub fn decode_body(bytes: &[u8], header_charset: Option<&str>) -> String {
    let encoding = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or_else(|| header_charset.and_then(|c| Encoding::for_label(c.as_bytes())))
        .or_else(|| prolog_encoding(bytes))
        .unwrap_or(UTF_8);

    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!("Feed body is not valid {}, replaced undecodable bytes", used.name());
    }
    text.into_owned()
}
