use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("auth failed: {0}")]
    Auth(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("not supported: {0}")]
    Unsupported(String),
    #[error("context channel: {0}")]
    Context(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Appended to any text that was cut at a caller-specified length.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: Option<usize>,
    /// Region bias hint for providers that support one (e.g. "us").
    pub region: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl SearchQuery {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// One usable search hit. Both fields are required: provider entries missing
/// either are dropped before results reach the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
}

/// What a search resolution produced when the provider itself did not fail.
///
/// `NoResults` is informational, not an error: it carries the original query
/// and any provider-suggested rewrite so the caller can adapt its phrasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SearchReply {
    Hits(Vec<SearchResult>),
    NoResults {
        query: String,
        suggested_query: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Hard cap on returned text length (chars). Cut text gets the marker.
    pub max_length: usize,
    pub timeout_ms: Option<u64>,
    /// If true, ask the provider for a combined representation
    /// (summary + highlights + truncated full text).
    pub combined: bool,
}

impl FetchRequest {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<SearchReply>;
}

#[async_trait::async_trait]
pub trait ContentProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, req: &FetchRequest) -> Result<String>;
}

/// Validate that a URL is fetchable: parses, http(s) scheme, has a host.
///
/// Runs before any network call so malformed input never reaches a provider.
pub fn validate_fetch_url(raw: &str) -> Result<url::Url> {
    let parsed =
        url::Url::parse(raw).map_err(|_| Error::InvalidUrl(format!("Invalid URL: {raw}")))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::InvalidUrl(format!(
                "Invalid URL: {raw} (unsupported scheme {other})"
            )))
        }
    }
    if parsed.host_str().map(|h| h.is_empty()).unwrap_or(true) {
        return Err(Error::InvalidUrl(format!("Invalid URL: {raw} (no host)")));
    }
    Ok(parsed)
}

/// Cap `s` at `max_chars` characters, appending [`TRUNCATION_MARKER`] when cut.
///
/// Char-based (not byte-based) so we never split a UTF-8 sequence.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_fetch_url_rejects_schemeless_input() {
        let err = validate_fetch_url("not-a-url").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[test]
    fn validate_fetch_url_rejects_non_http_schemes() {
        assert!(validate_fetch_url("ftp://example.com/a").is_err());
        assert!(validate_fetch_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn validate_fetch_url_accepts_http_and_https() {
        assert!(validate_fetch_url("http://example.com/").is_ok());
        assert!(validate_fetch_url("https://example.com/page?x=1").is_ok());
    }

    #[test]
    fn truncate_chars_appends_marker_only_when_cut() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 5), "hello");
        let cut = truncate_chars("hello world", 5);
        assert_eq!(cut, format!("hello{TRUNCATION_MARKER}"));
    }

    #[test]
    fn truncate_chars_is_char_boundary_safe() {
        let s = "héllo wörld";
        let cut = truncate_chars(s, 3);
        assert!(cut.starts_with("hél"));
        assert!(cut.ends_with(TRUNCATION_MARKER));
    }
}
