//! Two-tier provider resolution: managed API first, raw scrape last.
//!
//! The managed content API is more reliable and richer but can be unavailable
//! (missing credentials, quota); the raw scrape is a universal but fragile
//! last resort. Ordering by reliability minimizes both cost and failure rate.
//! The resolver never retries — backoff/retry policy belongs to the caller.

use taskrig_core::{Error, FetchRequest, Result, SearchQuery, SearchReply};

use crate::exa::ExaClient;
use crate::scrape::DirectFetcher;

#[derive(Debug, Clone)]
pub struct Resolver {
    exa: Option<ExaClient>,
    direct: DirectFetcher,
}

impl Resolver {
    /// Wire up providers from the environment. A missing API key is not an
    /// error here: search degrades to a `NotConfigured` payload per call and
    /// fetch goes straight to the direct fallback.
    pub fn from_env() -> Result<Self> {
        let client = crate::http_client()?;
        let exa = if ExaClient::configured() {
            Some(ExaClient::from_env(client.clone())?)
        } else {
            tracing::info!("no Exa API key configured; search disabled, fetch uses direct fallback");
            None
        };
        Ok(Self {
            exa,
            direct: DirectFetcher::new(client),
        })
    }

    pub fn search_configured(&self) -> bool {
        self.exa.is_some()
    }

    pub async fn resolve_search(&self, query: &str, max_results: usize) -> Result<SearchReply> {
        let Some(exa) = &self.exa else {
            return Err(Error::NotConfigured(
                "Exa API key not found; set TASKRIG_EXA_API_KEY (or EXA_API_KEY)".to_string(),
            ));
        };
        let q = SearchQuery {
            query: query.to_string(),
            max_results: Some(max_results),
            region: None,
            timeout_ms: None,
        };
        exa.search(&q).await
    }

    /// Fetch page text, in strict order:
    /// 1. reject malformed URLs before any network call;
    /// 2. managed contents API, when configured — 401 means "provider
    ///    unusable", fall through; 429 and other HTTP errors are returned
    ///    as-is (no fall-through); transport errors fall through;
    /// 3. direct GET + HTML-to-text as the last resort.
    pub async fn resolve_fetch(&self, req: &FetchRequest) -> Result<String> {
        taskrig_core::validate_fetch_url(&req.url)?;

        if let Some(exa) = &self.exa {
            match exa.fetch_contents(req).await {
                Ok(text) => return Ok(text),
                Err(Error::Auth(msg)) => {
                    tracing::warn!(error = %msg, "exa contents auth failed; falling back to direct fetch");
                }
                Err(e @ Error::RateLimited(_)) => return Err(e),
                Err(e @ Error::Provider(_)) => return Err(e),
                Err(Error::Fetch(msg)) => {
                    tracing::warn!(error = %msg, "exa contents transport error; falling back to direct fetch");
                }
                Err(e) => return Err(e),
            }
        }

        self.direct.fetch(req).await
    }
}
