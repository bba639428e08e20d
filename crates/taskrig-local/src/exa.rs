use serde::Deserialize;
use std::time::Duration;
use taskrig_core::{
    truncate_chars, Error, FetchRequest, Result, SearchQuery, SearchReply, SearchResult,
};

fn exa_api_key_from_env() -> Option<String> {
    std::env::var("TASKRIG_EXA_API_KEY")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| {
            std::env::var("EXA_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
        })
}

fn search_endpoint_from_env() -> String {
    // For tests / enterprise proxies, allow overriding the endpoint.
    std::env::var("TASKRIG_EXA_SEARCH_ENDPOINT")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "https://api.exa.ai/search".to_string())
}

fn contents_endpoint_from_env() -> String {
    std::env::var("TASKRIG_EXA_CONTENTS_ENDPOINT")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "https://api.exa.ai/contents".to_string())
}

pub fn search_region_from_env() -> String {
    std::env::var("TASKRIG_SEARCH_REGION")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "us".to_string())
}

/// Client for the Exa search + contents APIs.
#[derive(Debug, Clone)]
pub struct ExaClient {
    client: reqwest::Client,
    api_key: String,
}

impl ExaClient {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = exa_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured("missing TASKRIG_EXA_API_KEY (or EXA_API_KEY)".to_string())
        })?;
        Ok(Self { client, api_key })
    }

    pub fn configured() -> bool {
        exa_api_key_from_env().is_some()
    }

    fn map_status(status: reqwest::StatusCode, body_hint: &str, op: &str) -> Error {
        match status.as_u16() {
            401 => Error::Auth(format!("Exa {op} HTTP 401: invalid credentials")),
            429 => Error::RateLimited(format!("Exa {op} HTTP 429: rate limited, retry later")),
            code => Error::Provider(format!("Exa {op} HTTP {code}: {body_hint}")),
        }
    }

    /// Keyword search with a region bias and small text snippets.
    ///
    /// Entries missing a title or URL are dropped; zero usable results come
    /// back as `SearchReply::NoResults` with the provider's suggested rewrite.
    pub async fn search(&self, q: &SearchQuery) -> Result<SearchReply> {
        let max_results = q.max_results.unwrap_or(5).min(20);
        let timeout_ms = crate::clamp_timeout_ms(q.timeout_ms);
        let region = q.region.clone().unwrap_or_else(search_region_from_env);

        let body = serde_json::json!({
            "query": q.query,
            "numResults": max_results,
            "type": "keyword",
            "userLocation": region,
            "contents": { "text": { "maxCharacters": 1000 } }
        });

        let resp = self
            .client
            .post(search_endpoint_from_env())
            .header("x-api-key", &self.api_key)
            .json(&body)
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Search(format!("exa search timed out after {timeout_ms}ms"))
                } else {
                    Error::Search(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let hint = resp.text().await.unwrap_or_default();
            let hint = truncate_chars(&hint, 200);
            return Err(Self::map_status(status, &hint, "search"));
        }

        let parsed: ExaSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let mut hits = Vec::new();
        for r in parsed.results.unwrap_or_default() {
            // Both fields required; partial entries are dropped silently.
            let (Some(title), Some(url)) = (r.title, r.url) else {
                continue;
            };
            if title.trim().is_empty() || url.trim().is_empty() {
                continue;
            }
            hits.push(SearchResult { title, url });
            if hits.len() >= max_results {
                break;
            }
        }

        if hits.is_empty() {
            return Ok(SearchReply::NoResults {
                query: q.query.clone(),
                suggested_query: parsed.autoprompt_string,
            });
        }
        Ok(SearchReply::Hits(hits))
    }

    /// Fetch page text via the contents API (`livecrawl: "fallback"` uses the
    /// provider cache first and live-crawls only when needed).
    pub async fn fetch_contents(&self, req: &FetchRequest) -> Result<String> {
        let timeout_ms = crate::clamp_timeout_ms(req.timeout_ms);

        let mut body = serde_json::json!({
            "urls": [req.url],
            "text": true,
            "livecrawl": "fallback"
        });
        if req.combined {
            body["summary"] = serde_json::json!(true);
            body["highlights"] = serde_json::json!({
                "numSentences": 2,
                "highlightsPerUrl": 3
            });
        }

        let resp = self
            .client
            .post(contents_endpoint_from_env())
            .header("x-api-key", &self.api_key)
            .json(&body)
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Fetch(format!("exa contents timed out after {timeout_ms}ms"))
                } else {
                    Error::Fetch(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let hint = resp.text().await.unwrap_or_default();
            let hint = truncate_chars(&hint, 200);
            return Err(Self::map_status(status, &hint, "contents"));
        }

        let parsed: ExaContentsResponse = resp
            .json()
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;

        let Some(first) = parsed.results.unwrap_or_default().into_iter().next() else {
            return Ok("No content available for this URL".to_string());
        };

        let text = first.text.unwrap_or_default();
        if !req.combined {
            if text.trim().is_empty() {
                return Ok("No text content found".to_string());
            }
            return Ok(truncate_chars(&text, req.max_length));
        }

        Ok(assemble_combined(
            first.summary.as_deref(),
            &first.highlights.unwrap_or_default(),
            &text,
            req.max_length,
        ))
    }
}

#[async_trait::async_trait]
impl taskrig_core::SearchProvider for ExaClient {
    fn name(&self) -> &'static str {
        "exa"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchReply> {
        ExaClient::search(self, q).await
    }
}

#[async_trait::async_trait]
impl taskrig_core::ContentProvider for ExaClient {
    fn name(&self) -> &'static str {
        "exa"
    }

    async fn fetch(&self, req: &FetchRequest) -> Result<String> {
        self.fetch_contents(req).await
    }
}

/// Combined representation: summary, then at most three highlighted excerpts,
/// then the truncated full text, each section under a labeled delimiter.
fn assemble_combined(
    summary: Option<&str>,
    highlights: &[String],
    text: &str,
    max_length: usize,
) -> String {
    const MAX_HIGHLIGHTS: usize = 3;

    let mut sections: Vec<String> = Vec::new();
    if let Some(s) = summary.filter(|s| !s.trim().is_empty()) {
        sections.push(format!("=== Summary ===\n{}", s.trim()));
    }
    let picked: Vec<&str> = highlights
        .iter()
        .map(|h| h.trim())
        .filter(|h| !h.is_empty())
        .take(MAX_HIGHLIGHTS)
        .collect();
    if !picked.is_empty() {
        sections.push(format!("=== Highlights ===\n{}", picked.join("\n")));
    }
    let body = truncate_chars(text, max_length);
    if !body.trim().is_empty() {
        sections.push(format!("=== Content ===\n{body}"));
    }

    if sections.is_empty() {
        return "No text content found".to_string();
    }
    sections.join("\n\n")
}

#[derive(Debug, Deserialize)]
struct ExaSearchResponse {
    results: Option<Vec<ExaSearchResult>>,
    #[serde(rename = "autopromptString")]
    autoprompt_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExaSearchResult {
    title: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExaContentsResponse {
    results: Option<Vec<ExaContentsResult>>,
}

#[derive(Debug, Deserialize)]
struct ExaContentsResult {
    text: Option<String>,
    summary: Option<String>,
    highlights: Option<Vec<String>>,
}
