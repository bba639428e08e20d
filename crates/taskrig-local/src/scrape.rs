//! Direct-fetch fallback: a plain GET with a browser-like user agent, used
//! when the managed content API is unusable (missing key, 401) or errors out
//! in transit. Universal but fragile; some sites block automated access.

use std::io::Cursor;
use std::time::Duration;
use taskrig_core::{truncate_chars, Error, FetchRequest, Result};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const EXTRACT_WIDTH: usize = 100;

#[derive(Debug, Clone)]
pub struct DirectFetcher {
    client: reqwest::Client,
}

impl DirectFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn fetch(&self, req: &FetchRequest) -> Result<String> {
        let timeout_ms = crate::clamp_timeout_ms(req.timeout_ms);

        let resp = self
            .client
            .get(&req.url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Fetch(format!("direct fetch timed out after {timeout_ms}ms"))
                } else {
                    Error::Fetch(format!("Request error: {e}"))
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("unknown");
            return Err(Error::Fetch(format!(
                "HTTP error {}: {reason} (Note: this URL may be blocking automated access)",
                status.as_u16()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::Fetch(format!("Request error: {e}")))?;

        let text = html_body_to_text(&body);
        if text.trim().is_empty() {
            return Ok("No text content found".to_string());
        }
        Ok(truncate_chars(&text, req.max_length))
    }
}

#[async_trait::async_trait]
impl taskrig_core::ContentProvider for DirectFetcher {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn fetch(&self, req: &FetchRequest) -> Result<String> {
        DirectFetcher::fetch(self, req).await
    }
}

/// HTML body -> single-line readable text: drop script/style/noscript blocks,
/// render to text, collapse whitespace runs to single spaces.
pub fn html_body_to_text(body: &str) -> String {
    let h1 = strip_tag_blocks(body, "script");
    let h2 = strip_tag_blocks(&h1, "style");
    let h3 = strip_tag_blocks(&h2, "noscript");
    let rendered = html_to_text(&h3, EXTRACT_WIDTH);
    norm_ws(&rendered)
}

fn html_to_text(html: &str, width: usize) -> String {
    // html2text reads bytes; on a render failure the raw markup is still
    // better than nothing.
    html2text::from_read(Cursor::new(html.as_bytes()), width).unwrap_or_else(|_| html.to_string())
}

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_tag_blocks(html: &str, tag: &str) -> String {
    // Minimal, best-effort stripper for <tag ...> ... </tag> blocks.
    // Only removes when it finds a close tag; ASCII-case-insensitive on names.
    let tag_lc = tag.to_ascii_lowercase();
    let open_pat = format!("<{tag_lc}");
    let close_pat = format!("</{tag_lc}>");

    let mut out = String::new();
    let mut i = 0usize;
    let lower = html.to_ascii_lowercase();
    while let Some(rel_start) = lower[i..].find(&open_pat) {
        let start = i + rel_start;
        let after_open = start + open_pat.len();
        if let Some(rel_end) = lower[after_open..].find(&close_pat) {
            let end = after_open + rel_end + close_pat.len();
            out.push_str(&html[i..start]);
            i = end;
        } else {
            break;
        }
    }
    out.push_str(&html[i..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_and_style_blocks() {
        let html = r#"<html><head><style>.x{color:red}</style></head>
            <body><script>var x = 1;</script><p>Visible text</p></body></html>"#;
        let text = html_body_to_text(html);
        assert!(text.contains("Visible text"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("color:red"));
    }

    #[test]
    fn collapses_whitespace_runs_to_single_spaces() {
        let html = "<p>one</p>\n\n\n<p>two   three</p>";
        let text = html_body_to_text(html);
        assert!(!text.contains("  "), "got {text:?}");
        assert!(text.contains("one"));
        assert!(text.contains("two three"));
    }

    #[test]
    fn unclosed_tag_blocks_are_left_alone() {
        // Conservative: without a close tag we keep the input rather than
        // guessing where the block ends.
        let html = "<script>orphan";
        let out = strip_tag_blocks(html, "script");
        assert_eq!(out, html);
    }

    #[test]
    fn tag_name_matching_is_case_insensitive() {
        let out = strip_tag_blocks("<SCRIPT>x</SCRIPT>rest", "script");
        assert_eq!(out, "rest");
    }
}
