use reqwest::Client;
use scraper::Html;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::headers::HeaderProvider;
use super::prober::describe_error;
use crate::utils::decode::decode_to_utf8;

/// Flag returned instead of phrase matches when the page could not be fetched.
pub const FETCH_ERROR_FLAG: &str = "fetch_error";

/// Phrases that mark a reachable page as unavailable, in report order.
pub static DEFAULT_VOCABULARY: &[&str] = &[
    "not valid",
    "not available",
    "out of stock",
    "product not found",
    "obsolete",
    "discontinued",
    "no longer available",
    "404 not found",
    "page not found",
    "item unavailable",
];

/// Scans the rendered text of reachable pages for "unavailable" phrases.
pub struct ContentClassifier {
    client: Client,
    headers: Arc<dyn HeaderProvider>,
    timeout: Duration,
    vocabulary: Vec<String>,
}

impl ContentClassifier {
    pub fn new(client: Client, headers: Arc<dyn HeaderProvider>, timeout: Duration) -> Self {
        Self {
            client,
            headers,
            timeout,
            vocabulary: DEFAULT_VOCABULARY.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Matched phrases in vocabulary order; empty when the page does not answer 200,
    /// `[FETCH_ERROR_FLAG]` when the fetch itself fails.
    pub async fn classify(&self, url: &str) -> Vec<String> {
        match self.fetch_text(url).await {
            Ok(Some(text)) => {
                let flags = self.match_phrases(&text);
                info!(target: "classify", url = %url, flags = flags.len(), "Content classified");
                flags
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(target: "classify", url = %url, "Classification fetch failed: {}", e);
                vec![FETCH_ERROR_FLAG.to_string()]
            }
        }
    }

    /// Case-insensitive substring test of every phrase against `text`.
    pub fn match_phrases(&self, text: &str) -> Vec<String> {
        let haystack = text.to_lowercase();
        self.vocabulary
            .iter()
            .filter(|phrase| haystack.contains(&phrase.to_lowercase()))
            .cloned()
            .collect()
    }

    async fn fetch_text(&self, url: &str) -> Result<Option<String>, String> {
        let response = self
            .client
            .get(url)
            .headers(self.headers.headers())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| describe_error(&e, self.timeout))?;

        if response.status().as_u16() != 200 {
            debug!(target: "classify", url = %url, status = response.status().as_u16(), "Page no longer answers 200; no flags");
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|ct| ct.to_str().ok())
            .map(|s| s.to_string());
        let body = response
            .bytes()
            .await
            .map_err(|e| describe_error(&e, self.timeout))?;

        Ok(Some(render_plain_text(&body, content_type.as_deref())))
    }
}

/// Markup-free, whitespace-collapsed, lowercased text of a response body.
pub fn render_plain_text(body: &[u8], content_type: Option<&str>) -> String {
    let decoded = decode_to_utf8(body, content_type).unwrap_or_else(|e| {
        debug!(target: "classify", "Falling back to lossy UTF-8: {:#}", e);
        String::from_utf8_lossy(body).into_owned()
    });

    let looks_like_html = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("html"))
        .unwrap_or_else(|| decoded.trim_start().starts_with('<'));

    let text = if looks_like_html {
        html_to_text(&decoded)
    } else {
        decoded
    };

    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Text nodes of the whole document joined by spaces, skipping script-like elements.
fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| matches!(el.name(), "script" | "style" | "noscript"))
        });
        if !hidden {
            parts.push(&**text);
        }
    }
    parts.join(" ")
}
