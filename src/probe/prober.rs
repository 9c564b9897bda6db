use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::headers::HeaderProvider;
use crate::config::CheckerConfig;

/// Lightweight-probe statuses that are retried with a full fetch: servers
/// answering these often reject header-only requests rather than the resource.
pub const FALLBACK_STATUSES: [u16; 3] = [401, 403, 405];

/// Which request produced the reported status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeMethod {
    #[serde(rename = "lightweight")]
    Lightweight,
    #[serde(rename = "full-fetch")]
    FullFetch,
}

/// Outcome of probing one URL.
///
/// With a status, `error_detail` only notes a transient failure that came
/// before the final answer. Without one, both attempts failed and
/// `error_detail` describes each failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub status_code: Option<u16>,
    pub method_used: Option<ProbeMethod>,
    pub error_detail: Option<String>,
}

/// Two-tier reachability check: HEAD first, GET when HEAD fails at the
/// network level or is refused with one of [`FALLBACK_STATUSES`].
pub struct Prober {
    client: Client,
    headers: Arc<dyn HeaderProvider>,
    head_timeout: Duration,
    fetch_timeout: Duration,
}

impl Prober {
    pub fn new(client: Client, headers: Arc<dyn HeaderProvider>, config: &CheckerConfig) -> Self {
        Self {
            client,
            headers,
            head_timeout: config.head_timeout,
            fetch_timeout: config.fetch_timeout,
        }
    }

    pub async fn probe(&self, url: &str) -> ProbeResult {
        let result = match self.lightweight(url).await {
            Ok(status) if FALLBACK_STATUSES.contains(&status) => {
                debug!(target: "probe", url = %url, status, "Lightweight probe refused; retrying with full fetch");
                match self.full_fetch(url).await {
                    Ok(full_status) => ProbeResult {
                        status_code: Some(full_status),
                        method_used: Some(ProbeMethod::FullFetch),
                        error_detail: None,
                    },
                    Err(fetch_err) => ProbeResult {
                        status_code: Some(status),
                        method_used: Some(ProbeMethod::Lightweight),
                        error_detail: Some(format!(
                            "full fetch after HTTP {} failed: {}",
                            status, fetch_err
                        )),
                    },
                }
            }
            Ok(status) => ProbeResult {
                status_code: Some(status),
                method_used: Some(ProbeMethod::Lightweight),
                error_detail: None,
            },
            Err(head_err) => {
                debug!(target: "probe", url = %url, "Lightweight probe failed: {}", head_err);
                match self.full_fetch(url).await {
                    Ok(full_status) => ProbeResult {
                        status_code: Some(full_status),
                        method_used: Some(ProbeMethod::FullFetch),
                        error_detail: Some(format!("lightweight probe failed: {}", head_err)),
                    },
                    Err(fetch_err) => ProbeResult {
                        status_code: None,
                        method_used: None,
                        error_detail: Some(format!(
                            "lightweight probe failed: {}; full fetch failed: {}",
                            head_err, fetch_err
                        )),
                    },
                }
            }
        };

        info!(
            target: "probe",
            url = %url,
            status = ?result.status_code,
            method = ?result.method_used,
            failed = result.error_detail.is_some(),
            "Probe finished"
        );
        result
    }

    async fn lightweight(&self, url: &str) -> Result<u16, String> {
        let response = self
            .client
            .head(url)
            .headers(self.headers.headers())
            .timeout(self.head_timeout)
            .send()
            .await
            .map_err(|e| describe_error(&e, self.head_timeout))?;
        Ok(response.status().as_u16())
    }

    async fn full_fetch(&self, url: &str) -> Result<u16, String> {
        let response = self
            .client
            .get(url)
            .headers(self.headers.headers())
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| describe_error(&e, self.fetch_timeout))?;
        let status = response.status().as_u16();
        response
            .bytes()
            .await
            .map_err(|e| describe_error(&e, self.fetch_timeout))?;
        Ok(status)
    }
}

/// Short cause for a failed request, including the innermost source error
/// (DNS, TLS or socket message) that reqwest's own Display hides.
pub fn describe_error(error: &reqwest::Error, timeout: Duration) -> String {
    if error.is_timeout() {
        return format!("timed out after {}s", timeout.as_secs_f32());
    }

    let kind = if error.is_connect() {
        "connection failed"
    } else if error.is_redirect() {
        "redirect loop"
    } else if error.is_body() || error.is_decode() {
        "failed to read body"
    } else if error.is_builder() {
        "invalid URL"
    } else {
        "request failed"
    };

    let mut detail = None;
    let mut source = error.source();
    while let Some(inner) = source {
        detail = Some(inner.to_string());
        source = inner.source();
    }
    match detail {
        Some(detail) if !detail.is_empty() => format!("{}: {}", kind, detail),
        _ => format!("{}: {}", kind, error),
    }
}
