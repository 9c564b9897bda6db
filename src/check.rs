use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::config::CheckerConfig;
use crate::probe::classify::ContentClassifier;
use crate::probe::headers::HeaderProvider;
use crate::probe::prober::Prober;
use crate::report::{aggregate, BlockDetector, DocumentReport, LinkReport, StatusAndErrorBlockDetector};

const MAX_REDIRECTS: usize = 10;

/// Probes, classifies and aggregates the links of one document.
pub struct LinkChecker {
    prober: Prober,
    classifier: ContentClassifier,
    detector: Box<dyn BlockDetector>,
    config: CheckerConfig,
}

impl LinkChecker {
    /// Builds a checker around a fresh shared HTTP client that follows redirects.
    pub fn new(config: CheckerConfig, headers: Arc<dyn HeaderProvider>) -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self::with_client(client, headers, config))
    }

    pub fn with_client(client: Client, headers: Arc<dyn HeaderProvider>, config: CheckerConfig) -> Self {
        Self {
            prober: Prober::new(client.clone(), headers.clone(), &config),
            classifier: ContentClassifier::new(client, headers, config.classify_timeout),
            detector: Box::new(StatusAndErrorBlockDetector),
            config,
        }
    }

    pub fn with_detector(mut self, detector: Box<dyn BlockDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Probe one link and classify it when it answers 200.
    pub async fn check_link(&self, url: &str) -> LinkReport {
        let probe = self.prober.probe(url).await;
        let flags = match probe.status_code {
            Some(200) => Some(self.classifier.classify(url).await),
            _ => None,
        };
        LinkReport::from_probe(url, probe, flags)
    }

    /// Checks every link with at most `max_concurrency` in flight and returns
    /// the aggregated report, rows in input order.
    pub async fn check_links(&self, links: Vec<String>, max_concurrency: Option<usize>) -> DocumentReport {
        let concurrency = self.config.concurrency_for(max_concurrency);
        let started = Instant::now();
        let total = links.len();

        let rows: Vec<LinkReport> = stream::iter(links.iter())
            .map(|url| self.check_link(url))
            .buffered(concurrency)
            .collect()
            .await;

        let report = aggregate(rows, self.detector.as_ref());
        info!(
            target: "check",
            links = total,
            concurrency,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Link check finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::classify::FETCH_ERROR_FLAG;
    use crate::probe::headers::StaticHeaders;
    use crate::probe::prober::ProbeMethod;
    use crate::report::{ALL_LINKS_SENTINEL, BLOCK_HINT};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn checker() -> LinkChecker {
        let config = CheckerConfig {
            head_timeout: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(2),
            classify_timeout: Duration::from_secs(2),
            max_concurrency: 4,
        };
        LinkChecker::new(config, Arc::new(StaticHeaders::parse_user_agent("doclinks-test/1.0").unwrap())).unwrap()
    }

    #[tokio::test]
    async fn no_links_means_empty_report() {
        let report = checker().check_links(Vec::new(), None).await;
        assert!(report.links.is_empty());
    }

    #[tokio::test]
    async fn rows_keep_input_order_and_flags_follow_status() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/slow-ok"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/slow-ok"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html><body>Sorry, this part is discontinued.</body></html>"),
            )
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let links = vec![
            format!("{}/slow-ok", server.uri()),
            format!("{}/gone", server.uri()),
        ];
        let report = checker().check_links(links.clone(), Some(2)).await;

        assert_eq!(report.links.len(), 2);
        assert_eq!(report.links[0].url, links[0]);
        assert_eq!(report.links[0].http_status, Some(200));
        assert_eq!(
            report.links[0].content_flags,
            Some(vec!["discontinued".to_string()])
        );
        assert_eq!(report.links[1].url, links[1]);
        assert_eq!(report.links[1].http_status, Some(404));
        assert_eq!(report.links[1].content_flags, None);
    }

    #[tokio::test]
    async fn forbidden_head_then_ok_get_is_a_clean_full_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("in stock"))
            .mount(&server)
            .await;

        let report = checker()
            .check_links(vec![format!("{}/item", server.uri())], None)
            .await;
        assert_eq!(report.links.len(), 1);
        let row = &report.links[0];
        assert_eq!(row.http_status, Some(200));
        assert_eq!(row.status_method, Some(ProbeMethod::FullFetch));
        assert_eq!(row.error, None);
        assert_eq!(row.content_flags, Some(vec![]));
    }

    #[tokio::test]
    async fn uniformly_forbidden_links_add_the_block_hint() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let links: Vec<String> = (0..3).map(|i| format!("{}/p{}", server.uri(), i)).collect();
        let report = checker().check_links(links, None).await;

        assert_eq!(report.links.len(), 4);
        for row in &report.links[..3] {
            assert_eq!(row.http_status, Some(403));
            assert_eq!(row.status_method, Some(ProbeMethod::FullFetch));
            assert_eq!(row.content_flags, None);
        }
        let sentinel = &report.links[3];
        assert_eq!(sentinel.url, ALL_LINKS_SENTINEL);
        assert_eq!(sentinel.error.as_deref(), Some(BLOCK_HINT));
    }

    #[tokio::test]
    async fn custom_detector_replaces_the_default() {
        struct NeverBlocked;
        impl BlockDetector for NeverBlocked {
            fn is_blocking(&self, _row: &LinkReport) -> bool {
                false
            }
        }

        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(451))
            .mount(&server)
            .await;

        let report = checker()
            .with_detector(Box::new(NeverBlocked))
            .check_links(vec![server.uri()], None)
            .await;
        assert_eq!(report.links.len(), 1);
        assert_eq!(report.links[0].http_status, Some(451));
    }

    #[tokio::test]
    async fn classification_failure_is_flagged_not_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(4)))
            .mount(&server)
            .await;

        let report = checker()
            .check_links(vec![format!("{}/hangs", server.uri())], None)
            .await;
        assert_eq!(report.links[0].http_status, Some(200));
        assert_eq!(
            report.links[0].content_flags,
            Some(vec![FETCH_ERROR_FLAG.to_string()])
        );
    }
}
