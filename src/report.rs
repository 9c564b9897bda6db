use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::probe::prober::{ProbeMethod, ProbeResult};

/// URL of the synthetic row appended when every link looks blocked.
pub const ALL_LINKS_SENTINEL: &str = "ALL LINKS";

pub const BLOCK_HINT: &str = "Every link answered with a blocking-class response. The checker's own \
network origin is most likely IP-blocked or challenged by an anti-bot filter; \
these results do not show that the linked pages are dead.";

/// Statuses that usually come from firewalls and anti-bot filters rather than the resource.
pub const BLOCKING_STATUSES: [u16; 2] = [403, 451];

/// Error substrings that indicate the request was blocked. Matched case-sensitively.
pub const BLOCK_MARKERS: [&str; 2] = ["blocked", "Cloudflare"];

/// One row of the link-check report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkReport {
    pub url: String,
    pub http_status: Option<u16>,
    pub status_method: Option<ProbeMethod>,
    /// `None` when the link was never classified (status other than 200).
    pub content_flags: Option<Vec<String>>,
    pub error: Option<String>,
}

impl LinkReport {
    pub fn from_probe(url: impl Into<String>, probe: ProbeResult, content_flags: Option<Vec<String>>) -> Self {
        Self {
            url: url.into(),
            http_status: probe.status_code,
            status_method: probe.method_used,
            content_flags,
            error: probe.error_detail,
        }
    }

    fn sentinel() -> Self {
        Self {
            url: ALL_LINKS_SENTINEL.to_string(),
            http_status: None,
            status_method: None,
            content_flags: None,
            error: Some(BLOCK_HINT.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub links: Vec<LinkReport>,
}

/// Decides whether a row looks like the checker was blocked rather than the link being dead.
pub trait BlockDetector: Send + Sync {
    fn is_blocking(&self, row: &LinkReport) -> bool;
}

/// Blocking when the status is one of [`BLOCKING_STATUSES`] or the error
/// contains one of [`BLOCK_MARKERS`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusAndErrorBlockDetector;

impl BlockDetector for StatusAndErrorBlockDetector {
    fn is_blocking(&self, row: &LinkReport) -> bool {
        let by_status = row
            .http_status
            .is_some_and(|status| BLOCKING_STATUSES.contains(&status));
        let by_error = row
            .error
            .as_deref()
            .is_some_and(|error| BLOCK_MARKERS.iter().any(|marker| error.contains(marker)));
        by_status || by_error
    }
}

/// Builds the document report, appending the [`ALL_LINKS_SENTINEL`] row when
/// the row set is non-empty and every row is blocking-class.
pub fn aggregate(rows: Vec<LinkReport>, detector: &dyn BlockDetector) -> DocumentReport {
    let blocking = rows.iter().filter(|row| detector.is_blocking(row)).count();
    let mut links = rows;

    if !links.is_empty() && blocking == links.len() {
        warn!(target: "report", links = blocking, "All links look blocked; appending systemic block hint");
        links.push(LinkReport::sentinel());
    }

    DocumentReport { links }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(url: &str, status: Option<u16>, error: Option<&str>) -> LinkReport {
        LinkReport {
            url: url.to_string(),
            http_status: status,
            status_method: status.map(|_| ProbeMethod::Lightweight),
            content_flags: if status == Some(200) { Some(vec![]) } else { None },
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn empty_report_has_no_sentinel() {
        let report = aggregate(Vec::new(), &StatusAndErrorBlockDetector);
        assert!(report.links.is_empty());
    }

    #[test]
    fn all_forbidden_links_get_exactly_one_sentinel() {
        let rows = vec![
            row("https://a.example/", Some(403), None),
            row("https://b.example/", Some(451), None),
            row("https://c.example/", None, Some("connection failed: blocked by policy")),
        ];
        let report = aggregate(rows, &StatusAndErrorBlockDetector);

        assert_eq!(report.links.len(), 4);
        let sentinels: Vec<_> = report.links.iter().filter(|r| r.url == ALL_LINKS_SENTINEL).collect();
        assert_eq!(sentinels.len(), 1);
        let last = report.links.last().unwrap();
        assert_eq!(last.url, ALL_LINKS_SENTINEL);
        assert_eq!(last.error.as_deref(), Some(BLOCK_HINT));
        assert_eq!(last.http_status, None);
        assert_eq!(last.status_method, None);
        assert_eq!(last.content_flags, None);
    }

    #[test]
    fn one_healthy_link_suppresses_the_sentinel() {
        let rows = vec![
            row("https://a.example/", Some(403), None),
            row("https://b.example/", Some(200), None),
        ];
        let report = aggregate(rows.clone(), &StatusAndErrorBlockDetector);
        assert_eq!(report.links, rows);
    }

    #[test]
    fn block_markers_are_case_sensitive() {
        let detector = StatusAndErrorBlockDetector;
        assert!(detector.is_blocking(&row("u", None, Some("challenge page served by Cloudflare"))));
        assert!(!detector.is_blocking(&row("u", None, Some("cloudflare said no"))));
        assert!(!detector.is_blocking(&row("u", None, Some("Blocked"))));
        assert!(!detector.is_blocking(&row("u", Some(404), None)));
    }

    #[test]
    fn detector_is_pluggable() {
        struct NotFoundIsBlocking;
        impl BlockDetector for NotFoundIsBlocking {
            fn is_blocking(&self, row: &LinkReport) -> bool {
                row.http_status == Some(404)
            }
        }

        let report = aggregate(vec![row("https://a.example/", Some(404), None)], &NotFoundIsBlocking);
        assert_eq!(report.links.len(), 2);
        assert!(report.links[1].url == ALL_LINKS_SENTINEL);
    }

    #[test]
    fn rows_serialize_with_nullable_fields() {
        let value = serde_json::to_value(row("https://a.example/", Some(403), None)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "url": "https://a.example/",
                "http_status": 403,
                "status_method": "lightweight",
                "content_flags": null,
                "error": null
            })
        );
    }
}
