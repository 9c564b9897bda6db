use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::utm::{append_utm, UtmParams};
use crate::document::Document;
use crate::links::extract::{dedup_matches, find_item_matches};
use crate::links::pattern::ItemPattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RewriteMode {
    /// Tag every existing URI link in place.
    UtmOnly,
    /// Link every item-number occurrence to `base_url + item`.
    HyperlinkUtm,
}

impl FromStr for RewriteMode {
    type Err = RewriteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "utm-only" => Ok(Self::UtmOnly),
            "hyperlink-utm" => Ok(Self::HyperlinkUtm),
            other => Err(RewriteError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for RewriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UtmOnly => write!(f, "utm-only"),
            Self::HyperlinkUtm => write!(f, "hyperlink-utm"),
        }
    }
}

/// Request-level problems detected before the document is touched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RewriteError {
    #[error("unknown rewrite mode {0:?}; expected \"utm-only\" or \"hyperlink-utm\"")]
    UnknownMode(String),
    #[error("hyperlink-utm mode requires a non-empty base URL")]
    MissingBaseUrl,
    #[error("hyperlink-utm mode requires an item format")]
    MissingPattern,
}

/// Configuration of one rewrite request.
#[derive(Debug, Clone)]
pub struct LinkRewriteSpec {
    pub mode: RewriteMode,
    pub base_url: String,
    pub item_pattern: Option<ItemPattern>,
    pub utm: UtmParams,
}

impl LinkRewriteSpec {
    pub fn validate(&self) -> Result<(), RewriteError> {
        if self.mode == RewriteMode::HyperlinkUtm {
            if self.base_url.trim().is_empty() {
                return Err(RewriteError::MissingBaseUrl);
            }
            if self.item_pattern.is_none() {
                return Err(RewriteError::MissingPattern);
            }
        }
        Ok(())
    }
}

/// A single link that could not be inserted or updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteLogEntry {
    pub page: usize,
    /// Matched item text or original URL.
    pub target: String,
    pub message: String,
}

/// Structured record of one rewrite run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteLog {
    pub run_id: Uuid,
    pub mode: RewriteMode,
    pub page_count: usize,
    pub matches_found: usize,
    pub links_inserted: usize,
    pub links_updated: usize,
    pub errors: Vec<RewriteLogEntry>,
}

impl RewriteLog {
    fn new(mode: RewriteMode, page_count: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode,
            page_count,
            matches_found: 0,
            links_inserted: 0,
            links_updated: 0,
            errors: Vec::new(),
        }
    }

    fn record_error(&mut self, page: usize, target: impl Into<String>, message: impl Into<String>) {
        let entry = RewriteLogEntry {
            page,
            target: target.into(),
            message: message.into(),
        };
        warn!(
            target: "rewrite",
            run_id = %self.run_id,
            page = entry.page,
            item = %entry.target,
            "Link rewrite failed: {}",
            entry.message
        );
        self.errors.push(entry);
    }
}

/// Applies `spec` to `doc` in place.
///
/// Nothing is modified when `spec` fails validation.
/// After that, failures are scoped to one page or one link: they are logged,
/// recorded in the returned log and the run goes on.
pub fn rewrite(doc: &mut dyn Document, spec: &LinkRewriteSpec) -> Result<RewriteLog, RewriteError> {
    spec.validate()?;

    let mut log = RewriteLog::new(spec.mode, doc.page_count());
    info!(target: "rewrite", run_id = %log.run_id, mode = %spec.mode, pages = log.page_count, "Rewrite started");

    match (spec.mode, &spec.item_pattern) {
        (RewriteMode::UtmOnly, _) => tag_existing_links(doc, &spec.utm, &mut log),
        (RewriteMode::HyperlinkUtm, Some(pattern)) => {
            link_item_numbers(doc, pattern, &spec.base_url, &spec.utm, &mut log)
        }
        (RewriteMode::HyperlinkUtm, None) => return Err(RewriteError::MissingPattern),
    }

    info!(
        target: "rewrite",
        run_id = %log.run_id,
        matches = log.matches_found,
        inserted = log.links_inserted,
        updated = log.links_updated,
        errors = log.errors.len(),
        "Rewrite finished"
    );
    Ok(log)
}

fn tag_existing_links(doc: &mut dyn Document, utm: &UtmParams, log: &mut RewriteLog) {
    for page in 0..doc.page_count() {
        let annotations = match doc.links(page) {
            Ok(annotations) => annotations,
            Err(e) => {
                log.record_error(page, "page", e.to_string());
                continue;
            }
        };

        for annotation in annotations {
            let Some(original) = annotation.uri().map(str::to_string) else {
                continue;
            };
            log.matches_found += 1;
            let tagged = append_utm(&original, utm, &original);
            match doc.replace_link_uri(page, &annotation, &tagged) {
                Ok(()) => {
                    debug!(target: "rewrite", page, url = %original, "Link tagged");
                    log.links_updated += 1;
                }
                Err(e) => log.record_error(page, original, e.to_string()),
            }
        }
    }
}

fn link_item_numbers(
    doc: &mut dyn Document,
    pattern: &ItemPattern,
    base_url: &str,
    utm: &UtmParams,
    log: &mut RewriteLog,
) {
    let matches = dedup_matches(find_item_matches(&*doc, pattern));
    log.matches_found = matches.len();

    for item in matches {
        let target = append_utm(&format!("{}{}", base_url, item.text), utm, &item.text);
        match doc.insert_link(item.page, item.rect, &target) {
            Ok(()) => {
                debug!(target: "rewrite", page = item.page, item = %item.text, "Link inserted");
                log.links_inserted += 1;
            }
            Err(e) => log.record_error(item.page, item.text, e.to_string()),
        }
    }
}
