use serde::{Deserialize, Serialize};

/// Campaign parameters shared by every link of one rewrite run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmParams {
    pub source: String,
    pub medium: String,
    pub campaign: String,
}

/// Appends `utm_source`, `utm_medium`, `utm_campaign` and `utm_content` to `url`.
///
/// Plain concatenation: `?` starts a query when the URL has none, `&` extends
/// an existing one. Values are inserted verbatim (no percent-encoding) and
/// existing UTM parameters are neither detected nor replaced, so applying it
/// twice yields the parameters twice.
pub fn append_utm(url: &str, params: &UtmParams, content: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{url}{separator}utm_source={}&utm_medium={}&utm_campaign={}&utm_content={}",
        params.source, params.medium, params.campaign, content
    )
}
