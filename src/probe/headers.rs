use rand::seq::SliceRandom;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER,
    USER_AGENT,
};

// Rotating User Agents
static USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

static REFERERS: &[&str] = &[
    "https://www.google.com/",
    "https://www.bing.com/",
    "https://duckduckgo.com/",
];

static ACCEPT_LANGUAGES: &[&str] = &["en-US,en;q=0.9", "en-GB,en;q=0.8", "en-US,en;q=0.7,de;q=0.3"];

const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Supplies the request headers sent with every probe and classification fetch.
pub trait HeaderProvider: Send + Sync {
    fn headers(&self) -> HeaderMap;
}

/// Browser-like headers with a randomly rotated user agent, language and
/// search-engine referer. Best effort against trivial bot filters only.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserHeaders;

impl HeaderProvider for BrowserHeaders {
    fn headers(&self) -> HeaderMap {
        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENTS.choose(&mut rng).unwrap_or(&USER_AGENTS[0]);
        let referer = REFERERS.choose(&mut rng).unwrap_or(&REFERERS[0]);
        let language = ACCEPT_LANGUAGES
            .choose(&mut rng)
            .unwrap_or(&ACCEPT_LANGUAGES[0]);

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(user_agent));
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(language));
        headers.insert(REFERER, HeaderValue::from_static(referer));
        headers.insert(HeaderName::from_static("dnt"), HeaderValue::from_static("1"));
        headers
    }
}

/// The same headers on every call, for reproducible runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders(pub HeaderMap);

impl StaticHeaders {
    /// Only a `User-Agent` header, rejected when it is not a valid header value.
    pub fn parse_user_agent(agent: &str) -> Result<Self, InvalidHeaderValue> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(agent)?);
        Ok(Self(headers))
    }
}

impl HeaderProvider for StaticHeaders {
    fn headers(&self) -> HeaderMap {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_headers_carry_the_full_disguise() {
        let headers = BrowserHeaders.headers();
        let agent = headers.get(USER_AGENT).unwrap().to_str().unwrap();
        assert!(USER_AGENTS.contains(&agent));
        let referer = headers.get(REFERER).unwrap().to_str().unwrap();
        assert!(REFERERS.contains(&referer));
        assert!(headers.contains_key(ACCEPT));
        assert!(headers.contains_key(ACCEPT_LANGUAGE));
        assert_eq!(headers.get("dnt").unwrap(), "1");
    }

    #[test]
    fn static_headers_repeat_exactly() {
        let provider = StaticHeaders::parse_user_agent("doclinks-test/1.0").unwrap();
        assert_eq!(provider.headers(), provider.headers());
        assert_eq!(provider.headers().get(USER_AGENT).unwrap(), "doclinks-test/1.0");
    }

    #[test]
    fn runtime_user_agent_is_validated() {
        let provider = StaticHeaders::parse_user_agent("linkbot/2.0 (+https://example.com)").unwrap();
        assert_eq!(provider.headers().len(), 1);
        assert!(StaticHeaders::parse_user_agent("bad\nvalue").is_err());
        assert!(StaticHeaders::parse_user_agent("bad\u{7f}value").is_err());
    }
}
