use clap::ArgMatches;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_HEAD_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CLASSIFY_TIMEOUT_SECS: u64 = 8;
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
/// Hard ceiling for per-call `maxConcurrency` overrides.
pub const MAX_CONCURRENCY_LIMIT: usize = 64;

/// Network budget for one link-check run.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Per-attempt timeout of the lightweight (HEAD) probe.
    pub head_timeout: Duration,
    /// Per-attempt timeout of the full-fetch (GET) fallback.
    pub fetch_timeout: Duration,
    /// Timeout of the content classification fetch.
    pub classify_timeout: Duration,
    /// Links probed at the same time.
    pub max_concurrency: usize,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            head_timeout: Duration::from_secs(DEFAULT_HEAD_TIMEOUT_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            classify_timeout: Duration::from_secs(DEFAULT_CLASSIFY_TIMEOUT_SECS),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl CheckerConfig {
    /// Builds the config from command-line flags, falling back to environment
    /// variables and then to the defaults. Unparseable values are ignored with a warning.
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let defaults = Self::default();
        let secs = |arg: &str, env_key: &str, default: Duration| {
            lookup(matches, arg, env_key)
                .and_then(|raw| parse_positive::<u64>(arg, &raw))
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            head_timeout: secs(
                "head-timeout-secs",
                "DOCLINKS_HEAD_TIMEOUT_SECS",
                defaults.head_timeout,
            ),
            fetch_timeout: secs(
                "fetch-timeout-secs",
                "DOCLINKS_FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout,
            ),
            classify_timeout: secs(
                "classify-timeout-secs",
                "DOCLINKS_CLASSIFY_TIMEOUT_SECS",
                defaults.classify_timeout,
            ),
            max_concurrency: lookup(matches, "max-concurrency", "DOCLINKS_MAX_CONCURRENCY")
                .and_then(|raw| parse_positive::<usize>("max-concurrency", &raw))
                .map(|n| n.min(MAX_CONCURRENCY_LIMIT))
                .unwrap_or(defaults.max_concurrency),
        }
    }

    /// Concurrency for one call: the override when given, clamped to `1..=MAX_CONCURRENCY_LIMIT`.
    pub fn concurrency_for(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.max_concurrency)
            .clamp(1, MAX_CONCURRENCY_LIMIT)
    }
}

fn lookup(matches: &ArgMatches, arg: &str, env_key: &str) -> Option<String> {
    matches
        .get_one::<String>(arg)
        .cloned()
        .or_else(|| std::env::var(env_key).ok())
}

fn parse_positive<T>(name: &str, raw: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Some(value),
        _ => {
            warn!("Ignoring invalid value for {}: {:?}", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{Arg, Command};

    fn command() -> Command {
        Command::new("test")
            .arg(Arg::new("head-timeout-secs").long("head-timeout-secs"))
            .arg(Arg::new("fetch-timeout-secs").long("fetch-timeout-secs"))
            .arg(Arg::new("classify-timeout-secs").long("classify-timeout-secs"))
            .arg(Arg::new("max-concurrency").long("max-concurrency"))
    }

    #[test]
    fn flags_override_defaults() {
        let matches = command().get_matches_from([
            "test",
            "--head-timeout-secs",
            "2",
            "--max-concurrency",
            "500",
        ]);
        let config = CheckerConfig::from_matches(&matches);
        assert_eq!(config.head_timeout, Duration::from_secs(2));
        assert_eq!(config.max_concurrency, MAX_CONCURRENCY_LIMIT);
        assert_eq!(
            config.classify_timeout,
            Duration::from_secs(DEFAULT_CLASSIFY_TIMEOUT_SECS)
        );
    }

    #[test]
    fn invalid_values_fall_back() {
        let matches = command().get_matches_from(["test", "--fetch-timeout-secs", "0"]);
        let config = CheckerConfig::from_matches(&matches);
        assert_eq!(
            config.fetch_timeout,
            Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS)
        );
    }

    #[test]
    fn per_call_concurrency_is_clamped() {
        let config = CheckerConfig::default();
        assert_eq!(config.concurrency_for(None), DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.concurrency_for(Some(0)), 1);
        assert_eq!(config.concurrency_for(Some(1000)), MAX_CONCURRENCY_LIMIT);
    }
}
