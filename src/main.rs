use clap::{Arg, ArgAction, Command};
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod check;
mod config;
mod document;
mod links;
mod mcp;
mod probe;
mod report;
mod rewrite;
mod tools;
mod utils;

use check::LinkChecker;
use config::CheckerConfig;
use mcp::server::McpServer;
use probe::headers::{BrowserHeaders, HeaderProvider, StaticHeaders};

fn command() -> Command {
    Command::new("mcp-doclinks")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A Model Context Protocol server that checks and rewrites document hyperlinks")
        .long_about(
            "This MCP server provides the following tools:\n\
            - check-document-links: Probe every link in a PDF/text document and flag dead or unavailable pages\n\
            - rewrite-document-links: Append UTM parameters to existing links or link item numbers to a shop\n\
            - find-item-numbers: Locate item numbers matching an N/L template",
        )
        .arg(
            Arg::new("head-timeout-secs")
                .long("head-timeout-secs")
                .value_name("SECS")
                .help("Timeout of the lightweight HEAD probe [env: DOCLINKS_HEAD_TIMEOUT_SECS] [default: 5]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("fetch-timeout-secs")
                .long("fetch-timeout-secs")
                .value_name("SECS")
                .help("Timeout of the full GET fallback [env: DOCLINKS_FETCH_TIMEOUT_SECS] [default: 10]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("classify-timeout-secs")
                .long("classify-timeout-secs")
                .value_name("SECS")
                .help("Timeout of the page-content fetch [env: DOCLINKS_CLASSIFY_TIMEOUT_SECS] [default: 8]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("max-concurrency")
                .long("max-concurrency")
                .value_name("N")
                .help("Links checked at the same time [env: DOCLINKS_MAX_CONCURRENCY] [default: 8]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("user-agent")
                .long("user-agent")
                .value_name("UA")
                .help("Send this fixed User-Agent instead of rotating browser headers [env: DOCLINKS_USER_AGENT]")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Only log errors (for MCP clients)")
                .action(ArgAction::SetTrue),
        )
}

#[tokio::main]
async fn main() {
    let matches = command().get_matches();

    // stdout is reserved for JSON-RPC, so logs go to stderr; RUST_LOG wins over --quiet
    let default_level = if matches.get_flag("quiet") {
        "error"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = CheckerConfig::from_matches(&matches);
    info!(
        head_timeout_secs = config.head_timeout.as_secs(),
        fetch_timeout_secs = config.fetch_timeout.as_secs(),
        classify_timeout_secs = config.classify_timeout.as_secs(),
        max_concurrency = config.max_concurrency,
        "Link checker configured"
    );

    let headers: Arc<dyn HeaderProvider> = match matches
        .get_one::<String>("user-agent")
        .cloned()
        .or_else(|| std::env::var("DOCLINKS_USER_AGENT").ok())
    {
        Some(agent) => match StaticHeaders::parse_user_agent(&agent) {
            Ok(fixed) => {
                info!(user_agent = %agent, "Using a fixed User-Agent");
                Arc::new(fixed)
            }
            Err(e) => {
                warn!("Ignoring invalid User-Agent {:?}: {}", agent, e);
                Arc::new(BrowserHeaders)
            }
        },
        None => Arc::new(BrowserHeaders),
    };

    let checker = match LinkChecker::new(config, headers) {
        Ok(checker) => Arc::new(checker),
        Err(e) => {
            error!("Failed to initialize link checker: {:#}", e);
            process::exit(1);
        }
    };

    info!("Starting MCP server...");

    let mut server = McpServer::new(checker);
    if let Err(e) = server.start().await {
        error!("Failed to start server: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        command().debug_assert();
    }

    #[test]
    fn flags_feed_the_checker_config() {
        let matches = command().get_matches_from(["mcp-doclinks", "-q", "--max-concurrency", "3"]);
        assert!(matches.get_flag("quiet"));
        assert_eq!(CheckerConfig::from_matches(&matches).max_concurrency, 3);
    }
}
