use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use streamgrab::config::{CandidatePolicy, ResolverConfig};
use streamgrab::extractors::BackendRegistry;
use streamgrab::fetch::RequestHeaders;
use streamgrab::pipeline::PageRequest;
use url::Url;

#[derive(Parser, Debug)]
#[command(version)]
/// Resolve streaming pages to their HLS manifests and write an M3U playlist
pub(crate) struct Args {
    /// JSON file with a list of pages, e.g. [{"url": "...", "title": "...", "season": 1, "episode": 2}]
    #[arg(short, long, value_name = "FILE")]
    pub(crate) input: Option<PathBuf>,

    /// JSON file replacing the built-in backend table
    #[arg(long, value_name = "FILE")]
    pub(crate) backends: Option<PathBuf>,

    /// Pages resolved at the same time
    #[arg(short = 'N', long, default_value = "5", value_name = "NUMBER")]
    pub(crate) concurrent: NonZeroUsize,

    /// Timeout for content pages in seconds
    #[arg(long, value_parser = parse_seconds, default_value = "45", value_name = "SECONDS")]
    pub(crate) timeout: Duration,

    /// Timeout for embed pages in seconds
    #[arg(long, value_parser = parse_seconds, default_value = "15", value_name = "SECONDS")]
    pub(crate) embed_timeout: Duration,

    /// Timeout for each mirror probe in seconds
    #[arg(long, value_parser = parse_seconds, default_value = "10", value_name = "SECONDS")]
    pub(crate) probe_timeout: Duration,

    /// User agent sent with every request
    #[arg(long, value_name = "AGENT")]
    pub(crate) user_agent: Option<String>,

    /// Referer sent with content page requests
    #[arg(long, value_parser = parse_page_url, value_name = "URL")]
    pub(crate) referer: Option<String>,

    /// Move on to the next candidate when a backend fails
    #[arg(long)]
    pub(crate) try_next_candidate: bool,

    /// Write the playlist to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub(crate) output: Option<PathBuf>,

    /// Group title for pages without one
    #[arg(long, value_name = "NAME")]
    pub(crate) group: Option<String>,

    /// Enable debug mode
    #[arg(short, long)]
    pub(crate) debug: bool,

    /// Content page URLs
    #[arg(value_parser = parse_page_url, value_name = "URL")]
    pub(crate) urls: Vec<String>,
}

impl Args {
    pub(crate) async fn resolver_config(&self) -> anyhow::Result<ResolverConfig> {
        let registry = match &self.backends {
            Some(path) => {
                let json = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read backend table {}", path.display()))?;

                BackendRegistry::from_json(&json)
                    .with_context(|| format!("Failed to load backend table {}", path.display()))?
            }
            None => BackendRegistry::builtin(),
        };

        let mut headers = RequestHeaders::default().with_referer(self.referer.as_deref());

        if let Some(user_agent) = &self.user_agent {
            headers.user_agent = user_agent.clone();
        }

        Ok(ResolverConfig {
            headers,
            page_timeout: self.timeout,
            embed_timeout: self.embed_timeout,
            probe_timeout: self.probe_timeout,
            policy: if self.try_next_candidate {
                CandidatePolicy::TryNextCandidate
            } else {
                CandidatePolicy::StopAtFirstAttempt
            },
            registry,
        })
    }

    /// Pages from `--input` first, then the positional urls.
    pub(crate) async fn page_requests(&self) -> anyhow::Result<Vec<PageRequest>> {
        let mut requests = match &self.input {
            Some(path) => {
                let json = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read page list {}", path.display()))?;

                serde_json::from_str::<Vec<PageRequest>>(&json)
                    .with_context(|| format!("Failed to parse page list {}", path.display()))?
            }
            None => Vec::new(),
        };

        requests.extend(self.urls.iter().cloned().map(PageRequest::new));
        Ok(requests)
    }
}

fn parse_seconds(input: &str) -> Result<Duration, String> {
    let seconds = input.parse::<f64>().map_err(|err| format!("{err}"))?;

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err("timeout must be greater than 0".to_string());
    }

    Ok(Duration::from_secs_f64(seconds))
}

fn parse_page_url(input: &str) -> Result<String, String> {
    let url = Url::parse(input.trim()).map_err(|err| format!("{err}"))?;

    match url.scheme() {
        "http" | "https" => Ok(url.to_string()),
        scheme => Err(format!("unsupported scheme: {scheme}")),
    }
}
