use std::time::Duration;

use crate::extractors::BackendRegistry;
use crate::fetch::RequestHeaders;

pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(45);
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CONCURRENT_PAGES: usize = 5;

/// What happens after the first attempted candidate fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CandidatePolicy {
    /// The first candidate that reaches a backend decides the outcome. The
    /// iframe is only used when no script candidate reached a backend.
    #[default]
    StopAtFirstAttempt,
    /// Keep going: remaining script candidates, then the iframe, then the
    /// generic scan.
    TryNextCandidate,
}

/// Everything a resolution needs besides the network. Passed by reference into
/// every call; nothing here is mutated while pages are resolving.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub headers: RequestHeaders,
    pub page_timeout: Duration,
    pub embed_timeout: Duration,
    pub probe_timeout: Duration,
    pub policy: CandidatePolicy,
    pub registry: BackendRegistry,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            headers: RequestHeaders::default(),
            page_timeout: DEFAULT_PAGE_TIMEOUT,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            policy: CandidatePolicy::default(),
            registry: BackendRegistry::builtin(),
        }
    }
}
