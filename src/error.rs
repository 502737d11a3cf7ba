use crate::decode::DecodeError;
use crate::fetch::FetchError;

/// Every way resolving a single page can end without a manifest.
///
/// None of these are fatal: the batch driver logs them and moves on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolutionFailure {
    #[error("no candidate link found on the page")]
    NoCandidateFound,
    #[error("failed to decode candidate link {raw:?}: {source}")]
    DecodeFailed { raw: String, source: DecodeError },
    #[error("none of the {mirrors} mirrors served {path}")]
    AllMirrorsUnreachable { path: String, mirrors: usize },
    #[error("no manifest url found in {url}")]
    ManifestPatternNotFound { url: String },
    #[error("timed out fetching {url}")]
    FetchTimeout { url: String },
    #[error("HTTP {status} fetching {url}")]
    FetchHttpError { url: String, status: u16 },
    #[error("failed to fetch {url}: {reason}")]
    FetchFailed { url: String, reason: String },
    #[error("invalid url {0:?}")]
    InvalidUrl(String),
}

impl ResolutionFailure {
    pub fn from_fetch(url: &str, err: FetchError) -> Self {
        let url = url.to_string();

        match err {
            FetchError::Timeout => ResolutionFailure::FetchTimeout { url },
            FetchError::HttpStatus(status) => ResolutionFailure::FetchHttpError { url, status },
            FetchError::Transport(reason) => ResolutionFailure::FetchFailed { url, reason },
        }
    }

    /// Short stable name, used as the failure kind in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolutionFailure::NoCandidateFound => "NoCandidateFound",
            ResolutionFailure::DecodeFailed { .. } => "DecodeFailed",
            ResolutionFailure::AllMirrorsUnreachable { .. } => "AllMirrorsUnreachable",
            ResolutionFailure::ManifestPatternNotFound { .. } => "ManifestPatternNotFound",
            ResolutionFailure::FetchTimeout { .. } => "FetchTimeout",
            ResolutionFailure::FetchHttpError { .. } => "FetchHttpError",
            ResolutionFailure::FetchFailed { .. } => "FetchFailed",
            ResolutionFailure::InvalidUrl(_) => "InvalidUrl",
        }
    }
}
