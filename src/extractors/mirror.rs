use std::time::Duration;

use regex::Regex;
use url::Url;

use crate::error::ResolutionFailure;
use crate::fetch::{Fetcher, RequestHeaders};

/// Backend serving one asset from several interchangeable mirror domains.
#[derive(Debug, Clone)]
pub struct MirrorProbe {
    /// Pulls the asset id out of the player url; the first group is the id.
    pub id_pattern: Regex,
    /// Tried strictly in this order.
    pub mirrors: Vec<String>,
    /// Manifest path with an `{id}` placeholder.
    pub path_template: String,
    pub referer: Option<String>,
}

impl MirrorProbe {
    pub fn asset_id(&self, url: &Url) -> Option<String> {
        self.id_pattern
            .captures(url.as_str())
            .and_then(|captures| captures.get(1))
            .map(|id| id.as_str().to_string())
    }

    pub fn manifest_path(&self, id: &str) -> String {
        self.path_template.replace("{id}", id)
    }

    pub async fn resolve<F: Fetcher>(
        &self,
        fetcher: &F,
        player_url: &Url,
        headers: &RequestHeaders,
        timeout: Duration,
    ) -> Result<String, ResolutionFailure> {
        let id = self
            .asset_id(player_url)
            .ok_or_else(|| ResolutionFailure::InvalidUrl(player_url.to_string()))?;
        let headers = headers.with_referer(self.referer.as_deref().or(headers.referer.as_deref()));

        log::debug!("Probing {} mirrors for asset {}", self.mirrors.len(), id);
        probe_mirrors(fetcher, &self.manifest_path(&id), &self.mirrors, &headers, timeout).await
    }
}

fn mirror_url(mirror: &str, path_suffix: &str) -> String {
    let base = if mirror.contains("://") {
        mirror.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", mirror.trim_matches('/'))
    };

    if path_suffix.starts_with('/') {
        format!("{base}{path_suffix}")
    } else {
        format!("{base}/{path_suffix}")
    }
}

/// Returns the manifest url on the first mirror whose HEAD answers 200.
///
/// Probes run one after another, so the worst case costs
/// `mirrors.len() * timeout`.
pub async fn probe_mirrors<F: Fetcher>(
    fetcher: &F,
    path_suffix: &str,
    mirrors: &[String],
    headers: &RequestHeaders,
    timeout: Duration,
) -> Result<String, ResolutionFailure> {
    for mirror in mirrors {
        let candidate = mirror_url(mirror, path_suffix);

        if fetcher.probe(&candidate, headers, timeout).await {
            log::info!("Found working mirror: {}", candidate);
            return Ok(candidate);
        }

        log::debug!("Mirror {} did not answer for {}", mirror, path_suffix);
    }

    Err(ResolutionFailure::AllMirrorsUnreachable {
        path: path_suffix.to_string(),
        mirrors: mirrors.len(),
    })
}
