use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::decode::unpack_all;
use crate::error::ResolutionFailure;
use crate::fetch::{Fetcher, RequestHeaders};

/// Ways a manifest url shows up in an embed page, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestPattern {
    /// `file: "https://.../x.m3u8"` in a player setup call.
    FileAssignment,
    /// `<source src="https://.../x.m3u8">`
    SourceTag,
    /// Any `.m3u8` url anywhere in the body.
    BareUrl,
}

pub const ALL_PATTERNS: [ManifestPattern; 3] = [
    ManifestPattern::FileAssignment,
    ManifestPattern::SourceTag,
    ManifestPattern::BareUrl,
];

impl ManifestPattern {
    fn regex(&self) -> &'static Regex {
        static FILE_ASSIGNMENT_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r#"\bfile\s*:\s*["'](https?://[^"']+?\.m3u8[^"']*)["']"#).unwrap());
        static SOURCE_TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r#"(?i)<source\b[^>]*?\bsrc\s*=\s*["'](https?://[^"']+?\.m3u8[^"']*)["']"#).unwrap()
        });
        static BARE_URL_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r#"(https?://[^\s"'<>\\]+?\.m3u8[^\s"'<>\\]*)"#).unwrap());

        match self {
            ManifestPattern::FileAssignment => &FILE_ASSIGNMENT_REGEX,
            ManifestPattern::SourceTag => &SOURCE_TAG_REGEX,
            ManifestPattern::BareUrl => &BARE_URL_REGEX,
        }
    }

    pub fn find(&self, body: &str) -> Option<String> {
        self.regex()
            .captures(body)
            .and_then(|captures| captures.get(1))
            .map(|url| url.as_str().to_string())
    }
}

/// First match of the first pattern that matches at all. Packed scripts are
/// only unpacked when nothing matches the body verbatim.
pub fn scan_manifest(body: &str, patterns: &[ManifestPattern]) -> Option<String> {
    let find_in = |text: &str| patterns.iter().find_map(|pattern| pattern.find(text));

    find_in(body).or_else(|| unpack_all(body).iter().find_map(|unpacked| find_in(unpacked)))
}

/// Fetches `embed_url` and scans it for a manifest url.
pub async fn resolve_embed<F: Fetcher>(
    fetcher: &F,
    embed_url: &str,
    patterns: &[ManifestPattern],
    headers: &RequestHeaders,
    timeout: Duration,
) -> Result<String, ResolutionFailure> {
    let body = fetcher
        .fetch(embed_url, headers, timeout)
        .await
        .map_err(|err| ResolutionFailure::from_fetch(embed_url, err))?;

    match scan_manifest(&body, patterns) {
        Some(manifest_url) => {
            log::info!("Found manifest in {}: {}", embed_url, manifest_url);
            Ok(manifest_url)
        }
        None => Err(ResolutionFailure::ManifestPatternNotFound {
            url: embed_url.to_string(),
        }),
    }
}

/// Backend whose embed page carries the manifest url in script or markup.
#[derive(Debug, Clone)]
pub struct EmbedScriptParse {
    pub patterns: Vec<ManifestPattern>,
    /// Referer sent with the embed request; the content page when unset.
    pub referer: Option<String>,
}

impl Default for EmbedScriptParse {
    fn default() -> Self {
        Self {
            patterns: ALL_PATTERNS.to_vec(),
            referer: None,
        }
    }
}

impl EmbedScriptParse {
    pub async fn resolve<F: Fetcher>(
        &self,
        fetcher: &F,
        embed_url: &str,
        headers: &RequestHeaders,
        timeout: Duration,
    ) -> Result<String, ResolutionFailure> {
        let headers = headers.with_referer(self.referer.as_deref().or(headers.referer.as_deref()));
        resolve_embed(fetcher, embed_url, &self.patterns, &headers, timeout).await
    }
}
