use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use self::embed::{resolve_embed, EmbedScriptParse, ManifestPattern, ALL_PATTERNS};
use self::mirror::MirrorProbe;
use crate::config::ResolverConfig;
use crate::error::ResolutionFailure;
use crate::fetch::{Fetcher, RequestHeaders};

pub mod embed;
pub mod mirror;

/// Name reported for manifests found by the catch-all page scan.
pub const GENERIC_BACKEND: &str = "generic";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStream {
    pub manifest_url: String,
    pub backend: String,
}

/// Resolution strategy of a hosting backend.
#[derive(Debug, Clone)]
pub enum Backend {
    MirrorProbe(MirrorProbe),
    EmbedScriptParse(EmbedScriptParse),
}

impl Backend {
    fn accepts(&self, url: &Url) -> bool {
        match self {
            Backend::MirrorProbe(probe) => probe.asset_id(url).is_some(),
            Backend::EmbedScriptParse(_) => true,
        }
    }
}

/// One row of the classification table.
#[derive(Debug, Clone)]
pub struct BackendEntry {
    pub name: String,
    /// Lowercase substring the url host has to contain.
    pub host: String,
    pub backend: Backend,
}

impl BackendEntry {
    pub fn matches(&self, url: &Url) -> bool {
        let host_matches = url
            .host_str()
            .map(|host| host.to_ascii_lowercase().contains(&self.host))
            .unwrap_or(false);

        host_matches && self.backend.accepts(url)
    }

    pub async fn resolve<F: Fetcher>(
        &self,
        fetcher: &F,
        target: &Url,
        headers: &RequestHeaders,
        config: &ResolverConfig,
    ) -> Result<ResolvedStream, ResolutionFailure> {
        let manifest_url = match &self.backend {
            Backend::MirrorProbe(probe) => probe.resolve(fetcher, target, headers, config.probe_timeout).await?,
            Backend::EmbedScriptParse(embed) => {
                embed
                    .resolve(fetcher, target.as_str(), headers, config.embed_timeout)
                    .await?
            }
        };

        Ok(ResolvedStream {
            manifest_url,
            backend: self.name.clone(),
        })
    }
}

/// Least specific strategy: fetch whatever the link points at and scan it.
pub async fn resolve_generic<F: Fetcher>(
    fetcher: &F,
    target: &Url,
    headers: &RequestHeaders,
    config: &ResolverConfig,
) -> Result<ResolvedStream, ResolutionFailure> {
    let manifest_url = resolve_embed(fetcher, target.as_str(), &ALL_PATTERNS, headers, config.embed_timeout).await?;

    Ok(ResolvedStream {
        manifest_url,
        backend: GENERIC_BACKEND.to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid backend table: {0}")]
    Json(#[from] serde_json::Error),
    #[error("backend {name}: host must not be empty")]
    EmptyHost { name: String },
    #[error("backend {name}: invalid id pattern: {source}")]
    IdPattern { name: String, source: regex::Error },
    #[error("backend {name}: id pattern needs a capture group")]
    MissingCaptureGroup { name: String },
    #[error("backend {name}: path template lacks the {{id}} placeholder")]
    MissingIdPlaceholder { name: String },
    #[error("backend {name}: no mirrors configured")]
    NoMirrors { name: String },
    #[error("backend {name}: no manifest patterns configured")]
    NoPatterns { name: String },
}

#[derive(Debug, Deserialize)]
struct BackendRow {
    name: String,
    host: String,
    #[serde(flatten)]
    kind: BackendKindRow,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum BackendKindRow {
    MirrorProbe {
        id_pattern: String,
        mirrors: Vec<String>,
        path_template: String,
        #[serde(default)]
        referer: Option<String>,
    },
    EmbedScriptParse {
        #[serde(default = "default_patterns")]
        patterns: Vec<ManifestPattern>,
        #[serde(default)]
        referer: Option<String>,
    },
}

fn default_patterns() -> Vec<ManifestPattern> {
    ALL_PATTERNS.to_vec()
}

impl TryFrom<BackendRow> for BackendEntry {
    type Error = RegistryError;

    fn try_from(row: BackendRow) -> Result<Self, Self::Error> {
        let BackendRow { name, host, kind } = row;
        let host = host.trim().to_ascii_lowercase();

        if host.is_empty() {
            return Err(RegistryError::EmptyHost { name });
        }

        let backend = match kind {
            BackendKindRow::MirrorProbe {
                id_pattern,
                mirrors,
                path_template,
                referer,
            } => {
                let id_pattern = match Regex::new(&id_pattern) {
                    Ok(id_pattern) => id_pattern,
                    Err(source) => return Err(RegistryError::IdPattern { name, source }),
                };

                if id_pattern.captures_len() < 2 {
                    return Err(RegistryError::MissingCaptureGroup { name });
                }

                if !path_template.contains("{id}") {
                    return Err(RegistryError::MissingIdPlaceholder { name });
                }

                if mirrors.is_empty() {
                    return Err(RegistryError::NoMirrors { name });
                }

                Backend::MirrorProbe(MirrorProbe {
                    id_pattern,
                    mirrors,
                    path_template,
                    referer,
                })
            }
            BackendKindRow::EmbedScriptParse { patterns, referer } => {
                if patterns.is_empty() {
                    return Err(RegistryError::NoPatterns { name });
                }

                Backend::EmbedScriptParse(EmbedScriptParse { patterns, referer })
            }
        };

        Ok(BackendEntry { name, host, backend })
    }
}

/// Ordered classification table. The first matching row wins, so narrower
/// hosts have to come before broader ones.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    entries: Vec<BackendEntry>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl BackendRegistry {
    pub fn new(entries: Vec<BackendEntry>) -> Self {
        Self { entries }
    }

    pub fn builtin() -> Self {
        static PLAYER_ID_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"/player/([a-zA-Z0-9]+)").unwrap());

        Self::new(vec![
            BackendEntry {
                name: "gujan".to_string(),
                host: "gujan.premiumvideo.click".to_string(),
                backend: Backend::EmbedScriptParse(EmbedScriptParse::default()),
            },
            BackendEntry {
                name: "playhouse".to_string(),
                host: "premiumvideo.click".to_string(),
                backend: Backend::MirrorProbe(MirrorProbe {
                    id_pattern: PLAYER_ID_REGEX.clone(),
                    mirrors: ["d1", "d2", "d3", "d4"]
                        .iter()
                        .map(|mirror| format!("{mirror}.premiumvideo.click"))
                        .collect(),
                    path_template: "/uploads/encode/{id}/master.m3u8".to_string(),
                    referer: Some("https://playhouse.premiumvideo.click/".to_string()),
                }),
            },
        ])
    }

    /// Parses a JSON array of backend rows, e.g.
    ///
    /// ```json
    /// [{"name": "gujan", "host": "gujan.premiumvideo.click", "kind": "embed_script_parse"}]
    /// ```
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let rows: Vec<BackendRow> = serde_json::from_str(json)?;
        let entries = rows
            .into_iter()
            .map(BackendEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(entries))
    }

    pub fn entries(&self) -> &[BackendEntry] {
        &self.entries
    }

    pub fn classify(&self, url: &Url) -> Option<&BackendEntry> {
        self.entries.iter().find(|entry| entry.matches(url))
    }
}
