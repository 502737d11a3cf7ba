use std::fmt::{self, Display};

use serde::Deserialize;

pub const PLAYLIST_HEADER: &str = "#EXTM3U";

/// Display metadata supplied alongside a page url. Never read by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

impl PageMeta {
    fn title(&self) -> Option<&str> {
        self.title.as_deref().map(str::trim).filter(|title| !title.is_empty())
    }

    /// `Title S01E02` when season and episode are known, otherwise the title,
    /// otherwise `fallback`.
    pub fn display_name(&self, fallback: &str) -> String {
        let title = self.title().unwrap_or(fallback);

        match (self.season, self.episode) {
            (Some(season), Some(episode)) => format!("{title} S{season:02}E{episode:02}"),
            _ => title.to_string(),
        }
    }
}

/// Upper-case playlist id: Turkish letters transliterated, punctuation dropped,
/// whitespace runs turned into `_`.
pub fn sanitize_tvg_id(text: &str) -> String {
    let transliterated = text
        .chars()
        .map(|c| match c {
            'ç' => 'c',
            'Ç' => 'C',
            'ğ' => 'g',
            'Ğ' => 'G',
            'ı' => 'i',
            'İ' => 'I',
            'ö' => 'o',
            'Ö' => 'O',
            'ş' => 's',
            'Ş' => 'S',
            'ü' => 'u',
            'Ü' => 'U',
            c => c,
        })
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || *c == '-')
        .collect::<String>();

    let id = transliterated.split_whitespace().collect::<Vec<_>>().join("_");

    if id.is_empty() {
        "UNKNOWN".to_string()
    } else {
        id.to_ascii_uppercase()
    }
}

fn attribute_value(value: &str) -> String {
    value.replace(['"', '\r', '\n'], " ").trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub display_name: String,
    pub attributes: Vec<(&'static str, String)>,
    pub url: String,
}

impl PlaylistEntry {
    pub fn new(meta: &PageMeta, page_url: &str, manifest_url: &str, default_group: Option<&str>) -> Self {
        let display_name = meta.display_name(page_url);
        let group = meta
            .group
            .as_deref()
            .or(meta.title())
            .or(default_group)
            .unwrap_or_default();

        Self {
            attributes: vec![
                ("tvg-id", sanitize_tvg_id(&display_name)),
                ("tvg-name", attribute_value(&display_name)),
                ("tvg-logo", attribute_value(meta.logo.as_deref().unwrap_or_default())),
                ("group-title", attribute_value(group)),
            ],
            display_name,
            url: manifest_url.trim().to_string(),
        }
    }
}

impl Display for PlaylistEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#EXTINF:-1")?;

        for (key, value) in &self.attributes {
            write!(f, " {key}=\"{value}\"")?;
        }

        writeln!(f, ",{}", self.display_name.replace(['\r', '\n'], " "))?;
        writeln!(f, "{}", self.url)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Playlist {
    entries: Vec<PlaylistEntry>,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: PlaylistEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[PlaylistEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl Display for Playlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{PLAYLIST_HEADER}")?;

        for entry in &self.entries {
            write!(f, "{entry}")?;
        }

        Ok(())
    }
}
