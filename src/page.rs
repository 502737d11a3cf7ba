use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::decode::{decode_hex_url, DecodeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEncoding {
    None,
    Hex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOrigin {
    Script,
    Iframe,
}

/// A reference found on a content page that may lead to a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLink {
    pub raw: String,
    pub encoding: LinkEncoding,
    pub origin: LinkOrigin,
}

impl CandidateLink {
    pub fn decoded(&self) -> Result<String, DecodeError> {
        match self.encoding {
            LinkEncoding::None => Ok(self.raw.clone()),
            LinkEncoding::Hex => decode_hex_url(&self.raw),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContentPage {
    pub url: Url,
    pub body: String,
}

impl ContentPage {
    pub fn new(url: Url, body: String) -> Self {
        Self { url, body }
    }

    /// Hex encoded `hexToString(...)` arguments inside `<script>` bodies, in
    /// document order and without duplicates.
    pub fn script_candidates(&self) -> Vec<CandidateLink> {
        static SCRIPT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<script[^>]*>(.*?)</script>").unwrap());
        static HEX_CALL_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r#"hexToString\w*\(\s*["']([^"']*)["']\s*\)"#).unwrap());

        let mut candidates: Vec<CandidateLink> = Vec::new();

        for script in SCRIPT_REGEX.captures_iter(&self.body) {
            let Some(script_content) = script.get(1) else {
                continue;
            };

            for call in HEX_CALL_REGEX.captures_iter(script_content.as_str()) {
                let raw = call[1].to_string();

                if candidates.iter().any(|candidate| candidate.raw == raw) {
                    continue;
                }

                candidates.push(CandidateLink {
                    raw,
                    encoding: LinkEncoding::Hex,
                    origin: LinkOrigin::Script,
                });
            }
        }

        candidates
    }

    /// The first iframe link. Lazy-loading players park `about:blank` in `src`
    /// and keep the real target in `data-src`, so both are looked at.
    pub fn iframe_candidate(&self) -> Option<CandidateLink> {
        static IFRAME_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<iframe\b[^>]*>").unwrap());
        static SRC_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r#"(?is)\s(?:data-src|src)\s*=\s*["']([^"']*)["']"#).unwrap());

        IFRAME_REGEX
            .find_iter(&self.body)
            .flat_map(|tag| SRC_REGEX.captures_iter(tag.as_str()))
            .filter_map(|captures| captures.get(1))
            .map(|src| src.as_str().trim())
            .find(|src| !src.is_empty() && !src.to_ascii_lowercase().starts_with("about:"))
            .map(|src| CandidateLink {
                raw: src.to_string(),
                encoding: LinkEncoding::None,
                origin: LinkOrigin::Iframe,
            })
    }

    /// Joins `link` against the page url, so `//host/path` and `/path` become
    /// absolute. Only http(s) results are accepted.
    pub fn absolutize(&self, link: &str) -> Option<Url> {
        self.url
            .join(link.trim())
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::{CandidateLink, ContentPage, LinkEncoding, LinkOrigin};

    fn page(body: &str) -> ContentPage {
        ContentPage::new(Url::parse("https://dizi.test/dizi/show/?sezon=1").unwrap(), body.to_string())
    }

    #[test]
    fn test_script_candidates_in_order() {
        let body = r#"<html><script type="text/javascript">
            var a = hexToString("6162");
            var b = hexToStringUtf8('6364');
            var c = hexToString("6162");
        </script><p>hexToString("ffff")</p><SCRIPT>load(hexToString( "6566" ))</SCRIPT></html>"#;

        let candidates = page(body).script_candidates();
        let raws = candidates.iter().map(|candidate| candidate.raw.as_str()).collect::<Vec<_>>();

        assert_eq!(raws, vec!["6162", "6364", "6566"]);
        assert!(candidates
            .iter()
            .all(|candidate| candidate.encoding == LinkEncoding::Hex && candidate.origin == LinkOrigin::Script));
    }

    #[test]
    fn test_script_candidates_keep_malformed_values() {
        let candidates = page(r#"<script>hexToString("xyz")</script>"#).script_candidates();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].decoded().is_err());
    }

    #[test]
    fn test_iframe_candidate() {
        let body = r#"<div><iframe width="100%" src="//gujan.premiumvideo.click/embed/1" allowfullscreen></iframe>
            <iframe src="https://other.test/"></iframe></div>"#;

        assert_eq!(
            page(body).iframe_candidate(),
            Some(CandidateLink {
                raw: "//gujan.premiumvideo.click/embed/1".to_string(),
                encoding: LinkEncoding::None,
                origin: LinkOrigin::Iframe,
            })
        );
        assert_eq!(page("<iframe src=\"about:blank\"></iframe>").iframe_candidate(), None);
        assert_eq!(page("<iframe data-width=\"1\"></iframe>").iframe_candidate(), None);
        assert_eq!(page("<p>nothing</p>").iframe_candidate(), None);
    }

    #[test]
    fn test_lazy_iframe_candidate() {
        let lazy = r#"<iframe class="lazy" src="about:blank" data-src="https://gujan.premiumvideo.click/embed/7"></iframe>"#;
        assert_eq!(
            page(lazy).iframe_candidate().map(|candidate| candidate.raw),
            Some("https://gujan.premiumvideo.click/embed/7".to_string())
        );

        let later = r#"<iframe src="about:blank"></iframe><IFRAME SRC='/embed/2'></IFRAME>"#;
        assert_eq!(
            page(later).iframe_candidate().map(|candidate| candidate.raw),
            Some("/embed/2".to_string())
        );
    }

    #[test]
    fn test_absolutize() {
        let page = page("");

        assert_eq!(
            page.absolutize("//gujan.premiumvideo.click/embed/1").unwrap().as_str(),
            "https://gujan.premiumvideo.click/embed/1"
        );
        assert_eq!(page.absolutize("/player/abc").unwrap().as_str(), "https://dizi.test/player/abc");
        assert_eq!(
            page.absolutize(" https://d1.premiumvideo.click/player/x ").unwrap().as_str(),
            "https://d1.premiumvideo.click/player/x"
        );
        assert_eq!(page.absolutize("javascript:void(0)"), None);
    }
}
