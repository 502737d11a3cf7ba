use futures_util::StreamExt as _;
use serde::Deserialize;
use url::Url;

use crate::config::{CandidatePolicy, ResolverConfig};
use crate::error::ResolutionFailure;
use crate::extractors::{resolve_generic, ResolvedStream};
use crate::fetch::Fetcher;
use crate::page::{CandidateLink, ContentPage};
use crate::playlist::PageMeta;

/// A page handed in by whatever crawled the site.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    pub url: String,
    #[serde(flatten)]
    pub meta: PageMeta,
}

impl PageRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            meta: PageMeta::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub request: PageRequest,
    pub result: Result<ResolvedStream, ResolutionFailure>,
}

/// Tracks the candidate attempts of one page and applies the candidate policy.
struct Attempts {
    policy: CandidatePolicy,
    attempted: bool,
    last_failure: Option<ResolutionFailure>,
}

impl Attempts {
    fn new(policy: CandidatePolicy) -> Self {
        Self {
            policy,
            attempted: false,
            last_failure: None,
        }
    }

    /// `Some` when the page is decided by this attempt.
    fn settle(
        &mut self,
        result: Result<ResolvedStream, ResolutionFailure>,
    ) -> Option<Result<ResolvedStream, ResolutionFailure>> {
        self.attempted = true;

        match (result, self.policy) {
            (Ok(stream), _) => Some(Ok(stream)),
            (Err(failure), CandidatePolicy::StopAtFirstAttempt) => Some(Err(failure)),
            (Err(failure), CandidatePolicy::TryNextCandidate) => {
                log::debug!("Candidate failed ({}), trying the next one", failure);
                self.last_failure = Some(failure);
                None
            }
        }
    }

    /// Records a candidate that never reached a backend.
    fn skip(&mut self, failure: ResolutionFailure) {
        log::debug!("Skipping candidate: {}", failure);
        self.last_failure = Some(failure);
    }

    fn may_continue(&self) -> bool {
        !self.attempted || self.policy == CandidatePolicy::TryNextCandidate
    }

    fn finish(self) -> Result<ResolvedStream, ResolutionFailure> {
        Err(self.last_failure.unwrap_or(ResolutionFailure::NoCandidateFound))
    }
}

fn candidate_target(page: &ContentPage, candidate: &CandidateLink) -> Result<Url, ResolutionFailure> {
    let decoded = candidate
        .decoded()
        .map_err(|source| ResolutionFailure::DecodeFailed {
            raw: candidate.raw.clone(),
            source,
        })?;

    page.absolutize(&decoded)
        .ok_or(ResolutionFailure::InvalidUrl(decoded))
}

/// Resolves an already fetched page.
///
/// Script candidates go first, in document order, and the first one whose
/// host is in the registry is resolved. The visible iframe follows, and links
/// no backend claimed get the generic scan last.
pub async fn resolve_content<F: Fetcher>(
    fetcher: &F,
    config: &ResolverConfig,
    page: &ContentPage,
) -> Result<ResolvedStream, ResolutionFailure> {
    let scripts = page.script_candidates();
    let iframe = page.iframe_candidate();

    log::debug!(
        "{}: {} script candidate(s), iframe: {}",
        page.url,
        scripts.len(),
        iframe.as_ref().map(|iframe| iframe.raw.as_str()).unwrap_or("none")
    );

    if scripts.is_empty() && iframe.is_none() {
        return Err(ResolutionFailure::NoCandidateFound);
    }

    // Backends see the content page as referer unless they pin their own
    let headers = config.headers.with_referer(Some(page.url.as_str()));
    let mut attempts = Attempts::new(config.policy);
    let mut unclaimed = Vec::new();

    for candidate in &scripts {
        let target = match candidate_target(page, candidate) {
            Ok(target) => target,
            Err(failure) => {
                attempts.skip(failure);
                continue;
            }
        };

        log::info!("Decoded candidate: {}", target);

        match config.registry.classify(&target) {
            Some(entry) => {
                let result = entry.resolve(fetcher, &target, &headers, config).await;

                if let Some(outcome) = attempts.settle(result) {
                    return outcome;
                }
            }
            None => {
                log::debug!("No backend claims {}", target);
                unclaimed.push(target);
            }
        }
    }

    if attempts.may_continue() {
        if let Some(iframe) = &iframe {
            match candidate_target(page, iframe) {
                Ok(target) => {
                    log::info!("Falling back to iframe: {}", target);

                    match config.registry.classify(&target) {
                        Some(entry) => {
                            let result = entry.resolve(fetcher, &target, &headers, config).await;

                            if let Some(outcome) = attempts.settle(result) {
                                return outcome;
                            }
                        }
                        None => unclaimed.insert(0, target),
                    }
                }
                Err(failure) => attempts.skip(failure),
            }
        }
    }

    for target in unclaimed {
        if !attempts.may_continue() {
            break;
        }

        log::debug!("Scanning {} for a manifest", target);
        let result = resolve_generic(fetcher, &target, &headers, config).await;

        if let Some(outcome) = attempts.settle(result) {
            return outcome;
        }
    }

    attempts.finish()
}

/// Fetches `page_url` and resolves it to a manifest url.
pub async fn resolve_page<F: Fetcher>(
    fetcher: &F,
    config: &ResolverConfig,
    page_url: &str,
) -> Result<ResolvedStream, ResolutionFailure> {
    let url = Url::parse(page_url.trim()).map_err(|_| ResolutionFailure::InvalidUrl(page_url.to_string()))?;
    let body = fetcher
        .fetch(url.as_str(), &config.headers, config.page_timeout)
        .await
        .map_err(|err| ResolutionFailure::from_fetch(url.as_str(), err))?;

    log::debug!("Fetched {} ({} bytes)", url, body.len());
    resolve_content(fetcher, config, &ContentPage::new(url, body)).await
}

/// Resolves `pages` with at most `max_concurrent` in flight.
///
/// Outcomes come back in input order, and a failed page never stops the
/// others.
pub async fn resolve_batch<F: Fetcher>(
    fetcher: &F,
    config: &ResolverConfig,
    pages: Vec<PageRequest>,
    max_concurrent: usize,
) -> Vec<PageOutcome> {
    futures_util::stream::iter(pages)
        .map(|request| async move {
            let result = resolve_page(fetcher, config, &request.url).await;

            match &result {
                Ok(stream) => log::info!("Resolved {} via {}: {}", request.url, stream.backend, stream.manifest_url),
                Err(failure) => log::warn!("Failed to resolve {} [{}]: {}", request.url, failure.kind(), failure),
            }

            PageOutcome { request, result }
        })
        .buffered(max_concurrent.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::{resolve_batch, resolve_content, resolve_page, PageRequest};
    use crate::config::{CandidatePolicy, ResolverConfig};
    use crate::error::ResolutionFailure;
    use crate::extractors::ResolvedStream;
    use crate::fetch::stub::StubFetcher;
    use crate::page::ContentPage;

    const PAGE: &str = "https://dizi.test/dizi/show/sezon-1/bolum-1";

    fn hex_script(url: &str) -> String {
        let encoded = hex::encode(urlencoding::encode(url).as_bytes());
        format!(r#"<script>var playerUrl = hexToString("{encoded}");</script>"#)
    }

    fn mirror_manifest(mirror: &str, id: &str) -> String {
        format!("https://{mirror}.premiumvideo.click/uploads/encode/{id}/master.m3u8")
    }

    fn stream(manifest_url: &str, backend: &str) -> ResolvedStream {
        ResolvedStream {
            manifest_url: manifest_url.to_string(),
            backend: backend.to_string(),
        }
    }

    fn try_next() -> ResolverConfig {
        ResolverConfig {
            policy: CandidatePolicy::TryNextCandidate,
            ..ResolverConfig::default()
        }
    }

    #[tokio::test]
    async fn test_script_candidate_probes_mirrors() {
        let body = format!("<html>{}</html>", hex_script("https://d2.premiumvideo.click/player/abc123"));
        let fetcher = StubFetcher::new()
            .page(PAGE, &body)
            .head(&mirror_manifest("d1", "abc123"), 404)
            .head(&mirror_manifest("d2", "abc123"), 200)
            .head(&mirror_manifest("d3", "abc123"), 200)
            .head(&mirror_manifest("d4", "abc123"), 404);

        let resolved = resolve_page(&fetcher, &ResolverConfig::default(), PAGE).await;

        assert_eq!(resolved, Ok(stream(&mirror_manifest("d2", "abc123"), "playhouse")));
        assert_eq!(
            fetcher.head_urls(),
            vec![mirror_manifest("d1", "abc123"), mirror_manifest("d2", "abc123")]
        );
    }

    #[tokio::test]
    async fn test_iframe_fallback_to_embed() {
        let body = r#"<div class="player"><iframe src="//gujan.premiumvideo.click/embed/z"></iframe></div>"#;
        let fetcher = StubFetcher::new()
            .page(PAGE, body)
            .page(
                "https://gujan.premiumvideo.click/embed/z",
                r#"<video><source src="https://cdn/z.m3u8"></video>"#,
            );

        let resolved = resolve_page(&fetcher, &ResolverConfig::default(), PAGE).await;

        assert_eq!(resolved, Ok(stream("https://cdn/z.m3u8", "gujan")));
        assert_eq!(fetcher.calls()[1].referer.as_deref(), Some(PAGE));
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let fetcher = StubFetcher::new().page(PAGE, "<html><p>coming soon</p></html>");

        let resolved = resolve_page(&fetcher, &ResolverConfig::default(), PAGE).await;

        assert_eq!(resolved, Err(ResolutionFailure::NoCandidateFound));
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_page_fetch_failure() {
        let resolved = resolve_page(&StubFetcher::new(), &ResolverConfig::default(), PAGE).await;

        assert_eq!(
            resolved,
            Err(ResolutionFailure::FetchHttpError {
                url: PAGE.to_string(),
                status: 404
            })
        );
        assert!(matches!(
            resolve_page(&StubFetcher::new(), &ResolverConfig::default(), "not a url").await,
            Err(ResolutionFailure::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_first_attempt_failure_is_final() {
        let body = format!(
            "{}{}<iframe src=\"https://gujan.premiumvideo.click/embed/ok\"></iframe>",
            hex_script("https://d1.premiumvideo.click/player/dead"),
            hex_script("https://d1.premiumvideo.click/player/alive"),
        );
        let fetcher = StubFetcher::new()
            .page(PAGE, &body)
            .head(&mirror_manifest("d1", "alive"), 200)
            .page("https://gujan.premiumvideo.click/embed/ok", r#"file: "https://cdn/ok.m3u8""#);

        let resolved = resolve_page(&fetcher, &ResolverConfig::default(), PAGE).await;

        assert!(matches!(resolved, Err(ResolutionFailure::AllMirrorsUnreachable { mirrors: 4, .. })));
        assert_eq!(fetcher.head_urls().len(), 4);
        assert_eq!(fetcher.calls().len(), 5);
    }

    #[tokio::test]
    async fn test_try_next_candidate_policy() {
        let body = format!(
            "{}{}",
            hex_script("https://d1.premiumvideo.click/player/dead"),
            hex_script("https://d1.premiumvideo.click/player/alive"),
        );
        let fetcher = StubFetcher::new()
            .page(PAGE, &body)
            .head(&mirror_manifest("d3", "alive"), 200);

        let resolved = resolve_page(&fetcher, &try_next(), PAGE).await;

        assert_eq!(resolved, Ok(stream(&mirror_manifest("d3", "alive"), "playhouse")));
    }

    #[tokio::test]
    async fn test_try_next_candidate_reaches_iframe() {
        let body = format!(
            "{}<iframe src=\"https://gujan.premiumvideo.click/embed/ok\"></iframe>",
            hex_script("https://d1.premiumvideo.click/player/dead"),
        );
        let fetcher = StubFetcher::new()
            .page(PAGE, &body)
            .page("https://gujan.premiumvideo.click/embed/ok", r#"file: "https://cdn/ok.m3u8""#);

        assert_eq!(
            resolve_page(&fetcher, &try_next(), PAGE).await,
            Ok(stream("https://cdn/ok.m3u8", "gujan"))
        );
        assert!(matches!(
            resolve_page(&fetcher, &ResolverConfig::default(), PAGE).await,
            Err(ResolutionFailure::AllMirrorsUnreachable { .. })
        ));
    }

    #[tokio::test]
    async fn test_undecodable_script_falls_back_to_iframe() {
        let body = r#"<script>hexToString("abc")</script><iframe src="https://gujan.premiumvideo.click/e/1"></iframe>"#;
        let fetcher = StubFetcher::new()
            .page(PAGE, body)
            .page("https://gujan.premiumvideo.click/e/1", r#"file:"https://cdn/1.m3u8""#);

        assert_eq!(
            resolve_page(&fetcher, &ResolverConfig::default(), PAGE).await,
            Ok(stream("https://cdn/1.m3u8", "gujan"))
        );
    }

    #[tokio::test]
    async fn test_undecodable_script_only() {
        let page = ContentPage::new(Url::parse(PAGE).unwrap(), r#"<script>hexToString("abc")</script>"#.to_string());

        let resolved = resolve_content(&StubFetcher::new(), &ResolverConfig::default(), &page).await;

        assert!(matches!(resolved, Err(ResolutionFailure::DecodeFailed { ref raw, .. }) if raw == "abc"));
    }

    #[tokio::test]
    async fn test_generic_scan_runs_last() {
        let body = format!(
            "{}<iframe src=\"https://unknown-host.test/e/9\"></iframe>",
            hex_script("https://other.test/watch/1"),
        );
        let fetcher = StubFetcher::new()
            .page(PAGE, &body)
            .page("https://unknown-host.test/e/9", r#"<script>var src = "https://cdn.test/9/index.m3u8";</script>"#)
            .page("https://other.test/watch/1", r#"var src = "https://cdn.test/1/index.m3u8";"#);

        let resolved = resolve_page(&fetcher, &ResolverConfig::default(), PAGE).await;

        assert_eq!(resolved, Ok(stream("https://cdn.test/9/index.m3u8", "generic")));
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let mut fetcher = StubFetcher::new();
        let mut pages = Vec::new();

        for i in 0..10 {
            let page_url = format!("https://dizi.test/ep/{i}");
            let embed_url = format!("https://gujan.premiumvideo.click/embed/{i}");

            fetcher = fetcher.page(&page_url, &format!(r#"<iframe src="{embed_url}"></iframe>"#));

            if i != 3 && i != 7 {
                fetcher = fetcher.page(&embed_url, &format!(r#"<source src="https://cdn.test/{i}.m3u8">"#));
            }

            pages.push(PageRequest::new(page_url));
        }

        let outcomes = resolve_batch(&fetcher, &ResolverConfig::default(), pages, 5).await;

        assert_eq!(outcomes.len(), 10);
        assert_eq!(outcomes.iter().filter(|outcome| outcome.result.is_ok()).count(), 8);

        for (i, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.request.url, format!("https://dizi.test/ep/{i}"));

            if i == 3 || i == 7 {
                assert!(matches!(outcome.result, Err(ResolutionFailure::FetchHttpError { status: 404, .. })));
            } else {
                assert_eq!(
                    outcome.result.as_ref().map(|stream| stream.manifest_url.as_str()),
                    Ok(format!("https://cdn.test/{i}.m3u8").as_str())
                );
            }
        }
    }

    #[test]
    fn test_page_request_from_json() {
        let json = r#"[{"url": "https://dizi.test/ep/1", "title": "Show", "season": 1, "episode": 2},
                       {"url": "https://dizi.test/film/2"}]"#;
        let requests: Vec<PageRequest> = serde_json::from_str(json).unwrap();

        assert_eq!(requests[0].meta.title.as_deref(), Some("Show"));
        assert_eq!(requests[0].meta.episode, Some(2));
        assert_eq!(requests[1], PageRequest::new("https://dizi.test/film/2"));
    }
}
