use std::future::Future;
use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::{Method, StatusCode};
use url::Url;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "tr-TR,tr;q=0.9,en-US;q=0.8,en;q=0.7";

const MAX_REDIRECTS: u32 = 10;

/// Header set attached to every outbound request.
///
/// Several backends reject requests whose referer does not point at their own
/// player page, so the referer is chosen per call instead of living on a shared
/// client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeaders {
    pub user_agent: String,
    pub accept_language: Option<String>,
    pub referer: Option<String>,
}

impl Default for RequestHeaders {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: Some(DEFAULT_ACCEPT_LANGUAGE.to_string()),
            referer: None,
        }
    }
}

impl RequestHeaders {
    pub fn with_referer(&self, referer: Option<&str>) -> Self {
        Self {
            referer: referer.map(str::to_string),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("server answered with HTTP {0}")]
    HttpStatus(u16),
    #[error("{0}")]
    Transport(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

pub trait Fetcher {
    /// GET `url` and return the body text of a successful response.
    async fn fetch(&self, url: &str, headers: &RequestHeaders, timeout: Duration) -> Result<String, FetchError>;

    /// HEAD `url`, following redirects. Only a final 200 counts; every other
    /// outcome, transport errors included, is `false`.
    async fn probe(&self, url: &str, headers: &RequestHeaders, timeout: Duration) -> bool;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .redirect(Policy::none()) // redirects handled in send_following_redirects
            .build()?;

        Ok(Self { client })
    }

    async fn send_following_redirects(
        &self,
        method: Method,
        url: &str,
        headers: &RequestHeaders,
    ) -> Result<reqwest::Response, FetchError> {
        // reqwest rewrites the Referer header when it follows redirects itself,
        // and the mirrors check it on the final hop
        let mut current = Url::parse(url).map_err(|err| FetchError::Transport(format!("invalid url {url}: {err}")))?;
        let mut redirect_count = 0u32;

        loop {
            let mut request = self
                .client
                .request(method.clone(), current.clone())
                .header(reqwest::header::USER_AGENT, &headers.user_agent);

            if let Some(accept_language) = &headers.accept_language {
                request = request.header(reqwest::header::ACCEPT_LANGUAGE, accept_language);
            }

            if let Some(referer) = &headers.referer {
                request = request.header(reqwest::header::REFERER, referer);
            }

            let response = request.send().await?;
            let location = match response.headers().get(reqwest::header::LOCATION) {
                Some(location) if response.status().is_redirection() => location
                    .to_str()
                    .map(str::to_string)
                    .map_err(|_| FetchError::Transport("redirect location is not valid text".to_string()))?,
                _ => return Ok(response),
            };

            if redirect_count >= MAX_REDIRECTS {
                return Err(FetchError::Transport(format!("more than {MAX_REDIRECTS} redirects")));
            }

            redirect_count += 1;
            current = current
                .join(&location)
                .map_err(|err| FetchError::Transport(format!("invalid redirect location {location}: {err}")))?;
            log::trace!("Following redirect to {}", current);
        }
    }
}

/// Runs a whole exchange, every redirect hop and the body included, under one
/// deadline.
async fn within_deadline<T>(
    timeout: Duration,
    exchange: impl Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    tokio::time::timeout(timeout, exchange)
        .await
        .unwrap_or(Err(FetchError::Timeout))
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, headers: &RequestHeaders, timeout: Duration) -> Result<String, FetchError> {
        within_deadline(timeout, async {
            let response = self.send_following_redirects(Method::GET, url, headers).await?;
            let status = response.status();

            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            Ok::<_, FetchError>(response.text().await?)
        })
        .await
    }

    async fn probe(&self, url: &str, headers: &RequestHeaders, timeout: Duration) -> bool {
        let exchange = self.send_following_redirects(Method::HEAD, url, headers);

        match within_deadline(timeout, exchange).await {
            Ok(response) => {
                log::trace!("HEAD {} -> {}", url, response.status());
                response.status() == StatusCode::OK
            }
            Err(err) => {
                log::trace!("HEAD {} failed: {}", url, err);
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::{FetchError, Fetcher, RequestHeaders};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) struct Call {
        pub(crate) method: &'static str,
        pub(crate) url: String,
        pub(crate) referer: Option<String>,
    }

    /// Scripted stand-in for the network. Unknown GETs answer 404 and unknown
    /// HEADs answer `false`.
    #[derive(Default)]
    pub(crate) struct StubFetcher {
        pages: HashMap<String, Result<String, FetchError>>,
        heads: HashMap<String, u16>,
        calls: Mutex<Vec<Call>>,
    }

    impl StubFetcher {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), Ok(body.to_string()));
            self
        }

        pub(crate) fn page_error(mut self, url: &str, err: FetchError) -> Self {
            self.pages.insert(url.to_string(), Err(err));
            self
        }

        pub(crate) fn head(mut self, url: &str, status: u16) -> Self {
            self.heads.insert(url.to_string(), status);
            self
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn head_urls(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|call| call.method == "HEAD")
                .map(|call| call.url)
                .collect()
        }

        fn record(&self, method: &'static str, url: &str, headers: &RequestHeaders) {
            self.calls.lock().unwrap().push(Call {
                method,
                url: url.to_string(),
                referer: headers.referer.clone(),
            });
        }
    }

    impl Fetcher for StubFetcher {
        async fn fetch(&self, url: &str, headers: &RequestHeaders, _timeout: Duration) -> Result<String, FetchError> {
            self.record("GET", url, headers);
            self.pages
                .get(url)
                .cloned()
                .unwrap_or(Err(FetchError::HttpStatus(404)))
        }

        async fn probe(&self, url: &str, headers: &RequestHeaders, _timeout: Duration) -> bool {
            self.record("HEAD", url, headers);
            self.heads.get(url) == Some(&200)
        }
    }
}
