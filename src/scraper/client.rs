//! Blocking HTTP client for the portal with bounded retries on timeout.
//!
//! Login and listing requests go through [`PortalClient::get`] / [`PortalClient::post_form`], which
//! apply a short per-request timeout and resend the same request when it times out. Document
//! downloads use [`PortalClient::download`], which has no timeout (bodies can be large) and asks the
//! server to close the connection afterwards.

use crate::model::Session;
use crate::scraper::error::FetchError;
use reqwest::blocking::{RequestBuilder, Response};
use reqwest::header::{CONNECTION, CONTENT_TYPE, COOKIE};
use std::time::Duration;
use tracing::{debug, warn};

/// Production portal root.
pub const DEFAULT_PORTAL_URL: &str = "https://clip.fct.unl.pt";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; clipfetch/0.1)";
/// Timeout for login and listing requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4);
/// Extra attempts after a timed-out request (initial attempt not included).
pub const DEFAULT_TIMEOUT_RETRIES: u32 = 5;
const MAX_REDIRECTS: usize = 10;
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Why [`retry_on_timeout`] gave up.
#[derive(Debug)]
pub enum RetryFailure<E> {
    /// The operation failed with an error that is not a timeout.
    Failed(E),
    /// Every attempt timed out; `last` is the error of the final attempt.
    Exhausted { attempts: u32, last: E },
}

/// Run `op` once, then up to `retries` more times while it keeps failing with a timeout.
///
/// `op` receives the 1-based attempt number and must build its request from scratch each time.
pub fn retry_on_timeout<T, E>(
    retries: u32,
    is_timeout: impl Fn(&E) -> bool,
    mut op: impl FnMut(u32) -> Result<T, E>,
) -> Result<T, RetryFailure<E>> {
    let max_attempts = retries.saturating_add(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if !is_timeout(&e) => return Err(RetryFailure::Failed(e)),
            Err(e) if attempt >= max_attempts => {
                return Err(RetryFailure::Exhausted {
                    attempts: attempt,
                    last: e,
                })
            }
            Err(_) => {
                warn!(attempt, max_attempts, "request timed out, retrying");
                attempt += 1;
            }
        }
    }
}

/// Encode form fields as `application/x-www-form-urlencoded`.
fn encode_form(form: &[(&str, &str)]) -> String {
    form.iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Fail with [`FetchError::RequestFailed`] unless the response is 200 OK.
pub(crate) fn require_ok(
    response: Response,
    url: &str,
    context: &str,
) -> Result<Response, FetchError> {
    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(FetchError::RequestFailed {
            status: status.as_u16(),
            url: url.to_string(),
            context: Some(context.to_string()),
        });
    }
    Ok(response)
}

/// Read the whole body as text. Bytes that are not UTF-8 become U+FFFD; use [`read_bytes`] when
/// they matter.
pub(crate) fn read_body(response: Response, url: &str) -> Result<String, FetchError> {
    response.text().map_err(|e| FetchError::BodyRead {
        url: url.to_string(),
        source: e,
    })
}

/// Read the whole body undecoded.
pub(crate) fn read_bytes(response: Response, url: &str) -> Result<Vec<u8>, FetchError> {
    response
        .bytes()
        .map(|b| b.to_vec())
        .map_err(|e| FetchError::BodyRead {
            url: url.to_string(),
            source: e,
        })
}

/// Blocking portal client. Cheap to share by reference across the run; holds no session state.
#[derive(Debug, Clone)]
pub struct PortalClient {
    inner: reqwest::blocking::Client,
    base_url: String,
    timeout: Duration,
    timeout_retries: u32,
}

impl PortalClient {
    /// Client for the production portal with default timeout and retries.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    pub fn builder() -> PortalClientBuilder {
        PortalClientBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a path relative to the portal root (`/utente/eu`, `/objecto?...`).
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET with the retry policy, optionally carrying the session cookie.
    pub fn get(&self, url: &str, session: Option<&Session>) -> Result<Response, FetchError> {
        self.execute(url, || {
            let request = self.inner.get(url).timeout(self.timeout);
            match session {
                Some(s) => request.header(COOKIE, s.cookie_header()),
                None => request,
            }
        })
    }

    /// POST form fields with the retry policy. The body is encoded once and the same bytes are
    /// sent on every attempt.
    pub fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<Response, FetchError> {
        let payload = encode_form(form);
        self.execute(url, || {
            self.inner
                .post(url)
                .timeout(self.timeout)
                .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(payload.clone())
        })
    }

    /// Authenticated GET for a document body. Not retried, no timeout, `Connection: close`.
    pub fn download(&self, url: &str, session: &Session) -> Result<Response, FetchError> {
        let response = self
            .inner
            .get(url)
            .header(COOKIE, session.cookie_header())
            .header(CONNECTION, "close")
            .send()
            .map_err(|e| FetchError::Network {
                url: url.to_string(),
                source: e,
            })?;
        require_ok(response, url, "download")
    }

    fn execute(
        &self,
        url: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<Response, FetchError> {
        let result = retry_on_timeout(self.timeout_retries, reqwest::Error::is_timeout, |attempt| {
            debug!(url, attempt, "sending request");
            build().send()
        });
        result.map_err(|failure| match failure {
            RetryFailure::Failed(e) => FetchError::Network {
                url: url.to_string(),
                source: e,
            },
            RetryFailure::Exhausted { attempts, last } => FetchError::TimeoutExhausted {
                url: url.to_string(),
                attempts,
                source: last,
            },
        })
    }
}

/// Builder for PortalClient with optional portal URL, User-Agent, timeout and retry count.
#[derive(Debug)]
pub struct PortalClientBuilder {
    base_url: String,
    user_agent: Option<String>,
    timeout: Duration,
    timeout_retries: u32,
}

impl Default for PortalClientBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PORTAL_URL.to_string(),
            user_agent: None,
            timeout: DEFAULT_TIMEOUT,
            timeout_retries: DEFAULT_TIMEOUT_RETRIES,
        }
    }
}

impl PortalClientBuilder {
    /// Portal root, without trailing slash. Default is the production portal.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Timeout for login and listing requests. Default 4 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extra attempts after a timeout. Default 5.
    pub fn timeout_retries(mut self, n: u32) -> Self {
        self.timeout_retries = n;
        self
    }

    pub fn build(self) -> Result<PortalClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        // Downloads must not inherit the blocking client's default 30s total timeout.
        let inner = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(None::<Duration>)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(PortalClient {
            inner,
            base_url: self.base_url,
            timeout: self.timeout,
            timeout_retries: self.timeout_retries,
        })
    }
}
