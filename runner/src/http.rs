//! HTTP transport for the bootstrap script and the credential tool.
//!
//! Provides a trait-based abstraction over the two requests the runner makes,
//! enabling dependency injection for testing:
//!
//! - an authenticated text fetch whose HTTP status is captured explicitly
//!   rather than collapsed into a success flag, and
//! - a direct binary download that bypasses any configured proxy.
//!
//! Neither request carries an internal timeout; a hung request is cancelled
//! by closing the session, like every other step.

use std::path::Path;
use std::sync::OnceLock;

/// A completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// The status code returned by the server.
    pub status: u16,
    /// The response body.
    pub body: String,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    ///
    /// # Examples
    ///
    /// ```
    /// use imcv2_sdk_runner::http::HttpResponse;
    ///
    /// let ok = HttpResponse { status: 200, body: String::new() };
    /// let forbidden = HttpResponse { status: 403, body: String::new() };
    /// assert!(ok.is_success());
    /// assert!(!forbidden.is_success());
    /// ```
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for the runner's HTTP requests.
///
/// Abstractions allow tests to mock HTTP behaviour without network access.
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient {
    /// Fetches `url` as text, authenticating with `token`.
    ///
    /// Non-success statuses are returned as a response, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] when no status was received.
    fn fetch_text(&self, url: &str, token: &str) -> Result<HttpResponse, FetchError>;

    /// Downloads `url` into `dest` without going through any proxy.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is not 2xx, or the
    /// file cannot be written.
    fn download_to_file(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Errors arising from HTTP requests.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request failed before a status was received.
    #[error("request to {url} failed: {reason}")]
    Transport {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The server answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// The URL that was requested.
        url: String,
        /// The status code.
        status: u16,
    },

    /// I/O error writing the downloaded file.
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP client backed by `ureq`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UreqClient;

impl HttpClient for UreqClient {
    fn fetch_text(&self, url: &str, token: &str) -> Result<HttpResponse, FetchError> {
        let response = authenticated_agent()
            .get(url)
            .header("Authorization", format!("token {token}"))
            .header("Accept", "application/vnd.github.raw")
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        let status = response.status().as_u16();
        let body = response
            .into_body()
            .read_to_string()
            .map_err(|e| FetchError::Transport {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;
        log::debug!("GET {url} -> {status}");
        Ok(HttpResponse { status, body })
    }

    fn download_to_file(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let response = direct_agent()
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        let mut file = std::fs::File::create(dest)?;
        std::io::copy(&mut response.into_body().as_reader(), &mut file)?;
        Ok(())
    }
}

/// Agent that honours the proxy environment and reports every status.
fn authenticated_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();
        ureq::Agent::new_with_config(config)
    })
}

/// Agent that never uses a proxy.
fn direct_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder().proxy(None).build();
        ureq::Agent::new_with_config(config)
    })
}

/// Map a ureq error to a [`FetchError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(status) => FetchError::Status {
            url: url.to_owned(),
            status: *status,
        },
        other => FetchError::Transport {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
