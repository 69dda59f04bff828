use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Transport settings for credential downloads.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct FetchConfig {
    /// Upper bound for establishing the connection, in seconds. Must be non-zero.
    pub connect_timeout_secs: u64,
    /// Upper bound for receiving the full response, in seconds. Must be non-zero.
    pub read_timeout_secs: u64,
    /// Refuse URLs that are not `https://`.
    pub require_https: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_TIMEOUT_SECS,
            require_https: true,
        }
    }
}

/// Failures while downloading credential material.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-2xx status.
    #[error("fetch_error: {url} answered with HTTP status {status}")]
    Http {
        /// Requested URL.
        url: String,
        /// Status code returned by the server.
        status: u16,
    },
    /// The server answered with an empty body.
    #[error("fetch_error: {url} returned an empty body")]
    Empty {
        /// Requested URL.
        url: String,
    },
    /// Connecting, sending or reading failed (including timeouts).
    #[error("fetch_error: request to {url} failed: {error}")]
    Network {
        /// Requested URL.
        url: String,
        /// Transport error description.
        error: String,
    },
    /// The URL does not use HTTPS while HTTPS is required.
    #[error("fetch_error: refusing non-https url {url}")]
    InsecureUrl {
        /// Rejected URL.
        url: String,
    },
    /// A configured timeout was zero.
    #[error("fetch_error: timeouts must be non-zero")]
    InvalidTimeout,
}

/// Blocking HTTP(S) GET client with bounded connect and read timeouts.
///
/// No retries are performed; retry policy belongs to the caller.
pub struct RemoteFetcher {
    client: Client,
    require_https: bool,
}

impl std::fmt::Debug for RemoteFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFetcher")
            .field("require_https", &self.require_https)
            .finish_non_exhaustive()
    }
}

impl RemoteFetcher {
    /// Builds a fetcher from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidTimeout`] if a timeout is zero, or
    /// [`FetchError::Network`] if the TLS backend cannot be initialised.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        if config.connect_timeout_secs == 0 || config.read_timeout_secs == 0 {
            return Err(FetchError::InvalidTimeout);
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .build()
            .map_err(|err| FetchError::Network {
                url: "<client>".to_string(),
                error: err.to_string(),
            })?;

        Ok(Self {
            client,
            require_https: config.require_https,
        })
    }

    /// Downloads the body at `url`.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InsecureUrl`] if HTTPS is required and `url` is not HTTPS
    /// - [`FetchError::Http`] on a non-2xx response
    /// - [`FetchError::Empty`] on a zero-length body
    /// - [`FetchError::Network`] on any transport failure
    pub fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if self.require_https && !url.starts_with("https://") {
            return Err(FetchError::InsecureUrl {
                url: url.to_string(),
            });
        }

        let network = |err: reqwest::Error| FetchError::Network {
            url: url.to_string(),
            error: err.to_string(),
        };

        let response = self
            .client
            .get(url)
            .header(
                USER_AGENT,
                format!("certinstaller-core/{}", env!("CARGO_PKG_VERSION")),
            )
            .send()
            .map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().map_err(network)?;
        if body.is_empty() {
            return Err(FetchError::Empty {
                url: url.to_string(),
            });
        }

        log::debug!("fetched {} bytes from {url}", body.len());
        Ok(body.to_vec())
    }
}
