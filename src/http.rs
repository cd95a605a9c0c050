//! HTTP transport for resolving station URLs.
//!
//! This module wraps `reqwest::Client` with the settings station servers
//! expect:
//! * A `User-Agent` identifying the player
//! * TCP keepalive for slow playlist servers
//! * No request timeout: fetches end when the server finishes or the
//!   resolver cancels them
//!
//! # Example
//!
//! ```rust
//! use streamtune::{config::Config, http::Client, transport::Transport};
//!
//! let client = Client::new(&config)?;
//! let response = client.get("http://example.com/station.pls").await?;
//! ```

use std::{future::Future, time::Duration};

use futures_util::TryFutureExt;

use crate::{
    config::Config,
    error::Result,
    transport::{Headers, Response, Transport},
};

/// HTTP client implementing [`Transport`].
#[derive(Clone, Debug)]
pub struct Client {
    inner: reqwest::Client,
}

impl Client {
    /// Duration to keep idle connections alive.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Maximum redirects followed before the fetch fails.
    const MAX_REDIRECTS: usize = 10;

    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the TLS backend cannot be initialized or the
    /// configured user agent is not a valid header value.
    pub fn new(config: &Config) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(Self::MAX_REDIRECTS))
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { inner })
    }
}

impl Transport for Client {
    type Response = reqwest::Response;

    fn get(&self, url: &str) -> impl Future<Output = Result<Self::Response>> + Send {
        trace!("GET {url}");
        self.inner.get(url).send().map_err(Into::into)
    }
}

impl Response for reqwest::Response {
    fn status(&self) -> u16 {
        reqwest::Response::status(self).as_u16()
    }

    fn headers(&self) -> Headers {
        Headers::from(reqwest::Response::headers(self))
    }

    fn next_chunk(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send {
        self.chunk()
            .map_ok(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .map_err(Into::into)
    }
}
