//! Station URL resolution.
//!
//! The [`Resolver`] fetches a URL once, sniffs the response against the
//! playlist [`Format`]s and returns the ordered list of stream URIs to try.
//! When nothing matches, or the fetch fails, the URL itself becomes a
//! single-entry playlist: it may well be a direct media stream, and the
//! pipeline will report an error if it is not.
//!
//! At most one fetch is in flight per resolver. Starting a new one, or
//! calling [`cancel`](Resolver::cancel), aborts the previous fetch and
//! guarantees its completion is never delivered.
//!
//! # Example
//!
//! ```rust
//! use streamtune::{config::Config, http::Client, resolver::Resolver};
//!
//! let client = Client::new(&Config::new())?;
//! let mut resolver = Resolver::new(client);
//! let playlist = resolver.resolve("http://example.com/station.pls").await;
//! ```

use std::{collections::VecDeque, sync::Arc};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    format::Format,
    transport::{FetchResult, Response, Transport},
};

/// Ordered stream URIs to attempt, head first.
pub type Playlist = VecDeque<String>;

/// Completion of a spawned resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    /// Token identifying the `start()` that issued the fetch.
    pub generation: u64,
    pub url: String,
    pub playlist: Playlist,
}

pub struct Resolver<T: Transport> {
    transport: Arc<T>,
    cancel: Option<CancellationToken>,
}

impl<T: Transport> Resolver<T> {
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            cancel: None,
        }
    }

    /// Fetches `url` and returns its playlist. Never empty.
    pub async fn resolve(&mut self, url: &str) -> Playlist {
        let result = self.fetch(url).await;
        playlist(url, &result)
    }

    /// Fetches `url`, cancelling any fetch still in flight.
    pub async fn fetch(&mut self, url: &str) -> FetchResult {
        let token = self.renew();
        fetch(&*self.transport, url, &token).await
    }

    /// Resolves `url` on a background task and sends the outcome to `tx`,
    /// tagged with `generation`. Nothing is sent if the fetch is cancelled
    /// before it completes.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn spawn(&mut self, url: &str, generation: u64, tx: mpsc::UnboundedSender<Resolved>) {
        let token = self.renew();
        let transport = Arc::clone(&self.transport);
        let url = url.to_owned();

        tokio::spawn(async move {
            let result = fetch(&*transport, &url, &token).await;
            if token.is_cancelled() {
                trace!("dropping cancelled resolution of {url}");
                return;
            }

            let playlist = playlist(&url, &result);
            if tx
                .send(Resolved {
                    generation,
                    url,
                    playlist,
                })
                .is_err()
            {
                debug!("resolution finished after player went away");
            }
        });
    }

    /// Aborts the fetch in flight, if any.
    pub fn cancel(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }

    fn renew(&mut self) -> CancellationToken {
        self.cancel();
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        token
    }
}

impl<T: Transport> Drop for Resolver<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Builds the playlist for a fetch of `url`: the URIs of the first matching
/// format, or `url` alone when no format matches.
#[must_use]
pub fn playlist(url: &str, result: &FetchResult) -> Playlist {
    if let Some(error) = &result.error {
        warn!("fetching {url} failed: {error}");
    }

    match Format::detect(result) {
        Some(format) => {
            let uris = format.extract(result);
            debug!("{url} is a {format} playlist with {} entries", uris.len());
            if uris.is_empty() {
                // Nothing to play; the fallback keeps the playlist non-empty.
                return VecDeque::from([url.to_owned()]);
            }
            uris.into()
        }
        None => {
            debug!("{url} is not a playlist, trying it as a stream");
            VecDeque::from([url.to_owned()])
        }
    }
}

/// Runs one fetch to completion or cancellation.
async fn fetch<T: Transport>(transport: &T, url: &str, token: &CancellationToken) -> FetchResult {
    let mut result = FetchResult::default();

    let outcome = tokio::select! {
        biased;
        () = token.cancelled() => Err(Error::cancelled("fetch cancelled")),
        outcome = receive(transport, url, &mut result) => outcome,
    };

    match outcome {
        Ok(body) => result.body = Some(body),
        Err(e) => result.error = Some(e.to_string()),
    }

    result
}

/// Receives status, headers and body text of `url` into `result`.
async fn receive<T: Transport>(transport: &T, url: &str, result: &mut FetchResult) -> Result<String> {
    let mut response = transport.get(url).await?;

    let status = response.status();
    result.status_code = Some(status);
    result.headers = response.headers();
    trace!("{url}: {status} {:?}", result.headers);

    if status != http::StatusCode::OK.as_u16() {
        return Err(Error::unavailable(format!("unexpected status code {status}")));
    }

    let mut text = TextDecoder::default();
    while let Some(chunk) = response.next_chunk().await? {
        text.push(&chunk)?;
    }
    text.finish()
}

/// Incremental UTF-8 decoding of a chunked body.
#[derive(Debug, Default)]
struct TextDecoder {
    text: String,
    /// Start of a multi-byte sequence cut off by the chunk boundary.
    pending: Vec<u8>,
}

impl TextDecoder {
    fn push(&mut self, chunk: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(chunk);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => return Err(e.into()),
        };

        let rest = self.pending.split_off(valid);
        self.text.push_str(std::str::from_utf8(&self.pending)?);
        self.pending = rest;
        Ok(())
    }

    fn finish(self) -> Result<String> {
        if self.pending.is_empty() {
            Ok(self.text)
        } else {
            Err(Error::invalid_argument(format!(
                "body ends in an incomplete character ({} bytes)",
                self.pending.len()
            )))
        }
    }
}
