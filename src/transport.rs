//! Transport capability consumed by the resolver.
//!
//! A [`Transport`] issues a single HTTP GET and hands back a [`Response`]
//! that yields its status and headers up front and its body chunk by chunk.
//! The resolver turns that progression into one immutable [`FetchResult`]
//! per fetch attempt, which the playlist [`Format`](crate::format::Format)s
//! then sniff.

use std::future::Future;

use crate::error::Result;

/// Response headers as a case-sensitive multimap.
///
/// Keys are stored exactly as the transport reported them, so
/// `Content-Type` and `content-type` are different keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value under `name`, keeping any earlier values.
    pub fn append<K, V>(&mut self, name: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.push((name.into(), value.into()));
    }

    /// Returns the first value stored under exactly `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns every value stored under exactly `name`.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Converts `http` headers, decoding values that are not visible ASCII
/// lossily instead of dropping them.
impl From<&http::HeaderMap> for Headers {
    fn from(map: &http::HeaderMap) -> Self {
        map.iter()
            .map(|(name, value)| {
                (
                    name.as_str(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect()
    }
}

/// Outcome of a single fetch attempt.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchResult {
    /// HTTP status, if the server got as far as answering.
    pub status_code: Option<u16>,

    pub headers: Headers,

    /// Decoded response text; absent when the fetch failed.
    pub body: Option<String>,

    /// Transport-level failure, if any.
    pub error: Option<String>,
}

impl FetchResult {
    /// Header spellings probed, in order, for the content type and length.
    const CONTENT_TYPE_KEYS: [&'static str; 3] = ["Content-Type", "Content-type", "content-type"];
    const CONTENT_LENGTH_KEYS: [&'static str; 3] =
        ["Content-Length", "Content-length", "content-length"];

    /// Returns the media type of the response without its parameters:
    /// everything before the first `;`, untrimmed.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header_value(&Self::CONTENT_TYPE_KEYS)
    }

    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.header_value(&Self::CONTENT_LENGTH_KEYS)
            .and_then(|length| length.parse().ok())
    }

    /// Whether the fetch completed without a transport error.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    fn header_value(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|key| self.headers.get(key).filter(|value| !value.is_empty()))
            .and_then(|value| value.split(';').next())
    }
}

/// An HTTP response whose body is still being received.
pub trait Response: Send {
    fn status(&self) -> u16;

    fn headers(&self) -> Headers;

    /// Receives the next body chunk, or `None` once the body is complete.
    fn next_chunk(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;
}

/// Asynchronous HTTP GET.
///
/// Dropping the future returned by [`get`](Self::get) or
/// [`next_chunk`](Response::next_chunk) aborts the request.
pub trait Transport: Send + Sync + 'static {
    type Response: Response;

    fn get(&self, url: &str) -> impl Future<Output = Result<Self::Response>> + Send;
}
