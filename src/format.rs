//! Playlist format sniffing.
//!
//! Five legacy streaming-playlist formats are recognized. Detection never
//! looks at the URL: a [`FetchResult`] matches a [`Format`] only when its
//! media type is on the format's allow-list and its body carries the
//! format's signature.
//!
//! | Format | Signature |
//! |--------|-----------|
//! | ASF    | starts with `[Reference]` |
//! | ASX    | starts with `<asx` |
//! | M3U    | some line starts with `http://` or `https://` |
//! | PLS    | starts with `[playlist]` |
//! | RAM    | some line starts with `rtsp`, or contains `http://`/`https://` |
//!
//! Formats are tried in the order of [`Format::ALL`]; the first one that
//! validates wins.
//!
//! # Example
//!
//! ```rust
//! use streamtune::format::Format;
//!
//! if let Some(format) = Format::detect(&result) {
//!     let uris = format.extract(&result);
//! }
//! ```

use std::{fmt, sync::LazyLock};

use regex_lite::Regex;

use crate::transport::FetchResult;

/// Generic binary media type accepted by every format.
const OCTET_STREAM: &str = "application/octet-stream";

static ASF_REF: LazyLock<Regex> = LazyLock::new(|| compile(r"(?im)^Ref\d+=(.*)"));
static ASX_REF: LazyLock<Regex> =
    LazyLock::new(|| compile(r#"(?i)<ref\s+href\s*=\s*["']([^"']*)["']"#));
static M3U_URL: LazyLock<Regex> = LazyLock::new(|| compile(r"(?im)^https?://.*"));
static PLS_FILE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?im)^File\d+=(.*)"));
// `rtsp` is anchored to the line start, `http(s)://` may appear anywhere.
static RAM_URL: LazyLock<Regex> = LazyLock::new(|| compile(r"(?im)^rtsp.*|https?://.*"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("playlist pattern is valid")
}

/// A streaming playlist format.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Format {
    /// Windows Media ASF reference file (`[Reference]` / `RefN=`).
    Asf,
    /// Windows Media ASX metafile (`<asx>` / `<ref href>`).
    Asx,
    /// Plain or extended M3U.
    M3u,
    /// Shoutcast PLS (`[playlist]` / `FileN=`).
    Pls,
    /// RealAudio metafile.
    Ram,
}

impl Format {
    /// All formats in detection priority order.
    pub const ALL: [Format; 5] = [Self::Asf, Self::Asx, Self::M3u, Self::Pls, Self::Ram];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Asf => "ASF",
            Self::Asx => "ASX",
            Self::M3u => "M3U",
            Self::Pls => "PLS",
            Self::Ram => "RAM",
        }
    }

    /// Media types this format may be served as.
    #[must_use]
    pub fn content_types(self) -> &'static [&'static str] {
        match self {
            Self::Asf => &[OCTET_STREAM, "video/x-ms-asf"],
            Self::Asx => &[
                OCTET_STREAM,
                "audio/x-ms-wax",
                "video/x-ms-wvx",
                "video/x-ms-wmv",
                "video/x-ms-asf",
            ],
            Self::M3u => &[OCTET_STREAM, "audio/mpegurl", "audio/x-mpegurl"],
            Self::Pls => &[OCTET_STREAM, "audio/x-scpls", "application/pls+xml"],
            Self::Ram => &[
                OCTET_STREAM,
                "audio/x-pn-realaudio",
                "audio/vnd.rn-realaudio",
            ],
        }
    }

    /// Whether `result` holds a playlist in this format.
    ///
    /// Requires a successful fetch, a non-empty body, an allowed media type
    /// and the format's body signature.
    #[must_use]
    pub fn validate(self, result: &FetchResult) -> bool {
        if result.error.is_some() {
            return false;
        }

        let Some(body) = result.body.as_deref().filter(|body| !body.is_empty()) else {
            return false;
        };

        let Some(content_type) = result.content_type() else {
            return false;
        };
        if !self.content_types().contains(&content_type) {
            return false;
        }

        match self {
            Self::Asf => has_signature(body, "[reference]"),
            Self::Asx => has_signature(body, "<asx"),
            Self::M3u => M3U_URL.is_match(body),
            Self::Pls => has_signature(body, "[playlist]"),
            Self::Ram => RAM_URL.is_match(body),
        }
    }

    /// Extracts the stream URIs of `result` in document order.
    ///
    /// Only meaningful when [`validate`](Self::validate) holds; returns an
    /// empty list otherwise.
    #[must_use]
    pub fn extract(self, result: &FetchResult) -> Vec<String> {
        if !self.validate(result) {
            return Vec::new();
        }

        let body = result.body.as_deref().unwrap_or_default();
        match self {
            Self::Asf => captures(&ASF_REF, body),
            Self::Asx => captures(&ASX_REF, body),
            Self::M3u => matches(&M3U_URL, body),
            Self::Pls => captures(&PLS_FILE, body),
            Self::Ram => matches(&RAM_URL, body),
        }
    }

    /// Returns the first format, in priority order, that validates `result`.
    #[must_use]
    pub fn detect(result: &FetchResult) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.validate(result))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Trims whitespace (including a byte order mark) and compares the start of
/// `body` against a lower-case ASCII `signature`, ignoring case.
fn has_signature(body: &str, signature: &str) -> bool {
    let body = body.trim_start_matches(|chr: char| chr.is_whitespace() || chr == '\u{feff}');
    body.get(..signature.len())
        .is_some_and(|start| start.eq_ignore_ascii_case(signature))
}

/// Whole matches, without a trailing carriage return.
fn matches(pattern: &Regex, body: &str) -> Vec<String> {
    pattern
        .find_iter(body)
        .map(|found| strip_cr(found.as_str()))
        .collect()
}

/// First capture group of every match, without a trailing carriage return.
fn captures(pattern: &Regex, body: &str) -> Vec<String> {
    pattern
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|found| strip_cr(found.as_str()))
        .collect()
}

fn strip_cr(line: &str) -> String {
    line.trim_end_matches('\r').to_owned()
}
