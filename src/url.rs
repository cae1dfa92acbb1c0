//! Helpers for connecting to and navigating between Gemini URLs.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::fmt;
use url::Url;

/// The port used when a URL does not name one.
pub const DEFAULT_PORT: u16 = 1965;
const DEFAULT_SCHEME: &str = "gemini";
const DEFAULT_PATH: &str = "/";

// unreserved characters are left alone, everything else in user input is escaped
const INPUT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// The host and port a request connects to.
#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    /// The hostname or IP address, without IPv6 brackets.
    pub name: String,
    /// The port, [`DEFAULT_PORT`] if the URL does not name one.
    pub port: u16,
}

impl Host {
    /// Extract the host and port from a URL, if it has a non-empty host.
    pub fn from_url(url: &Url) -> Option<Self> {
        let name = match url.host()? {
            url::Host::Domain(domain) => domain.to_string(),
            url::Host::Ipv4(addr) => addr.to_string(),
            url::Host::Ipv6(addr) => addr.to_string(),
        };

        if name.is_empty() {
            return None;
        }

        Some(Self { name, port: url.port().unwrap_or(DEFAULT_PORT) })
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.contains(':') {
            write!(f, "[{}]:{}", self.name, self.port)
        } else {
            write!(f, "{}:{}", self.name, self.port)
        }
    }
}

/// Check whether a URL should be routed back into the Gemini client.
pub fn is_gemini(url: &Url) -> bool {
    url.scheme().eq_ignore_ascii_case(DEFAULT_SCHEME)
}

/// Resolve a possibly relative reference against a base URL.
pub fn resolve(base: &Url, reference: &str) -> Result<Url, url::ParseError> {
    base.join(reference)
}

/// Replace the query of `url` with the percent-encoded user input.
///
/// This is how a response to an input prompt is submitted: the same URL is
/// requested again with the text as its query.
pub fn with_input(url: &Url, input: &str) -> Url {
    let mut url = url.clone();
    let encoded = utf8_percent_encode(input, INPUT).to_string();
    url.set_query(Some(&encoded));
    url
}

/// Give a URL with an empty path the root path, leaving anything else as is.
pub(crate) fn normalize(mut url: Url) -> Url {
    if url.path().is_empty() {
        url.set_path(DEFAULT_PATH);
    }
    url
}
