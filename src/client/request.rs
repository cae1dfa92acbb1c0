use super::ClientError;
use crate::url::{Host, is_gemini, normalize};
use std::fmt;
use url::Url;

/// A request to a given URL.
///
/// Only absolute `gemini://` URLs with a host make a request. The fragment is
/// never sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    url: Url,
    host: Host,
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\r\n", self.url)
    }
}

impl Request {
    /// Create a request for `url`.
    pub fn new(mut url: Url) -> Result<Self, ClientError> {
        if !is_gemini(&url) {
            return Err(ClientError::InvalidUrl(format!("not a gemini URL: {url}")));
        }

        let host = Host::from_url(&url)
            .ok_or_else(|| ClientError::InvalidUrl(format!("URL must contain a host: {url}")))?;

        url.set_fragment(None);

        Ok(Self { url: normalize(url), host })
    }

    /// The URL being requested.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The host and port to connect to.
    pub fn host(&self) -> Host {
        self.host.clone()
    }
}

impl TryFrom<&str> for Request {
    type Error = ClientError;

    fn try_from(url: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(url).map_err(|e| ClientError::InvalidUrl(format!("{url}: {e}")))?;
        Self::new(url)
    }
}
