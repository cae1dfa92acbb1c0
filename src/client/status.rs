/// A named Gemini status code.
/// See [gemini://geminiprotocol.net/docs/protocol-specification.gmi](gemini://geminiprotocol.net/docs/protocol-specification.gmi) for more information on what these mean and how they should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 10: a request for input from the user.
    Input,
    /// 11: a request for sensitive input from the user.
    SensitiveInput,
    /// 20: a successful response.
    Success,
    /// 30: a temporary redirect to a new URL.
    TemporaryRedirect,
    /// 31: a permanent redirect to a new URL.
    PermanentRedirect,
    /// 40: a temporary failure.
    TemporaryFailure,
    /// 41: the server is currently unavailable.
    ServerUnavailable,
    /// 42: a CGI error.
    CGIError,
    /// 43: a proxy error.
    ProxyError,
    /// 44: a rate limit was enforced, the server is asking the client to slow down.
    SlowDown,
    /// 50: a permanent failure.
    PermanentFailure,
    /// 51: the requested resource was not found.
    NotFound,
    /// 52: the requested resource is no longer available.
    Gone,
    /// 53: the proxy request was refused.
    ProxyRequestRefused,
    /// 59: the request was invalid.
    BadRequest,
    /// 60: a client certificate is required.
    ClientCertificateRequired,
    /// 61: the client certificate given was not authorized.
    CertificateNotAuthorized,
    /// 62: the client certificate given was not valid.
    CertificateNotValid,
    /// Any other code; the class is still given by the leading digit.
    Other(u8),
}

impl From<u8> for Status {
    fn from(code: u8) -> Self {
        match code {
            10 => Self::Input,
            11 => Self::SensitiveInput,
            20 => Self::Success,
            30 => Self::TemporaryRedirect,
            31 => Self::PermanentRedirect,
            40 => Self::TemporaryFailure,
            41 => Self::ServerUnavailable,
            42 => Self::CGIError,
            43 => Self::ProxyError,
            44 => Self::SlowDown,
            50 => Self::PermanentFailure,
            51 => Self::NotFound,
            52 => Self::Gone,
            53 => Self::ProxyRequestRefused,
            59 => Self::BadRequest,
            60 => Self::ClientCertificateRequired,
            61 => Self::CertificateNotAuthorized,
            62 => Self::CertificateNotValid,
            other => Self::Other(other),
        }
    }
}

impl Status {
    /// The numeric code.
    pub fn code(&self) -> u8 {
        match self {
            Self::Input                     => 10,
            Self::SensitiveInput            => 11,
            Self::Success                   => 20,
            Self::TemporaryRedirect         => 30,
            Self::PermanentRedirect         => 31,
            Self::TemporaryFailure          => 40,
            Self::ServerUnavailable         => 41,
            Self::CGIError                  => 42,
            Self::ProxyError                => 43,
            Self::SlowDown                  => 44,
            Self::PermanentFailure          => 50,
            Self::NotFound                  => 51,
            Self::Gone                      => 52,
            Self::ProxyRequestRefused       => 53,
            Self::BadRequest                => 59,
            Self::ClientCertificateRequired => 60,
            Self::CertificateNotAuthorized  => 61,
            Self::CertificateNotValid       => 62,
            Self::Other(code)               => *code,
        }
    }

    /// The status class, i.e. the leading digit.
    pub fn class(&self) -> u8 {
        self.code() / 10
    }
}
