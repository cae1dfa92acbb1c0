use super::{ClientError, status::Status};
use crate::{
    config::Config,
    gemtext::{Line, Parser, split_lines},
    url::resolve,
};
use encoding_rs::{Encoding, UTF_8};
use nom::{
    IResult,
    Parser as _,
    branch::alt,
    bytes::complete::{take_till, take_till1, take_while_m_n},
    character::complete::{anychar, char},
    combinator::{map_res, opt, rest},
    multi::many0,
    sequence::{delimited, preceded},
};
use std::{borrow::Cow, fmt, io};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;
use url::Url;

/// The media type assumed when a success response does not name one.
const DEFAULT_MIME_TYPE: &str = "text/gemini; charset=utf-8";

/// A MIME type, as sent in the header of a success response.
#[derive(Debug, Clone, PartialEq)]
pub struct MimeType {
    /// The lower-cased `type/subtype`.
    pub essence: String,
    /// The `key=value` parameters in order, keys lower-cased.
    pub parameters: Vec<(String, String)>,
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.essence)?;
        for (key, value) in &self.parameters {
            write!(f, "; {key}={value}")?;
        }
        Ok(())
    }
}

impl MimeType {
    fn parameter(input: &str) -> IResult<&str, (&str, &str)> {
        let (input, _) = char(';').parse(input)?;
        let (input, key) = take_till1(|c: char| c == '=' || c == ';').parse(input)?;
        let (input, _) = char('=').parse(input)?;
        let (input, value) = alt((
            delimited(char('"'), take_till(|c: char| c == '"'), char('"')),
            take_till(|c: char| c == ';'),
        )).parse(input)?;

        Ok((input, (key.trim(), value.trim())))
    }

    fn mime_type(input: &str) -> IResult<&str, (&str, Vec<(&str, &str)>)> {
        let (input, essence) = take_till(|c: char| c == ';').parse(input)?;
        let (input, parameters) = many0(Self::parameter).parse(input)?;

        Ok((input, (essence.trim(), parameters)))
    }

    /// Parse a media type leniently; malformed trailing parameters are ignored.
    ///
    /// An empty string gives the default `text/gemini; charset=utf-8`.
    pub fn parse(input: &str) -> Self {
        let input = if input.trim().is_empty() { DEFAULT_MIME_TYPE } else { input };

        let (essence, parameters) = match Self::mime_type(input) {
            Ok((_, parsed)) => parsed,
            Err(_) => (input.trim(), Vec::new()),
        };

        Self {
            essence: essence.to_ascii_lowercase(),
            parameters: parameters
                .into_iter()
                .map(|(key, value)| (key.to_ascii_lowercase(), value.to_string()))
                .collect(),
        }
    }

    /// The `charset` parameter, if present.
    pub fn charset(&self) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(key, _)| key == "charset")
            .map(|(_, value)| value.as_str())
    }

    /// Whether this is a gemtext document.
    pub fn is_gemtext(&self) -> bool {
        self.essence == "text/gemini"
    }
}

/// The body of a success response.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// A parsed `text/gemini` document.
    Gemtext(Vec<Line>),
    /// Any other media type, as received.
    Raw(Vec<u8>),
}

/// The status line of a response: a two digit code and an optional detail.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// The two digit status code.
    pub code: u8,
    /// Everything after the separator following the code, if the line is longer than the code.
    pub detail: Option<String>,
}

impl Header {
    fn status_line(input: &str) -> IResult<&str, (u8, Option<&str>)> {
        let (input, code) = map_res(
            take_while_m_n(2, 2, |c: char| c.is_ascii_digit()),
            str::parse::<u8>,
        ).parse(input)?;
        let (input, detail) = opt(preceded(anychar, rest)).parse(input)?;

        Ok((input, (code, detail)))
    }
}

impl TryFrom<&str> for Header {
    type Error = ClientError;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let (_, (code, detail)) = Self::status_line(line)
            .map_err(|_| ClientError::Format(format!("status line does not start with two digits: {line:?}")))?;

        Ok(Self { code, detail: detail.map(str::to_string) })
    }
}

/// A response to a request, by status class.
/// See [gemini://geminiprotocol.net/docs/protocol-specification.gmi](gemini://geminiprotocol.net/docs/protocol-specification.gmi) for more information on what these mean and how they should be handled.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// 1x: a request for input from the user.
    Input {
        /// The status code.
        code: u8,
        /// The prompt that should be displayed to the user.
        prompt: String,
    },
    /// 2x: a successful response.
    Success {
        /// The status code.
        code: u8,
        /// The MIME type of the body.
        mime_type: MimeType,
        /// The body of the response.
        body: Body,
    },
    /// 3x: a redirect to a new URL.
    Redirect {
        /// The status code.
        code: u8,
        /// The URL to redirect to, resolved against the requested URL.
        url: Url,
    },
    /// 4x and 5x: a temporary or permanent failure.
    Failure {
        /// The status code.
        code: u8,
        /// Information about the failure.
        information: String,
    },
    /// 6x: a client certificate is needed.
    CertificateRequired {
        /// The status code.
        code: u8,
        /// Information about the failure.
        information: String,
    },
}

/// Read the status line: `\r` is dropped, `\n` or the end of the stream ends it.
pub(crate) async fn read_header<R>(reader: &mut R, max_length: usize) -> Result<Header, ClientError>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();

    loop {
        let byte = match reader.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(ClientError::Read(e.to_string())),
        };

        match byte {
            b'\n' => break,
            b'\r' => continue,
            byte => line.push(byte),
        }

        if line.len() > max_length {
            return Err(ClientError::Protocol(format!("status line exceeds {max_length} bytes")));
        }
    }

    let line = String::from_utf8(line)
        .map_err(|e| ClientError::Decoding(format!("status line is not UTF-8: {e}")))?;
    debug!(status_line = %line, "received status line");

    Header::try_from(line.as_str())
}

/// Decode `bytes` with the named charset, UTF-8 if none is named.
///
/// A leading byte order mark for that charset is dropped.
fn decode<'a>(bytes: &'a [u8], charset: Option<&str>) -> Result<Cow<'a, str>, ClientError> {
    let encoding = match charset {
        Some(label) => Encoding::for_label(label.as_bytes())
            .ok_or_else(|| ClientError::Decoding(format!("unknown charset: {label}")))?,
        None => UTF_8,
    };

    let bytes = match Encoding::for_bom(bytes) {
        Some((bom_encoding, bom_length)) if bom_encoding == encoding => &bytes[bom_length..],
        _ => bytes,
    };

    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .ok_or_else(|| ClientError::Decoding(format!("body is not valid {}", encoding.name())))
}

/// Read everything up to the end of the stream, failing past `max_size` bytes.
async fn read_to_close<R>(reader: R, max_size: usize) -> Result<Vec<u8>, ClientError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let limit = u64::try_from(max_size).unwrap_or(u64::MAX).saturating_add(1);

    match reader.take(limit).read_to_end(&mut buffer).await {
        Ok(_) => {}
        // plenty of servers close the socket without a TLS close_notify
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            debug!("connection closed without close_notify");
        }
        Err(e) => return Err(ClientError::Read(e.to_string())),
    }

    if buffer.len() > max_size {
        return Err(ClientError::BodyTooLarge(max_size));
    }

    Ok(buffer)
}

impl Response {
    /// Read a whole response: the status line, then the body of a success response.
    ///
    /// `request_url` is the URL that was requested; links and relative redirects
    /// are resolved against it.
    pub async fn read_from<R>(mut reader: R, request_url: &Url, config: &Config) -> Result<Self, ClientError>
    where
        R: AsyncRead + Unpin,
    {
        let header = read_header(&mut reader, config.max_line_length).await?;
        Self::from_header(header, reader, request_url, config).await
    }

    /// Build the response for an already read status line, reading the body from `reader` if there is one.
    pub(crate) async fn from_header<R>(header: Header, reader: R, request_url: &Url, config: &Config) -> Result<Self, ClientError>
    where
        R: AsyncRead + Unpin,
    {
        let Header { code, detail } = header;
        let detail = detail.unwrap_or_default();

        match code / 10 {
            1 => Ok(Self::Input { code, prompt: detail }),
            2 => {
                let mime_type = MimeType::parse(&detail);
                let bytes = read_to_close(reader, config.max_body_size).await?;
                debug!(%mime_type, size = bytes.len(), "read response body");

                let body = if mime_type.is_gemtext() {
                    let text = decode(&bytes, mime_type.charset())?;
                    let lines = Parser::new(request_url, split_lines(&text))
                        .max_line_length(config.max_line_length)
                        .collect();
                    Body::Gemtext(lines)
                } else {
                    Body::Raw(bytes)
                };

                Ok(Self::Success { code, mime_type, body })
            }
            3 => {
                let target = detail.trim();
                if target.is_empty() {
                    return Err(ClientError::Protocol(format!("redirect {code} has no target")));
                }

                let url = resolve(request_url, target)
                    .map_err(|e| ClientError::Protocol(format!("invalid redirect target {target:?}: {e}")))?;

                Ok(Self::Redirect { code, url })
            }
            4 | 5 => Ok(Self::Failure { code, information: detail }),
            6 => Ok(Self::CertificateRequired { code, information: detail }),
            class => Err(ClientError::Protocol(format!("unrecognized status class {class} in status {code:02}"))),
        }
    }

    /// The numeric status code.
    pub fn code(&self) -> u8 {
        match self {
            Self::Input { code, .. }
            | Self::Success { code, .. }
            | Self::Redirect { code, .. }
            | Self::Failure { code, .. }
            | Self::CertificateRequired { code, .. } => *code,
        }
    }

    /// The named status.
    pub fn status(&self) -> Status {
        Status::from(self.code())
    }

    /// Whether the server asked for input that should not be echoed.
    pub fn is_sensitive_input(&self) -> bool {
        self.status() == Status::SensitiveInput
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_url() -> Url {
        Url::parse("gemini://example.org/docs/index.gmi").unwrap()
    }

    async fn response(raw: &[u8]) -> Result<Response, ClientError> {
        Response::read_from(raw, &request_url(), &Config::default()).await
    }

    #[test]
    fn header_with_detail() {
        let header = Header::try_from("51 not found");
        assert_eq!(header, Ok(Header { code: 51, detail: Some("not found".to_string()) }));
    }

    #[test]
    fn header_without_detail() {
        assert_eq!(Header::try_from("20"), Ok(Header { code: 20, detail: None }));
    }

    #[test]
    fn header_separator_is_any_character() {
        assert_eq!(Header::try_from("10\tName?"), Ok(Header { code: 10, detail: Some("Name?".to_string()) }));
        assert_eq!(Header::try_from("20 "), Ok(Header { code: 20, detail: Some(String::new()) }));
    }

    #[test]
    fn malformed_headers() {
        for line in ["", "5", "x1", "1x", " 20 text/gemini"] {
            assert!(matches!(Header::try_from(line), Err(ClientError::Format(_))), "{line:?}");
        }
    }

    #[test]
    fn mime_type_parameters() {
        let mime_type = MimeType::parse("Text/Gemini; Charset=ISO-8859-1; lang=en");
        assert_eq!(mime_type.essence, "text/gemini");
        assert_eq!(mime_type.charset(), Some("ISO-8859-1"));
        assert!(mime_type.is_gemtext());
        assert_eq!(mime_type.to_string(), "text/gemini; charset=ISO-8859-1; lang=en");
    }

    #[test]
    fn mime_type_quoted_parameter() {
        let mime_type = MimeType::parse(r#"text/plain;charset="utf-8""#);
        assert_eq!(mime_type.charset(), Some("utf-8"));
        assert!(!mime_type.is_gemtext());
    }

    #[test]
    fn empty_mime_type_defaults_to_gemtext() {
        let mime_type = MimeType::parse("");
        assert!(mime_type.is_gemtext());
        assert_eq!(mime_type.charset(), Some("utf-8"));
    }

    #[tokio::test]
    async fn every_class_dispatches() {
        for class in 1..=6u8 {
            for digit in 0..=9u8 {
                let detail = match class {
                    2 => "text/plain",
                    3 => "gemini://example.org/elsewhere",
                    _ => "some detail here",
                };
                let code = class * 10 + digit;
                let raw = format!("{code} {detail}\r\n");
                let response = response(raw.as_bytes()).await.unwrap();

                assert_eq!(response.code(), code);
                match response {
                    Response::Input { prompt, .. } => assert_eq!((class, prompt.as_str()), (1, detail)),
                    Response::Success { mime_type, .. } => assert_eq!((class, mime_type.essence.as_str()), (2, detail)),
                    Response::Redirect { url, .. } => assert_eq!((class, url.as_str()), (3, detail)),
                    Response::Failure { information, .. } => {
                        assert!(class == 4 || class == 5);
                        assert_eq!(information, detail);
                    }
                    Response::CertificateRequired { information, .. } => assert_eq!((class, information.as_str()), (6, detail)),
                }
            }
        }
    }

    #[tokio::test]
    async fn input() {
        let response = response(b"10 What is the capital of France?\r\n").await;
        assert_eq!(response, Ok(Response::Input { code: 10, prompt: "What is the capital of France?".to_string() }));
    }

    #[tokio::test]
    async fn sensitive_input() {
        let response = response(b"11 Password\r\n").await.unwrap();
        assert!(response.is_sensitive_input());
    }

    #[tokio::test]
    async fn not_found() {
        let response = response(b"51 not found\r\n").await.unwrap();
        assert_eq!(response, Response::Failure { code: 51, information: "not found".to_string() });
        assert_eq!(response.status(), Status::NotFound);
    }

    #[tokio::test]
    async fn success_without_body() {
        let response = response(b"20 text/gemini\r\n").await;
        assert_eq!(response, Ok(Response::Success {
            code: 20,
            mime_type: MimeType { essence: "text/gemini".to_string(), parameters: Vec::new() },
            body: Body::Gemtext(Vec::new()),
        }));
    }

    #[tokio::test]
    async fn success_gemtext() {
        let raw = b"20 text/gemini\r\n# Hello\r\n\r\n=> faq.gmi FAQ\r\n```\r\nverbatim \r\n```\r\n";
        let Ok(Response::Success { body, .. }) = response(raw).await else {
            panic!("expected a success response");
        };

        assert_eq!(body, Body::Gemtext(vec![
            Line::Heading { level: 1, text: "Hello".to_string() },
            Line::Link {
                url_hint: "faq.gmi".to_string(),
                absolute_url: Url::parse("gemini://example.org/docs/faq.gmi").unwrap(),
                label: "FAQ".to_string(),
            },
            Line::Preformatted { alt_text: String::new(), body: "verbatim ".to_string() },
        ]));
    }

    #[tokio::test]
    async fn success_raw_body() {
        let mut raw = b"20 image/png\r\n".to_vec();
        raw.extend_from_slice(&[0x89, b'P', b'N', b'G', 0x00, 0xff]);
        let response = response(&raw).await;

        assert_eq!(response, Ok(Response::Success {
            code: 20,
            mime_type: MimeType { essence: "image/png".to_string(), parameters: Vec::new() },
            body: Body::Raw(vec![0x89, b'P', b'N', b'G', 0x00, 0xff]),
        }));
    }

    #[tokio::test]
    async fn success_declared_charset() {
        let raw = b"20 text/gemini; charset=iso-8859-1\r\ncaf\xe9\n";
        let Ok(Response::Success { body, .. }) = response(raw).await else {
            panic!("expected a success response");
        };

        assert_eq!(body, Body::Gemtext(vec![Line::Text { content: "café".to_string() }]));
    }

    #[tokio::test]
    async fn byte_order_mark_is_dropped() {
        let raw = b"20 text/gemini\r\n\xef\xbb\xbf# Title\n";
        let Ok(Response::Success { body, .. }) = response(raw).await else {
            panic!("expected a success response");
        };

        assert_eq!(body, Body::Gemtext(vec![Line::Heading { level: 1, text: "Title".to_string() }]));
    }

    #[test]
    fn byte_order_mark_of_other_charset_is_kept() {
        // in windows-1252 the UTF-8 mark is ordinary text
        assert_eq!(decode(b"\xef\xbb\xbfabc", Some("utf-8")).unwrap(), "abc");
        assert_eq!(decode(b"\xef\xbb\xbfabc", Some("iso-8859-1")).unwrap(), "\u{ef}\u{bb}\u{bf}abc");
    }

    #[tokio::test]
    async fn unknown_charset() {
        let response = response(b"20 text/gemini; charset=klingon\r\nhi\n").await;
        assert!(matches!(response, Err(ClientError::Decoding(_))));
    }

    #[tokio::test]
    async fn invalid_utf8_body() {
        let response = response(b"20 text/gemini\r\n\xff\xfe\n").await;
        assert!(matches!(response, Err(ClientError::Decoding(_))));
    }

    #[tokio::test]
    async fn body_too_large() {
        let config = Config { max_body_size: 4, ..Config::default() };
        let response = Response::read_from(&b"20 text/plain\r\n12345"[..], &request_url(), &config).await;
        assert_eq!(response, Err(ClientError::BodyTooLarge(4)));
    }

    #[tokio::test]
    async fn body_at_limit() {
        let config = Config { max_body_size: 5, ..Config::default() };
        let response = Response::read_from(&b"20 text/plain\r\n12345"[..], &request_url(), &config).await;
        assert!(matches!(response, Ok(Response::Success { body: Body::Raw(_), .. })));
    }

    #[tokio::test]
    async fn relative_redirect() {
        let response = response(b"31 ../moved.gmi\r\n").await;
        assert_eq!(response, Ok(Response::Redirect {
            code: 31,
            url: Url::parse("gemini://example.org/moved.gmi").unwrap(),
        }));
    }

    #[tokio::test]
    async fn redirect_without_target() {
        let response = response(b"30\r\n").await;
        assert!(matches!(response, Err(ClientError::Protocol(_))));
    }

    #[tokio::test]
    async fn certificate_required() {
        let response = response(b"60 Please log in\r\n").await;
        assert_eq!(response, Ok(Response::CertificateRequired { code: 60, information: "Please log in".to_string() }));
    }

    #[tokio::test]
    async fn status_line_ends_at_stream_end() {
        let response = response(b"40").await;
        assert_eq!(response, Ok(Response::Failure { code: 40, information: String::new() }));
    }

    #[tokio::test]
    async fn unrecognized_class() {
        for raw in [&b"00 zero\r\n"[..], b"70 meow\r\n", b"81 x\r\n", b"99\r\n"] {
            assert!(matches!(response(raw).await, Err(ClientError::Protocol(_))));
        }
    }

    #[tokio::test]
    async fn malformed_status_line() {
        for raw in [&b""[..], b"2\r\n", b"ok\r\n", b"2x text/gemini\r\n"] {
            assert!(matches!(response(raw).await, Err(ClientError::Format(_))));
        }
    }

    #[tokio::test]
    async fn status_line_too_long() {
        let config = Config { max_line_length: 8, ..Config::default() };
        let response = Response::read_from(&b"20 text/gemini\r\n"[..], &request_url(), &config).await;
        assert!(matches!(response, Err(ClientError::Protocol(_))));
    }
}
