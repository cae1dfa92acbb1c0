pub mod request;
pub mod response;
pub mod status;
mod verifier;

use crate::{config::Config, url::Host};
use request::Request;
use response::{Response, read_header};
use rustls::pki_types::ServerName;
use std::{sync::Arc, time::Duration};
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::TcpStream,
    time::timeout,
};
use tokio_rustls::{TlsConnector, client::TlsStream};
use tracing::{debug, info};
use url::Url;
use verifier::{ValidityVerifier, fingerprint};

/// An error that can occur when the client tries to do something.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// The URL is not an absolute `gemini://` URL with a host.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// The host could not be resolved or connected to, or the TLS handshake failed.
    #[error("connection failed: {0}")]
    Connection(String),
    /// A deadline expired; names what was being waited on.
    #[error("timed out while {0}")]
    Timeout(&'static str),
    /// The status line does not start with a two digit status code.
    #[error("malformed response header: {0}")]
    Format(String),
    /// The response does not follow the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The response could not be decoded with its declared or assumed charset.
    #[error("decoding error: {0}")]
    Decoding(String),
    /// The response body is larger than the configured maximum.
    #[error("response body exceeds {0} bytes")]
    BodyTooLarge(usize),
    /// Reading the response failed.
    #[error("failed to read response: {0}")]
    Read(String),
}

/// Run `future`, failing with [`ClientError::Timeout`] if it takes longer than `limit`.
async fn within<T, F>(limit: Duration, phase: &'static str, future: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    timeout(limit, future).await.map_err(|_| ClientError::Timeout(phase))?
}

/// A TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TlsProtocolVersion {
    /// TLS 1.3.
    Tls1_3,
    /// TLS 1.2.
    Tls1_2,
    /// An unknown TLS protocol version.
    Unknown,
}

/// An open TLS connection to a Gemini server, good for a single request.
pub struct TlsConnection {
    stream: TlsStream<TcpStream>,
    config: Arc<Config>,
    /// The TLS protocol version used by the connected server.
    pub protocol_version: TlsProtocolVersion,
    /// The SHA-256 fingerprint of the server certificate, hex encoded.
    pub fingerprint: Option<String>,
}

impl TlsConnection {
    /// Send a request and read the whole response.
    ///
    /// The connection is consumed and closed whatever the outcome.
    pub async fn send(mut self, request: Request) -> Result<Response, ClientError> {
        let read_timeout = self.config.read_timeout();

        within(read_timeout, "sending the request", async {
            self.stream
                .write_all(request.to_string().as_bytes())
                .await
                .map_err(|e| ClientError::Connection(e.to_string()))?;
            self.stream
                .flush()
                .await
                .map_err(|e| ClientError::Connection(e.to_string()))
        }).await?;

        let mut reader = BufReader::new(self.stream);

        let header = within(
            read_timeout,
            "reading the status line",
            read_header(&mut reader, self.config.max_line_length),
        ).await?;

        let response = within(
            read_timeout,
            "reading the response body",
            Response::from_header(header, &mut reader, request.url(), &self.config),
        ).await?;

        info!(url = %request.url(), code = response.code(), "request complete");
        Ok(response)
    }
}

/// A client for the Gemini protocol.
pub struct Client {
    connector: TlsConnector,
    config: Arc<Config>,
}

impl Client {
    /// Create a new client with the default configuration.
    pub fn new() -> Result<Self, ClientError> {
        Self::with_config(Config::default())
    }

    /// Create a new client with the given limits and deadlines.
    pub fn with_config(config: Config) -> Result<Self, ClientError> {
        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());

        let tls_config = rustls::ClientConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
            .map_err(|e| ClientError::Connection(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(ValidityVerifier::new(provider)))
            .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(tls_config)),
            config: Arc::new(config),
        })
    }

    /// The configuration requests are made with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Establish a TLS connection with the host of a request.
    pub async fn connect(&self, request: &Request) -> Result<TlsConnection, ClientError> {
        let Host { name, port } = request.host();
        let connect_timeout = self.config.connect_timeout();

        debug!(host = %name, port, "connecting");
        let tcp_stream = within(connect_timeout, "connecting", async {
            TcpStream::connect((name.as_str(), port))
                .await
                .map_err(|e| ClientError::Connection(format!("{name}:{port}: {e}")))
        }).await?;

        // server name indication
        let domain = ServerName::try_from(name.clone())
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        let tls_stream = within(connect_timeout, "negotiating TLS", async {
            self.connector
                .connect(domain, tcp_stream)
                .await
                .map_err(|e| ClientError::Connection(format!("TLS handshake with {name} failed: {e}")))
        }).await?;

        let session = tls_stream.get_ref().1;

        let protocol_version = session.protocol_version()
            .map(|v| match v {
                rustls::ProtocolVersion::TLSv1_3 => TlsProtocolVersion::Tls1_3,
                rustls::ProtocolVersion::TLSv1_2 => TlsProtocolVersion::Tls1_2,
                _ => TlsProtocolVersion::Unknown,
            })
            .unwrap_or(TlsProtocolVersion::Unknown);

        let fingerprint = session.peer_certificates()
            .and_then(|certificates| certificates.first())
            .map(fingerprint);

        debug!(host = %name, ?protocol_version, "TLS established");

        Ok(TlsConnection { stream: tls_stream, config: self.config.clone(), protocol_version, fingerprint })
    }

    /// Send a request to its host and return the response.
    pub async fn send_request(&self, request: Request) -> Result<Response, ClientError> {
        let connection = self.connect(&request).await?;
        connection.send(request).await
    }

    /// Request a URL and return the response.
    pub async fn request(&self, url: Url) -> Result<Response, ClientError> {
        self.send_request(Request::new(url)?).await
    }
}
