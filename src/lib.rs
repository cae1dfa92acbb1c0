//! # gemscope
//!
//! gemscope is a client for the Gemini protocol: it sends a request over TLS,
//! dispatches on the status line of the response and parses `text/gemini`
//! bodies into typed lines.
//!
//! It implements the client side of [gemini://geminiprotocol.net/docs/protocol-specification.gmi](gemini://geminiprotocol.net/docs/protocol-specification.gmi).

#![warn(missing_docs)]
#![warn(unused_imports)]

mod client;
mod config;
pub mod gemtext;
pub mod url;

pub use client::{
    Client,
    ClientError,
    TlsConnection,
    TlsProtocolVersion,
    request::Request,
    response::{Body, Header, MimeType, Response},
    status::Status,
};
pub use config::{Config, ConfigError};
pub use gemtext::Line;
