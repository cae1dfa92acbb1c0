use serde::{Deserialize, Serialize};
use std::{fs::File, io::{BufReader, BufWriter}, path::Path, time::Duration};

use crate::gemtext::DEFAULT_MAX_LINE_LENGTH;

/// An error that can occur while loading or saving a [`Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The path does not name a JSON file.
    #[error("config path must end with .json: {0}")]
    InvalidPath(String),
    /// The file could not be read or written.
    #[error("config file error: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid JSON for a config.
    #[error("config file is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Limits and deadlines applied to every request.
///
/// Missing fields in a config file take their default value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Deadline for resolving and connecting, and separately for the TLS handshake.
    pub connect_timeout_ms: u64,
    /// Deadline for sending the request and reading the status line, and separately for reading the body.
    pub read_timeout_ms: u64,
    /// The largest body that is read before giving up.
    pub max_body_size: usize,
    /// The longest status line or gemtext line, in bytes.
    pub max_line_length: usize,
    /// How many redirects in a row are followed.
    pub max_redirects: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            read_timeout_ms: 30_000,
            max_body_size: 32 * 1024 * 1024,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_redirects: 5,
        }
    }
}

fn check_path(path: &Path) -> Result<(), ConfigError> {
    if path.extension().is_some_and(|extension| extension == "json") {
        Ok(())
    } else {
        Err(ConfigError::InvalidPath(path.display().to_string()))
    }
}

impl Config {
    /// Load a config from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        check_path(path)?;

        let file = File::open(path)?;
        let reader = BufReader::new(file);

        Ok(serde_json::from_reader(reader)?)
    }

    /// Load a config from a JSON file, or use the defaults if the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        check_path(path)?;

        if std::fs::exists(path)? {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the config to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        check_path(path)?;

        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;

        Ok(())
    }

    /// The connect and handshake deadline.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// The status line and body deadline.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
