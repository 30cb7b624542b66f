//! Configuration error types shared by the gateway and its libraries

use thiserror::Error;

/// Common error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL for {field}: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Reject anything that is not an absolute http(s) URL.
    pub fn check_http_url(field: &'static str, value: &str) -> Result<()> {
        if value.starts_with("http://") || value.starts_with("https://") {
            Ok(())
        } else {
            Err(Error::InvalidUrl {
                field,
                value: value.to_owned(),
            })
        }
    }
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;
