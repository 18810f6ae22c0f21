//! HTTP adapter error types.

use pagewise_domain::error::FetchError;

/// Errors raised while building the HTTP page source.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The configured base URL could not be parsed.
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// The base URL cannot have path segments appended (e.g. `mailto:`).
    #[error("base URL {0:?} cannot be used as a base")]
    CannotBeABase(String),

    /// The underlying reqwest client failed to build.
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),
}

/// Map a transport-level reqwest failure into a [`FetchError`].
///
/// Decode failures keep their own variant; everything else means the
/// backend could not be reached or the exchange broke off.
pub(crate) fn transport_error(err: &reqwest::Error) -> FetchError {
    if err.is_decode() {
        FetchError::Decode {
            message: err.to_string(),
        }
    } else {
        FetchError::Network {
            message: err.to_string(),
        }
    }
}

pub(crate) fn decode_error(err: &serde_json::Error) -> FetchError {
    FetchError::Decode {
        message: err.to_string(),
    }
}
