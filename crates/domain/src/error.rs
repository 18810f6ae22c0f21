//! Error types shared across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`PagewiseError`] via `#[from]`.

/// Top-level error for pagewise operations.
#[derive(Debug, thiserror::Error)]
pub enum PagewiseError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("fetch error")]
    Fetch(#[from] FetchError),
}

/// A domain value failed its invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The resource path was empty once surrounding slashes were trimmed.
    #[error("resource path must not be empty")]
    EmptyResourcePath,

    /// Page size must be strictly positive.
    #[error("page size must be greater than zero")]
    ZeroPageSize,
}

/// Failure of a single page (or record) request.
///
/// Stored inside the `Errored` pagination phase, hence `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The transport could not reach the backend.
    #[error("network error: {message}")]
    Network { message: String },

    /// The backend answered with a non-success status.
    #[error("request rejected with status {status}: {message}")]
    Request { status: u16, message: String },

    /// The response body was not the expected shape.
    #[error("failed to decode response: {message}")]
    Decode { message: String },
}

impl FetchError {
    /// HTTP status carried by [`FetchError::Request`], if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => Some(*status),
            Self::Network { .. } | Self::Decode { .. } => None,
        }
    }
}
