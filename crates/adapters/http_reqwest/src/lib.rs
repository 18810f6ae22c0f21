//! # pagewise-adapter-http-reqwest
//!
//! HTTP adapter built on [reqwest](https://docs.rs/reqwest).
//!
//! ## Responsibilities
//! - Implement the [`PageSource`] port against a REST backend
//! - Issue `GET {base_url}/{resource}?limit=…&offset=…&<filters>`
//! - Attach the bearer token, when configured
//! - Map transport failures, non-2xx statuses and malformed bodies into
//!   [`FetchError`]
//!
//! ## Dependency rule
//! Depends on `pagewise-app` (for the port trait) and `pagewise-domain`
//! (for request and error types). Never leaks reqwest types into the domain.

pub mod config;
pub mod error;

use std::future::Future;

use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use pagewise_app::ports::PageSource;
use pagewise_domain::error::FetchError;
use pagewise_domain::page::{PageRequest, ResourcePath};

pub use config::HttpConfig;
pub use error::HttpError;

use error::{decode_error, transport_error};

/// JSON error body returned by the backend on non-2xx responses.
///
/// Backends disagree on the field name, so the first one present wins.
#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
    detail: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.error.or(self.message).or(self.detail)
    }
}

/// [`PageSource`] backed by a shared reqwest [`Client`].
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpPageSource {
    /// Build a page source from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError`] if the base URL is invalid or the client
    /// cannot be built.
    pub fn new(config: &HttpConfig) -> Result<Self, HttpError> {
        let base_url = Url::parse(&config.base_url).map_err(|err| HttpError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: err.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(HttpError::CannotBeABase(config.base_url.clone()));
        }
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(HttpError::Client)?;
        Ok(Self {
            client,
            base_url,
            token: config.token.clone().filter(|token| !token.is_empty()),
        })
    }

    /// Replace the bearer token, e.g. after the shell receives a new one.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL of `resource`, with every segment percent-encoded.
    #[must_use]
    pub fn resource_url(&self, resource: &ResourcePath) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(resource.segments());
        }
        url
    }

    async fn get(
        &self,
        resource: &ResourcePath,
        query: &[(String, String)],
    ) -> Result<Vec<u8>, FetchError> {
        let url = self.resource_url(resource);
        let mut builder = self.client.get(url).query(query);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|err| transport_error(&err))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| transport_error(&err))?;

        if status.is_success() {
            tracing::trace!(%resource, status = status.as_u16(), bytes = body.len(), "response received");
            return Ok(body.to_vec());
        }

        let message = rejection_message(status, &body);
        tracing::debug!(%resource, status = status.as_u16(), %message, "request rejected");
        Err(FetchError::Request {
            status: status.as_u16(),
            message,
        })
    }
}

fn rejection_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or_else(|| match status.canonical_reason() {
            Some(reason) => format!("HTTP {} {reason}", status.as_u16()),
            None => format!("HTTP {}", status.as_u16()),
        })
}

impl PageSource for HttpPageSource {
    fn fetch_page<T>(
        &self,
        request: &PageRequest,
    ) -> impl Future<Output = Result<Vec<T>, FetchError>> + Send
    where
        T: DeserializeOwned + Send + 'static,
    {
        async move {
            let body = self.get(request.resource(), &request.query_pairs()).await?;
            serde_json::from_slice(&body).map_err(|err| decode_error(&err))
        }
    }

    fn fetch_one<T>(
        &self,
        path: &ResourcePath,
    ) -> impl Future<Output = Result<T, FetchError>> + Send
    where
        T: DeserializeOwned + Send + 'static,
    {
        async move {
            let body = self.get(path, &[]).await?;
            serde_json::from_slice(&body).map_err(|err| decode_error(&err))
        }
    }
}
