//! Endpoint-agnostic request and response shapes
//!
//! Every Open API call is described as an [`ApiRequest`] and comes back as
//! the platform's `{ error, message, data }` envelope.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Endpoint-agnostic description of an outbound API call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Path below the API base, e.g. `/v3.0/oa/message/text`
    pub path: String,
    /// Query parameters
    pub query: Vec<(String, String)>,
    /// JSON payload for POST requests
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Describe a GET request
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: Method::GET, path: path.into(), query: Vec::new(), body: None }
    }

    /// Describe a POST request
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self { method: Method::POST, path: path.into(), query: Vec::new(), body: None }
    }

    /// Append a query parameter
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON payload
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// The platform response envelope
///
/// `error == 0` means success; any other code is surfaced as
/// [`Error::Api`] by the executor, so a caller holding an `ApiResponse`
/// always holds a successful one.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    /// Platform error code; `0` on success
    #[serde(default)]
    pub error: i64,
    /// Server message
    #[serde(default)]
    pub message: String,
    /// Endpoint-specific payload
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ApiResponse {
    /// Decode the `data` payload into a typed value
    ///
    /// A `null`/absent payload decodes to the type's default, since
    /// several endpoints acknowledge with an empty `data`.
    ///
    /// # Errors
    /// Returns [`Error::Api`] if the payload does not match `T`
    pub fn data_as<T>(&self) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        if self.data.is_null() {
            return Ok(T::default());
        }

        serde_json::from_value(self.data.clone()).map_err(|err| Error::Api {
            message: format!("failed to decode response data: {err}"),
            code: None,
            http_status: None,
        })
    }
}
