// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP client for the openWB simple API.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::catalog::PullQuery;
use crate::command::OutboundWrite;
use crate::error::ProtocolError;

// ============================================================================
// ApiConfig
// ============================================================================

/// Connection parameters for a simple API endpoint.
///
/// # Examples
///
/// ```
/// use openwb_bridge::protocol::ApiConfig;
/// use std::time::Duration;
///
/// let config = ApiConfig::new("http://192.168.0.68/simpleAPI/web/simpleapi.php")
///     .with_token("secret")
///     .with_timeout(Duration::from_secs(5));
/// assert_eq!(config.timeout(), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    url: String,
    token: Option<String>,
    timeout: Duration,
}

impl ApiConfig {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a configuration for the API at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.is_empty()).then_some(token);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the API URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the bearer token, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Creates an [`ApiClient`] from this configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is empty or the HTTP client cannot be built.
    pub fn into_client(self) -> Result<ApiClient, ProtocolError> {
        if self.url.trim().is_empty() {
            return Err(ProtocolError::InvalidAddress(
                "API URL is required".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(ProtocolError::Http)?;

        Ok(ApiClient {
            url: self.url.trim_end_matches('/').to_string(),
            token: self.token,
            client,
        })
    }
}

// ============================================================================
// ApiClient
// ============================================================================

/// Client for reading documents from and submitting commands to the
/// simple API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    url: String,
    token: Option<String>,
    client: Client,
}

impl ApiClient {
    /// Returns the API URL without a trailing slash.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Fetches the response for `query`.
    ///
    /// The whole response is returned; use [`PullQuery::select`] to narrow
    /// it to the instance document.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::AuthenticationFailed`] on HTTP 401 and
    /// [`ProtocolError::FetchFailed`] for any other failure, including a
    /// body that is not a JSON object.
    pub async fn fetch(&self, query: &PullQuery) -> Result<Value, ProtocolError> {
        let url = format!("{}/{}", self.url, query.query());
        let failed = |reason: String| ProtocolError::FetchFailed {
            query: query.query().to_string(),
            reason,
        };

        tracing::trace!(url = %url, "Fetching");

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ProtocolError::AuthenticationFailed);
        }
        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status().as_u16())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| failed(format!("invalid JSON: {e}")))?;
        if !body.is_object() {
            return Err(failed("response is not an object".to_string()));
        }
        Ok(body)
    }

    /// Submits a pull-side write as a form encoded POST.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidAddress`] for a push-side write,
    /// [`ProtocolError::AuthenticationFailed`] on HTTP 401 and
    /// [`ProtocolError::ConnectionFailed`] for any other non-success status.
    pub async fn submit(&self, write: &OutboundWrite) -> Result<Value, ProtocolError> {
        let Some(body) = write.form_body() else {
            return Err(ProtocolError::InvalidAddress(
                "push writes cannot be submitted to the API".to_string(),
            ));
        };

        tracing::debug!(url = %self.url, body = %body, "Submitting API write");

        let response = self
            .authorize(self.client.post(&self.url))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(ProtocolError::Http)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ProtocolError::AuthenticationFailed);
        }
        if !response.status().is_success() {
            return Err(ProtocolError::ConnectionFailed(format!(
                "HTTP {} - {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        let text = response.text().await.map_err(ProtocolError::Http)?;
        tracing::debug!(body = %text, "Received API response");
        Ok(serde_json::from_str(&text).unwrap_or(Value::Null))
    }
}

/// Extracts the value echoed for `command` from a successful write response.
pub(crate) fn echoed_value<'a>(response: &'a Value, command: &str) -> Option<&'a Value> {
    if response.get("success").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    response.get("data")?.get(command)
}
