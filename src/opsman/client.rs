//! Ops Manager API client implementation.
//!
//! This module provides the HTTP client for the Ops Manager management API.
//! The client is built explicitly from the provider configuration and passed
//! to whatever needs it.

use reqwest::{header, Client, Method};
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::{ENV_TOKEN, ProviderConfig};
use crate::error::{ApiError, ConfigError, OpsmanError, Result};

use super::types::{
    ApplyChangesRequest, InstallationResponse, InstallationStatus, InstallationStatusResponse,
};

/// Path of the staged director properties.
const DIRECTOR_PROPERTIES_PATH: &str = "/api/v0/staged/director/properties";

/// Path of the installations collection.
const INSTALLATIONS_PATH: &str = "/api/v0/installations";

/// Maximum number of attempts for read requests.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

/// Ops Manager API client.
#[derive(Debug, Clone)]
pub struct OpsManClient {
    /// HTTP client.
    client: Client,
    /// Scheme and host every path is appended to.
    base_url: String,
    /// Target hostname, used as the director ID.
    target: String,
    /// UAA bearer token.
    token: String,
}

impl OpsManClient {
    /// Creates a client for the configured target.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is configured or the HTTP client cannot
    /// be created.
    pub fn new(provider: &ProviderConfig) -> Result<Self> {
        let token = provider
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                OpsmanError::Config(ConfigError::MissingEnvVar {
                    name: ENV_TOKEN.to_string(),
                })
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(provider.request_timeout_secs))
            .danger_accept_invalid_certs(provider.skip_ssl_validation)
            .build()
            .map_err(|e| {
                ApiError::network(
                    &provider.target_hostname,
                    format!("Failed to create HTTP client: {e}"),
                )
            })?;

        if provider.skip_ssl_validation {
            debug!(
                "TLS certificate verification disabled for {}",
                provider.target_hostname
            );
        }

        Ok(Self {
            client,
            base_url: provider.base_url(),
            target: provider.target_hostname.clone(),
            token,
        })
    }

    /// Points the client at a different base URL, keeping the target ID.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Returns the target hostname.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Fetches the staged director properties as raw JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is empty.
    pub async fn get_staged_director_properties(&self) -> Result<String> {
        let body = self.get(DIRECTOR_PROPERTIES_PATH).await.map_err(|e| {
            debug!("Error getting staged director properties from {}: {e}", self.target);
            e
        })?;

        if body.trim().is_empty() {
            return Err(OpsmanError::Api(ApiError::invalid_response(format!(
                "empty staged director properties from {}",
                self.target
            ))));
        }

        Ok(body)
    }

    /// Replaces the staged director properties with the given JSON text.
    ///
    /// The document is sent verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn put_staged_director_properties(&self, document: &str) -> Result<()> {
        self.send(Method::PUT, DIRECTOR_PROPERTIES_PATH, Some(document.to_string()))
            .await?;
        Ok(())
    }

    /// Triggers an apply changes run and returns the installation ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response has no ID.
    pub async fn apply_changes(&self, request: &ApplyChangesRequest) -> Result<u64> {
        let body = serde_json::to_string(request).map_err(|e| {
            OpsmanError::internal(format!("Failed to serialize apply changes request: {e}"))
        })?;

        let response = self.send(Method::POST, INSTALLATIONS_PATH, Some(body)).await?;

        let parsed: InstallationResponse = serde_json::from_str(&response).map_err(|e| {
            OpsmanError::Api(ApiError::invalid_response(format!(
                "Failed to parse installation response: {e}"
            )))
        })?;

        Ok(parsed.install.id)
    }

    /// Gets the status of an installation.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status cannot be parsed.
    pub async fn get_installation_status(
        &self,
        installation_id: u64,
    ) -> Result<InstallationStatus> {
        let body = self
            .get(&format!("{INSTALLATIONS_PATH}/{installation_id}"))
            .await?;

        let parsed: InstallationStatusResponse = serde_json::from_str(&body).map_err(|e| {
            OpsmanError::Api(ApiError::invalid_response(format!(
                "Failed to parse installation status: {e}"
            )))
        })?;

        Ok(parsed.status)
    }

    /// Executes a GET request, retrying transient failures.
    async fn get(&self, path: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_RETRIES} for GET {path}");
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)))
                    .await;
            }

            match self.send(Method::GET, path, None).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    if e.is_retryable() {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            OpsmanError::Api(ApiError::network(&self.target, "Max retries exceeded"))
        }))
    }

    /// Executes a single request and returns the response body.
    async fn send(&self, method: Method, path: &str, body: Option<String>) -> Result<String> {
        let url = format!("{}{path}", self.base_url);
        trace!("{method} {url}");

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token));

        if let Some(body) = body {
            request = request
                .header(header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::network(&self.target, format!("{method} {path} failed: {e}")))?;

        let status = response.status();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            let message = response.text().await.unwrap_or_default();
            return Err(OpsmanError::Api(ApiError::AuthenticationFailed {
                message: if message.is_empty() {
                    String::from("token rejected")
                } else {
                    message
                },
            }));
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OpsmanError::Api(ApiError::api_error(status.as_u16(), message)));
        }

        response.text().await.map_err(|e| {
            OpsmanError::Api(ApiError::invalid_response(format!(
                "Failed to read response body: {e}"
            )))
        })
    }
}
