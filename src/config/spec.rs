//! Manifest types for the director tool.
//!
//! This module defines the structs that map to the `opsman.yaml` manifest.
//! The manifest declares how to reach Ops Manager and the desired director
//! properties.

use serde::{Deserialize, Serialize};

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpsmanConfig {
    /// Connection and credential settings.
    pub provider: ProviderConfig,
    /// Desired director configuration.
    pub director: DirectorSpec,
    /// Apply changes behaviour.
    #[serde(default)]
    pub apply: ApplySettings,
    /// State storage settings.
    #[serde(default)]
    pub state: StateConfig,
}

/// Connection settings for the Ops Manager API.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Hostname of the Ops Manager, without scheme. Doubles as the director ID.
    pub target_hostname: String,
    /// UAA access token.
    #[serde(default)]
    pub token: Option<String>,
    /// UAA client ID.
    #[serde(default)]
    pub client_id: Option<String>,
    /// UAA client secret.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Ops Manager username.
    #[serde(default)]
    pub username: Option<String>,
    /// Ops Manager password.
    #[serde(default)]
    pub password: Option<String>,
    /// Accept invalid TLS certificates.
    #[serde(default)]
    pub skip_ssl_validation: bool,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Authentication method implied by the credential fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Pre-generated UAA token.
    Token,
    /// UAA client credentials.
    ClientCredentials,
    /// Username and password.
    UsernamePassword,
    /// No credentials given.
    None,
}

/// Desired director resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectorSpec {
    /// Inline JSON document with director, IaaS and security properties.
    #[serde(default)]
    pub config: Option<String>,
    /// Path to a JSON file with the same content, relative to the manifest.
    #[serde(default)]
    pub config_file: Option<String>,
    /// Continue deletion when products are deployed. Accepted but not acted upon.
    #[serde(default = "default_true")]
    pub force_delete: bool,
}

/// Apply changes behaviour.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplySettings {
    /// Wait for the installation to finish before reading back.
    #[serde(default = "default_true")]
    pub wait: bool,
    /// Seconds between installation status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Maximum seconds to wait for an installation.
    #[serde(default = "default_apply_timeout")]
    pub timeout_secs: u64,
}

/// State storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Directory holding the state file, relative to the manifest.
    #[serde(default)]
    pub path: Option<String>,
}

const fn default_true() -> bool {
    true
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_poll_interval() -> u64 {
    10
}

const fn default_apply_timeout() -> u64 {
    3600
}

impl ProviderConfig {
    /// Creates a token-authenticated provider configuration.
    #[must_use]
    pub fn with_token(target_hostname: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            target_hostname: target_hostname.into(),
            token: Some(token.into()),
            client_id: None,
            client_secret: None,
            username: None,
            password: None,
            skip_ssl_validation: false,
            request_timeout_secs: default_request_timeout(),
        }
    }

    /// Returns the API base URL.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("https://{}", self.target_hostname)
    }

    /// Returns the authentication method the credentials select.
    ///
    /// When several are set the first in precedence order wins; the
    /// validator rejects such combinations anyway.
    #[must_use]
    pub fn auth_method(&self) -> AuthMethod {
        if is_set(self.token.as_ref()) {
            AuthMethod::Token
        } else if is_set(self.client_id.as_ref()) || is_set(self.client_secret.as_ref()) {
            AuthMethod::ClientCredentials
        } else if is_set(self.username.as_ref()) || is_set(self.password.as_ref()) {
            AuthMethod::UsernamePassword
        } else {
            AuthMethod::None
        }
    }
}

fn is_set(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("ProviderConfig")
            .field("target_hostname", &self.target_hostname)
            .field("token", &redact(&self.token))
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("skip_ssl_validation", &self.skip_ssl_validation)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl DirectorSpec {
    /// Creates a spec from an inline JSON document.
    #[must_use]
    pub fn inline(config: impl Into<String>) -> Self {
        Self {
            config: Some(config.into()),
            config_file: None,
            force_delete: true,
        }
    }

    /// Returns the desired configuration document, once resolved.
    #[must_use]
    pub fn document(&self) -> Option<&str> {
        self.config.as_deref()
    }
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self {
            wait: true,
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_apply_timeout(),
        }
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Token => "token",
            Self::ClientCredentials => "client_credentials",
            Self::UsernamePassword => "username_password",
            Self::None => "none",
        };
        write!(f, "{s}")
    }
}
