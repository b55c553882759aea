//! Configuration validation for the manifest.
//!
//! This module checks the provider credentials, the director configuration
//! document and the apply settings before anything is sent to Ops Manager.

use crate::error::{ConfigError, OpsmanError, Result};
use tracing::debug;

use super::parser::ENV_TOKEN;
use super::spec::{ApplySettings, AuthMethod, DirectorSpec, OpsmanConfig, ProviderConfig};

/// Credential fields that a UAA token excludes.
const TOKEN_CONFLICTS: &[&str] = &["client_id", "client_secret", "username", "password"];

/// Validator for manifests.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The underlying error.
    pub error: ConfigError,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a manifest.
    ///
    /// # Errors
    ///
    /// Returns the first error found if validation fails.
    pub fn validate(&self, config: &OpsmanConfig) -> Result<ValidationResult> {
        let mut result = self.check(config);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first = result.errors.swap_remove(0);
            Err(OpsmanError::Config(first.error))
        }
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn check(&self, config: &OpsmanConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_provider(&config.provider, &mut result);
        Self::validate_director(&config.director, &mut result);
        Self::validate_apply(&config.apply, &mut result);

        result
    }

    /// Validates connection settings and credentials.
    fn validate_provider(provider: &ProviderConfig, result: &mut ValidationResult) {
        let target = provider.target_hostname.trim();
        if target.is_empty() {
            result.push(
                "provider.target_hostname",
                ConfigError::validation(
                    "Target hostname cannot be empty",
                    "provider.target_hostname",
                ),
            );
        } else if target.contains("://") || target.contains('/') {
            result.push(
                "provider.target_hostname",
                ConfigError::validation(
                    format!("Target '{target}' must be a hostname without scheme or path"),
                    "provider.target_hostname",
                ),
            );
        }

        let set = |name: &str| -> bool {
            let value = match name {
                "token" => provider.token.as_deref(),
                "client_id" => provider.client_id.as_deref(),
                "client_secret" => provider.client_secret.as_deref(),
                "username" => provider.username.as_deref(),
                "password" => provider.password.as_deref(),
                _ => None,
            };
            value.is_some_and(|v| !v.is_empty())
        };

        if set("token") {
            for other in TOKEN_CONFLICTS.iter().filter(|f| set(f.as_ref())) {
                result.push(
                    "provider.token",
                    ConfigError::ConflictingFields {
                        field: String::from("token"),
                        other: (*other).to_string(),
                    },
                );
            }
        }
        for client in ["client_id", "client_secret"].into_iter().filter(|f| set(f)) {
            for user in ["username", "password"].into_iter().filter(|f| set(f)) {
                result.push(
                    format!("provider.{client}"),
                    ConfigError::ConflictingFields {
                        field: client.to_string(),
                        other: user.to_string(),
                    },
                );
            }
        }

        match provider.auth_method() {
            AuthMethod::Token => {}
            AuthMethod::None => result.push(
                "provider.token",
                ConfigError::validation(
                    format!("A UAA token is required (set provider.token or {ENV_TOKEN})"),
                    "provider.token",
                ),
            ),
            method @ (AuthMethod::ClientCredentials | AuthMethod::UsernamePassword) => result.push(
                "provider",
                ConfigError::UnsupportedAuthMethod {
                    method: method.to_string(),
                },
            ),
        }

        if provider.request_timeout_secs == 0 {
            result.push(
                "provider.request_timeout_secs",
                ConfigError::validation(
                    "Request timeout must be at least 1 second",
                    "provider.request_timeout_secs",
                ),
            );
        }

        if provider.skip_ssl_validation {
            result.warnings.push(format!(
                "TLS certificate verification is disabled for {target}"
            ));
        }
    }

    /// Validates the desired director document.
    fn validate_director(director: &DirectorSpec, result: &mut ValidationResult) {
        match director.document() {
            None => result.push(
                "director.config",
                ConfigError::validation(
                    "One of director.config or director.config_file is required",
                    "director.config",
                ),
            ),
            Some(document) => {
                if let Err(error) = validate_director_document(document) {
                    result.push("director.config", error);
                }
            }
        }

        if !director.force_delete {
            result.warnings.push(String::from(
                "director.force_delete has no effect: destroying the director only forgets local state",
            ));
        }
    }

    /// Validates polling settings.
    fn validate_apply(apply: &ApplySettings, result: &mut ValidationResult) {
        if apply.poll_interval_secs == 0 {
            result.push(
                "apply.poll_interval_secs",
                ConfigError::validation(
                    "Poll interval must be at least 1 second",
                    "apply.poll_interval_secs",
                ),
            );
        } else if apply.timeout_secs < apply.poll_interval_secs {
            result.push(
                "apply.timeout_secs",
                ConfigError::validation(
                    format!(
                        "Timeout ({}s) must not be shorter than the poll interval ({}s)",
                        apply.timeout_secs, apply.poll_interval_secs
                    ),
                    "apply.timeout_secs",
                ),
            );
        }

        if !apply.wait {
            result.warnings.push(String::from(
                "apply.wait is off: state is read back before changes are applied",
            ));
        }
    }
}

/// Checks that a director configuration document is a JSON object.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidDirectorConfig`] if the text is not JSON or
/// not an object.
pub fn validate_director_document(
    document: &str,
) -> std::result::Result<serde_json::Map<String, serde_json::Value>, ConfigError> {
    match serde_json::from_str::<serde_json::Value>(document) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(ConfigError::InvalidDirectorConfig {
            message: format!("expected a JSON object, found {}", json_type_name(&other)),
        }),
        Err(e) => Err(ConfigError::InvalidDirectorConfig {
            message: format!("not valid JSON: {e}"),
        }),
    }
}

const fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

impl ValidationResult {
    /// Records an error for a field.
    fn push(&mut self, field: impl Into<String>, error: ConfigError) {
        self.errors.push(ValidationError {
            field: field.into(),
            error,
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spec::StateConfig;

    fn valid_config() -> OpsmanConfig {
        OpsmanConfig {
            provider: ProviderConfig::with_token("opsman.example.com", "token"),
            director: DirectorSpec::inline(
                r#"{"director_configuration":{"ntp_servers_string":"pool.ntp.org"}}"#,
            ),
            apply: ApplySettings::default(),
            state: StateConfig::default(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let result = ConfigValidator::new().validate(&valid_config()).unwrap();
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_empty_target_rejected() {
        let mut config = valid_config();
        config.provider.target_hostname = String::new();
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(err.to_string().contains("Target hostname cannot be empty"));
    }

    #[test]
    fn test_target_with_scheme_rejected() {
        let mut config = valid_config();
        config.provider.target_hostname = String::from("https://opsman.example.com");
        let result = ConfigValidator::new().check(&config);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors[0].field, "provider.target_hostname");
    }

    #[test]
    fn test_token_conflicts_with_other_credentials() {
        let mut config = valid_config();
        config.provider.username = Some(String::from("admin"));
        config.provider.client_id = Some(String::from("ci"));

        let result = ConfigValidator::new().check(&config);
        let conflicts: Vec<_> = result
            .errors
            .iter()
            .filter(|e| matches!(e.error, ConfigError::ConflictingFields { .. }))
            .collect();
        // token/client_id, token/username, client_id/username
        assert_eq!(conflicts.len(), 3);
    }

    #[test]
    fn test_client_credentials_are_not_supported() {
        let mut config = valid_config();
        config.provider.token = None;
        config.provider.client_id = Some(String::from("ci"));
        config.provider.client_secret = Some(String::from("secret"));

        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(matches!(
            err,
            OpsmanError::Config(ConfigError::UnsupportedAuthMethod { .. })
        ));
    }

    #[test]
    fn test_missing_token_rejected() {
        let mut config = valid_config();
        config.provider.token = None;
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(err.to_string().contains(ENV_TOKEN));
    }

    #[test]
    fn test_director_config_must_be_object() {
        let mut config = valid_config();
        config.director = DirectorSpec::inline("[1, 2, 3]");
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(err.to_string().contains("an array"));

        config.director = DirectorSpec::inline("{not json");
        let err = ConfigValidator::new().validate(&config).unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn test_director_config_required() {
        let mut config = valid_config();
        config.director.config = None;
        let result = ConfigValidator::new().check(&config);
        assert_eq!(result.errors[0].field, "director.config");
    }

    #[test]
    fn test_apply_timeout_shorter_than_interval() {
        let mut config = valid_config();
        config.apply.poll_interval_secs = 30;
        config.apply.timeout_secs = 10;
        let result = ConfigValidator::new().check(&config);
        assert_eq!(result.errors[0].field, "apply.timeout_secs");
    }

    #[test]
    fn test_warnings_do_not_fail_validation() {
        let mut config = valid_config();
        config.provider.skip_ssl_validation = true;
        config.director.force_delete = false;
        config.apply.wait = false;

        let result = ConfigValidator::new().validate(&config).unwrap();
        assert_eq!(result.warnings.len(), 3);
    }

    #[test]
    fn test_validate_director_document_returns_map() {
        let map = validate_director_document(r#"{"a": 1, "b": {"c": true}}"#).unwrap();
        assert_eq!(map.len(), 2);
    }
}
