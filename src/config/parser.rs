//! Configuration parser for loading manifest files.
//!
//! This module handles loading the manifest from YAML, inlining the director
//! configuration file, and applying environment variable overrides.

use crate::error::{ConfigError, OpsmanError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::OpsmanConfig;

/// Environment variable overriding the target hostname.
pub const ENV_TARGET: &str = "OPSMAN_TARGET";

/// Environment variable supplying the UAA token.
pub const ENV_TOKEN: &str = "OPSMAN_TOKEN";

/// Environment variable overriding TLS verification.
pub const ENV_SKIP_SSL_VALIDATION: &str = "OPSMAN_SKIP_SSL_VALIDATION";

/// Configuration parser for loading the manifest.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or the director config file cannot be
    /// read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<OpsmanConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(OpsmanError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            OpsmanError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        let mut config = self.parse_yaml(&content, Some(path))?;
        self.resolve_director_config(&mut config)?;
        Ok(config)
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<OpsmanConfig> {
        debug!("Parsing YAML configuration");

        let config: OpsmanConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            OpsmanError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Successfully parsed configuration for target: {}",
            config.provider.target_hostname
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<OpsmanConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Reads `director.config_file` into `director.config`.
    fn resolve_director_config(&self, config: &mut OpsmanConfig) -> Result<()> {
        let Some(file) = config.director.config_file.as_deref() else {
            return Ok(());
        };
        if config.director.config.is_some() {
            return Err(OpsmanError::Config(ConfigError::validation(
                "Set either director.config or director.config_file, not both",
                "director",
            )));
        }

        let path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(file), |base| base.join(file));
        debug!("Reading director configuration from: {}", path.display());

        let content = std::fs::read_to_string(&path).map_err(|e| {
            OpsmanError::Config(ConfigError::ParseError {
                message: format!("Failed to read director config file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        config.director.config = Some(content);
        Ok(())
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(config: &mut OpsmanConfig) {
        if let Ok(target) = std::env::var(ENV_TARGET) {
            debug!("Overriding provider.target_hostname from environment");
            config.provider.target_hostname = target;
        }

        if let Ok(token) = std::env::var(ENV_TOKEN) {
            debug!("Overriding provider.token from environment");
            config.provider.token = Some(token);
        }

        if let Ok(skip) = std::env::var(ENV_SKIP_SSL_VALIDATION) {
            debug!("Overriding provider.skip_ssl_validation from environment");
            config.provider.skip_ssl_validation = parse_bool(&skip);
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                OpsmanError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["opsman.yaml", "opsman.yml"];

/// Finds the configuration file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(OpsmanError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
provider:
  target_hostname: opsman.example.com
  token: abc
director:
  config: '{"director_configuration": {"ntp_servers_string": "pool.ntp.org"}}'
"#;
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();

        assert_eq!(config.provider.target_hostname, "opsman.example.com");
        assert_eq!(config.provider.token.as_deref(), Some("abc"));
        assert!(!config.provider.skip_ssl_validation);
        assert_eq!(config.provider.request_timeout_secs, 30);
        assert!(config.director.force_delete);
        assert!(config.apply.wait);
        assert_eq!(config.apply.poll_interval_secs, 10);
        assert_eq!(config.apply.timeout_secs, 3600);
        assert!(config.state.path.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r"
provider:
  target_hostname: pcf.example.com
  token: abc
  skip_ssl_validation: true
  request_timeout_secs: 60
director:
  config_file: director.json
  force_delete: false
apply:
  wait: false
  poll_interval_secs: 5
  timeout_secs: 600
state:
  path: .state
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();

        assert!(config.provider.skip_ssl_validation);
        assert_eq!(config.provider.request_timeout_secs, 60);
        assert_eq!(config.director.config_file.as_deref(), Some("director.json"));
        assert!(config.director.config.is_none());
        assert!(!config.director.force_delete);
        assert!(!config.apply.wait);
        assert_eq!(config.apply.poll_interval_secs, 5);
        assert_eq!(config.state.path.as_deref(), Some(".state"));
    }

    #[test]
    fn test_missing_provider_is_a_parse_error() {
        let parser = ConfigParser::new();
        let err = parser.parse_yaml("director: {}\n", None).unwrap_err();
        assert!(matches!(err, OpsmanError::Config(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_load_file_inlines_director_config_file() {
        let dir = TempDir::new().unwrap();
        let director_json = r#"{"iaas_configuration": {"project": "my-project"}}"#;
        std::fs::write(dir.path().join("director.json"), director_json).unwrap();
        std::fs::write(
            dir.path().join("opsman.yaml"),
            "provider:\n  target_hostname: opsman.example.com\n  token: t\ndirector:\n  config_file: director.json\n",
        )
        .unwrap();

        let parser = ConfigParser::new().with_base_path(dir.path());
        let config = parser.load_file(dir.path().join("opsman.yaml")).unwrap();

        assert_eq!(config.director.document(), Some(director_json));
    }

    #[test]
    fn test_load_file_reports_missing_director_config_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("opsman.yaml"),
            "provider:\n  target_hostname: opsman.example.com\ndirector:\n  config_file: missing.json\n",
        )
        .unwrap();

        let parser = ConfigParser::new().with_base_path(dir.path());
        let err = parser.load_file(dir.path().join("opsman.yaml")).unwrap_err();
        assert!(err.to_string().contains("director config file"));
    }

    #[test]
    fn test_load_file_rejects_inline_and_file_together() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("director.json"), "{}").unwrap();
        std::fs::write(
            dir.path().join("opsman.yaml"),
            "provider:\n  target_hostname: opsman.example.com\ndirector:\n  config: '{}'\n  config_file: director.json\n",
        )
        .unwrap();

        let parser = ConfigParser::new().with_base_path(dir.path());
        let err = parser.load_file(dir.path().join("opsman.yaml")).unwrap_err();
        assert!(matches!(
            err,
            OpsmanError::Config(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_load_file_not_found() {
        let parser = ConfigParser::new();
        let err = parser.load_file("/definitely/not/here/opsman.yaml").unwrap_err();
        assert!(matches!(err, OpsmanError::Config(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("opsman.yml"), "").unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("opsman.yml"));
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool(" TRUE "));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
    }
}
