//! Configuration module for the Ops Manager director tool.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `opsman.yaml`
//! - Validation of credentials and the director document
//! - Computing configuration hashes for change detection

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{
    ApplySettings, AuthMethod, DirectorSpec, OpsmanConfig, ProviderConfig, StateConfig,
};
pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_SKIP_SSL_VALIDATION, ENV_TARGET, ENV_TOKEN,
    find_config_file,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult, validate_director_document};
pub use hash::ConfigHasher;
