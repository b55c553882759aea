//! Configuration hashing for change detection.
//!
//! Director documents are hashed in canonical form (sorted keys, compact
//! separators) so that a formatting-only edit keeps the same hash.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::spec::OpsmanConfig;

/// Hasher for computing configuration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the target and desired director document.
    ///
    /// An unparseable document is hashed as raw text.
    #[must_use]
    pub fn hash_config(&self, config: &OpsmanConfig) -> String {
        let mut hasher = Sha256::new();

        hasher.update(config.provider.target_hostname.as_bytes());
        hasher.update([0u8]);
        if let Some(document) = config.director.document() {
            hasher.update(self.hash_document(document).as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a hash of a single JSON document.
    #[must_use]
    pub fn hash_document(&self, document: &str) -> String {
        let mut hasher = Sha256::new();

        match serde_json::from_str::<Value>(document) {
            Ok(value) => hasher.update(canonical_json(&value).as_bytes()),
            Err(_) => hasher.update(document.as_bytes()),
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}

/// Serializes a value with sorted object keys and no whitespace.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|key| format!("{}:{}", encode_string(key), canonical_json(&map[key])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", parts.join(","))
        }
        Value::String(s) => encode_string(s),
        Value::Number(n) => canonical_number(n),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::from("null"),
    }
}

/// Integral floats are written as integers so `1.0` and `1` hash alike.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn canonical_number(n: &serde_json::Number) -> String {
    if n.is_f64()
        && let Some(f) = n.as_f64()
        && f.fract() == 0.0
        && f.abs() < 9.0e15
    {
        return (f as i64).to_string();
    }
    n.to_string()
}

fn encode_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spec::{ApplySettings, DirectorSpec, ProviderConfig, StateConfig};

    fn create_test_config(document: &str) -> OpsmanConfig {
        OpsmanConfig {
            provider: ProviderConfig::with_token("opsman.example.com", "t"),
            director: DirectorSpec::inline(document),
            apply: ApplySettings::default(),
            state: StateConfig::default(),
        }
    }

    #[test]
    fn test_config_hash_deterministic() {
        let hasher = ConfigHasher::new();
        let config = create_test_config(r#"{"a":1}"#);

        assert_eq!(hasher.hash_config(&config), hasher.hash_config(&config));
    }

    #[test]
    fn test_formatting_does_not_change_hash() {
        let hasher = ConfigHasher::new();
        let compact = hasher.hash_document(r#"{"a":1,"b":[1,2],"c":{"d":"e"}}"#);
        let pretty = hasher.hash_document("{\n  \"c\": {\"d\": \"e\"},\n  \"b\": [1, 2],\n  \"a\": 1.0\n}");

        assert_eq!(compact, pretty);
    }

    #[test]
    fn test_different_documents_different_hash() {
        let hasher = ConfigHasher::new();
        assert_ne!(
            hasher.hash_document(r#"{"a":1}"#),
            hasher.hash_document(r#"{"a":"1"}"#)
        );
        assert_ne!(hasher.hash_document("[1,2]"), hasher.hash_document("[2,1]"));
    }

    #[test]
    fn test_target_is_part_of_config_hash() {
        let hasher = ConfigHasher::new();
        let config = create_test_config("{}");
        let mut other = config.clone();
        other.provider.target_hostname = String::from("other.example.com");

        assert_ne!(hasher.hash_config(&config), hasher.hash_config(&other));
    }

    #[test]
    fn test_invalid_document_still_hashes() {
        let hasher = ConfigHasher::new();
        let hash = hasher.hash_document("{not json");
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        let full_hash = "abcdef1234567890abcdef1234567890";
        let short = hasher.short_hash(full_hash);

        assert_eq!(short, "abcdef12");
        assert_eq!(short.len(), 8);
    }
}
