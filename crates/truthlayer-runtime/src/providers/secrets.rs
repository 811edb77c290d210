//! Credential handling for model, search and entailment backends.
//!
//! Every remote backend loads its key through [`ApiCredential`], which
//! keeps the value inside a [`SecretString`] so it never shows up in
//! `Debug` output, tracing fields, or run artifacts.
//!
//! ```ignore
//! let cred = ApiCredential::from_config_or_env(&config, "api_key", "OPENAI_API_KEY", "OpenAI API key")?;
//! request.bearer_auth(cred.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Provider JSON in the run configuration
    Config,
    /// Environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely-stored API credential.
///
/// `Debug` and `Display` print `[REDACTED]`; the value is only reachable
/// through [`ApiCredential::expose`].
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    /// Wrap a raw value.
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load from JSON config, falling back to an environment variable.
    ///
    /// Empty strings count as missing in both places.
    pub fn from_config_or_env(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        Self::optional(config, config_key, env_var, name).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "{} required: set '{}' in config or {} environment variable",
                name, config_key, env_var
            ))
        })
    }

    /// Like [`ApiCredential::from_config_or_env`] for backends that also
    /// accept anonymous requests.
    pub fn optional(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
    ) -> Option<Self> {
        if let Some(value) = config[config_key].as_str().filter(|v| !v.is_empty()) {
            return Some(Self::new(value, CredentialSource::Config, name));
        }
        std::env::var(env_var)
            .ok()
            .filter(|v| !v.is_empty())
            .map(|value| Self::new(value, CredentialSource::Environment, name))
    }

    /// Check if a credential is available without loading it.
    pub fn is_available(config: &JsonValue, config_key: &str, env_var: &str) -> bool {
        config[config_key].as_str().is_some_and(|v| !v.is_empty())
            || std::env::var(env_var).is_ok_and(|v| !v.is_empty())
    }

    /// Expose the value at the point of use, e.g. when setting a header.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_redacted() {
        let secret = "sk-super-secret-key-12345";
        let cred = ApiCredential::new(secret, CredentialSource::Config, "OpenAI API key");

        let debug = format!("{:?}", cred);
        assert!(!debug.contains(secret), "Secret exposed in Debug!");
        assert!(debug.contains("[REDACTED]"));

        let display = format!("{}", cred);
        assert!(!display.contains(secret), "Secret exposed in Display!");
        assert!(display.contains("OpenAI API key from config"));

        assert_eq!(cred.expose(), secret);
    }

    #[test]
    fn test_config_takes_precedence() {
        let config = serde_json::json!({"api_key": "config-key"});
        std::env::set_var("TRUTHLAYER_TEST_KEY_PRIORITY", "env-key");

        let cred = ApiCredential::from_config_or_env(
            &config,
            "api_key",
            "TRUTHLAYER_TEST_KEY_PRIORITY",
            "Test key",
        )
        .unwrap();
        assert_eq!(cred.expose(), "config-key");
        assert_eq!(cred.source(), CredentialSource::Config);

        std::env::remove_var("TRUTHLAYER_TEST_KEY_PRIORITY");
    }

    #[test]
    fn test_env_fallback_and_empty_values() {
        std::env::set_var("TRUTHLAYER_TEST_KEY_FALLBACK", "env-key");
        let config = serde_json::json!({"api_key": ""});

        let cred = ApiCredential::from_config_or_env(
            &config,
            "api_key",
            "TRUTHLAYER_TEST_KEY_FALLBACK",
            "Test key",
        )
        .unwrap();
        assert_eq!(cred.expose(), "env-key");
        assert_eq!(cred.source(), CredentialSource::Environment);

        std::env::remove_var("TRUTHLAYER_TEST_KEY_FALLBACK");
    }

    #[test]
    fn test_missing_credential_error_names_sources() {
        let err = ApiCredential::from_config_or_env(
            &serde_json::json!({}),
            "api_key",
            "TRUTHLAYER_NONEXISTENT_12345",
            "Test key",
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("Test key"));
        assert!(err.contains("api_key"));
        assert!(err.contains("TRUTHLAYER_NONEXISTENT_12345"));

        assert!(ApiCredential::optional(
            &serde_json::json!({}),
            "token",
            "TRUTHLAYER_NONEXISTENT_12345",
            "Token"
        )
        .is_none());
        assert!(!ApiCredential::is_available(
            &serde_json::json!({}),
            "api_key",
            "TRUTHLAYER_NONEXISTENT_12345"
        ));
    }
}
