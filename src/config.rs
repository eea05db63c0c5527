//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Which [`Classifier`](crate::advisor::Classifier) serves the form path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifierMode {
    /// The rule table.
    #[default]
    Rules,
    /// The decision tree trained from the rule table.
    Tree,
}

impl FromStr for ClassifierMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rules" | "rule" => Ok(Self::Rules),
            "tree" | "model" => Ok(Self::Tree),
            other => Err(ConfigError::InvalidValue {
                key: "STREAM_ADVISOR_CLASSIFIER".to_string(),
                message: format!("unknown classifier '{other}' (expected rules or tree)"),
            }),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    /// Oracle backend.
    pub backend: LlmBackend,
    /// Model name passed to the backend.
    pub model: String,
    /// API key for `backend`, if set.
    pub api_key: Option<SecretString>,
    /// libSQL catalog file. `None` uses the built-in catalog.
    pub db_path: Option<PathBuf>,
    /// REST server port.
    pub port: u16,
    pub classifier: ClassifierMode,
    /// Bound on a single oracle call. `None` waits indefinitely.
    pub oracle_timeout: Option<Duration>,
    /// Idle time after which a REST session is dropped. `None` keeps sessions
    /// until they are deleted.
    pub session_ttl: Option<Duration>,
}

/// Default idle lifetime of a REST session.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Parse a whole number of seconds where `0` means "off".
fn optional_secs(key: &str, value: &str) -> Result<Option<Duration>, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(0) => Ok(None),
        Ok(secs) => Ok(Some(Duration::from_secs(secs))),
        Err(_) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{value}' is not a whole number of seconds"),
        }),
    }
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        let backend = LlmBackend::Gemini;
        Self {
            backend,
            model: backend.default_model().to_string(),
            api_key: None,
            db_path: None,
            port: 8080,
            classifier: ClassifierMode::Rules,
            oracle_timeout: None,
            session_ttl: Some(DEFAULT_SESSION_TTL),
        }
    }
}

impl AdvisorConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let backend: LlmBackend = match get("STREAM_ADVISOR_LLM_BACKEND") {
            Some(s) => s.parse()?,
            None => defaults.backend,
        };

        let model = get("STREAM_ADVISOR_MODEL").unwrap_or_else(|| backend.default_model().to_string());
        let api_key = get(backend.api_key_var()).map(SecretString::from);
        let db_path = get("STREAM_ADVISOR_DB_PATH").map(PathBuf::from);

        let port = match get("STREAM_ADVISOR_PORT") {
            Some(s) => s.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "STREAM_ADVISOR_PORT".to_string(),
                message: format!("'{s}' is not a port number"),
            })?,
            None => defaults.port,
        };

        let classifier = match get("STREAM_ADVISOR_CLASSIFIER") {
            Some(s) => s.parse()?,
            None => defaults.classifier,
        };

        let oracle_timeout = match get("STREAM_ADVISOR_ORACLE_TIMEOUT_SECS") {
            Some(s) => optional_secs("STREAM_ADVISOR_ORACLE_TIMEOUT_SECS", &s)?,
            None => defaults.oracle_timeout,
        };

        let session_ttl = match get("STREAM_ADVISOR_SESSION_TTL_SECS") {
            Some(s) => optional_secs("STREAM_ADVISOR_SESSION_TTL_SECS", &s)?,
            None => defaults.session_ttl,
        };

        Ok(Self {
            backend,
            model,
            api_key,
            db_path,
            port,
            classifier,
            oracle_timeout,
            session_ttl,
        })
    }

    /// Provider config. Fails when the backend's API key is not set.
    pub fn llm_config(&self) -> Result<LlmConfig, ConfigError> {
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar(self.backend.api_key_var().to_string()))?;
        Ok(LlmConfig {
            backend: self.backend,
            api_key,
            model: self.model.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AdvisorConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AdvisorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.backend, LlmBackend::Gemini);
        assert_eq!(config.model, "gemini-flash-latest");
        assert_eq!(config.port, 8080);
        assert_eq!(config.classifier, ClassifierMode::Rules);
        assert!(config.db_path.is_none());
        assert!(config.oracle_timeout.is_none());
        assert_eq!(config.session_ttl, Some(DEFAULT_SESSION_TTL));
        assert!(matches!(
            config.llm_config(),
            Err(ConfigError::MissingEnvVar(ref var)) if var == "GEMINI_API_KEY"
        ));
    }

    #[test]
    fn backend_selects_key_and_default_model() {
        let config = config_from(&[
            ("STREAM_ADVISOR_LLM_BACKEND", "anthropic"),
            ("ANTHROPIC_API_KEY", "sk-ant-test"),
            ("GEMINI_API_KEY", "ignored"),
        ])
        .unwrap();
        assert_eq!(config.model, "claude-sonnet-4-20250514");
        let llm = config.llm_config().unwrap();
        assert_eq!(llm.api_key.expose_secret(), "sk-ant-test");
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = config_from(&[
            ("STREAM_ADVISOR_MODEL", "gemini-pro"),
            ("STREAM_ADVISOR_DB_PATH", "./data/career.db"),
            ("STREAM_ADVISOR_PORT", "9090"),
            ("STREAM_ADVISOR_CLASSIFIER", "tree"),
            ("STREAM_ADVISOR_ORACLE_TIMEOUT_SECS", "15"),
        ])
        .unwrap();
        assert_eq!(config.model, "gemini-pro");
        assert_eq!(config.db_path, Some(PathBuf::from("./data/career.db")));
        assert_eq!(config.port, 9090);
        assert_eq!(config.classifier, ClassifierMode::Tree);
        assert_eq!(config.oracle_timeout, Some(Duration::from_secs(15)));
    }

    #[test]
    fn zero_disables_timeout_and_ttl() {
        let config = config_from(&[
            ("STREAM_ADVISOR_ORACLE_TIMEOUT_SECS", "0"),
            ("STREAM_ADVISOR_SESSION_TTL_SECS", "0"),
        ])
        .unwrap();
        assert!(config.oracle_timeout.is_none());
        assert!(config.session_ttl.is_none());
    }

    #[test]
    fn session_ttl_is_configurable() {
        let config = config_from(&[("STREAM_ADVISOR_SESSION_TTL_SECS", "120")]).unwrap();
        assert_eq!(config.session_ttl, Some(Duration::from_secs(120)));
        assert!(config_from(&[("STREAM_ADVISOR_SESSION_TTL_SECS", "-5")]).is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(config_from(&[("STREAM_ADVISOR_PORT", "eighty")]).is_err());
        assert!(config_from(&[("STREAM_ADVISOR_CLASSIFIER", "forest")]).is_err());
        assert!(config_from(&[("STREAM_ADVISOR_LLM_BACKEND", "llama")]).is_err());
        assert!(config_from(&[("STREAM_ADVISOR_ORACLE_TIMEOUT_SECS", "soon")]).is_err());
    }
}
