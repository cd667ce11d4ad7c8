use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Model parameters applied when a backend is built from defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Model identifier (default: "gpt-4o-mini").
    pub model: String,
    /// Sampling temperature (default: 0.7).
    pub temperature: f64,
    /// Completion token limit (default: 2000).
    pub max_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Adapter-level timeout configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterTimeout {
    /// Connection timeout in seconds (default: 10.0).
    pub connect: f64,
    /// Request timeout in seconds (default: 120.0).
    pub request: f64,
}

impl Default for AdapterTimeout {
    fn default() -> Self {
        Self {
            connect: 10.0,
            request: 120.0,
        }
    }
}

/// Everything needed to talk to an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: SecretString,
    /// Scheme and host, without the `/v1/...` path.
    pub base_url: String,
    pub settings: ModelSettings,
    pub timeout: AdapterTimeout,
}

impl OpenAiConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            settings: ModelSettings::default(),
            timeout: AdapterTimeout::default(),
        }
    }

    /// Read configuration from the process environment.
    ///
    /// `OPENAI_API_KEY` is required. `OPENAI_BASE_URL`, `PROMPTGEN_MODEL`,
    /// `PROMPTGEN_TEMPERATURE`, `PROMPTGEN_MAX_TOKENS`, `PROMPTGEN_CONNECT_TIMEOUT` and
    /// `PROMPTGEN_REQUEST_TIMEOUT` override the defaults; unparseable values are ignored.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`OpenAiConfig::from_env`] with a caller-supplied variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::configuration("OPENAI_API_KEY environment variable is not set")
                    .with_detail("variable", "OPENAI_API_KEY")
            })?;

        let mut config = Self::new(SecretString::from(api_key));
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|u| !u.is_empty()) {
            config.base_url = url;
        }
        if let Some(model) = lookup("PROMPTGEN_MODEL").filter(|m| !m.is_empty()) {
            config.settings.model = model;
        }
        if let Some(t) = parsed::<f64>(&lookup, "PROMPTGEN_TEMPERATURE").filter(|t| t.is_finite()) {
            config.settings.temperature = t;
        }
        if let Some(n) = parsed(&lookup, "PROMPTGEN_MAX_TOKENS") {
            config.settings.max_tokens = n;
        }
        if let Some(s) = parsed::<f64>(&lookup, "PROMPTGEN_CONNECT_TIMEOUT").filter(is_usable_secs) {
            config.timeout.connect = s;
        }
        if let Some(s) = parsed::<f64>(&lookup, "PROMPTGEN_REQUEST_TIMEOUT").filter(is_usable_secs) {
            config.timeout.request = s;
        }
        Ok(config)
    }
}

fn is_usable_secs(secs: &f64) -> bool {
    secs.is_finite() && *secs > 0.0
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_model_settings_defaults() {
        let s = ModelSettings::default();
        assert_eq!(s.model, "gpt-4o-mini");
        assert_eq!(s.temperature, 0.7);
        assert_eq!(s.max_tokens, 2000);
    }

    #[test]
    fn test_adapter_timeout_defaults() {
        let t = AdapterTimeout::default();
        assert_eq!(t.connect, 10.0);
        assert_eq!(t.request, 120.0);
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let err = OpenAiConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert_eq!(err.code, "config_error");
        assert!(err.message.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_blank_key_is_configuration_error() {
        let err = OpenAiConfig::from_lookup(lookup_from(&[("OPENAI_API_KEY", "  ")])).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_key_only_uses_defaults() {
        let config = OpenAiConfig::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(config.api_key.expose_secret(), "sk-test");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.settings, ModelSettings::default());
        assert_eq!(config.timeout, AdapterTimeout::default());
    }

    #[test]
    fn test_overrides_applied() {
        let config = OpenAiConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:8080/"),
            ("PROMPTGEN_MODEL", "gpt-4o"),
            ("PROMPTGEN_TEMPERATURE", "0.2"),
            ("PROMPTGEN_MAX_TOKENS", "512"),
            ("PROMPTGEN_CONNECT_TIMEOUT", "3"),
            ("PROMPTGEN_REQUEST_TIMEOUT", "45.5"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "http://localhost:8080/");
        assert_eq!(config.settings.model, "gpt-4o");
        assert_eq!(config.settings.temperature, 0.2);
        assert_eq!(config.settings.max_tokens, 512);
        assert_eq!(config.timeout.connect, 3.0);
        assert_eq!(config.timeout.request, 45.5);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = OpenAiConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("PROMPTGEN_TEMPERATURE", "warm"),
            ("PROMPTGEN_MAX_TOKENS", "-1"),
            ("PROMPTGEN_REQUEST_TIMEOUT", "0"),
        ]))
        .unwrap();
        assert_eq!(config.settings.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.settings.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.timeout.request, 120.0);
    }

    #[test]
    fn test_non_finite_values_fall_back() {
        let config = OpenAiConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("PROMPTGEN_TEMPERATURE", "NaN"),
            ("PROMPTGEN_CONNECT_TIMEOUT", "-inf"),
            ("PROMPTGEN_REQUEST_TIMEOUT", "inf"),
        ]))
        .unwrap();
        assert_eq!(config.settings.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.timeout, AdapterTimeout::default());
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = OpenAiConfig::new(SecretString::from("sk-very-secret".to_string()));
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-very-secret"));
    }
}
