//! Runtime configuration, read from the environment after loading `.env`.

use thiserror::Error;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("unknown backend {0:?}, expected \"supabase\" or \"memory\"")]
    UnknownBackend(String),

    #[error("invalid backend url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendConfig {
    Supabase { url: String, anon_key: String },
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        GeminiConfig {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_owned(),
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind_addr: String,
    pub backend: BackendConfig,
    pub gemini: GeminiConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let backend = match var("BLOGWEB_BACKEND").as_deref().unwrap_or("supabase") {
            "supabase" => BackendConfig::Supabase {
                url: var("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL"))?,
                anon_key: var("SUPABASE_ANON_KEY").ok_or(ConfigError::Missing("SUPABASE_ANON_KEY"))?,
            },
            "memory" => BackendConfig::Memory,
            other => return Err(ConfigError::UnknownBackend(other.to_owned())),
        };

        Ok(Config {
            bind_addr: var("BLOGWEB_BIND").unwrap_or_else(|| DEFAULT_BIND.to_owned()),
            backend,
            gemini: GeminiConfig {
                api_key: var("GEMINI_API_KEY"),
                model: var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_owned()),
                endpoint: var("GEMINI_ENDPOINT").unwrap_or_else(|| DEFAULT_GEMINI_ENDPOINT.to_owned()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn supabase_needs_url_and_key() {
        let err = Config::from_lookup(lookup(&[("SUPABASE_URL", "https://x.supabase.co")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SUPABASE_ANON_KEY")));
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND);
        assert_eq!(config.gemini, GeminiConfig::default());
    }

    #[test]
    fn memory_backend_needs_nothing() {
        let config = Config::from_lookup(lookup(&[("BLOGWEB_BACKEND", "memory"), ("GEMINI_API_KEY", "k")])).unwrap();
        assert_eq!(config.backend, BackendConfig::Memory);
        assert_eq!(config.gemini.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("BLOGWEB_BACKEND", "firebase")])),
            Err(ConfigError::UnknownBackend(_))
        ));
    }
}
