use anyhow::{Context, bail};
use tracing::{info, warn};

use agora_ai::client::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use agora_ai::geocode::DEFAULT_GEOCODER_URL;
use agora_ai::live::DEFAULT_LIVE_MODEL;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-jwt-secret",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub backend_url: String,
    pub backend_service_key: String,
    pub jwt_secret: String,
    pub ai_api_key: Option<String>,
    pub ai_model: String,
    pub ai_live_model: String,
    pub ai_base_url: String,
    pub geocoder_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or_default = |key: &str, default: &str| {
            get(key).unwrap_or_else(|| {
                info!("{key} not set, using default: {default}");
                default.to_string()
            })
        };
        let required = |key: &str| get(key).with_context(|| format!("{key} must be set"));

        let jwt_secret = required("AGORA_JWT_SECRET")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("AGORA_JWT_SECRET is still a placeholder; use the backend's JWT secret");
        }

        let port = or_default("AGORA_PORT", "3000")
            .parse()
            .context("AGORA_PORT must be a port number")?;

        let ai_api_key = get("AGORA_AI_API_KEY");
        if ai_api_key.is_none() {
            warn!("AGORA_AI_API_KEY not set, assistant routes will answer 503");
        }

        Ok(Self {
            host: or_default("AGORA_HOST", "0.0.0.0"),
            port,
            backend_url: required("AGORA_BACKEND_URL")?
                .trim_end_matches('/')
                .to_string(),
            backend_service_key: required("AGORA_BACKEND_SERVICE_KEY")?,
            jwt_secret,
            ai_api_key,
            ai_model: or_default("AGORA_AI_MODEL", DEFAULT_MODEL),
            ai_live_model: or_default("AGORA_AI_LIVE_MODEL", DEFAULT_LIVE_MODEL),
            ai_base_url: or_default("AGORA_AI_BASE_URL", DEFAULT_BASE_URL),
            geocoder_url: or_default("AGORA_GEOCODER_URL", DEFAULT_GEOCODER_URL),
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
        move |key: &str| map.get(key).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("AGORA_BACKEND_URL", "https://project.example.co/"),
        ("AGORA_BACKEND_SERVICE_KEY", "service"),
        ("AGORA_JWT_SECRET", "a-real-secret"),
    ];

    #[test]
    fn defaults_fill_optional_values() {
        let config = Config::from_lookup(lookup(BASE)).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.backend_url, "https://project.example.co");
        assert_eq!(config.ai_model, DEFAULT_MODEL);
        assert!(config.ai_api_key.is_none());
    }

    #[test]
    fn placeholder_secret_is_refused() {
        let pairs = [
            BASE[0],
            BASE[1],
            ("AGORA_JWT_SECRET", "dev-secret-change-me"),
        ];
        let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("placeholder"));
    }

    #[test]
    fn missing_backend_is_an_error() {
        let err = Config::from_lookup(lookup(&[("AGORA_JWT_SECRET", "a-real-secret")])).unwrap_err();
        assert!(err.to_string().contains("AGORA_BACKEND_URL"));
    }

    #[test]
    fn blank_ai_key_counts_as_unset() {
        let mut pairs = BASE.to_vec();
        pairs.push(("AGORA_AI_API_KEY", "  "));
        pairs.push(("AGORA_PORT", "8080"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert!(config.ai_api_key.is_none());
        assert_eq!(config.port, 8080);
    }
}
