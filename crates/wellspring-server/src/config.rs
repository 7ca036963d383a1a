use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "changeme",
    "secret",
];

/// Shorter secrets are rejected outright.
const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub proof_dir: PathBuf,
    pub mail_relay_url: Option<String>,
    pub mail_from: String,
    pub public_url: String,
    pub cleanup_interval_secs: u64,
    pub secure_cookies: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("WELLSPRING_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("WELLSPRING_JWT_SECRET is unset or still a placeholder");
        }
        if jwt_secret.len() < MIN_SECRET_LEN {
            bail!("WELLSPRING_JWT_SECRET must be at least {MIN_SECRET_LEN} characters");
        }

        let port = match get("WELLSPRING_PORT") {
            Some(v) => v
                .parse::<u16>()
                .with_context(|| format!("WELLSPRING_PORT '{}' is not a valid port", v))?,
            None => 3000,
        };

        let cleanup_interval_secs = match get("WELLSPRING_CLEANUP_INTERVAL_SECS") {
            Some(v) => v
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .with_context(|| format!("WELLSPRING_CLEANUP_INTERVAL_SECS '{}' is invalid", v))?,
            None => 3600,
        };

        let secure_cookies = match get("WELLSPRING_SECURE_COOKIES").as_deref() {
            None => false,
            Some("1" | "true" | "yes" | "on") => true,
            Some("0" | "false" | "no" | "off") => false,
            Some(other) => bail!("WELLSPRING_SECURE_COOKIES '{}' is not a boolean", other),
        };

        Ok(Config {
            jwt_secret,
            db_path: get("WELLSPRING_DB_PATH")
                .unwrap_or_else(|| "wellspring.db".into())
                .into(),
            host: get("WELLSPRING_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            proof_dir: get("WELLSPRING_PROOF_DIR")
                .unwrap_or_else(|| "./proofs".into())
                .into(),
            mail_relay_url: get("WELLSPRING_MAIL_RELAY_URL"),
            mail_from: get("WELLSPRING_MAIL_FROM")
                .unwrap_or_else(|| "Wellspring <no-reply@wellspring.local>".into()),
            public_url: get("WELLSPRING_PUBLIC_URL")
                .unwrap_or_else(|| format!("http://localhost:{port}")),
            cleanup_interval_secs,
            secure_cookies,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const SECRET: (&str, &str) = ("WELLSPRING_JWT_SECRET", "a-long-enough-test-secret");

    #[test]
    fn defaults_apply() {
        let config = config(&[SECRET]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("wellspring.db"));
        assert_eq!(config.port, 3000);
        assert_eq!(config.proof_dir, PathBuf::from("./proofs"));
        assert_eq!(config.mail_relay_url, None);
        assert_eq!(config.public_url, "http://localhost:3000");
        assert_eq!(config.cleanup_interval_secs, 3600);
        assert!(!config.secure_cookies);
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn missing_or_placeholder_secret_is_fatal() {
        assert!(config(&[]).is_err());
        assert!(config(&[("WELLSPRING_JWT_SECRET", "   ")]).is_err());
        assert!(config(&[("WELLSPRING_JWT_SECRET", "dev-secret-change-me")]).is_err());
        assert!(config(&[("WELLSPRING_JWT_SECRET", "tooshort")]).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config(&[
            SECRET,
            ("WELLSPRING_PORT", "8080"),
            ("WELLSPRING_HOST", "127.0.0.1"),
            ("WELLSPRING_MAIL_RELAY_URL", "http://relay.local/send"),
            ("WELLSPRING_SECURE_COOKIES", "true"),
            ("WELLSPRING_CLEANUP_INTERVAL_SECS", "60"),
        ])
        .unwrap();
        assert_eq!(config.addr().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(config.mail_relay_url.as_deref(), Some("http://relay.local/send"));
        assert!(config.secure_cookies);
        assert_eq!(config.cleanup_interval_secs, 60);
        assert_eq!(config.public_url, "http://localhost:8080");
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(config(&[SECRET, ("WELLSPRING_PORT", "http")]).is_err());
        assert!(config(&[SECRET, ("WELLSPRING_CLEANUP_INTERVAL_SECS", "0")]).is_err());
        assert!(config(&[SECRET, ("WELLSPRING_SECURE_COOKIES", "maybe")]).is_err());
    }
}
