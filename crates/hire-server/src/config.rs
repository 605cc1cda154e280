use anyhow::{Context, bail};

/// Secrets that ship in sample files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "changeme", "secret"];

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    /// App to register at startup so a fresh database has a tenant.
    pub seed_bundle_id: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = get("HIRE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("HIRE_JWT_SECRET must be set to a real secret");
        }

        let port = get("HIRE_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("HIRE_PORT is not a port number")?;

        Ok(Self {
            db_path: get("HIRE_DB_PATH").unwrap_or_else(|| "hire.db".into()),
            host: get("HIRE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            jwt_secret,
            seed_bundle_id: get("HIRE_BUNDLE_ID").filter(|b| !b.trim().is_empty()),
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
    fn defaults_apply_around_a_real_secret() {
        let config = Config::from_lookup(lookup(&[("HIRE_JWT_SECRET", "s3cr3t-value")])).unwrap();
        assert_eq!(config.db_path, "hire.db");
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert!(config.seed_bundle_id.is_none());
    }

    #[test]
    fn missing_or_placeholder_secret_is_refused() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("HIRE_JWT_SECRET", "dev-secret-change-me")])).is_err());
    }

    #[test]
    fn bad_port_is_an_error() {
        let result = Config::from_lookup(lookup(&[
            ("HIRE_JWT_SECRET", "s3cr3t-value"),
            ("HIRE_PORT", "http"),
        ]));
        assert!(result.is_err());
    }
}
