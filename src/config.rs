//! Minimal runtime configuration helpers.
//! Secrets and endpoints come from the environment; request limits are compiled in.

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://gateway.isolarcloud.com.hk";
pub const DEFAULT_SYS_CODE: &str = "901";

/// Fixed pause after every vendor call; keeps us inside the hourly request quota.
pub const REQUEST_DELAY: Duration = Duration::from_secs(2);
/// Upper bound for `ps_key_list` in one minute-data request.
pub const MAX_PS_KEYS_PER_REQUEST: usize = 50;
/// Upper bound for the `points` list in one minute-data request.
pub const MAX_POINTS_PER_REQUEST: usize = 50;
/// Days per historical batch; each batch is then walked hour by hour.
pub const DAYS_PER_HISTORICAL_BATCH: u32 = 7;
pub const STATION_PAGE_SIZE: u32 = 20;
pub const DEVICE_PAGE_SIZE: u32 = 50;
pub const DEFAULT_MINUTE_INTERVAL: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL of the mirror store.
    pub database_url: String,
    pub base_url: String,
    /// Sent as the `sys_code` header on every request.
    pub sys_code: String,
    pub app_key: String,
    /// Sent as the `x-access-key` header.
    pub secret_key: String,
    pub username: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, String> {
            match lookup(key) {
                Some(v) if !v.trim().is_empty() => Ok(v),
                _ => Err(format!("Missing required environment variable {}", key)),
            }
        };
        let optional = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            base_url: optional("ISOLARCLOUD_BASE_URL", DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            sys_code: optional("ISOLARCLOUD_SYS_CODE", DEFAULT_SYS_CODE),
            app_key: required("ISOLARCLOUD_APP_KEY")?,
            secret_key: required("ISOLARCLOUD_SECRET_KEY")?,
            username: required("ISOLARCLOUD_USERNAME")?,
            password: required("ISOLARCLOUD_PASSWORD")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn full_env() -> HashMap<String, String> {
        env(&[
            ("DATABASE_URL", "postgres://localhost/solar"),
            ("ISOLARCLOUD_APP_KEY", "app"),
            ("ISOLARCLOUD_SECRET_KEY", "secret"),
            ("ISOLARCLOUD_USERNAME", "user"),
            ("ISOLARCLOUD_PASSWORD", "pass"),
        ])
    }

    #[test]
    fn defaults_apply_for_optional_values() {
        let vars = full_env();
        let cfg = Config::from_lookup(|k| vars.get(k).cloned()).expect("config");
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.sys_code, DEFAULT_SYS_CODE);
        assert_eq!(cfg.app_key, "app");
    }

    #[test]
    fn blank_required_value_is_reported_by_name() {
        let mut vars = full_env();
        vars.insert("ISOLARCLOUD_PASSWORD".into(), "   ".into());
        let err = Config::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(err.contains("ISOLARCLOUD_PASSWORD"), "{err}");
    }

    #[test]
    fn credentials_keep_surrounding_whitespace() {
        let mut vars = full_env();
        vars.insert("ISOLARCLOUD_PASSWORD".into(), " pa ss ".into());
        vars.insert("ISOLARCLOUD_SECRET_KEY".into(), "secret\t".into());
        let cfg = Config::from_lookup(|k| vars.get(k).cloned()).expect("config");
        assert_eq!(cfg.password, " pa ss ");
        assert_eq!(cfg.secret_key, "secret\t");
    }

    #[test]
    fn base_url_override_drops_trailing_slash() {
        let mut vars = full_env();
        vars.insert("ISOLARCLOUD_BASE_URL".into(), "https://gateway.isolarcloud.eu/".into());
        let cfg = Config::from_lookup(|k| vars.get(k).cloned()).expect("config");
        assert_eq!(cfg.base_url, "https://gateway.isolarcloud.eu");
    }
}
