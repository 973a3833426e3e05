use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_NODE_URL: &str = "https://us-central1-oracle-portfolio-prod.cloudfunctions.net";
pub const DEFAULT_PYTHON_URL: &str = "https://vgh0i1cowmwm.manus.space";

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshIntervals {
    pub regime: Duration,
    pub allocations: Duration,
    pub backtesting: Duration,
    pub market: Duration,
    pub countries: Duration,
    pub health: Duration,
}

impl Default for RefreshIntervals {
    fn default() -> Self {
        Self {
            regime: Duration::from_secs(5 * 60),
            allocations: Duration::from_secs(5 * 60),
            backtesting: Duration::from_secs(5 * 60),
            market: Duration::from_secs(5 * 60),
            countries: Duration::from_secs(60 * 60),
            health: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub node_url: String,
    pub python_url: String,
    pub timeout: Duration,
    pub retry_attempts: usize,
    pub retry_delay: Duration,
    pub config_dir: PathBuf,
    pub database_url: Option<String>,
    pub intervals: RefreshIntervals,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            node_url: DEFAULT_NODE_URL.to_string(),
            python_url: DEFAULT_PYTHON_URL.to_string(),
            timeout: Duration::from_millis(10_000),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(1_000),
            config_dir: PathBuf::from(".oracle-portfolio"),
            database_url: None,
            intervals: RefreshIntervals::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable lookup so tests do not
    /// have to mutate the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut settings = Settings::default();

        if let Some(url) = lookup("ORACLE_NODE_URL") {
            settings.node_url = trim_base(&url);
        }
        if let Some(url) = lookup("ORACLE_PYTHON_URL") {
            settings.python_url = trim_base(&url);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "ORACLE_TIMEOUT_MS")? {
            settings.timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var::<usize>(&lookup, "ORACLE_RETRY_ATTEMPTS")? {
            settings.retry_attempts = attempts.max(1);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "ORACLE_RETRY_DELAY_MS")? {
            settings.retry_delay = Duration::from_millis(ms);
        }
        if let Some(dir) = lookup("ORACLE_CONFIG_DIR") {
            settings.config_dir = PathBuf::from(dir);
        }
        settings.database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        Ok(settings)
    }
}

fn trim_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => {
            let value = raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("{name} must be a non-negative integer, got '{raw}'"))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_follow_hosted_backends() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.node_url, DEFAULT_NODE_URL);
        assert_eq!(settings.timeout, Duration::from_secs(10));
        assert_eq!(settings.retry_attempts, 3);
        assert_eq!(settings.retry_delay, Duration::from_secs(1));
        assert_eq!(settings.intervals.health, Duration::from_secs(30));
        assert!(settings.database_url.is_none());
    }

    #[test]
    fn env_overrides_are_applied() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("ORACLE_NODE_URL", "http://localhost:3001/"),
            ("ORACLE_RETRY_ATTEMPTS", "0"),
            ("ORACLE_TIMEOUT_MS", "2500"),
        ]))
        .unwrap();
        assert_eq!(settings.node_url, "http://localhost:3001");
        assert_eq!(settings.retry_attempts, 1);
        assert_eq!(settings.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let err = Settings::from_lookup(lookup_from(&[("ORACLE_RETRY_DELAY_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("ORACLE_RETRY_DELAY_MS"));
    }
}
