use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::resolver::DEFAULT_MIN_CONFIDENCE;

pub const DB_PATH: &str = "data/otb.sqlite";
pub const BASE_URL: &str = "https://otbdiscs.com";
pub const TIMEOUT_SECS: u64 = 10;
/// Upper bound on concurrent product page fetches.
pub const MAX_CONCURRENCY: usize = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub base_url: String,
    pub timeout: Duration,
    pub concurrency: usize,
    pub min_confidence: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: PathBuf::from(DB_PATH),
            base_url: BASE_URL.to_string(),
            timeout: Duration::from_secs(TIMEOUT_SECS),
            concurrency: MAX_CONCURRENCY,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

impl Config {
    /// Defaults overridden by `OTB_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();
        if let Some(path) = get("OTB_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(url) = get("OTB_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = get("OTB_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("OTB_TIMEOUT_SECS is not a number: {}", secs))?;
            config.timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(n) = get("OTB_CONCURRENCY") {
            let n: usize = n
                .trim()
                .parse()
                .with_context(|| format!("OTB_CONCURRENCY is not a number: {}", n))?;
            config.concurrency = n.clamp(1, MAX_CONCURRENCY);
        }
        if let Some(c) = get("OTB_MIN_CONFIDENCE") {
            let c: f64 = c
                .trim()
                .parse()
                .with_context(|| format!("OTB_MIN_CONFIDENCE is not a number: {}", c))?;
            config.min_confidence = c.clamp(0.0, 1.0);
        }
        Ok(config)
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
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults() {
        let c = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(c.db_path, PathBuf::from(DB_PATH));
        assert_eq!(c.concurrency, 5);
        assert_eq!(c.timeout, Duration::from_secs(10));
        assert_eq!(c.min_confidence, DEFAULT_MIN_CONFIDENCE);
    }

    #[test]
    fn overrides_are_clamped() {
        let c = Config::from_lookup(lookup(&[
            ("OTB_CONCURRENCY", "32"),
            ("OTB_BASE_URL", "http://localhost:8080/"),
            ("OTB_MIN_CONFIDENCE", "1.7"),
        ]))
        .unwrap();
        assert_eq!(c.concurrency, MAX_CONCURRENCY);
        assert_eq!(c.base_url, "http://localhost:8080");
        assert_eq!(c.min_confidence, 1.0);
    }

    #[test]
    fn bad_numbers_are_errors() {
        assert!(Config::from_lookup(lookup(&[("OTB_TIMEOUT_SECS", "soon")])).is_err());
    }
}
