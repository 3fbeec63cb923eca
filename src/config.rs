//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (provider API keys) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`. Every section has
//! defaults, so a partial file is fine.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::User;
use crate::engine::plan::DEFAULT_TIMEFRAME;
use crate::engine::scanner::{
    ScannerConfig, DEFAULT_FETCH_PAUSE_MS, INCLUSION_THRESHOLD, UNIVERSE_CAP,
};

/// Priority watchlist scanned when a user has no watchlist of their own.
pub const DEFAULT_UNIVERSE: &[&str] = &[
    "NVDA", "AAPL", "MSFT", "GOOGL", "AMZN", "META", "TSLA", "AMD", "AVGO", "TSM", "INTC",
    "QCOM", "COIN", "PLTR", "SNOW", "CRWD", "NET", "DDOG", "SQ", "SHOP", "UBER",
];

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: GeneralConfig,
    pub scanner: ScannerSection,
    pub data_sources: DataSourcesConfig,
    pub dashboard: DashboardConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeneralConfig {
    pub name: String,
    pub scan_interval_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: "OMNISCIENT ONE".to_string(),
            scan_interval_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScannerSection {
    pub universe: Vec<String>,
    pub universe_cap: usize,
    pub max_results: usize,
    pub inclusion_threshold: f64,
    pub fetch_pause_ms: u64,
    /// Whether synthetic placeholder bars may be scored at all.
    pub allow_synthetic: bool,
    pub timeframe: String,
}

impl Default for ScannerSection {
    fn default() -> Self {
        Self {
            universe: DEFAULT_UNIVERSE.iter().map(|s| s.to_string()).collect(),
            universe_cap: UNIVERSE_CAP,
            max_results: 5,
            inclusion_threshold: INCLUSION_THRESHOLD,
            fetch_pause_ms: DEFAULT_FETCH_PAUSE_MS,
            allow_synthetic: true,
            timeframe: DEFAULT_TIMEFRAME.to_string(),
        }
    }
}

impl ScannerSection {
    /// Runtime scanner settings derived from this section.
    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            universe_cap: self.universe_cap,
            inclusion_threshold: self.inclusion_threshold,
            fetch_pause: Duration::from_millis(self.fetch_pause_ms),
            allow_synthetic: self.allow_synthetic,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DataSourcesConfig {
    pub flat_file: FlatFileConfig,
    pub live: LiveConfig,
    pub synthetic: SyntheticConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FlatFileConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub bucket: String,
    /// Object key with a `{ticker}` placeholder.
    pub key_template: String,
    /// Read files from this directory instead of the remote endpoint.
    pub local_dir: Option<PathBuf>,
    /// Signing region for the object store.
    pub region: String,
    /// Env vars holding the object-store access and secret keys.
    pub access_key_env: Option<String>,
    pub secret_key_env: Option<String>,
}

impl Default for FlatFileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://files.massive.com".to_string(),
            bucket: "flatfiles".to_string(),
            key_template: "stocks/{ticker}/daily.csv".to_string(),
            local_dir: None,
            region: "us-east-1".to_string(),
            access_key_env: Some("FLATFILE_ACCESS_KEY".to_string()),
            secret_key_env: Some("FLATFILE_SECRET_KEY".to_string()),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LiveConfig {
    pub enabled: bool,
    pub range: String,
    pub interval: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            range: "1mo".to_string(),
            interval: "1d".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Should be off anywhere trade plans are acted upon.
    pub enabled: bool,
    pub bars: usize,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bars: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_mins: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_mins: 15 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
    /// Signed-in operator. Without one the dashboard is anonymous (free tier).
    pub operator: Option<User>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8501,
            operator: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/omniscient_store.json"),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = AppConfig::parse("").unwrap();
        assert_eq!(cfg.scanner.universe.len(), 21);
        assert_eq!(cfg.scanner.universe[0], "NVDA");
        assert_eq!(cfg.scanner.universe_cap, 15);
        assert_eq!(cfg.scanner.inclusion_threshold, 75.0);
        assert_eq!(cfg.scanner.timeframe, "3-10 days");
        assert_eq!(cfg.data_sources.cache.ttl_mins, 15);
        assert!(cfg.data_sources.synthetic.enabled);
        assert_eq!(cfg.data_sources.flat_file.key_template, "stocks/{ticker}/daily.csv");
    }

    #[test]
    fn test_partial_override() {
        let cfg = AppConfig::parse(
            r#"
            [scanner]
            universe = ["AAPL", "MSFT"]
            max_results = 2
            allow_synthetic = false

            [data_sources.synthetic]
            enabled = false

            [data_sources.flat_file]
            local_dir = "/tmp/bars"

            [dashboard.operator]
            user_id = "ops"
            username = "desk"
            tier = "premium"
            subscription_end = "2030-01-01T00:00:00Z"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.scanner.universe, vec!["AAPL", "MSFT"]);
        assert_eq!(cfg.scanner.max_results, 2);
        assert_eq!(cfg.scanner.universe_cap, 15);
        assert!(!cfg.scanner.allow_synthetic);
        assert!(!cfg.data_sources.synthetic.enabled);
        assert_eq!(cfg.data_sources.flat_file.local_dir, Some(PathBuf::from("/tmp/bars")));
        assert_eq!(cfg.data_sources.flat_file.bucket, "flatfiles");
        let operator = cfg.dashboard.operator.unwrap();
        assert_eq!(operator.tier, crate::subscription::Tier::Premium);
        assert_eq!(
            operator.subscription_end.map(|d| d.to_rfc3339()),
            Some("2030-01-01T00:00:00+00:00".to_string())
        );
        assert_eq!(cfg.dashboard.port, 8501);
    }

    #[test]
    fn test_scanner_config_conversion() {
        let section = ScannerSection {
            fetch_pause_ms: 250,
            ..ScannerSection::default()
        };
        let sc = section.scanner_config();
        assert_eq!(sc.fetch_pause, Duration::from_millis(250));
        assert_eq!(sc.universe_cap, 15);
        assert!(sc.allow_synthetic);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let err = AppConfig::load("/nonexistent/omniscient.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_load_repo_config() {
        // Runs from the crate root under `cargo test`.
        if let Ok(cfg) = AppConfig::load("config.toml") {
            assert!(!cfg.scanner.universe.is_empty());
            assert!(cfg.scanner.max_results > 0);
        }
    }
}
