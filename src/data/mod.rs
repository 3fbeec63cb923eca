//! Market data providers.
//!
//! Defines the `BarProvider` trait implemented by each upstream tier
//! (flat files, live API, synthetic generator) and the `TieredSource`
//! that walks them in order. The scanner only ever sees the
//! `MarketDataSource` trait.

pub mod flatfile;
pub mod live;
pub mod synthetic;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::DataSourcesConfig;
use crate::types::{normalize_bars, Bar, DataError, DataOrigin, Quote, SourcedBars};

use flatfile::FlatFileProvider;
use live::LiveProvider;
use synthetic::SyntheticProvider;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// One upstream tier in the fallback chain.
#[async_trait]
pub trait BarProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Tag attached to everything this provider returns.
    fn origin(&self) -> DataOrigin;

    /// Whether calls go over the network (and so deserve pacing).
    fn is_remote(&self) -> bool;

    /// Daily bars for a ticker. May be returned unsorted.
    async fn fetch_bars(&self, ticker: &str) -> std::result::Result<Vec<Bar>, DataError>;

    /// Latest quote for a ticker.
    async fn fetch_quote(&self, ticker: &str) -> std::result::Result<Quote, DataError>;
}

/// What the scanner consumes: bars that may fail, quotes that never do.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Chronological bars tagged with the tier that served them.
    async fn get_bars(&self, ticker: &str) -> std::result::Result<SourcedBars, DataError>;

    /// Latest quote, degrading to last-known or a placeholder.
    async fn get_quote(&self, ticker: &str) -> Quote;

    /// Whether callers should pause between consecutive fetches.
    fn paces_requests(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

struct CacheEntry {
    origin: DataOrigin,
    bars: Vec<Bar>,
    inserted_at: DateTime<Utc>,
}

/// Per-ticker bar cache. Stale entries are kept to back last-known quotes.
#[derive(Default)]
struct BarCache {
    entries: HashMap<String, CacheEntry>,
}

impl BarCache {
    fn fresh(&self, ticker: &str, ttl: Duration) -> Option<&CacheEntry> {
        self.entries
            .get(ticker)
            .filter(|entry| Utc::now() - entry.inserted_at < ttl)
    }

    fn last_bar(&self, ticker: &str) -> Option<&Bar> {
        self.entries.get(ticker).and_then(|entry| entry.bars.last())
    }

    fn insert(&mut self, ticker: String, origin: DataOrigin, bars: Vec<Bar>) {
        self.entries.insert(
            ticker,
            CacheEntry {
                origin,
                bars,
                inserted_at: Utc::now(),
            },
        );
    }
}

// ---------------------------------------------------------------------------
// Tiered source
// ---------------------------------------------------------------------------

/// Ordered provider chain: first tier that returns bars wins.
pub struct TieredSource {
    providers: Vec<Box<dyn BarProvider>>,
    cache: Mutex<BarCache>,
    cache_ttl: Duration,
}

impl TieredSource {
    pub fn new(providers: Vec<Box<dyn BarProvider>>, cache_ttl: Duration) -> Self {
        Self {
            providers,
            cache: Mutex::new(BarCache::default()),
            cache_ttl,
        }
    }

    /// Build the chain described by the `[data_sources]` config section.
    pub fn from_config(cfg: &DataSourcesConfig) -> Result<Self> {
        let mut providers: Vec<Box<dyn BarProvider>> = Vec::new();

        if cfg.flat_file.enabled {
            match FlatFileProvider::from_config(&cfg.flat_file) {
                Ok(provider) => providers.push(Box::new(provider)),
                Err(e) => warn!(error = %e, "Flat-file tier left out of the chain"),
            }
        }
        if cfg.live.enabled {
            let provider = LiveProvider::new(&cfg.live.range, &cfg.live.interval)
                .context("Failed to initialise live provider")?;
            providers.push(Box::new(provider));
        }
        if cfg.synthetic.enabled {
            warn!("Synthetic fallback enabled, placeholder data may appear in scans");
            providers.push(Box::new(SyntheticProvider::new(cfg.synthetic.bars)));
        }

        info!(
            tiers = ?providers.iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
            cache_ttl_mins = cfg.cache.ttl_mins,
            "Market data chain ready"
        );

        Ok(Self::new(providers, Duration::minutes(cfg.cache.ttl_mins)))
    }

    /// Number of tiers in the chain.
    pub fn tier_count(&self) -> usize {
        self.providers.len()
    }

    fn cache(&self) -> MutexGuard<'_, BarCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MarketDataSource for TieredSource {
    async fn get_bars(&self, ticker: &str) -> std::result::Result<SourcedBars, DataError> {
        let key = ticker.to_uppercase();

        let cached = self.cache().fresh(&key, self.cache_ttl).map(|entry| SourcedBars {
            origin: entry.origin,
            bars: entry.bars.clone(),
        });
        if let Some(hit) = cached {
            debug!(ticker = %key, origin = %hit.origin, "Bar cache hit");
            return Ok(hit);
        }

        for provider in &self.providers {
            match provider.fetch_bars(&key).await {
                Ok(bars) if !bars.is_empty() => {
                    let bars = normalize_bars(bars);
                    let origin = provider.origin();
                    if origin.is_real() {
                        self.cache().insert(key.clone(), origin, bars.clone());
                    } else {
                        warn!(ticker = %key, provider = provider.name(), "Serving synthetic bars");
                    }
                    debug!(
                        ticker = %key,
                        provider = provider.name(),
                        bars = bars.len(),
                        "Bars fetched"
                    );
                    return Ok(SourcedBars { origin, bars });
                }
                Ok(_) => {
                    debug!(ticker = %key, provider = provider.name(), "Provider returned no bars");
                }
                Err(e) => {
                    warn!(ticker = %key, provider = provider.name(), error = %e, "Provider failed, trying next tier");
                }
            }
        }

        Err(DataError::Unavailable { ticker: key })
    }

    async fn get_quote(&self, ticker: &str) -> Quote {
        let key = ticker.to_uppercase();

        for provider in self.providers.iter().filter(|p| p.origin().is_real()) {
            match provider.fetch_quote(&key).await {
                Ok(quote) => return quote,
                Err(e) => {
                    debug!(ticker = %key, provider = provider.name(), error = %e, "Quote tier failed");
                }
            }
        }

        let last_known = self.cache().last_bar(&key).cloned();
        if let Some(bar) = last_known {
            debug!(ticker = %key, "Serving last-known quote from cache");
            return Quote {
                ticker: key,
                price: bar.close,
                volume: bar.volume,
                timestamp: bar.timestamp,
                source: DataOrigin::Cached,
            };
        }

        warn!(ticker = %key, "No quote available, serving placeholder");
        Quote::placeholder(&key)
    }

    fn paces_requests(&self) -> bool {
        self.providers.iter().any(|p| p.is_remote())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
