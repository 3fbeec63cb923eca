//! Opportunity scanner.
//!
//! Walks a ticker universe one symbol at a time, pulls bars from the
//! injected data source, scores each series, keeps the ones above the
//! inclusion threshold, attaches a trade plan and returns the best few.
//! One bad ticker never aborts a scan; it is logged and counted.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::plan::TradePlanBuilder;
use super::scoring;
use crate::data::MarketDataSource;
use crate::types::{Analysis, ScanError, ScanResult, ScanStats};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Minimum combined score for an analysis to be reported.
pub const INCLUSION_THRESHOLD: f64 = 75.0;

/// Only the first this-many universe entries are fetched per scan.
pub const UNIVERSE_CAP: usize = 15;

/// Pause between fetches when the source hits the network.
pub const DEFAULT_FETCH_PAUSE_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub universe_cap: usize,
    pub inclusion_threshold: f64,
    pub fetch_pause: Duration,
    /// When false, tickers served by the synthetic tier are skipped.
    pub allow_synthetic: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            universe_cap: UNIVERSE_CAP,
            inclusion_threshold: INCLUSION_THRESHOLD,
            fetch_pause: Duration::from_millis(DEFAULT_FETCH_PAUSE_MS),
            allow_synthetic: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub struct OpportunityScanner {
    source: Arc<dyn MarketDataSource>,
    planner: TradePlanBuilder,
    config: ScannerConfig,
}

impl OpportunityScanner {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        planner: TradePlanBuilder,
        config: ScannerConfig,
    ) -> Self {
        Self {
            source,
            planner,
            config,
        }
    }

    /// Scanner with default plan builder and settings.
    pub fn with_defaults(source: Arc<dyn MarketDataSource>) -> Self {
        Self::new(source, TradePlanBuilder::default(), ScannerConfig::default())
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// The data source this scanner reads from.
    pub fn source(&self) -> &Arc<dyn MarketDataSource> {
        &self.source
    }

    /// Reject a request `scan` would refuse, without fetching anything.
    pub fn validate(universe: &[String], max_results: usize) -> Result<(), ScanError> {
        if universe.is_empty() {
            return Err(ScanError::InvalidArgument("universe is empty".to_string()));
        }
        if max_results == 0 {
            return Err(ScanError::InvalidArgument(
                "max_results must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Scan `universe` and return at most `max_results` opportunities,
    /// best first. Ties keep universe order.
    pub async fn scan(&self, universe: &[String], max_results: usize) -> Result<ScanResult, ScanError> {
        Self::validate(universe, max_results)?;

        let tickers = &universe[..universe.len().min(self.config.universe_cap)];
        let pace = self.source.paces_requests() && !self.config.fetch_pause.is_zero();
        let mut stats = ScanStats {
            tickers_requested: tickers.len(),
            ..ScanStats::default()
        };

        info!(
            tickers = tickers.len(),
            max_results,
            threshold = self.config.inclusion_threshold,
            "Starting opportunity scan"
        );

        let mut picks: Vec<Analysis> = Vec::new();

        for (i, ticker) in tickers.iter().enumerate() {
            if pace && i > 0 {
                tokio::time::sleep(self.config.fetch_pause).await;
            }

            let sourced = match self.source.get_bars(ticker).await {
                Ok(s) if !s.bars.is_empty() => s,
                Ok(_) => {
                    warn!(ticker = %ticker, "No bars returned, skipping");
                    stats.tickers_skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(ticker = %ticker, error = %e, "Fetch failed, skipping");
                    stats.tickers_skipped += 1;
                    continue;
                }
            };

            if !sourced.origin.is_real() && !self.config.allow_synthetic {
                debug!(ticker = %ticker, "Synthetic data excluded");
                stats.synthetic_excluded += 1;
                continue;
            }

            let mut analysis = scoring::analyze(ticker, &sourced.bars, sourced.origin);
            stats.tickers_analyzed += 1;

            if analysis.combined_score < self.config.inclusion_threshold {
                debug!(
                    ticker = %ticker,
                    score = analysis.combined_score,
                    "Below inclusion threshold"
                );
                stats.below_threshold += 1;
                continue;
            }

            analysis.trade_plan = Some(self.planner.build(&analysis));
            debug!(ticker = %ticker, score = analysis.combined_score, source = %analysis.source, "Opportunity found");
            picks.push(analysis);
        }

        // sort_by is stable, so equal scores stay in universe order.
        picks.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
        picks.truncate(max_results);

        info!(
            analyzed = stats.tickers_analyzed,
            skipped = stats.tickers_skipped,
            below_threshold = stats.below_threshold,
            synthetic_excluded = stats.synthetic_excluded,
            returned = picks.len(),
            "Opportunity scan complete"
        );

        Ok(ScanResult {
            opportunities: picks,
            stats,
            scanned_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
