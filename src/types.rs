//! Shared types for the OMNISCIENT scanner.
//!
//! These types form the data model used across all modules: raw market
//! data coming out of the providers, the per-ticker analysis produced by
//! the scoring engine, and the ranked scan result handed to the dashboard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// One OHLCV sample for a fixed time interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Sort bars chronologically and drop duplicate timestamps (first one wins).
pub fn normalize_bars(mut bars: Vec<Bar>) -> Vec<Bar> {
    bars.sort_by_key(|b| b.timestamp);
    bars.dedup_by_key(|b| b.timestamp);
    bars
}

/// Which provider tier produced a piece of market data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOrigin {
    /// Bulk object-store / flat-file provider.
    FlatFile,
    /// Live finance-data API.
    Live,
    /// Last-known value served from the source's cache.
    Cached,
    /// Generated placeholder. Never real signal.
    Synthetic,
}

impl DataOrigin {
    /// Whether the data came from a real upstream provider.
    pub fn is_real(&self) -> bool {
        !matches!(self, DataOrigin::Synthetic)
    }
}

impl fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataOrigin::FlatFile => write!(f, "flat_file"),
            DataOrigin::Live => write!(f, "live"),
            DataOrigin::Cached => write!(f, "cached"),
            DataOrigin::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// A bar series together with the tier that served it.
#[derive(Debug, Clone)]
pub struct SourcedBars {
    pub origin: DataOrigin,
    pub bars: Vec<Bar>,
}

/// Latest known price for a ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    pub price: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
    pub source: DataOrigin,
}

impl Quote {
    /// Fixed placeholder used when no provider could supply a quote.
    pub fn placeholder(ticker: &str) -> Self {
        Quote {
            ticker: ticker.to_string(),
            price: 100.0,
            volume: 1_000_000.0,
            timestamp: Utc::now(),
            source: DataOrigin::Synthetic,
        }
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ${:.2} (vol {:.0}, {})",
            self.ticker, self.price, self.volume, self.source
        )
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Short-term price direction between the last two closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Bullish => write!(f, "BULLISH"),
            Trend::Bearish => write!(f, "BEARISH"),
            Trend::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Confidence label attached to a trade plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Confidence {
    #[serde(rename = "VERY HIGH")]
    VeryHigh,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "MODERATE")]
    Moderate,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::VeryHigh => write!(f, "VERY HIGH"),
            Confidence::High => write!(f, "HIGH"),
            Confidence::Moderate => write!(f, "MODERATE"),
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis & trade plan
// ---------------------------------------------------------------------------

/// Recommended position size as a percentage range of portfolio value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionBand {
    pub min_pct: f64,
    pub max_pct: f64,
}

impl PositionBand {
    /// Dollar allocation range for a given portfolio value.
    pub fn dollar_range(&self, portfolio_value: f64) -> (f64, f64) {
        let value = portfolio_value.max(0.0);
        (value * self.min_pct / 100.0, value * self.max_pct / 100.0)
    }
}

impl fmt::Display for PositionBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}-{:.0}%", self.min_pct, self.max_pct)
    }
}

/// Concrete price levels and sizing for acting on a scored opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub direction: Direction,
    pub entry: f64,
    pub stop_loss: f64,
    pub target: f64,
    pub risk_reward: f64,
    pub timeframe: String,
    /// Band label such as `"10-15%"`.
    pub position_size: String,
    pub confidence: Confidence,
}

impl fmt::Display for TradePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entry ${:.2} | stop ${:.2} | target ${:.2} | R/R 1:{:.1} | {} | size {} | {}",
            self.direction,
            self.entry,
            self.stop_loss,
            self.target,
            self.risk_reward,
            self.timeframe,
            self.position_size,
            self.confidence,
        )
    }
}

/// Scored snapshot of one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub ticker: String,
    pub price: f64,
    pub price_change_percent: f64,
    pub trend: Trend,
    pub combined_score: f64,
    pub momentum_score: f64,
    pub volume_score: f64,
    pub trend_score: f64,
    pub source: DataOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_plan: Option<TradePlan>,
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} score {:.0}/100 | ${:.2} ({:+.2}%) | {} | M {:.0} V {:.0} T {:.0}",
            self.ticker,
            self.combined_score,
            self.price,
            self.price_change_percent,
            self.trend,
            self.momentum_score,
            self.volume_score,
            self.trend_score,
        )
    }
}

// ---------------------------------------------------------------------------
// Scan result
// ---------------------------------------------------------------------------

/// Per-scan counters. Skipped tickers are absorbed, so this is where
/// they become visible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub tickers_requested: usize,
    pub tickers_analyzed: usize,
    pub tickers_skipped: usize,
    pub synthetic_excluded: usize,
    pub below_threshold: usize,
}

/// Ranked opportunities, best first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub opportunities: Vec<Analysis>,
    pub stats: ScanStats,
    pub scanned_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn len(&self) -> usize {
        self.opportunities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opportunities.is_empty()
    }

    pub fn top(&self) -> Option<&Analysis> {
        self.opportunities.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Analysis> {
        self.opportunities.iter()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures from market data providers.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("No provider could supply data for {ticker}")]
    Unavailable { ticker: String },

    #[error("Provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("Parse error ({provider}): {message}")]
    Parse { provider: String, message: String },
}

/// Failures surfaced by a scan invocation.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar_at(day: u32, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2025, 3, day, 0, 0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_normalize_sorts_and_dedups() {
        let bars = vec![bar_at(3, 3.0), bar_at(1, 1.0), bar_at(3, 9.0), bar_at(2, 2.0)];
        let norm = normalize_bars(bars);
        let closes: Vec<f64> = norm.iter().map(|b| b.close).collect();
        assert_eq!(closes.len(), 3);
        assert_eq!(closes[0], 1.0);
        assert_eq!(closes[1], 2.0);
        assert_eq!(norm[2].timestamp.format("%d").to_string(), "03");
    }

    #[test]
    fn test_origin_is_real() {
        assert!(DataOrigin::FlatFile.is_real());
        assert!(DataOrigin::Live.is_real());
        assert!(DataOrigin::Cached.is_real());
        assert!(!DataOrigin::Synthetic.is_real());
    }

    #[test]
    fn test_enum_serialization_labels() {
        assert_eq!(serde_json::to_string(&Trend::Bullish).unwrap(), "\"BULLISH\"");
        assert_eq!(serde_json::to_string(&Direction::Short).unwrap(), "\"SHORT\"");
        assert_eq!(serde_json::to_string(&Confidence::VeryHigh).unwrap(), "\"VERY HIGH\"");
        assert_eq!(serde_json::to_string(&DataOrigin::FlatFile).unwrap(), "\"flat_file\"");
    }

    #[test]
    fn test_position_band_display_and_range() {
        let band = PositionBand { min_pct: 10.0, max_pct: 15.0 };
        assert_eq!(band.to_string(), "10-15%");
        let (lo, hi) = band.dollar_range(50_000.0);
        assert!((lo - 5_000.0).abs() < 1e-9);
        assert!((hi - 7_500.0).abs() < 1e-9);
        assert_eq!(band.dollar_range(-1.0), (0.0, 0.0));
    }

    #[test]
    fn test_placeholder_quote_is_tagged_synthetic() {
        let q = Quote::placeholder("NVDA");
        assert_eq!(q.price, 100.0);
        assert_eq!(q.volume, 1_000_000.0);
        assert_eq!(q.source, DataOrigin::Synthetic);
    }

    #[test]
    fn test_analysis_serializes_expected_fields() {
        let a = Analysis {
            ticker: "AAPL".into(),
            price: 10.0,
            price_change_percent: 1.5,
            trend: Trend::Bullish,
            combined_score: 80.0,
            momentum_score: 90.0,
            volume_score: 60.0,
            trend_score: 85.0,
            source: DataOrigin::Live,
            trade_plan: Some(TradePlan {
                direction: Direction::Long,
                entry: 10.0,
                stop_loss: 9.3,
                target: 12.1,
                risk_reward: 3.0,
                timeframe: "3-10 days".into(),
                position_size: "7-10%".into(),
                confidence: Confidence::High,
            }),
        };
        let json: serde_json::Value = serde_json::to_value(&a).unwrap();
        for key in [
            "ticker", "price", "price_change_percent", "trend", "combined_score",
            "momentum_score", "volume_score", "trend_score",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        let plan = &json["trade_plan"];
        for key in [
            "direction", "entry", "stop_loss", "target", "risk_reward",
            "timeframe", "position_size", "confidence",
        ] {
            assert!(plan.get(key).is_some(), "missing trade_plan.{key}");
        }
        assert_eq!(plan["confidence"], "HIGH");
    }

    #[test]
    fn test_error_display() {
        let e = DataError::Unavailable { ticker: "TSLA".into() };
        assert_eq!(e.to_string(), "No provider could supply data for TSLA");
        let e = ScanError::InvalidArgument("universe is empty".into());
        assert!(e.to_string().contains("universe is empty"));
    }
}
