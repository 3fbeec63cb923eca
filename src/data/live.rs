//! Live market data from the Yahoo Finance chart API.
//!
//! API: `https://query1.finance.yahoo.com/v8/finance/chart/{symbol}`
//! Auth: none, but requests without a browser-like user agent are
//! frequently rejected. Rate limits are undocumented, so the scanner
//! paces requests whenever this provider is in the chain.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::BarProvider;
use crate::types::{Bar, DataError, DataOrigin, Quote};

const PROVIDER: &str = "yahoo";
const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

// ---------------------------------------------------------------------------
// Chart API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Convert a chart response into bars, skipping rows with no open/close.
pub fn parse_chart(resp: ChartResponse) -> Result<Vec<Bar>, DataError> {
    if let Some(err) = resp.chart.error {
        return Err(DataError::Provider {
            provider: PROVIDER.to_string(),
            message: format!("{}: {}", err.code, err.description),
        });
    }

    let Some(result) = resp.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };
    let series = result.indicators.quote.into_iter().next().unwrap_or_default();
    let at = |v: &Vec<Option<f64>>, i: usize| v.get(i).copied().flatten();

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let (Some(open), Some(close)) = (at(&series.open, i), at(&series.close, i)) else {
            continue;
        };
        if open == 0.0 || close == 0.0 {
            continue;
        }
        let Some(timestamp) = DateTime::from_timestamp(ts, 0) else {
            continue;
        };
        bars.push(Bar {
            timestamp,
            open,
            high: at(&series.high, i).unwrap_or(open.max(close)),
            low: at(&series.low, i).unwrap_or(open.min(close)),
            close,
            volume: at(&series.volume, i).unwrap_or(0.0),
        });
    }
    Ok(bars)
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct LiveProvider {
    http: Client,
    base_url: String,
    range: String,
    interval: String,
}

impl LiveProvider {
    pub fn new(range: &str, interval: &str) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, range, interval)
    }

    pub fn with_base_url(base_url: &str, range: &str, interval: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("Mozilla/5.0 (compatible; OMNISCIENT/0.1.0)")
            .build()
            .context("Failed to build live-data HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            range: range.to_string(),
            interval: interval.to_string(),
        })
    }

    fn chart_url(&self, ticker: &str, range: &str, interval: &str) -> String {
        format!(
            "{}/v8/finance/chart/{}?range={}&interval={}",
            self.base_url,
            urlencoding::encode(&ticker.to_uppercase()),
            range,
            interval,
        )
    }

    async fn fetch_chart(&self, ticker: &str, range: &str, interval: &str) -> Result<Vec<Bar>, DataError> {
        let url = self.chart_url(ticker, range, interval);
        let provider_err = |message: String| DataError::Provider {
            provider: PROVIDER.to_string(),
            message,
        };

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| provider_err(format!("request failed for {ticker}: {e}")))?;

        if !resp.status().is_success() {
            return Err(provider_err(format!("{} for {ticker}", resp.status())));
        }

        let chart: ChartResponse = resp.json().await.map_err(|e| DataError::Parse {
            provider: PROVIDER.to_string(),
            message: format!("bad chart payload for {ticker}: {e}"),
        })?;

        let bars = parse_chart(chart)?;
        debug!(ticker, range, interval, bars = bars.len(), "Yahoo chart fetched");
        Ok(bars)
    }
}

#[async_trait]
impl BarProvider for LiveProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn origin(&self) -> DataOrigin {
        DataOrigin::Live
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn fetch_bars(&self, ticker: &str) -> Result<Vec<Bar>, DataError> {
        self.fetch_chart(ticker, &self.range, &self.interval).await
    }

    async fn fetch_quote(&self, ticker: &str) -> Result<Quote, DataError> {
        let bars = self.fetch_chart(ticker, "1d", "1m").await?;
        let last = bars.last().ok_or_else(|| DataError::Provider {
            provider: PROVIDER.to_string(),
            message: format!("no intraday data for {ticker}"),
        })?;
        Ok(Quote {
            ticker: ticker.to_uppercase(),
            price: last.close,
            volume: last.volume,
            timestamp: last.timestamp,
            source: DataOrigin::Live,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn chart(json: &str) -> ChartResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_chart_rows() {
        let resp = chart(
            r#"{"chart":{"result":[{
                "timestamp":[1735776000,1735862400,1735948800],
                "indicators":{"quote":[{
                    "open":[10.0,null,11.0],
                    "high":[10.5,11.0,null],
                    "low":[9.5,10.0,10.8],
                    "close":[10.2,10.9,11.4],
                    "volume":[1000,2000,null]
                }]}
            }],"error":null}}"#,
        );
        let bars = parse_chart(resp).unwrap();
        // Middle row has no open and is dropped.
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 10.2);
        assert_eq!(bars[0].volume, 1000.0);
        assert_eq!(bars[1].high, 11.4);
        assert_eq!(bars[1].volume, 0.0);
    }

    #[test]
    fn test_parse_chart_error() {
        let resp = chart(
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#,
        );
        let err = parse_chart(resp).unwrap_err();
        assert!(err.to_string().contains("delisted"));
    }

    #[test]
    fn test_parse_chart_empty_result() {
        let resp = chart(r#"{"chart":{"result":[],"error":null}}"#);
        assert!(parse_chart(resp).unwrap().is_empty());
    }

    #[test]
    fn test_chart_url() {
        let p = LiveProvider::with_base_url("http://localhost:9/", "1mo", "1d").unwrap();
        assert_eq!(
            p.chart_url("aapl", "1mo", "1d"),
            "http://localhost:9/v8/finance/chart/AAPL?range=1mo&interval=1d"
        );
        assert!(p.is_remote());
        assert_eq!(p.origin(), DataOrigin::Live);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_provider_error() {
        let p = LiveProvider::with_base_url("http://127.0.0.1:9", "1mo", "1d").unwrap();
        let err = p.fetch_bars("AAPL").await.unwrap_err();
        assert!(matches!(err, DataError::Provider { .. }));
    }
}
