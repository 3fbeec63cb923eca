//! Shared fixtures for integration tests.
//!
//! `StubSource` is a deterministic in-memory `MarketDataSource`: each
//! ticker is scripted to return fixed bars or fail. Every request is
//! recorded so tests can check fetch order and counts.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use omniscient::data::MarketDataSource;
use omniscient::types::{Bar, DataError, DataOrigin, Quote, SourcedBars};

/// Daily bars starting 2025-01-01 with the given closes and volumes.
pub fn bars(closes: &[f64], volumes: &[f64]) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&close, &volume))| Bar {
            timestamp: start + Duration::days(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume,
        })
        .collect()
}

/// 25 bars compounding `step_pct` per day, volume 5x in the last five.
/// Steps of 1% or more clear the default inclusion threshold.
pub fn breakout(step_pct: f64) -> Vec<Bar> {
    let closes: Vec<f64> = (0..25)
        .map(|i| 100.0 * (1.0 + step_pct / 100.0).powi(i))
        .collect();
    let volumes: Vec<f64> = (0..25).map(|i| if i >= 20 { 5_000.0 } else { 1_000.0 }).collect();
    bars(&closes, &volumes)
}

/// 25 bars falling `step_pct` per day on flat volume.
pub fn slide(step_pct: f64) -> Vec<Bar> {
    let closes: Vec<f64> = (0..25)
        .map(|i| 100.0 * (1.0 - step_pct / 100.0).powi(i))
        .collect();
    bars(&closes, &[1_000.0; 25])
}

enum Script {
    Bars(DataOrigin, Vec<Bar>),
    Fail,
}

#[derive(Default)]
pub struct StubSource {
    scripts: HashMap<String, Script>,
    paces: bool,
    calls: Mutex<Vec<String>>,
}

impl StubSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, ticker: &str, bars: Vec<Bar>) -> Self {
        self.scripts
            .insert(ticker.to_string(), Script::Bars(DataOrigin::Live, bars));
        self
    }

    pub fn with_origin(mut self, ticker: &str, origin: DataOrigin, bars: Vec<Bar>) -> Self {
        self.scripts.insert(ticker.to_string(), Script::Bars(origin, bars));
        self
    }

    pub fn failing(mut self, ticker: &str) -> Self {
        self.scripts.insert(ticker.to_string(), Script::Fail);
        self
    }

    pub fn pacing(mut self) -> Self {
        self.paces = true;
        self
    }

    /// Tickers requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketDataSource for StubSource {
    async fn get_bars(&self, ticker: &str) -> Result<SourcedBars, DataError> {
        self.calls.lock().unwrap().push(ticker.to_string());
        match self.scripts.get(ticker) {
            Some(Script::Bars(origin, bars)) => Ok(SourcedBars {
                origin: *origin,
                bars: bars.clone(),
            }),
            Some(Script::Fail) | None => Err(DataError::Unavailable {
                ticker: ticker.to_string(),
            }),
        }
    }

    async fn get_quote(&self, ticker: &str) -> Quote {
        match self.scripts.get(ticker) {
            Some(Script::Bars(origin, bars)) if !bars.is_empty() => {
                let last = &bars[bars.len() - 1];
                Quote {
                    ticker: ticker.to_string(),
                    price: last.close,
                    volume: last.volume,
                    timestamp: last.timestamp,
                    source: *origin,
                }
            }
            _ => Quote::placeholder(ticker),
        }
    }

    fn paces_requests(&self) -> bool {
        self.paces
    }
}
