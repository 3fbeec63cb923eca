//! Synthetic fallback provider.
//!
//! Generates a seeded random walk so the pipeline always has something
//! to score when every real provider is unreachable. The series shape is
//! a pure function of the ticker; only the anchoring date moves. Output is
//! tagged `synthetic` and must never be treated as signal.

use async_trait::async_trait;
use chrono::{Duration, NaiveTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::BarProvider;
use crate::types::{Bar, DataError, DataOrigin, Quote};

const PROVIDER: &str = "synthetic";

/// Maximum absolute daily return of the walk.
const DAILY_VOLATILITY: f64 = 0.02;

/// FNV-1a, so the seed is stable across builds and platforms.
fn seed_for(ticker: &str) -> u64 {
    ticker
        .to_uppercase()
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |hash, b| {
            (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        })
}

pub struct SyntheticProvider {
    bars: usize,
}

impl SyntheticProvider {
    pub fn new(bars: usize) -> Self {
        Self { bars }
    }

    /// Daily bars ending today (UTC midnight).
    pub fn generate(&self, ticker: &str) -> Vec<Bar> {
        let mut rng = StdRng::seed_from_u64(seed_for(ticker));
        let today = Utc::now().date_naive().and_time(NaiveTime::default()).and_utc();

        let mut price: f64 = rng.gen_range(20.0..400.0);
        let mut out = Vec::with_capacity(self.bars);

        for i in 0..self.bars {
            let open = price;
            price *= 1.0 + rng.gen_range(-DAILY_VOLATILITY..DAILY_VOLATILITY);
            let close = price;
            let wiggle = rng.gen::<f64>() * 0.01;
            let days_back = (self.bars - 1 - i) as i64;

            out.push(Bar {
                timestamp: today - Duration::days(days_back),
                open,
                high: open.max(close) * (1.0 + wiggle),
                low: open.min(close) * (1.0 - wiggle),
                close,
                volume: rng.gen_range(1_000_000u64..10_000_000u64) as f64,
            });
        }
        out
    }
}

#[async_trait]
impl BarProvider for SyntheticProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn origin(&self) -> DataOrigin {
        DataOrigin::Synthetic
    }

    fn is_remote(&self) -> bool {
        false
    }

    async fn fetch_bars(&self, ticker: &str) -> Result<Vec<Bar>, DataError> {
        Ok(self.generate(ticker))
    }

    async fn fetch_quote(&self, ticker: &str) -> Result<Quote, DataError> {
        match self.generate(ticker).last() {
            Some(bar) => Ok(Quote {
                ticker: ticker.to_uppercase(),
                price: bar.close,
                volume: bar.volume,
                timestamp: Utc::now(),
                source: DataOrigin::Synthetic,
            }),
            None => Ok(Quote::placeholder(&ticker.to_uppercase())),
        }
    }
}
