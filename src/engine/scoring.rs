//! Heuristic scoring of a daily bar series.
//!
//! Three independent sub-scores (momentum, volume anomaly, trend
//! strength), each on a 0–100 scale where 50 is neutral, blended into a
//! combined score. Everything here is pure: the same bars always give the
//! same numbers.

use crate::types::{Analysis, Bar, DataOrigin, Trend};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Score returned whenever there is not enough data to judge.
pub const NEUTRAL_SCORE: f64 = 50.0;

pub const MOMENTUM_WEIGHT: f64 = 0.4;
pub const VOLUME_WEIGHT: f64 = 0.3;
pub const TREND_WEIGHT: f64 = 0.3;

/// Bars required before momentum or volume is scored.
pub const MIN_BARS_SHORT: usize = 10;
/// Bars required before trend is scored.
pub const MIN_BARS_TREND: usize = 20;

/// Momentum compares the latest close with the first close of a window
/// this many bars long.
pub const MOMENTUM_LOOKBACK: usize = 5;
/// Points per percent of price change; a ±25% move saturates.
pub const MOMENTUM_SENSITIVITY: f64 = 2.0;

pub const VOLUME_SHORT_WINDOW: usize = 5;
pub const VOLUME_LONG_WINDOW: usize = 20;

pub const MA_SHORT_WINDOW: usize = 10;
pub const MA_LONG_WINDOW: usize = 20;

pub const STRONG_UPTREND_SCORE: f64 = 85.0;
pub const STRONG_DOWNTREND_SCORE: f64 = 15.0;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn clamp_score(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 100.0)
    } else {
        NEUTRAL_SCORE
    }
}

/// Mean of the trailing `window` values (or all of them if fewer).
fn trailing_mean(values: impl DoubleEndedIterator<Item = f64>, window: usize) -> f64 {
    let (sum, n) = values
        .rev()
        .take(window)
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn pct_change(from: f64, to: f64) -> f64 {
    if from > 0.0 && from.is_finite() && to.is_finite() {
        (to - from) / from * 100.0
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Sub-scores
// ---------------------------------------------------------------------------

/// Five-bar rate of change mapped onto `50 + 2 × pct`.
pub fn momentum_score(bars: &[Bar]) -> f64 {
    if bars.len() < MIN_BARS_SHORT {
        return NEUTRAL_SCORE;
    }
    let n = bars.len();
    let change = if n >= MOMENTUM_LOOKBACK {
        pct_change(bars[n - MOMENTUM_LOOKBACK].close, bars[n - 1].close)
    } else {
        0.0
    };
    clamp_score(NEUTRAL_SCORE + MOMENTUM_SENSITIVITY * change)
}

/// Recent volume relative to the longer-run average.
pub fn volume_score(bars: &[Bar]) -> f64 {
    if bars.len() < MIN_BARS_SHORT {
        return NEUTRAL_SCORE;
    }
    let volumes = || bars.iter().map(|b| b.volume);
    let recent = trailing_mean(volumes(), VOLUME_SHORT_WINDOW);
    let average = if bars.len() >= VOLUME_LONG_WINDOW {
        trailing_mean(volumes(), VOLUME_LONG_WINDOW)
    } else {
        recent
    };

    if average == 0.0 || !average.is_finite() {
        return NEUTRAL_SCORE;
    }

    let ratio = recent / average;
    let score = if ratio > 2.0 {
        90.0
    } else if ratio > 1.5 {
        75.0
    } else if ratio > 1.0 {
        60.0
    } else {
        40.0
    };
    clamp_score(score)
}

/// Moving-average alignment. Flat and mixed orderings both score 50.
pub fn trend_score(bars: &[Bar]) -> f64 {
    if bars.len() < MIN_BARS_TREND {
        return NEUTRAL_SCORE;
    }
    let closes = || bars.iter().map(|b| b.close);
    let last = bars[bars.len() - 1].close;
    let ma_short = trailing_mean(closes(), MA_SHORT_WINDOW);
    let ma_long = trailing_mean(closes(), MA_LONG_WINDOW);

    if last > ma_short && ma_short > ma_long {
        STRONG_UPTREND_SCORE
    } else if last < ma_short && ma_short < ma_long {
        STRONG_DOWNTREND_SCORE
    } else {
        NEUTRAL_SCORE
    }
}

/// Weighted blend of the three sub-scores.
pub fn combined_score(momentum: f64, volume: f64, trend: f64) -> f64 {
    clamp_score(MOMENTUM_WEIGHT * momentum + VOLUME_WEIGHT * volume + TREND_WEIGHT * trend)
}

/// Label and percent change between the last two closes.
pub fn classify_trend(bars: &[Bar]) -> (Trend, f64) {
    match bars {
        [.., prev, last] => {
            let change = pct_change(prev.close, last.close);
            let trend = if change > 0.0 { Trend::Bullish } else { Trend::Bearish };
            (trend, change)
        }
        _ => (Trend::Neutral, 0.0),
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Score a full series for one ticker. No trade plan is attached.
///
/// An empty series produces a zero combined score so that it can never
/// pass an inclusion filter.
pub fn analyze(ticker: &str, bars: &[Bar], source: DataOrigin) -> Analysis {
    let momentum = momentum_score(bars);
    let volume = volume_score(bars);
    let trend = trend_score(bars);
    let (label, change) = classify_trend(bars);

    let (price, combined) = match bars.last() {
        Some(last) => (last.close, combined_score(momentum, volume, trend)),
        None => (0.0, 0.0),
    };

    Analysis {
        ticker: ticker.to_string(),
        price,
        price_change_percent: change,
        trend: label,
        combined_score: combined,
        momentum_score: momentum,
        volume_score: volume,
        trend_score: trend,
        source,
        trade_plan: None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
