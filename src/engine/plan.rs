//! Trade plan construction.
//!
//! Turns a scored [`Analysis`] into fixed-offset price levels plus a
//! confidence label and position-size band. Deterministic: the plan is a
//! pure function of the analysis.

use crate::types::{Analysis, Confidence, Direction, PositionBand, TradePlan, Trend};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const LONG_STOP_FACTOR: f64 = 0.93;
pub const LONG_TARGET_FACTOR: f64 = 1.21;
pub const SHORT_STOP_FACTOR: f64 = 1.07;
pub const SHORT_TARGET_FACTOR: f64 = 0.79;

pub const VERY_HIGH_CONFIDENCE_SCORE: f64 = 85.0;
pub const HIGH_CONFIDENCE_SCORE: f64 = 75.0;

pub const DEFAULT_TIMEFRAME: &str = "3-10 days";

/// Confidence label and sizing band for a combined score.
pub fn confidence_for(score: f64) -> (Confidence, PositionBand) {
    if score >= VERY_HIGH_CONFIDENCE_SCORE {
        (Confidence::VeryHigh, PositionBand { min_pct: 10.0, max_pct: 15.0 })
    } else if score >= HIGH_CONFIDENCE_SCORE {
        (Confidence::High, PositionBand { min_pct: 7.0, max_pct: 10.0 })
    } else {
        (Confidence::Moderate, PositionBand { min_pct: 5.0, max_pct: 7.0 })
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TradePlanBuilder {
    timeframe: String,
}

impl Default for TradePlanBuilder {
    fn default() -> Self {
        Self {
            timeframe: DEFAULT_TIMEFRAME.to_string(),
        }
    }
}

impl TradePlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the textual holding horizon.
    pub fn with_timeframe(timeframe: impl Into<String>) -> Self {
        Self {
            timeframe: timeframe.into(),
        }
    }

    pub fn timeframe(&self) -> &str {
        &self.timeframe
    }

    /// Build the plan for an analysis. Only a BULLISH trend goes long.
    pub fn build(&self, analysis: &Analysis) -> TradePlan {
        let price = analysis.price;
        let (direction, stop_loss, target) = match analysis.trend {
            Trend::Bullish => (
                Direction::Long,
                price * LONG_STOP_FACTOR,
                price * LONG_TARGET_FACTOR,
            ),
            Trend::Bearish | Trend::Neutral => (
                Direction::Short,
                price * SHORT_STOP_FACTOR,
                price * SHORT_TARGET_FACTOR,
            ),
        };
        let entry = price;

        let risk = (entry - stop_loss).abs();
        let reward = (target - entry).abs();
        let risk_reward = if risk > 0.0 { reward / risk } else { 0.0 };

        let (confidence, band) = confidence_for(analysis.combined_score);

        TradePlan {
            direction,
            entry: round2(entry),
            stop_loss: round2(stop_loss),
            target: round2(target),
            risk_reward: round2(risk_reward),
            timeframe: self.timeframe.clone(),
            position_size: band.to_string(),
            confidence,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataOrigin;

    fn analysis(price: f64, trend: Trend, score: f64) -> Analysis {
        Analysis {
            ticker: "TEST".into(),
            price,
            price_change_percent: 0.0,
            trend,
            combined_score: score,
            momentum_score: 50.0,
            volume_score: 50.0,
            trend_score: 50.0,
            source: DataOrigin::Live,
            trade_plan: None,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_long_plan_levels() {
        let plan = TradePlanBuilder::new().build(&analysis(100.0, Trend::Bullish, 80.0));
        assert_eq!(plan.direction, Direction::Long);
        assert!(close(plan.entry, 100.0));
        assert!(close(plan.stop_loss, 93.0));
        assert!(close(plan.target, 121.0));
        assert!(close(plan.risk_reward, 3.0));
    }

    #[test]
    fn test_short_plan_levels() {
        let plan = TradePlanBuilder::new().build(&analysis(100.0, Trend::Bearish, 80.0));
        assert_eq!(plan.direction, Direction::Short);
        assert!(close(plan.entry, 100.0));
        assert!(close(plan.stop_loss, 107.0));
        assert!(close(plan.target, 79.0));
        assert!(close(plan.risk_reward, 3.0));
    }

    #[test]
    fn test_neutral_goes_short() {
        let plan = TradePlanBuilder::new().build(&analysis(50.0, Trend::Neutral, 90.0));
        assert_eq!(plan.direction, Direction::Short);
    }

    #[test]
    fn test_zero_price_guards_risk_reward() {
        let plan = TradePlanBuilder::new().build(&analysis(0.0, Trend::Bullish, 90.0));
        assert_eq!(plan.risk_reward, 0.0);
        assert_eq!(plan.entry, 0.0);
    }

    #[test]
    fn test_confidence_bands() {
        let b = TradePlanBuilder::new();
        let p = b.build(&analysis(10.0, Trend::Bullish, 85.0));
        assert_eq!(p.confidence, Confidence::VeryHigh);
        assert_eq!(p.position_size, "10-15%");

        let p = b.build(&analysis(10.0, Trend::Bullish, 84.99));
        assert_eq!(p.confidence, Confidence::High);
        assert_eq!(p.position_size, "7-10%");

        let p = b.build(&analysis(10.0, Trend::Bullish, 75.0));
        assert_eq!(p.confidence, Confidence::High);

        let p = b.build(&analysis(10.0, Trend::Bullish, 74.0));
        assert_eq!(p.confidence, Confidence::Moderate);
        assert_eq!(p.position_size, "5-7%");
    }

    #[test]
    fn test_timeframe_default_and_override() {
        let p = TradePlanBuilder::new().build(&analysis(10.0, Trend::Bullish, 80.0));
        assert_eq!(p.timeframe, "3-10 days");

        let p = TradePlanBuilder::with_timeframe("1-2 weeks")
            .build(&analysis(10.0, Trend::Bullish, 80.0));
        assert_eq!(p.timeframe, "1-2 weeks");
    }

    #[test]
    fn test_prices_rounded_to_cents() {
        let p = TradePlanBuilder::new().build(&analysis(123.456, Trend::Bullish, 80.0));
        assert!(close(p.entry, 123.46));
        assert!(close(p.stop_loss, 114.81)); // 114.81408
        assert!(close(p.target, 149.38)); // 149.38176
    }
}
