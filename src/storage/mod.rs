//! Persistence layer.
//!
//! Keeps watchlists, trade records and per-day usage counters in a single
//! JSON document. The whole document is rewritten on every change, which
//! is fine at dashboard scale. The scanner never writes here; callers
//! log what they act on.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{Analysis, Direction};

/// Name used when a caller doesn't pick a watchlist.
pub const DEFAULT_WATCHLIST: &str = "Default";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: Uuid,
    pub user_id: String,
    pub ticker: String,
    pub action: TradeAction,
    pub quantity: f64,
    pub price: f64,
    pub total: f64,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TradeRecord {
    pub fn new(user_id: &str, ticker: &str, action: TradeAction, quantity: f64, price: f64) -> Self {
        Self {
            trade_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            ticker: ticker.to_uppercase(),
            action,
            quantity,
            price,
            total: quantity * price,
            timestamp: Utc::now(),
            status: "completed".to_string(),
            notes: None,
        }
    }

    /// Record taking the entry of an analysis's trade plan. Falls back to
    /// the last price when no plan is attached.
    pub fn from_analysis(user_id: &str, analysis: &Analysis, quantity: f64) -> Self {
        let (action, price, notes) = match &analysis.trade_plan {
            Some(plan) => {
                let action = match plan.direction {
                    Direction::Long => TradeAction::Buy,
                    Direction::Short => TradeAction::Sell,
                };
                let notes = format!(
                    "{} stop {:.2} target {:.2} R/R {:.2} ({}, score {:.1})",
                    plan.direction,
                    plan.stop_loss,
                    plan.target,
                    plan.risk_reward,
                    plan.confidence,
                    analysis.combined_score,
                );
                (action, plan.entry, Some(notes))
            }
            None => (TradeAction::Buy, analysis.price, None),
        };
        Self {
            notes,
            ..Self::new(user_id, &analysis.ticker, action, quantity, price)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct UsageCounter {
    user_id: String,
    endpoint: String,
    date: NaiveDate,
    count: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    /// user_id -> watchlist name -> tickers
    #[serde(default)]
    watchlists: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    #[serde(default)]
    trades: Vec<TradeRecord>,
    #[serde(default)]
    usage: Vec<UsageCounter>,
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

#[cfg_attr(test, mockall::automock)]
pub trait PersistenceStore: Send + Sync {
    fn save_trade(&self, record: TradeRecord) -> Result<()>;

    /// Most recent first, at most `limit`.
    fn trades_for(&self, user_id: &str, limit: usize) -> Result<Vec<TradeRecord>>;

    fn get_named_watchlist(&self, user_id: &str, name: &str) -> Result<Vec<String>>;

    fn save_watchlist(&self, user_id: &str, name: &str, tickers: &[String]) -> Result<()>;

    /// Bump today's counter for `endpoint` and return the new count.
    fn record_usage(&self, user_id: &str, endpoint: &str, date: NaiveDate) -> Result<u32>;

    fn usage_on(&self, user_id: &str, endpoint: &str, date: NaiveDate) -> Result<u32>;

    /// Bump the counter only while it is below `limit`. Returns the new
    /// count, or `None` once the limit is reached. Check and bump happen
    /// under one lock.
    fn reserve_usage(
        &self,
        user_id: &str,
        endpoint: &str,
        date: NaiveDate,
        limit: u32,
    ) -> Result<Option<u32>>;

    /// The user's default watchlist; empty when none is saved.
    fn get_watchlist(&self, user_id: &str) -> Result<Vec<String>> {
        self.get_named_watchlist(user_id, DEFAULT_WATCHLIST)
    }
}

// ---------------------------------------------------------------------------
// JSON file store
// ---------------------------------------------------------------------------

pub struct JsonStore {
    path: PathBuf,
    doc: Mutex<StoreDocument>,
}

impl JsonStore {
    /// Open the store at `path`. A missing file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let doc = if path.exists() {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store from {}", path.display()))?;
            let doc: StoreDocument = serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse store from {}", path.display()))?;
            info!(
                path = %path.display(),
                trades = doc.trades.len(),
                users = doc.watchlists.len(),
                "Store loaded from disk"
            );
            doc
        } else {
            info!(path = %path.display(), "No store found, starting fresh");
            StoreDocument::default()
        };

        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn doc(&self) -> MutexGuard<'_, StoreDocument> {
        self.doc.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write the whole document. Called with the lock held so writers
    /// never interleave.
    fn persist(&self, doc: &StoreDocument) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(doc).context("Failed to serialise store")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write store to {}", self.path.display()))?;
        debug!(path = %self.path.display(), "Store saved");
        Ok(())
    }
}

/// Uppercase, trim, drop blanks and repeats. Order is kept.
fn normalize_tickers(tickers: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tickers.len());
    for t in tickers {
        let t = t.trim().to_uppercase();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

impl PersistenceStore for JsonStore {
    fn save_trade(&self, record: TradeRecord) -> Result<()> {
        let mut doc = self.doc();
        debug!(
            trade_id = %record.trade_id,
            user_id = %record.user_id,
            ticker = %record.ticker,
            action = %record.action,
            total = record.total,
            "Trade recorded"
        );
        doc.trades.push(record);
        self.persist(&doc)
    }

    fn trades_for(&self, user_id: &str, limit: usize) -> Result<Vec<TradeRecord>> {
        let doc = self.doc();
        let mut trades: Vec<TradeRecord> = doc
            .trades
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        trades.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        trades.truncate(limit);
        Ok(trades)
    }

    fn get_named_watchlist(&self, user_id: &str, name: &str) -> Result<Vec<String>> {
        let doc = self.doc();
        Ok(doc
            .watchlists
            .get(user_id)
            .and_then(|lists| lists.get(name))
            .cloned()
            .unwrap_or_default())
    }

    fn save_watchlist(&self, user_id: &str, name: &str, tickers: &[String]) -> Result<()> {
        let tickers = normalize_tickers(tickers);
        let mut doc = self.doc();
        debug!(user_id, name, tickers = tickers.len(), "Watchlist saved");
        doc.watchlists
            .entry(user_id.to_string())
            .or_default()
            .insert(name.to_string(), tickers);
        self.persist(&doc)
    }

    fn record_usage(&self, user_id: &str, endpoint: &str, date: NaiveDate) -> Result<u32> {
        let mut doc = self.doc();
        let count = bump_usage(&mut doc, user_id, endpoint, date);
        self.persist(&doc)?;
        Ok(count)
    }

    fn reserve_usage(
        &self,
        user_id: &str,
        endpoint: &str,
        date: NaiveDate,
        limit: u32,
    ) -> Result<Option<u32>> {
        let mut doc = self.doc();
        if usage_count(&doc, user_id, endpoint, date) >= limit {
            return Ok(None);
        }
        let count = bump_usage(&mut doc, user_id, endpoint, date);
        self.persist(&doc)?;
        Ok(Some(count))
    }

    fn usage_on(&self, user_id: &str, endpoint: &str, date: NaiveDate) -> Result<u32> {
        let doc = self.doc();
        Ok(usage_count(&doc, user_id, endpoint, date))
    }
}

fn usage_count(doc: &StoreDocument, user_id: &str, endpoint: &str, date: NaiveDate) -> u32 {
    doc.usage
        .iter()
        .find(|u| u.user_id == user_id && u.endpoint == endpoint && u.date == date)
        .map(|u| u.count)
        .unwrap_or(0)
}

fn bump_usage(doc: &mut StoreDocument, user_id: &str, endpoint: &str, date: NaiveDate) -> u32 {
    let existing = doc
        .usage
        .iter()
        .position(|u| u.user_id == user_id && u.endpoint == endpoint && u.date == date);
    match existing {
        Some(i) => {
            doc.usage[i].count += 1;
            doc.usage[i].count
        }
        None => {
            doc.usage.push(UsageCounter {
                user_id: user_id.to_string(),
                endpoint: endpoint.to_string(),
                date,
                count: 1,
            });
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
