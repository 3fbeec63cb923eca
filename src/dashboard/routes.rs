//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::auth::{AuthProvider, User};
use crate::engine::plan::confidence_for;
use crate::engine::OpportunityScanner;
use crate::storage::{PersistenceStore, TradeRecord};
use crate::subscription::{Feature, SubscriptionPolicy, Tier, TierLimits, UsageStats};
use crate::types::{Analysis, Direction, Quote, ScanError, ScanResult};

/// Usage counter key for scans.
pub const SCAN_ENDPOINT: &str = "scan";

/// Usage counter key for quote lookups, counted as API calls.
pub const QUOTE_ENDPOINT: &str = "quote";

/// Session id used for usage accounting when nobody is signed in.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Trades returned by `/api/trades`.
const TRADE_HISTORY_LIMIT: usize = 50;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub scanner: OpportunityScanner,
    pub policy: Arc<dyn SubscriptionPolicy>,
    pub auth: Arc<dyn AuthProvider>,
    pub store: Arc<dyn PersistenceStore>,
    /// Scanned when the user has no watchlist.
    pub universe: Vec<String>,
    pub default_max_results: usize,
    pub latest: RwLock<Option<ScanResult>>,
}

/// Who is asking, and the tier whose limits apply right now.
struct Session {
    user: User,
    tier: Tier,
}

impl DashboardState {
    pub fn new(
        scanner: OpportunityScanner,
        policy: Arc<dyn SubscriptionPolicy>,
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn PersistenceStore>,
        universe: Vec<String>,
        default_max_results: usize,
    ) -> Self {
        Self {
            scanner,
            policy,
            auth,
            store,
            universe,
            default_max_results,
            latest: RwLock::new(None),
        }
    }

    /// The signed-in user, or an anonymous free-tier session. A lapsed
    /// paid subscription gets free-tier limits.
    fn session(&self) -> Session {
        match self.auth.current_user() {
            Some(user) => Session {
                tier: user.active_tier(Utc::now()),
                user,
            },
            None => Session {
                user: User::new(ANONYMOUS_USER, ANONYMOUS_USER, Tier::Free),
                tier: Tier::Free,
            },
        }
    }

    fn require_feature(&self, session: &Session, feature: Feature) -> Result<(), ApiError> {
        if self.policy.feature_enabled(session.tier, feature) {
            Ok(())
        } else {
            Err(ApiError::FeatureLocked {
                feature,
                tier: session.tier,
            })
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("daily scan limit of {limit} reached for the {tier} tier")]
    QuotaExceeded { tier: Tier, limit: u32 },

    #[error("{feature} is not included in the {tier} tier")]
    FeatureLocked { feature: Feature, tier: Tier },

    #[error("{0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ScanError> for ApiError {
    fn from(e: ScanError) -> Self {
        match e {
            ScanError::InvalidArgument(msg) => ApiError::InvalidArgument(msg),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::FeatureLocked { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self, "Dashboard request failed");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ScanParams {
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountResponse {
    pub user: User,
    /// Tier whose limits apply today; free when a paid period has lapsed.
    pub active_tier: Tier,
    pub limits: TierLimits,
    pub scans_today: u32,
    pub scans_remaining: u32,
    pub quotes_today: u32,
    pub upgrade_recommendation: Option<Tier>,
}

#[derive(Debug, Deserialize)]
pub struct TradeRequest {
    pub ticker: String,
    pub quantity: f64,
}

#[derive(Debug, Deserialize)]
pub struct AllocationParams {
    pub portfolio_value: f64,
}

/// Dollar sizing of one pick for a given portfolio value.
#[derive(Debug, Clone, Serialize)]
pub struct Allocation {
    pub ticker: String,
    pub direction: Option<Direction>,
    pub entry: f64,
    pub position_size: String,
    pub min_dollars: f64,
    pub max_dollars: f64,
}

impl Allocation {
    fn for_analysis(analysis: &Analysis, portfolio_value: f64) -> Self {
        let (_, band) = confidence_for(analysis.combined_score);
        let (min_dollars, max_dollars) = band.dollar_range(portfolio_value);
        let plan = analysis.trade_plan.as_ref();
        Self {
            ticker: analysis.ticker.clone(),
            direction: plan.map(|p| p.direction),
            entry: plan.map_or(analysis.price, |p| p.entry),
            position_size: band.to_string(),
            min_dollars,
            max_dollars,
        }
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// GET /api/scan?max_results=N
pub async fn run_scan(
    State(state): State<AppState>,
    Query(params): Query<ScanParams>,
) -> Result<Json<ScanResult>, ApiError> {
    let session = state.session();
    let user_id = session.user.user_id.as_str();
    let today = Utc::now().date_naive();

    let watchlist = state.store.get_watchlist(user_id)?;
    let universe = if watchlist.is_empty() {
        state.universe.clone()
    } else {
        watchlist
    };
    let max_results = params.max_results.unwrap_or(state.default_max_results);
    OpportunityScanner::validate(&universe, max_results)?;

    // Take the quota slot before scanning so parallel requests can't
    // all pass the check.
    let limit = state.policy.max_daily_scans(session.tier);
    let Some(used) = state.store.reserve_usage(user_id, SCAN_ENDPOINT, today, limit)? else {
        info!(user_id, tier = %session.tier, limit, "Scan quota exhausted");
        return Err(ApiError::QuotaExceeded {
            tier: session.tier,
            limit,
        });
    };

    let result = state.scanner.scan(&universe, max_results).await?;
    *state.latest.write().await = Some(result.clone());

    info!(
        user_id,
        used,
        limit,
        opportunities = result.len(),
        "Dashboard scan served"
    );
    Ok(Json(result))
}

/// GET /api/scan/latest
pub async fn latest_scan(State(state): State<AppState>) -> Result<Json<ScanResult>, ApiError> {
    state
        .latest
        .read()
        .await
        .clone()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no scan has run yet".to_string()))
}

/// GET /api/quote/:ticker (needs real-time data)
pub async fn get_quote(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Quote>, ApiError> {
    let session = state.session();
    state.require_feature(&session, Feature::RealTimeData)?;
    let today = Utc::now().date_naive();
    state.store.record_usage(&session.user.user_id, QUOTE_ENDPOINT, today)?;
    Ok(Json(state.scanner.source().get_quote(&ticker).await))
}

/// GET /api/plans
pub async fn get_plans(State(state): State<AppState>) -> Json<Vec<TierLimits>> {
    Json(Tier::ALL.iter().map(|&t| state.policy.limits(t)).collect())
}

/// GET /api/account
pub async fn get_account(State(state): State<AppState>) -> Result<Json<AccountResponse>, ApiError> {
    let Session { user, tier } = state.session();
    let today = Utc::now().date_naive();
    let limits = state.policy.limits(tier);
    let scans_today = state.store.usage_on(&user.user_id, SCAN_ENDPOINT, today)?;
    let quotes_today = state.store.usage_on(&user.user_id, QUOTE_ENDPOINT, today)?;
    let usage = UsageStats {
        scans_used: scans_today,
        api_calls_used: quotes_today,
        ..UsageStats::default()
    };

    Ok(Json(AccountResponse {
        upgrade_recommendation: state.policy.upgrade_recommendation(tier, &usage),
        scans_remaining: state.policy.max_daily_scans(tier).saturating_sub(scans_today),
        scans_today,
        quotes_today,
        limits,
        active_tier: tier,
        user,
    }))
}

/// GET /api/allocation?portfolio_value=N
pub async fn get_allocation(
    State(state): State<AppState>,
    Query(params): Query<AllocationParams>,
) -> Result<Json<Vec<Allocation>>, ApiError> {
    if !params.portfolio_value.is_finite() || params.portfolio_value <= 0.0 {
        return Err(ApiError::InvalidArgument(
            "portfolio_value must be a positive number".to_string(),
        ));
    }
    let latest = state.latest.read().await;
    let result = latest
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("no scan has run yet".to_string()))?;
    Ok(Json(
        result
            .iter()
            .map(|a| Allocation::for_analysis(a, params.portfolio_value))
            .collect(),
    ))
}

/// GET /api/trades
pub async fn get_trades(State(state): State<AppState>) -> Result<Json<Vec<TradeRecord>>, ApiError> {
    let session = state.session();
    Ok(Json(state.store.trades_for(&session.user.user_id, TRADE_HISTORY_LIMIT)?))
}

/// POST /api/trades: record a trade on a pick from the latest scan.
pub async fn record_trade(
    State(state): State<AppState>,
    Json(req): Json<TradeRequest>,
) -> Result<(StatusCode, Json<TradeRecord>), ApiError> {
    if !req.quantity.is_finite() || req.quantity <= 0.0 {
        return Err(ApiError::InvalidArgument(
            "quantity must be a positive number".to_string(),
        ));
    }

    let analysis = state
        .latest
        .read()
        .await
        .as_ref()
        .and_then(|r| r.iter().find(|a| a.ticker.eq_ignore_ascii_case(req.ticker.trim())).cloned())
        .ok_or_else(|| ApiError::NotFound(format!("{} is not in the latest scan", req.ticker)))?;

    let session = state.session();
    let record = TradeRecord::from_analysis(&session.user.user_id, &analysis, req.quantity);
    state.store.save_trade(record.clone())?;

    info!(
        user_id = %record.user_id,
        ticker = %record.ticker,
        action = %record.action,
        quantity = record.quantity,
        price = record.price,
        "Trade recorded from scan"
    );
    Ok((StatusCode::CREATED, Json(record)))
}
