//! OMNISCIENT ONE: market opportunity scanner.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the market data chain, opens the store, optionally serves the
//! dashboard, and rescans the universe on a fixed interval until Ctrl-C.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use omniscient::auth::{AuthProvider, StaticAuth};
use omniscient::config;
use omniscient::dashboard::{self, AppState, DashboardState};
use omniscient::data::{MarketDataSource, TieredSource};
use omniscient::engine::{OpportunityScanner, TradePlanBuilder};
use omniscient::storage::{JsonStore, PersistenceStore};
use omniscient::subscription::PlanTable;
use omniscient::types::ScanResult;

const BANNER: &str = r#"
  ___  __  __ _  _ ___ ___  ___ ___ ___ _  _ _____
 / _ \|  \/  | \| |_ _/ __|/ __|_ _| __| \| |_   _|
| (_) | |\/| | .` || |\__ \ (__ | || _|| .` | | |
 \___/|_|  |_|_|\_|___|___/\___|___|___|_|\_| |_|

  Opportunity scanner · v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("OMNISCIENT_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        name = %cfg.app.name,
        scan_interval_secs = cfg.app.scan_interval_secs,
        universe = cfg.scanner.universe.len(),
        max_results = cfg.scanner.max_results,
        "OMNISCIENT starting up"
    );

    // -- Initialise components -------------------------------------------

    let source: Arc<dyn MarketDataSource> = Arc::new(TieredSource::from_config(&cfg.data_sources)?);
    let tiers = &cfg.data_sources;
    if !(tiers.flat_file.enabled || tiers.live.enabled || tiers.synthetic.enabled) {
        warn!("Every data tier is disabled; scans will report nothing");
    }

    let scanner = OpportunityScanner::new(
        source,
        TradePlanBuilder::with_timeframe(cfg.scanner.timeframe.clone()),
        cfg.scanner.scanner_config(),
    );

    let store: Arc<dyn PersistenceStore> = Arc::new(JsonStore::open(&cfg.storage.path)?);

    let auth: Arc<dyn AuthProvider> = match cfg.dashboard.operator.clone() {
        Some(user) => {
            info!(
                user_id = %user.user_id,
                tier = %user.tier,
                active_tier = %user.active_tier(chrono::Utc::now()),
                "Dashboard operator configured"
            );
            Arc::new(StaticAuth::signed_in(user))
        }
        None => Arc::new(StaticAuth::anonymous()),
    };

    let state: AppState = Arc::new(DashboardState::new(
        scanner,
        Arc::new(PlanTable),
        auth,
        store,
        cfg.scanner.universe.clone(),
        cfg.scanner.max_results,
    ));

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(state.clone(), cfg.dashboard.port).await?;
    }

    // -- Main loop -------------------------------------------------------

    let scan_interval = Duration::from_secs(cfg.app.scan_interval_secs.max(1));
    let mut interval = tokio::time::interval(scan_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = scan_interval.as_secs(),
        "Entering scan loop. Press Ctrl+C to stop."
    );

    let mut cycles = 0u64;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                cycles += 1;
                match state.scanner.scan(&state.universe, state.default_max_results).await {
                    Ok(result) => {
                        log_scan(cycles, &result);
                        *state.latest.write().await = Some(result);
                    }
                    Err(e) => error!(cycle = cycles, error = %e, "Scan failed, continuing to next"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!(cycles, "OMNISCIENT shut down cleanly.");
    Ok(())
}

/// Log a scan summary and each pick.
fn log_scan(cycle: u64, result: &ScanResult) {
    info!(
        cycle,
        requested = result.stats.tickers_requested,
        analyzed = result.stats.tickers_analyzed,
        skipped = result.stats.tickers_skipped,
        picks = result.len(),
        "Scan complete"
    );

    for (rank, a) in result.iter().enumerate() {
        let Some(plan) = &a.trade_plan else { continue };
        info!(
            rank = rank + 1,
            ticker = %a.ticker,
            score = format!("{:.1}", a.combined_score),
            direction = %plan.direction,
            entry = plan.entry,
            stop = plan.stop_loss,
            target = plan.target,
            rr = plan.risk_reward,
            confidence = %plan.confidence,
            size = %plan.position_size,
            source = %a.source,
            "Opportunity"
        );
        if !a.source.is_real() {
            warn!(ticker = %a.ticker, "Pick is based on synthetic data, do not trade it");
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("omniscient=info"));

    let json_logging = std::env::var("OMNISCIENT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
