//! End-to-end purchase and probe runs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::action::{ActionEngine, Activation, ElementAction, ElementContext};
use crate::balances::{fetch_with_reauth, print_report, reconcile, BalancesClient, Reconciliation};
use crate::browser::{
    attach_console_logging, wait_for_app_frame, BrowserSession, ContextTracker, FrameContext,
};
use crate::config::ResolvedConfig;
use crate::flow::{run_flow, FlowOutcome};
use crate::flows::{self, AssetKind};
use crate::session::{is_app_url, SessionTokenProvider, TokenSource};
use crate::store::{
    JsonFileStore, StateStore, BALANCES_KEY, BALANCES_RAW_KEY, INVENTORY_KEY, LAST_RUN_KEY,
};

const FRAME_WAIT: Duration = Duration::from_secs(30);
const PAGE_SETTLE: Duration = Duration::from_secs(3);
const PROBE_SETTLE: Duration = Duration::from_secs(10);

/// Sweeps of the Stars payment sheet search, page and app frame alternating.
const PAYMENT_SWEEPS: u32 = 30;
const PAYMENT_SWEEP_DELAY: Duration = Duration::from_millis(400);

/// What one purchase run produced.
#[derive(Debug)]
pub struct RunReport {
    pub asset: AssetKind,
    pub flow: FlowOutcome,
    pub reconciliation: Reconciliation,
    pub token_refreshed: bool,
}

/// Wires a full scenario: browser, flow, token, reconciliation, persistence.
pub struct RunOrchestrator {
    config: ResolvedConfig,
    store: Arc<dyn StateStore>,
}

impl RunOrchestrator {
    pub fn new(config: ResolvedConfig) -> Self {
        let store = Arc::new(JsonFileStore::new(&config.data_dir));
        Self { config, store }
    }

    /// Use an explicit store (useful for tests).
    pub fn with_store(config: ResolvedConfig, store: Arc<dyn StateStore>) -> Self {
        Self { config, store }
    }

    /// Run the purchase flow for one asset and reconcile its balance.
    ///
    /// The browser is released unconditionally, however far the flow got;
    /// the operator checkpoint comes first so the session can be inspected.
    pub async fn run_purchase(&self, asset: AssetKind) -> Result<RunReport> {
        let session = BrowserSession::launch(&self.config.profile_dir(), self.config.headless).await?;
        let outcome = self.drive_purchase(&session, asset).await;
        pause_for_operator();
        session.close().await;
        outcome
    }

    async fn drive_purchase(&self, session: &BrowserSession, asset: AssetKind) -> Result<RunReport> {
        let page = session.new_page("about:blank").await?;
        if let Err(err) = attach_console_logging(&page).await {
            warn!(error = %err, "console diagnostics unavailable");
        }
        let tracker = ContextTracker::install(&page).await?;

        page.goto(self.config.telegram_url.as_str())
            .await
            .context("Failed to open Telegram Web")?;
        info!(url = %self.config.telegram_url, "opened Telegram Web");
        sleep(PAGE_SETTLE).await;

        let engine = ActionEngine::default();
        let host = FrameContext::for_page(page.clone(), self.config.telegram_url.clone());
        run_flow(&engine, &host, &flows::launch_steps()).await;

        let app_frame = wait_for_app_frame(&page, &tracker, FRAME_WAIT).await;
        let flow = match &app_frame {
            Some(frame) => {
                info!(url = %TokenSource::url(frame), "app iframe located");
                let outcome = run_flow(&engine, frame, &asset.purchase_steps()).await;
                if asset.needs_star_payment() {
                    settle_star_payment(&host, frame).await;
                }
                outcome
            }
            None => {
                warn!("app iframe not found, skipping purchase flow");
                FlowOutcome::Aborted {
                    step: "locate app frame",
                }
            }
        };

        // Balances may have moved even on a partial flow; always check.
        let fallback_contexts: Vec<FrameContext> = tracker
            .snapshot()
            .await
            .into_iter()
            .filter(|context| is_app_url(&context.origin))
            .map(|context| FrameContext::for_context(page.clone(), context.id, context.origin))
            .collect();
        let fallbacks: Vec<&dyn TokenSource> = fallback_contexts
            .iter()
            .map(|context| context as &dyn TokenSource)
            .collect();
        let primary = app_frame.as_ref().map(|frame| frame as &dyn TokenSource);

        let provider = SessionTokenProvider::new(self.store.clone());
        let client = BalancesClient::new(&self.config.api_base)?;
        let fetch = fetch_with_reauth(&client, &provider, primary, &fallbacks).await;

        let old_snapshot = self.store.get(BALANCES_KEY).await.ok().flatten();
        if let Some(snapshot) = &fetch.snapshot {
            self.persist(BALANCES_RAW_KEY, snapshot).await;
        }

        let reconciliation = reconcile(
            old_snapshot.as_ref(),
            fetch.snapshot.as_ref(),
            asset.label(),
            asset.names(),
        );
        print_report(&reconciliation);

        if let Some(snapshot) = &fetch.snapshot {
            self.persist(BALANCES_KEY, snapshot).await;
        }

        let record = json!({
            "asset": asset.label(),
            "flow": match &flow {
                FlowOutcome::Completed => "completed".to_string(),
                FlowOutcome::Aborted { step } => format!("aborted at {step}"),
            },
            "fetched_at": Utc::now().to_rfc3339(),
            "token_refreshed": fetch.refreshed,
        });
        self.persist(LAST_RUN_KEY, &record).await;

        Ok(RunReport {
            asset,
            flow,
            reconciliation,
            token_refreshed: fetch.refreshed,
        })
    }

    /// Open the Mini App directly and dump token, balances, and inventory.
    pub async fn run_probe(&self) -> Result<()> {
        let tma_url = self
            .config
            .tma_url
            .clone()
            .context("probe mode requires tma_url in gemflow.toml")?;

        let session = BrowserSession::launch(&self.config.profile_dir(), self.config.headless).await?;
        let outcome = self.drive_probe(&session, &tma_url).await;
        pause_for_operator();
        session.close().await;
        outcome
    }

    async fn drive_probe(&self, session: &BrowserSession, tma_url: &str) -> Result<()> {
        let page = session.new_page("about:blank").await?;
        if let Err(err) = attach_console_logging(&page).await {
            warn!(error = %err, "console diagnostics unavailable");
        }

        page.goto(tma_url).await.context("Failed to open the Mini App")?;
        info!("opened the Mini App directly");
        sleep(PROBE_SETTLE).await;

        let context = FrameContext::for_page(page.clone(), tma_url);
        let provider = SessionTokenProvider::new(self.store.clone());
        let token = provider
            .capture(&context)
            .await
            .context("no session token found in the app's storage")?;

        let client = BalancesClient::new(&self.config.api_base)?;
        match client.fetch_balances(&token).await {
            Ok(snapshot) => {
                println!("balances:\n{}", serde_json::to_string_pretty(&snapshot)?);
                self.persist(BALANCES_KEY, &snapshot).await;
            }
            Err(err) => warn!(error = %err, "balances fetch failed"),
        }

        if let Some(items) = client.fetch_inventory(&token).await {
            println!("inventory: {} items", items.len());
            self.persist(INVENTORY_KEY, &Value::Array(items)).await;
        }

        Ok(())
    }

    async fn persist(&self, key: &str, value: &Value) {
        if let Err(err) = self.store.put(key, value).await {
            warn!(key, error = %err, "failed to persist state");
        }
    }
}

/// Search the Stars payment sheet on the host page and the app frame
/// alternately, scrolling between sweeps, until it confirms or the sweeps
/// run out. Best-effort either way.
async fn settle_star_payment(host: &FrameContext, frame: &FrameContext) {
    let step = flows::star_payment_step();
    let engine = ActionEngine {
        max_sweeps: 1,
        ..ActionEngine::default()
    };

    info!("waiting for the Stars payment sheet");
    for _ in 0..PAYMENT_SWEEPS {
        for ctx in [host as &dyn ElementContext, frame as &dyn ElementContext] {
            if engine.activate(ctx, &step.candidates, &ElementAction::Click).await
                == Activation::Activated
            {
                info!("confirmed the Stars payment sheet");
                sleep(step.settle).await;
                return;
            }
        }
        if let Err(err) = host.scroll_by(200).await {
            warn!(error = %err, "payment sheet scroll failed");
        }
        sleep(PAYMENT_SWEEP_DELAY).await;
    }
    warn!("the Stars payment sheet was not confirmed in time");
}

/// Human checkpoint before the browser goes away.
fn pause_for_operator() {
    println!("\nPress Enter to close the browser…");
    let mut input = String::new();
    let _ = std::io::stdin().read_line(&mut input);
}
