//! Balances endpoint client and reconciliation.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{info, warn};

use crate::locate::locate_named_quantity;
use crate::session::{SessionTokenProvider, TokenSource};

const BALANCES_PATH: &str = "/api/v1/balances";
const INVENTORY_PATH: &str = "/api/v1/offer-manager/user/inventory\
    ?page=1&limit=999&filter=ALL&rarity_filter=ALL&tradeable=false&for_trade=false";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// How a balances request can fail.
///
/// A 401 is the single retryable condition: callers refresh the token and
/// retry exactly once. Everything else degrades to an absent snapshot.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request rejected as unauthorized")]
    Unauthorized,
    #[error("request failed: {0}")]
    Failed(String),
}

/// Client for the store's REST API, authenticated per request.
pub struct BalancesClient {
    client: Client,
    base_url: String,
}

impl BalancesClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    async fn get_json(&self, path: &str, token: &str) -> Result<Value, FetchError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .header("authorization", format!("Bearer {token}"))
            .send()
            .await
            .map_err(|err| FetchError::Failed(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(FetchError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Failed(format!(
                "{status}: {}",
                &body[..body.len().min(200)]
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|err| FetchError::Failed(err.to_string()))?;
        serde_json::from_str(&body).map_err(|err| FetchError::Failed(format!("malformed body: {err}")))
    }

    /// Fetch the current balances snapshot, shape unconstrained.
    pub async fn fetch_balances(&self, token: &str) -> Result<Value, FetchError> {
        self.get_json(BALANCES_PATH, token).await
    }

    /// Fetch the user's inventory listing; failures degrade to `None`.
    ///
    /// The item array arrives wrapped in `data`/`items`/`inventory` (or
    /// bare, depending on the API build).
    pub async fn fetch_inventory(&self, token: &str) -> Option<Vec<Value>> {
        let payload = match self.get_json(INVENTORY_PATH, token).await {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "inventory request failed");
                return None;
            }
        };

        match payload {
            Value::Array(items) => Some(items),
            Value::Object(map) => Some(
                ["data", "items", "inventory"]
                    .iter()
                    .find_map(|key| match map.get(*key) {
                        Some(Value::Array(items)) => Some(items.clone()),
                        _ => None,
                    })
                    .unwrap_or_default(),
            ),
            _ => Some(Vec::new()),
        }
    }
}

/// The old/new values resolved for one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub asset: String,
    pub old: Option<f64>,
    pub new: Option<f64>,
}

impl Reconciliation {
    /// Computable only when both sides are present.
    pub fn delta(&self) -> Option<f64> {
        Some(self.new? - self.old?)
    }
}

/// Resolve the asset's quantity out of each snapshot independently.
///
/// Absent or unmatchable snapshots downgrade to `None`; this never fails.
pub fn reconcile(
    old: Option<&Value>,
    new: Option<&Value>,
    asset: &str,
    names: &[&str],
) -> Reconciliation {
    Reconciliation {
        asset: asset.to_string(),
        old: old.and_then(|snapshot| locate_named_quantity(snapshot, names)),
        new: new.and_then(|snapshot| locate_named_quantity(snapshot, names)),
    }
}

/// Print the user-facing balance check block.
pub fn print_report(reconciliation: &Reconciliation) {
    let fmt = |value: Option<f64>| match value {
        Some(value) => value.to_string(),
        None => "—".to_string(),
    };

    println!("\n=== {} balance check ===", reconciliation.asset);
    println!("old (cached): {}", fmt(reconciliation.old));
    println!("new (API):    {}", fmt(reconciliation.new));
    match reconciliation.delta() {
        Some(delta) => println!("Δ change:     {delta:+.6}"),
        None => println!("Δ change:     not computable (missing old or new value)"),
    }
    println!("==============================\n");
}

/// Result of a balance fetch, including how the token was handled.
#[derive(Debug)]
pub struct BalanceFetch {
    /// The token the last request was made with, if one was available.
    pub token: Option<String>,
    pub snapshot: Option<Value>,
    /// Whether a 401 triggered a refresh cycle.
    pub refreshed: bool,
}

/// Fetch balances with the single 401-refresh-retry cycle.
///
/// A second 401 after the refresh is terminal for this fetch only; the
/// caller still reports and persists whatever it has.
pub async fn fetch_with_reauth(
    client: &BalancesClient,
    tokens: &SessionTokenProvider,
    primary: Option<&dyn TokenSource>,
    fallbacks: &[&dyn TokenSource],
) -> BalanceFetch {
    let Some(mut token) = tokens.resolve(primary, fallbacks).await else {
        warn!("no session token available, skipping balance fetch");
        return BalanceFetch {
            token: None,
            snapshot: None,
            refreshed: false,
        };
    };

    let mut refreshed = false;
    let mut outcome = client.fetch_balances(&token).await;

    if matches!(outcome, Err(FetchError::Unauthorized)) {
        info!("balances request returned 401, refreshing token and retrying once");
        match primary {
            Some(primary) => {
                match tokens.refresh_after_unauthorized(primary, Some(&token)).await {
                    Some(fresh) => {
                        token = fresh;
                        refreshed = true;
                        outcome = client.fetch_balances(&token).await;
                    }
                    None => warn!("token refresh produced no new token"),
                }
            }
            None => warn!("no primary context available for a token refresh"),
        }
    }

    let snapshot = match outcome {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            warn!(error = %err, "balances fetch failed");
            None
        }
    };

    BalanceFetch {
        token: Some(token),
        snapshot,
        refreshed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reconcile_computes_delta_when_both_sides_resolve() {
        let old = json!({"diamonds": 120});
        let new = json!({"diamonds": 130});
        let result = reconcile(Some(&old), Some(&new), "Diamonds", &["diamond", "diamonds"]);
        assert_eq!(result.old, Some(120.0));
        assert_eq!(result.new, Some(130.0));
        assert_eq!(result.delta(), Some(10.0));
    }

    #[test]
    fn reconcile_downgrades_missing_old_snapshot() {
        let new = json!({"emeralds": "5k"});
        let result = reconcile(None, Some(&new), "Emeralds", &["emerald", "emeralds"]);
        assert_eq!(result.old, None);
        assert_eq!(result.new, Some(5_000.0));
        assert_eq!(result.delta(), None);
    }

    #[test]
    fn reconcile_tolerates_unmatchable_snapshots() {
        let old = json!({"unrelated": true});
        let new = json!([1, 2, 3]);
        let result = reconcile(Some(&old), Some(&new), "Sapphires", &["sapphire", "sapphires"]);
        assert_eq!(result.old, None);
        assert_eq!(result.new, None);
        assert_eq!(result.delta(), None);
    }
}
