//! Session token acquisition, caching, and refresh.
//!
//! The embedded app mints its own bearer token client-side; this module
//! owns the one "current" token for the duration of a run: cached copy
//! first, then live extraction from the app's storage, with an immediate
//! persist on every fresh capture so the next run can skip the browser
//! dance entirely.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::store::{StateStore, AUTH_KEY};
use crate::token::extract_bearer_token;

/// Substrings identifying the embedded app in frame/context addresses.
pub const APP_URL_HINTS: &[&str] = &["tgwebapp", "twa", "zargates", "demo-twa"];

/// Whether an address belongs to the embedded app.
pub fn is_app_url(url: &str) -> bool {
    url.contains("http") && APP_URL_HINTS.iter().any(|hint| url.contains(hint))
}

/// Anything that can dump an execution context's client-side storage.
///
/// Implemented by the live app frame, the probe page, and test doubles.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    /// Address of the execution context this source dumps.
    fn url(&self) -> &str;
    /// The context's durable key-value storage as a plain mapping.
    async fn local_storage(&self) -> Result<Value>;
    /// The context's session-scoped key-value storage as a plain mapping.
    async fn session_storage(&self) -> Result<Value>;
}

/// The persisted token cache: `{"auth_token": "<token>"}` under `auth`.
pub struct TokenCache {
    store: Arc<dyn StateStore>,
}

impl TokenCache {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Absent or malformed cache content loads as `None`.
    pub async fn load(&self) -> Option<String> {
        let value = self.store.get(AUTH_KEY).await.ok().flatten()?;
        let token = value.get("auth_token")?.as_str()?.trim();
        if token.is_empty() {
            return None;
        }
        Some(token.to_string())
    }

    pub async fn save(&self, token: &str) -> Result<()> {
        self.store.put(AUTH_KEY, &json!({ "auth_token": token })).await
    }
}

/// Owns token discovery for one run.
pub struct SessionTokenProvider {
    cache: TokenCache,
}

impl SessionTokenProvider {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            cache: TokenCache::new(store),
        }
    }

    /// Resolve the current token: cached copy, else extraction from the
    /// primary source, else from any fallback source on an app address.
    pub async fn resolve(
        &self,
        primary: Option<&dyn TokenSource>,
        fallbacks: &[&dyn TokenSource],
    ) -> Option<String> {
        if let Some(cached) = self.cache.load().await {
            debug!("using cached session token");
            return Some(cached);
        }

        if let Some(primary) = primary {
            if let Some(token) = self.capture(primary).await {
                return Some(token);
            }
        }

        for source in fallbacks {
            if !is_app_url(source.url()) {
                continue;
            }
            if let Some(token) = self.capture(*source).await {
                return Some(token);
            }
        }

        None
    }

    /// Extract a token live from `source`, persisting it before returning.
    ///
    /// Skips the cache entirely; `resolve` is the cache-aware entry point.
    pub async fn capture(&self, source: &dyn TokenSource) -> Option<String> {
        let token = self.extract_from(source).await?;
        self.persist(&token).await;
        Some(token)
    }

    /// Re-extract from the primary source after a 401.
    ///
    /// Returns the fresh token only if it differs from the rejected one;
    /// callers retry the failed request exactly once with it.
    pub async fn refresh_after_unauthorized(
        &self,
        primary: &dyn TokenSource,
        current: Option<&str>,
    ) -> Option<String> {
        let fresh = self.extract_from(primary).await?;
        if current == Some(fresh.as_str()) {
            debug!("re-extracted token matches the rejected one");
            return None;
        }
        self.persist(&fresh).await;
        Some(fresh)
    }

    async fn extract_from(&self, source: &dyn TokenSource) -> Option<String> {
        match source.local_storage().await {
            Ok(dump) => {
                if let Some(token) = extract_bearer_token(&dump) {
                    info!(url = %source.url(), "token found in localStorage");
                    return Some(token);
                }
            }
            Err(err) => debug!(url = %source.url(), error = %err, "localStorage dump failed"),
        }

        match source.session_storage().await {
            Ok(dump) => {
                if let Some(token) = extract_bearer_token(&dump) {
                    info!(url = %source.url(), "token found in sessionStorage");
                    return Some(token);
                }
            }
            Err(err) => debug!(url = %source.url(), error = %err, "sessionStorage dump failed"),
        }

        None
    }

    async fn persist(&self, token: &str) {
        match self.cache.save(token).await {
            Ok(()) => info!("session token saved"),
            Err(err) => warn!(error = %err, "failed to persist session token"),
        }
    }
}
