//! Locating the embedded app among the page's execution contexts.
//!
//! Telegram renders Mini Apps inside a dialog iframe. chromiumoxide's
//! element handles stay within the main frame, so everything that has to
//! run inside the app goes through `Runtime.evaluate` against the app
//! frame's execution context instead.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chromiumoxide::cdp::js_protocol::runtime::{
    EnableParams, EvaluateParams, EventExecutionContextCreated, ExecutionContextId,
};
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::action::ElementContext;
use crate::session::{is_app_url, TokenSource};

/// The Telegram WebApp dialog iframe, or any external iframe.
const APP_IFRAME_SELECTOR: &str = r#"div[role="dialog"] iframe, iframe[src*="http"]"#;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One execution context observed on the page.
#[derive(Debug, Clone)]
pub struct TrackedContext {
    pub id: ExecutionContextId,
    pub origin: String,
    pub frame_id: Option<String>,
    pub is_default: bool,
}

/// Records every execution context the page creates.
///
/// Installed once per page before navigation so no context is missed.
pub struct ContextTracker {
    contexts: Arc<Mutex<Vec<TrackedContext>>>,
    _listener: JoinHandle<()>,
}

impl ContextTracker {
    pub async fn install(page: &Page) -> Result<Self> {
        page.execute(EnableParams::default())
            .await
            .context("Failed to enable the Runtime domain")?;

        let mut events = page
            .event_listener::<EventExecutionContextCreated>()
            .await
            .context("Failed to listen for execution contexts")?;

        let contexts: Arc<Mutex<Vec<TrackedContext>>> = Arc::default();
        let sink = contexts.clone();
        let listener = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let description = &event.context;
                let aux = description.aux_data.as_ref();
                let tracked = TrackedContext {
                    id: description.id.clone(),
                    origin: description.origin.clone(),
                    frame_id: aux
                        .and_then(|aux| aux.get("frameId"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    is_default: aux
                        .and_then(|aux| aux.get("isDefault"))
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                };
                trace!(origin = %tracked.origin, "execution context created");
                sink.lock().await.push(tracked);
            }
        });

        Ok(Self {
            contexts,
            _listener: listener,
        })
    }

    pub async fn snapshot(&self) -> Vec<TrackedContext> {
        self.contexts.lock().await.clone()
    }
}

/// Wait for the app iframe and resolve its execution context.
///
/// Bounded wait for the iframe element first; once anything matches, pick
/// the first tracked context whose origin names the app, falling back to
/// the iframe element's own frame. Absence is a normal outcome.
pub async fn wait_for_app_frame(
    page: &Page,
    tracker: &ContextTracker,
    timeout: Duration,
) -> Option<FrameContext> {
    let deadline = Instant::now() + timeout;
    loop {
        match page.find_elements(APP_IFRAME_SELECTOR).await {
            Ok(elements) if !elements.is_empty() => break,
            Ok(_) => {}
            Err(err) => trace!(error = %err, "iframe query failed"),
        }
        if Instant::now() >= deadline {
            debug!("no app iframe appeared within {timeout:?}");
            return None;
        }
        sleep(POLL_INTERVAL).await;
    }

    for context in tracker.snapshot().await {
        if is_app_url(&context.origin) {
            debug!(origin = %context.origin, "app context matched by origin");
            return Some(FrameContext::for_context(
                page.clone(),
                context.id,
                context.origin,
            ));
        }
    }

    match context_for_iframe_element(page, tracker).await {
        Ok(Some(frame)) => Some(frame),
        Ok(None) => {
            debug!("no execution context matched the app iframe");
            None
        }
        Err(err) => {
            warn!(error = %err, "app frame fallback resolution failed");
            None
        }
    }
}

/// Resolve the DOM-located iframe element's own execution context.
async fn context_for_iframe_element(
    page: &Page,
    tracker: &ContextTracker,
) -> Result<Option<FrameContext>> {
    let element = match page.find_element(APP_IFRAME_SELECTOR).await {
        Ok(element) => element,
        Err(_) => return Ok(None),
    };

    let node = element
        .description()
        .await
        .context("Failed to describe the app iframe element")?;
    let Some(frame_id) = node.frame_id else {
        return Ok(None);
    };
    let frame_id = frame_id.inner().as_str();

    let contexts = tracker.snapshot().await;
    let matched = contexts
        .iter()
        .find(|context| context.is_default && context.frame_id.as_deref() == Some(frame_id))
        .or_else(|| {
            contexts
                .iter()
                .find(|context| context.frame_id.as_deref() == Some(frame_id))
        });

    Ok(matched.map(|context| {
        FrameContext::for_context(page.clone(), context.id.clone(), context.origin.clone())
    }))
}

/// A page plus, optionally, a specific execution context to evaluate in.
///
/// With no context id, expressions run in the page's main world, which is
/// what the host-page steps and probe mode need.
pub struct FrameContext {
    page: Page,
    context_id: Option<ExecutionContextId>,
    url: String,
}

impl FrameContext {
    pub fn for_page(page: Page, url: impl Into<String>) -> Self {
        Self {
            page,
            context_id: None,
            url: url.into(),
        }
    }

    pub fn for_context(page: Page, context_id: ExecutionContextId, url: impl Into<String>) -> Self {
        Self {
            page,
            context_id: Some(context_id),
            url: url.into(),
        }
    }

    /// Evaluate an expression, returning its value by JSON serialization.
    async fn eval(&self, expression: String) -> Result<Value> {
        let mut builder = EvaluateParams::builder()
            .expression(expression)
            .return_by_value(true);
        if let Some(context_id) = &self.context_id {
            builder = builder.context_id(context_id.clone());
        }
        let params = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build evaluate params: {e}"))?;

        let response = self.page.execute(params).await.context("Evaluate call failed")?;
        if let Some(details) = &response.exception_details {
            anyhow::bail!("page script threw: {}", details.text);
        }
        Ok(response.result.result.value.clone().unwrap_or(Value::Null))
    }

    /// Run an action snippet that reports "ok" or a rejection reason.
    async fn eval_action(&self, expression: String) -> Result<()> {
        let value = self.eval(expression).await?;
        match value.as_str() {
            Some("ok") => Ok(()),
            Some(reason) => anyhow::bail!("{reason}"),
            None => anyhow::bail!("action script returned an unexpected shape"),
        }
    }
}

/// Quote a string for embedding into a JS expression.
fn js_string(text: &str) -> String {
    serde_json::to_string(text).expect("strings serialize to JSON")
}

#[async_trait::async_trait]
impl ElementContext for FrameContext {
    fn describe(&self) -> String {
        if self.url.is_empty() {
            "page".to_string()
        } else {
            self.url.clone()
        }
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>> {
        let expression = format!(
            "Array.from(document.querySelectorAll({sel})).map(el => el.innerText || el.textContent || '')",
            sel = js_string(selector),
        );
        let value = self.eval(expression).await?;
        serde_json::from_value(value).context("texts script returned an unexpected shape")
    }

    async fn click(&self, selector: &str, index: usize, force: bool) -> Result<()> {
        let expression = format!(
            r#"(() => {{
                const el = document.querySelectorAll({sel})[{index}];
                if (!el) return "element gone";
                el.scrollIntoView({{block: "center"}});
                if (!{force}) {{
                    const rect = el.getBoundingClientRect();
                    const style = window.getComputedStyle(el);
                    if (rect.width === 0 || rect.height === 0
                        || style.visibility === "hidden" || style.display === "none"
                        || el.disabled) {{
                        return "element not actionable";
                    }}
                }}
                el.click();
                return "ok";
            }})()"#,
            sel = js_string(selector),
        );
        self.eval_action(expression).await
    }

    async fn fill(&self, selector: &str, index: usize, text: &str, force: bool) -> Result<()> {
        // The store is a reactive SPA; setting `value` through the native
        // setter and dispatching input/change is what its bindings listen to.
        let expression = format!(
            r#"(() => {{
                const el = document.querySelectorAll({sel})[{index}];
                if (!el) return "element gone";
                el.scrollIntoView({{block: "center"}});
                if (!{force}) {{
                    const rect = el.getBoundingClientRect();
                    if (rect.width === 0 || rect.height === 0 || el.disabled || el.readOnly) {{
                        return "element not actionable";
                    }}
                }}
                el.focus();
                const proto = el instanceof HTMLTextAreaElement
                    ? HTMLTextAreaElement.prototype
                    : HTMLInputElement.prototype;
                const setter = Object.getOwnPropertyDescriptor(proto, "value").set;
                setter.call(el, {text});
                el.dispatchEvent(new Event("input", {{bubbles: true}}));
                el.dispatchEvent(new Event("change", {{bubbles: true}}));
                return "ok";
            }})()"#,
            sel = js_string(selector),
            text = js_string(text),
        );
        self.eval_action(expression).await
    }

    async fn scroll_by(&self, delta_y: i64) -> Result<()> {
        self.eval(format!("window.scrollBy(0, {delta_y})")).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TokenSource for FrameContext {
    fn url(&self) -> &str {
        &self.url
    }

    async fn local_storage(&self) -> Result<Value> {
        self.eval("Object.fromEntries(Object.entries(localStorage))".to_string())
            .await
    }

    async fn session_storage(&self) -> Result<Value> {
        self.eval("Object.fromEntries(Object.entries(sessionStorage))".to_string())
            .await
    }
}
