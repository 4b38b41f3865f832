//! Resilient element activation.
//!
//! Every UI step in the purchase flows funnels through one bounded-retry
//! combinator: an ordered candidate chain, per-attempt timeouts, a forced
//! retry when the normal action is rejected, and a scroll between sweeps.
//! The flows are built around frequent transient failure, so exhaustion is
//! a soft outcome, never an error.

use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use tokio::time::{sleep, timeout};
use tracing::{debug, trace, warn};

/// Which of several matching elements a candidate activates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Pick {
    #[default]
    First,
    Last,
}

/// One strategy for finding a UI element, tried in priority order.
#[derive(Debug, Clone)]
pub struct LocatorCandidate {
    pub selector: String,
    pub text: Option<Regex>,
    pub pick: Pick,
}

impl LocatorCandidate {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            text: None,
            pick: Pick::First,
        }
    }

    /// Require the element's inner text to match `pattern`
    /// (case-insensitive).
    pub fn with_text(mut self, pattern: &str) -> Self {
        self.text = Some(
            Regex::new(&format!("(?i){pattern}")).expect("candidate text pattern is valid"),
        );
        self
    }

    pub fn pick_last(mut self) -> Self {
        self.pick = Pick::Last;
        self
    }
}

/// The seam between the engine and the automation runtime.
///
/// Kept to "resolve selector, act on one index" so the engine stays
/// independent of the runtime's object model and tests can script it.
#[async_trait::async_trait]
pub trait ElementContext: Send + Sync {
    /// Where actions run, for diagnostics (a frame URL or "page").
    fn describe(&self) -> String;
    /// Inner text of every element matching `selector`, in DOM order.
    async fn texts(&self, selector: &str) -> Result<Vec<String>>;
    /// Click the `index`-th match. `force` skips actionability checks.
    async fn click(&self, selector: &str, index: usize, force: bool) -> Result<()>;
    /// Fill the `index`-th match. `force` skips actionability checks.
    async fn fill(&self, selector: &str, index: usize, text: &str, force: bool) -> Result<()>;
    /// Scroll the container by `delta_y` pixels.
    async fn scroll_by(&self, delta_y: i64) -> Result<()>;
}

#[derive(Debug, Clone)]
pub enum ElementAction {
    Click,
    Fill(String),
}

/// Outcome of an activation attempt. Exhaustion is a soft failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Activated,
    Exhausted,
}

pub struct ActionEngine {
    /// Full passes over the candidate list before giving up.
    pub max_sweeps: u32,
    pub attempt_timeout: Duration,
    /// Pixels scrolled between sweeps.
    pub sweep_scroll: i64,
    pub sweep_delay: Duration,
}

impl Default for ActionEngine {
    fn default() -> Self {
        Self {
            max_sweeps: 4,
            attempt_timeout: Duration::from_secs(5),
            sweep_scroll: 400,
            sweep_delay: Duration::from_millis(400),
        }
    }
}

impl ActionEngine {
    /// Engine tuned for a slow-settling target.
    pub fn patient(max_sweeps: u32) -> Self {
        Self {
            max_sweeps,
            ..Self::default()
        }
    }

    /// Try each candidate in priority order until one activates.
    ///
    /// A candidate that resolves to no elements is skipped; a resolved
    /// candidate whose action is rejected gets one forced retry before the
    /// next candidate is tried. Between sweeps the container is scrolled.
    pub async fn activate(
        &self,
        ctx: &dyn ElementContext,
        candidates: &[LocatorCandidate],
        action: &ElementAction,
    ) -> Activation {
        for sweep in 0..self.max_sweeps {
            for candidate in candidates {
                let Some(index) = self.resolve(ctx, candidate).await else {
                    continue;
                };

                match self.attempt(ctx, candidate, index, action, false).await {
                    Ok(()) => {
                        debug!(selector = %candidate.selector, "activated");
                        return Activation::Activated;
                    }
                    Err(err) => {
                        debug!(selector = %candidate.selector, error = %err, "action rejected, retrying forced");
                    }
                }

                match self.attempt(ctx, candidate, index, action, true).await {
                    Ok(()) => {
                        debug!(selector = %candidate.selector, "activated (forced)");
                        return Activation::Activated;
                    }
                    Err(err) => {
                        trace!(selector = %candidate.selector, error = %err, "forced retry failed");
                    }
                }
            }

            if sweep + 1 < self.max_sweeps {
                if let Err(err) = ctx.scroll_by(self.sweep_scroll).await {
                    trace!(error = %err, "scroll between sweeps failed");
                }
                sleep(self.sweep_delay).await;
            }
        }

        warn!(context = %ctx.describe(), "all candidates exhausted");
        Activation::Exhausted
    }

    /// Fill every element the first resolving candidate matches with the
    /// same text, pausing between fields so the app's input validation can
    /// keep up.
    pub async fn fill_each(
        &self,
        ctx: &dyn ElementContext,
        candidates: &[LocatorCandidate],
        text: &str,
        pause: Duration,
    ) -> Activation {
        for sweep in 0..self.max_sweeps {
            for candidate in candidates {
                let count = match ctx.texts(&candidate.selector).await {
                    Ok(texts) => texts.len(),
                    Err(_) => 0,
                };
                if count == 0 {
                    continue;
                }

                let mut complete = true;
                for index in 0..count {
                    let filled = ctx.fill(&candidate.selector, index, text, false).await.is_ok()
                        || ctx.fill(&candidate.selector, index, text, true).await.is_ok();
                    if !filled {
                        complete = false;
                        break;
                    }
                    sleep(pause).await;
                }
                if complete {
                    debug!(selector = %candidate.selector, fields = count, "filled");
                    return Activation::Activated;
                }
            }

            if sweep + 1 < self.max_sweeps {
                sleep(self.sweep_delay).await;
            }
        }

        warn!(context = %ctx.describe(), "no code inputs could be filled");
        Activation::Exhausted
    }

    /// Resolve a candidate to the element index it would act on.
    async fn resolve(&self, ctx: &dyn ElementContext, candidate: &LocatorCandidate) -> Option<usize> {
        let texts = match ctx.texts(&candidate.selector).await {
            Ok(texts) => texts,
            Err(err) => {
                trace!(selector = %candidate.selector, error = %err, "candidate resolution failed");
                return None;
            }
        };

        let matching: Vec<usize> = texts
            .iter()
            .enumerate()
            .filter(|(_, text)| {
                candidate
                    .text
                    .as_ref()
                    .map_or(true, |pattern| pattern.is_match(text))
            })
            .map(|(index, _)| index)
            .collect();

        match candidate.pick {
            Pick::First => matching.first().copied(),
            Pick::Last => matching.last().copied(),
        }
    }

    async fn attempt(
        &self,
        ctx: &dyn ElementContext,
        candidate: &LocatorCandidate,
        index: usize,
        action: &ElementAction,
        force: bool,
    ) -> Result<()> {
        let attempt = async {
            match action {
                ElementAction::Click => ctx.click(&candidate.selector, index, force).await,
                ElementAction::Fill(text) => {
                    ctx.fill(&candidate.selector, index, text, force).await
                }
            }
        };

        match timeout(self.attempt_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!("timed out after {:?}", self.attempt_timeout),
        }
    }
}
