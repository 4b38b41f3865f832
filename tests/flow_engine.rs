//! Engine fallback and flow state-machine behavior over a scripted context.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::Result;
use gemflow::action::{ActionEngine, Activation, ElementAction, ElementContext, LocatorCandidate};
use gemflow::flow::{run_flow, FlowOutcome, FlowStep, StepAction};
use tokio::sync::Mutex;

/// A DOM stand-in: fixed selector → element texts, with per-selector click
/// scripting.
#[derive(Default)]
struct MockContext {
    texts: HashMap<String, Vec<String>>,
    /// Selectors whose click always fails, forced or not.
    always_reject: HashSet<String>,
    /// Selectors whose click fails unless forced.
    reject_unforced: HashSet<String>,
    clicks: Mutex<Vec<(String, usize, bool)>>,
    fills: Mutex<Vec<(String, usize, String)>>,
    scrolls: Mutex<u32>,
}

impl MockContext {
    fn with_elements(selector: &str, texts: &[&str]) -> Self {
        let mut ctx = Self::default();
        ctx.add_elements(selector, texts);
        ctx
    }

    fn add_elements(&mut self, selector: &str, texts: &[&str]) {
        self.texts.insert(
            selector.to_string(),
            texts.iter().map(|t| t.to_string()).collect(),
        );
    }

    async fn clicks(&self) -> Vec<(String, usize, bool)> {
        self.clicks.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl ElementContext for MockContext {
    fn describe(&self) -> String {
        "mock".to_string()
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>> {
        Ok(self.texts.get(selector).cloned().unwrap_or_default())
    }

    async fn click(&self, selector: &str, index: usize, force: bool) -> Result<()> {
        self.clicks
            .lock()
            .await
            .push((selector.to_string(), index, force));
        if self.always_reject.contains(selector) {
            anyhow::bail!("click rejected");
        }
        if self.reject_unforced.contains(selector) && !force {
            anyhow::bail!("click rejected");
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, index: usize, text: &str, _force: bool) -> Result<()> {
        self.fills
            .lock()
            .await
            .push((selector.to_string(), index, text.to_string()));
        Ok(())
    }

    async fn scroll_by(&self, _delta_y: i64) -> Result<()> {
        *self.scrolls.lock().await += 1;
        Ok(())
    }
}

fn fast_engine() -> ActionEngine {
    ActionEngine {
        max_sweeps: 2,
        attempt_timeout: Duration::from_millis(200),
        sweep_scroll: 400,
        sweep_delay: Duration::from_millis(1),
    }
}

fn click_step(name: &'static str, candidates: Vec<LocatorCandidate>, required: bool) -> FlowStep {
    FlowStep {
        name,
        candidates,
        action: StepAction::Click,
        settle: Duration::ZERO,
        required,
    }
}

#[tokio::test]
async fn unresolved_candidate_is_skipped_without_acting() {
    let ctx = MockContext::with_elements("button.real", &["Buy"]);
    let candidates = vec![
        LocatorCandidate::css("button.ghost"),
        LocatorCandidate::css("button.real"),
    ];

    let outcome = fast_engine()
        .activate(&ctx, &candidates, &ElementAction::Click)
        .await;

    assert_eq!(outcome, Activation::Activated);
    let clicks = ctx.clicks().await;
    assert_eq!(clicks, vec![("button.real".to_string(), 0, false)]);
}

#[tokio::test]
async fn rejected_click_retries_forced_before_falling_back() {
    let mut ctx = MockContext::with_elements("button.covered", &["Buy"]);
    ctx.reject_unforced.insert("button.covered".to_string());

    let outcome = fast_engine()
        .activate(
            &ctx,
            &[LocatorCandidate::css("button.covered")],
            &ElementAction::Click,
        )
        .await;

    assert_eq!(outcome, Activation::Activated);
    let clicks = ctx.clicks().await;
    assert_eq!(
        clicks,
        vec![
            ("button.covered".to_string(), 0, false),
            ("button.covered".to_string(), 0, true),
        ]
    );
}

#[tokio::test]
async fn exhaustion_sweeps_the_full_candidate_list_and_scrolls_between() {
    let mut ctx = MockContext::with_elements("button.a", &["Buy"]);
    ctx.add_elements("button.b", &["Buy"]);
    ctx.always_reject.insert("button.a".to_string());
    ctx.always_reject.insert("button.b".to_string());

    let outcome = fast_engine()
        .activate(
            &ctx,
            &[
                LocatorCandidate::css("button.a"),
                LocatorCandidate::css("button.b"),
            ],
            &ElementAction::Click,
        )
        .await;

    assert_eq!(outcome, Activation::Exhausted);
    // 2 sweeps × 2 candidates × (normal + forced)
    assert_eq!(ctx.clicks().await.len(), 8);
    assert_eq!(*ctx.scrolls.lock().await, 1);
}

#[tokio::test]
async fn text_filter_selects_the_matching_element() {
    let ctx = MockContext::with_elements(
        "button.card__submit-button",
        &["Cancel", "Купить за 10", "Other"],
    );

    let outcome = fast_engine()
        .activate(
            &ctx,
            &[LocatorCandidate::css("button.card__submit-button").with_text(r"\b10\b")],
            &ElementAction::Click,
        )
        .await;

    assert_eq!(outcome, Activation::Activated);
    assert_eq!(
        ctx.clicks().await,
        vec![("button.card__submit-button".to_string(), 1, false)]
    );
}

#[tokio::test]
async fn pick_last_activates_the_final_match() {
    let ctx = MockContext::with_elements("button.play", &["Play", "Play", "Play"]);

    let outcome = fast_engine()
        .activate(
            &ctx,
            &[LocatorCandidate::css("button.play")
                .with_text(r"\bplay\b")
                .pick_last()],
            &ElementAction::Click,
        )
        .await;

    assert_eq!(outcome, Activation::Activated);
    assert_eq!(ctx.clicks().await, vec![("button.play".to_string(), 2, false)]);
}

#[tokio::test]
async fn text_filter_with_no_match_resolves_to_nothing() {
    let ctx = MockContext::with_elements("button", &["Cancel", "Back"]);

    let outcome = fast_engine()
        .activate(
            &ctx,
            &[LocatorCandidate::css("button").with_text("(купить за|buy)")],
            &ElementAction::Click,
        )
        .await;

    assert_eq!(outcome, Activation::Exhausted);
    assert!(ctx.clicks().await.is_empty());
}

#[tokio::test]
async fn required_step_abort_skips_the_rest_of_the_flow() {
    let ctx = MockContext::with_elements("button.first", &["Open"]);
    // "button.second" resolves to nothing; "button.third" would succeed if
    // the flow ever got there.

    let steps = vec![
        click_step("first", vec![LocatorCandidate::css("button.first")], true),
        click_step("second", vec![LocatorCandidate::css("button.second")], true),
        click_step("third", vec![LocatorCandidate::css("button.third")], true),
    ];

    let outcome = run_flow(&fast_engine(), &ctx, &steps).await;

    assert_eq!(outcome, FlowOutcome::Aborted { step: "second" });
    let clicked: Vec<String> = ctx.clicks().await.into_iter().map(|(sel, _, _)| sel).collect();
    assert!(clicked.contains(&"button.first".to_string()));
    assert!(!clicked.contains(&"button.third".to_string()));
}

#[tokio::test]
async fn optional_step_exhaustion_does_not_abort() {
    let mut ctx = MockContext::with_elements("button.confirm", &["Confirm"]);
    ctx.add_elements("div.radio", &[]);

    let steps = vec![
        click_step("select package", vec![LocatorCandidate::css("div.radio")], false),
        click_step(
            "confirm",
            vec![LocatorCandidate::css("button.confirm")],
            true,
        ),
    ];

    let outcome = run_flow(&fast_engine(), &ctx, &steps).await;

    assert_eq!(outcome, FlowOutcome::Completed);
    assert_eq!(
        ctx.clicks().await,
        vec![("button.confirm".to_string(), 0, false)]
    );
}

#[tokio::test]
async fn code_entry_fills_every_discovered_input() {
    let ctx = MockContext::with_elements("div.code input.code__input", &["", "", "", ""]);

    let steps = vec![FlowStep {
        name: "enter confirmation code",
        candidates: vec![LocatorCandidate::css("div.code input.code__input")],
        action: StepAction::FillCode {
            digit: "1",
            pause: Duration::from_millis(1),
        },
        settle: Duration::ZERO,
        required: true,
    }];

    let outcome = run_flow(&fast_engine(), &ctx, &steps).await;

    assert_eq!(outcome, FlowOutcome::Completed);
    let fills = ctx.fills.lock().await.clone();
    assert_eq!(fills.len(), 4);
    for (index, fill) in fills.iter().enumerate() {
        assert_eq!(fill.0, "div.code input.code__input");
        assert_eq!(fill.1, index);
        assert_eq!(fill.2, "1");
    }
}
