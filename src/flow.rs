//! The fixed-step purchase flow state machine.

use std::time::Duration;

use tracing::{info, warn};

use crate::action::{ActionEngine, Activation, ElementAction, ElementContext, LocatorCandidate};

/// What a flow step does once its element resolves.
#[derive(Debug, Clone)]
pub enum StepAction {
    Click,
    /// Fill every discovered code input with the same digit, pausing
    /// between fields.
    FillCode { digit: &'static str, pause: Duration },
}

/// One state in a purchase sequence.
#[derive(Debug, Clone)]
pub struct FlowStep {
    pub name: &'static str,
    pub candidates: Vec<LocatorCandidate>,
    pub action: StepAction,
    /// How long the app needs to settle after the action lands.
    pub settle: Duration,
    /// Whether exhaustion aborts the flow. Optional steps are skipped.
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    Completed,
    Aborted { step: &'static str },
}

/// Run the steps in order.
///
/// A required step whose candidates exhaust aborts the flow and skips
/// everything after it; earlier steps are never retried. The outcome is
/// informational either way; the surrounding run continues to
/// reconciliation regardless.
pub async fn run_flow(
    engine: &ActionEngine,
    ctx: &dyn ElementContext,
    steps: &[FlowStep],
) -> FlowOutcome {
    for step in steps {
        let activation = match &step.action {
            StepAction::Click => {
                engine
                    .activate(ctx, &step.candidates, &ElementAction::Click)
                    .await
            }
            StepAction::FillCode { digit, pause } => {
                engine.fill_each(ctx, &step.candidates, digit, *pause).await
            }
        };

        match activation {
            Activation::Activated => {
                info!(step = step.name, "step done");
                tokio::time::sleep(step.settle).await;
            }
            Activation::Exhausted if step.required => {
                warn!(step = step.name, "flow aborted");
                return FlowOutcome::Aborted { step: step.name };
            }
            Activation::Exhausted => {
                info!(step = step.name, "optional step skipped");
            }
        }
    }

    FlowOutcome::Completed
}
