//! Per-asset flow step tables.
//!
//! The store UI ships the same purchase dialog for diamonds and emeralds;
//! sapphires go through a shorter in-app sequence and finish on the host
//! page's Stars payment sheet. Selector chains mirror the store's markup,
//! most specific first.

use std::time::Duration;

use crate::action::LocatorCandidate;
use crate::flow::{FlowStep, StepAction};

/// Digit the store's test mode accepts for the confirmation code.
const TEST_CODE_DIGIT: &str = "1";

/// Which asset a run purchases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum AssetKind {
    Diamonds,
    Emeralds,
    Sapphires,
}

impl AssetKind {
    pub fn label(self) -> &'static str {
        match self {
            AssetKind::Diamonds => "Diamonds",
            AssetKind::Emeralds => "Emeralds",
            AssetKind::Sapphires => "Sapphires",
        }
    }

    /// Accepted names for this asset in balance payloads.
    pub fn names(self) -> &'static [&'static str] {
        match self {
            AssetKind::Diamonds => &["diamond", "diamonds"],
            AssetKind::Emeralds => &["emerald", "emeralds"],
            AssetKind::Sapphires => &["sapphire", "sapphires"],
        }
    }

    /// The in-app purchase sequence for this asset.
    pub fn purchase_steps(self) -> Vec<FlowStep> {
        match self {
            AssetKind::Diamonds => {
                let mut steps = vec![deposit_step(
                    "open diamonds deposit panel",
                    vec![
                        LocatorCandidate::css(
                            r#"div.balances__item:has(img[alt="Diamonds"]) div.balances__deposit .button__image"#,
                        ),
                        LocatorCandidate::css(
                            r#"div.balances__item:has(img[src*="diamondsBalance"]) div.balances__deposit"#,
                        ),
                    ],
                )];
                steps.extend(deposit_purchase_tail());
                steps
            }
            AssetKind::Emeralds => {
                let mut steps = vec![deposit_step(
                    "open emeralds deposit panel",
                    vec![
                        LocatorCandidate::css(
                            r#"div.balances__item:has(img[src*="emeraldsBalance"]) div.balances__deposit .button__image"#,
                        ),
                        LocatorCandidate::css(
                            r#"div.balances__item:has(img[src*="emeraldsBalance"]) div.balances__deposit"#,
                        ),
                    ],
                )];
                steps.extend(deposit_purchase_tail());
                steps
            }
            AssetKind::Sapphires => vec![
                FlowStep {
                    name: "open sapphires deposit panel",
                    candidates: vec![
                        LocatorCandidate::css(
                            r#"div.balances__item:has(img[alt="Sapphires"]) div.balances__deposit .button__image"#,
                        ),
                        LocatorCandidate::css(
                            r#"div.balances__item:has(img[alt="Sapphires"]) div.balances__deposit"#,
                        ),
                    ],
                    action: StepAction::Click,
                    settle: Duration::from_millis(400),
                    required: true,
                },
                // The 10-pack may already be preselected.
                FlowStep {
                    name: "select 10-pack",
                    candidates: vec![
                        LocatorCandidate::css("div.buy__buy-item .radio").with_text(r"\b10\b"),
                    ],
                    action: StepAction::Click,
                    settle: Duration::from_millis(300),
                    required: false,
                },
                FlowStep {
                    name: "confirm purchase",
                    candidates: vec![
                        LocatorCandidate::css("button.button_blue_gradient"),
                        LocatorCandidate::css(".box__actions button").with_text("confirm"),
                    ],
                    action: StepAction::Click,
                    settle: Duration::from_millis(600),
                    required: true,
                },
            ],
        }
    }

    /// Sapphires are paid in Stars through a host-page sheet.
    pub fn needs_star_payment(self) -> bool {
        matches!(self, AssetKind::Sapphires)
    }
}

fn deposit_step(name: &'static str, candidates: Vec<LocatorCandidate>) -> FlowStep {
    FlowStep {
        name,
        candidates,
        action: StepAction::Click,
        settle: Duration::from_secs(3),
        required: true,
    }
}

/// The shared tail of the diamond/emerald purchase dialog.
fn deposit_purchase_tail() -> Vec<FlowStep> {
    vec![
        FlowStep {
            name: "pick purchase package",
            candidates: vec![
                LocatorCandidate::css("button.card__submit-button").with_text(r"\b10\b"),
                LocatorCandidate::css("button.card__submit-button").with_text("(купить за|buy)"),
                LocatorCandidate::css("button").with_text("(купить за|buy)"),
            ],
            action: StepAction::Click,
            settle: Duration::from_secs(2),
            required: true,
        },
        FlowStep {
            name: "confirm purchase",
            candidates: vec![
                LocatorCandidate::css("button.button_blue_gradient")
                    .with_text("(продолжить|continue)"),
                LocatorCandidate::css("button.box__button_continue").with_text("продолжить"),
                LocatorCandidate::css("button").with_text("continue"),
            ],
            action: StepAction::Click,
            settle: Duration::from_secs(2),
            required: true,
        },
        FlowStep {
            name: "enter confirmation code",
            candidates: vec![LocatorCandidate::css("div.code input.code__input")],
            action: StepAction::FillCode {
                digit: TEST_CODE_DIGIT,
                pause: Duration::from_millis(100),
            },
            settle: Duration::ZERO,
            required: true,
        },
        FlowStep {
            name: "submit confirmation",
            candidates: vec![LocatorCandidate::css("button").with_text("(подтвердить|confirm)")],
            action: StepAction::Click,
            settle: Duration::from_secs(2),
            required: true,
        },
        FlowStep {
            name: "dismiss continuation",
            candidates: vec![
                LocatorCandidate::css("button.button_yellow_gradient").with_text("продолжить"),
                LocatorCandidate::css("button").with_text("continue"),
            ],
            action: StepAction::Click,
            settle: Duration::from_millis(800),
            required: true,
        },
    ]
}

/// Host-page steps that get from the bot chat into the running Mini App.
/// Both are best-effort: the chat may already be past them.
pub fn launch_steps() -> Vec<FlowStep> {
    vec![
        FlowStep {
            name: "open play button",
            candidates: vec![
                LocatorCandidate::css("button.Button.tiny.primary")
                    .with_text(r"\bplay\b")
                    .pick_last(),
                LocatorCandidate::css("button").with_text(r"\bplay\b"),
                LocatorCandidate::css("a").with_text(r"\bplay\b"),
                LocatorCandidate::css(r#"[role="button"]"#).with_text(r"\bplay\b"),
            ],
            action: StepAction::Click,
            settle: Duration::from_secs(7),
            required: false,
        },
        FlowStep {
            name: "confirm launch modal",
            candidates: vec![
                LocatorCandidate::css(r#"div[role="dialog"] button"#)
                    .with_text("(confirm|open|continue|открыть|продолжить)"),
                LocatorCandidate::css("button")
                    .with_text("(confirm|open|continue|открыть|продолжить)"),
            ],
            action: StepAction::Click,
            settle: Duration::from_millis(500),
            required: false,
        },
    ]
}

/// The host page's Stars payment sheet.
pub fn star_payment_step() -> FlowStep {
    FlowStep {
        name: "confirm and pay",
        candidates: vec![
            LocatorCandidate::css(r#"button, .Button, [role="button"]"#)
                .with_text("(confirm.*pay|оплатить|подтвердить.*оплат|оплата|pay)"),
        ],
        action: StepAction::Click,
        settle: Duration::from_millis(600),
        required: false,
    }
}
