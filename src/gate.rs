//! Checkpoint gate — the single human-approval suspension point
//!
//! The gate's only responsibility is producing a well-formed
//! [`ValidationDecision`]; it performs no business logic. Decisions
//! arrive through a [`DecisionHandler`] — interactive (terminal prompt,
//! in the CLI binary) or programmatic (scripted, UI-driven) — and the
//! executor is agnostic to which is wired. When no handler is wired the
//! run suspends and the resume API becomes the decision channel.
//!
//! Malformed decisions (`edit` without keyword lists) are rejected at
//! this boundary and re-solicited; they never propagate into the graph.

use crate::state::{ConceptMatrix, DecisionAction, SeedKeywords, ValidationDecision};
use async_trait::async_trait;
use std::collections::VecDeque;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("malformed decision: {0}")]
    MalformedDecision(String),

    #[error("decision handler unavailable: {0}")]
    HandlerUnavailable(String),
}

/// What the deciding party sees when the pipeline reaches the gate.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub concept_matrix: ConceptMatrix,
    pub seed_keywords: SeedKeywords,
    /// 1-based validation attempt number (increments on each rejection).
    pub attempt: u32,
}

/// Source of checkpoint decisions.
#[async_trait]
pub trait DecisionHandler: Send + Sync {
    async fn decide(&self, ctx: DecisionContext) -> Result<ValidationDecision, GateError>;
}

/// Validate a decision at the gate boundary.
///
/// `edit` requires usable keyword lists; other actions carry no required
/// payload.
pub fn validate_decision(decision: &ValidationDecision) -> Result<(), GateError> {
    if decision.action == DecisionAction::Edit {
        match &decision.edited_keywords {
            None => {
                return Err(GateError::MalformedDecision(
                    "edit requires edited_keywords".to_string(),
                ))
            }
            Some(keywords) if keywords.is_empty() => {
                return Err(GateError::MalformedDecision(
                    "edited keyword lists are all empty".to_string(),
                ))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Strip payloads that are meaningless for the chosen action.
pub fn normalize_decision(mut decision: ValidationDecision) -> ValidationDecision {
    if decision.action != DecisionAction::Reject {
        decision.feedback = None;
    }
    if decision.action != DecisionAction::Edit {
        decision.edited_keywords = None;
    }
    decision
}

/// Solicit a well-formed decision from the handler, re-soliciting a
/// malformed one up to `max_attempts` times.
pub async fn solicit(
    handler: &dyn DecisionHandler,
    ctx: &DecisionContext,
    max_attempts: u32,
) -> Result<ValidationDecision, GateError> {
    let mut last_malformed = None;
    for attempt in 1..=max_attempts.max(1) {
        let decision = handler.decide(ctx.clone()).await?;
        match validate_decision(&decision) {
            Ok(()) => return Ok(normalize_decision(decision)),
            Err(err) => {
                warn!(attempt, error = %err, "malformed checkpoint decision, re-soliciting");
                last_malformed = Some(err);
            }
        }
    }
    Err(last_malformed.unwrap_or_else(|| {
        GateError::MalformedDecision("no decision produced".to_string())
    }))
}

/// Programmatic handler that replays a scripted decision sequence.
///
/// Once the sequence is exhausted the optional fallback decision repeats
/// forever; with no fallback, further solicitations fail.
pub struct ScriptedDecisions {
    queue: tokio::sync::Mutex<VecDeque<ValidationDecision>>,
    fallback: Option<ValidationDecision>,
}

impl ScriptedDecisions {
    pub fn sequence(decisions: Vec<ValidationDecision>) -> Self {
        Self {
            queue: tokio::sync::Mutex::new(decisions.into()),
            fallback: None,
        }
    }

    /// The same decision for every solicitation.
    pub fn repeating(decision: ValidationDecision) -> Self {
        Self {
            queue: tokio::sync::Mutex::new(VecDeque::new()),
            fallback: Some(decision),
        }
    }

    pub fn with_fallback(mut self, decision: ValidationDecision) -> Self {
        self.fallback = Some(decision);
        self
    }
}

#[async_trait]
impl DecisionHandler for ScriptedDecisions {
    async fn decide(&self, _ctx: DecisionContext) -> Result<ValidationDecision, GateError> {
        if let Some(decision) = self.queue.lock().await.pop_front() {
            return Ok(decision);
        }
        self.fallback.clone().ok_or_else(|| {
            GateError::HandlerUnavailable("scripted decisions exhausted".to_string())
        })
    }
}
