//! Workflow executor
//!
//! Drives the graph in dependency order: after `normalize`, the
//! summarize/classify branch runs as a concurrent task while the
//! concept/keyword branch runs inline. The branch is joined before the
//! checkpoint so the suspended snapshot is complete and serializable.
//! Decisions route through [`route`](super::route); the reject back-edge
//! clears the discarded keyword path, carries feedback forward, and is
//! bounded by the configured retry limit.
//!
//! Generation-required stages without a degrade path (concept
//! extraction, keyword generation) are retried here; everything else
//! degrades inside the stage.

use super::node::StageNode;
use super::router::route;
use crate::cancel::CancellationToken;
use crate::collab::Collaborators;
use crate::config::PipelineConfig;
use crate::gate::{self, DecisionContext, DecisionHandler, GateError};
use crate::stage::{self, StageCtx, StageError};
use crate::state::{IpcPrediction, PipelineState, StageUpdate, StateError, ValidationDecision};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Structural pipeline failures surfaced to the caller.
///
/// Collaborator failures never appear here directly — they are degraded
/// inside stages or retried; only exhausted retries, invariant
/// violations, cancellation, and gate misuse escape.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline invariant violated: {0}")]
    InvariantViolation(String),

    #[error("stage '{stage}' failed: {reason}")]
    StageFailed {
        stage: &'static str,
        reason: String,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("internal executor error: {0}")]
    Internal(String),
}

impl From<StateError> for PipelineError {
    fn from(err: StateError) -> Self {
        PipelineError::InvariantViolation(err.to_string())
    }
}

fn stage_failure(stage: &'static str, err: StageError) -> PipelineError {
    match err {
        StageError::Cancelled => PipelineError::Cancelled,
        StageError::MissingField(field) => PipelineError::InvariantViolation(format!(
            "stage '{}' ran without required field '{}'",
            stage, field
        )),
        StageError::Collaborator(err) => PipelineError::StageFailed {
            stage,
            reason: err.to_string(),
        },
    }
}

/// Where a drive left the run.
#[derive(Debug)]
pub enum DriveOutcome {
    /// Suspended at the checkpoint; `rejections` rejections consumed so far.
    AwaitingDecision {
        state: PipelineState,
        rejections: u32,
    },
    Done(PipelineState),
    /// The configured reject limit was reached without approval.
    RetryLimitExceeded {
        state: PipelineState,
        rejections: u32,
    },
}

/// Drives one workflow instance at a time. Stateless between runs —
/// everything a run needs travels in its `PipelineState`.
pub struct Executor {
    collab: Collaborators,
    config: PipelineConfig,
}

impl Executor {
    pub fn new(collab: Collaborators, config: PipelineConfig) -> Self {
        Self { collab, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run from the entry node to the checkpoint.
    ///
    /// Launches the summarize/classify branch concurrently with the
    /// concept/keyword branch and joins it before returning, so the
    /// returned state is a complete gate snapshot.
    pub async fn drive_to_gate(
        &self,
        mut state: PipelineState,
        cancel: &CancellationToken,
    ) -> Result<PipelineState, PipelineError> {
        let ctx = StageCtx {
            collab: &self.collab,
            config: &self.config,
            cancel,
        };

        self.ensure_live(cancel)?;
        let update = stage::normalize::run(&state, &ctx)
            .await
            .map_err(|err| stage_failure("normalize", err))?;
        state.merge(update)?;

        // Both successors of normalize are now eligible; their relative
        // order is unspecified and neither reads fields the other owns.
        let summary_branch = self.spawn_summary_branch(&state, cancel);

        let concept_result = self.run_extraction_path(&mut state, &ctx).await;

        // Join before suspending regardless of how the concept branch
        // fared, so a failure never leaks a detached task.
        let branch_result = summary_branch
            .await
            .map_err(|err| PipelineError::Internal(format!("summary branch join failed: {}", err)));
        concept_result?;
        let (summary_text, ipc_codes) = branch_result??;
        state.merge(StageUpdate {
            summary_text,
            ipc_codes: Some(ipc_codes),
            ..Default::default()
        })?;

        self.ensure_live(cancel)?;
        info!(node = %StageNode::AwaitDecision, "pipeline suspended at checkpoint");
        Ok(state)
    }

    /// Apply a validated decision and continue.
    ///
    /// `rejections` is how many rejections this run has already consumed.
    pub async fn resume(
        &self,
        mut state: PipelineState,
        decision: ValidationDecision,
        rejections: u32,
        cancel: &CancellationToken,
    ) -> Result<DriveOutcome, PipelineError> {
        gate::validate_decision(&decision)?;
        let decision = gate::normalize_decision(decision);
        let action = decision.action;
        state.validation_decision = Some(decision);

        match route(action) {
            StageNode::ExpandKeywords => {
                info!("checkpoint approved");
                Ok(DriveOutcome::Done(self.finish(state, cancel).await?))
            }
            StageNode::ApplyEdit => {
                let edited = state
                    .validation_decision
                    .as_ref()
                    .and_then(|decision| decision.edited_keywords.clone())
                    .ok_or_else(|| {
                        PipelineError::Gate(GateError::MalformedDecision(
                            "edit requires edited_keywords".to_string(),
                        ))
                    })?;
                info!("applying edited keywords");
                state.apply_edited_keywords(edited);
                Ok(DriveOutcome::Done(self.finish(state, cancel).await?))
            }
            StageNode::ExtractConcepts => {
                let rejections = rejections + 1;
                if rejections >= self.config.max_validation_retries {
                    warn!(
                        rejections,
                        limit = self.config.max_validation_retries,
                        "validation retry limit exceeded"
                    );
                    return Ok(DriveOutcome::RetryLimitExceeded { state, rejections });
                }
                info!(rejections, "checkpoint rejected, retrying extraction");
                state.clear_rejected();

                let ctx = StageCtx {
                    collab: &self.collab,
                    config: &self.config,
                    cancel,
                };
                self.run_extraction_path(&mut state, &ctx).await?;
                self.ensure_live(cancel)?;
                Ok(DriveOutcome::AwaitingDecision { state, rejections })
            }
            other => Err(PipelineError::Internal(format!(
                "router produced non-successor node '{}'",
                other
            ))),
        }
    }

    /// Drive a run end to end, soliciting checkpoint decisions from the
    /// given handler. Used when a handler is wired; the executor does not
    /// care whether it is interactive or programmatic.
    pub async fn run_with_handler(
        &self,
        state: PipelineState,
        handler: &dyn DecisionHandler,
        cancel: &CancellationToken,
    ) -> Result<DriveOutcome, PipelineError> {
        let mut state = self.drive_to_gate(state, cancel).await?;
        let mut rejections = 0u32;
        loop {
            self.ensure_live(cancel)?;
            let gate_ctx = self.decision_context(&state, rejections + 1)?;
            let decision = gate::solicit(
                handler,
                &gate_ctx,
                self.config.max_decision_solicitations,
            )
            .await?;

            match self.resume(state, decision, rejections, cancel).await? {
                DriveOutcome::AwaitingDecision {
                    state: next,
                    rejections: consumed,
                } => {
                    state = next;
                    rejections = consumed;
                }
                terminal => return Ok(terminal),
            }
        }
    }

    /// Build what the deciding party sees at the checkpoint.
    pub fn decision_context(
        &self,
        state: &PipelineState,
        attempt: u32,
    ) -> Result<DecisionContext, PipelineError> {
        let concept_matrix = state.concept_matrix.clone().ok_or_else(|| {
            PipelineError::InvariantViolation("gate reached without concept matrix".to_string())
        })?;
        let seed_keywords = state.seed_keywords.clone().ok_or_else(|| {
            PipelineError::InvariantViolation("gate reached without seed keywords".to_string())
        })?;
        Ok(DecisionContext {
            concept_matrix,
            seed_keywords,
            attempt,
        })
    }

    /// The accepting path: expansion, queries, discovery, scoring.
    async fn finish(
        &self,
        mut state: PipelineState,
        cancel: &CancellationToken,
    ) -> Result<PipelineState, PipelineError> {
        let ctx = StageCtx {
            collab: &self.collab,
            config: &self.config,
            cancel,
        };

        self.ensure_live(cancel)?;
        let update = stage::expand::run(&state, &ctx)
            .await
            .map_err(|err| stage_failure("expand_keywords", err))?;
        state.merge(update)?;

        self.ensure_live(cancel)?;
        let update = stage::queries::run(&state, &ctx)
            .await
            .map_err(|err| stage_failure("build_queries", err))?;
        state.merge(update)?;

        self.ensure_live(cancel)?;
        let update = stage::discover::run(&state, &ctx)
            .await
            .map_err(|err| stage_failure("discover_documents", err))?;
        state.merge(update)?;

        self.ensure_live(cancel)?;
        let update = stage::score::run(&state, &ctx)
            .await
            .map_err(|err| stage_failure("score_documents", err))?;
        state.merge(update)?;

        self.ensure_live(cancel)?;
        info!(node = %StageNode::Done, "pipeline complete");
        Ok(state)
    }

    /// extract_concepts -> generate_keywords with executor-level retry.
    async fn run_extraction_path(
        &self,
        state: &mut PipelineState,
        ctx: &StageCtx<'_>,
    ) -> Result<(), PipelineError> {
        self.ensure_live(ctx.cancel)?;
        let update = self
            .with_stage_retry("extract_concepts", || stage::concepts::run(state, ctx))
            .await?;
        state.merge(update)?;

        self.ensure_live(ctx.cancel)?;
        let update = self
            .with_stage_retry("generate_keywords", || stage::keywords::run(state, ctx))
            .await?;
        state.merge(update)?;
        Ok(())
    }

    fn spawn_summary_branch(
        &self,
        state: &PipelineState,
        cancel: &CancellationToken,
    ) -> JoinHandle<Result<(Option<String>, Vec<IpcPrediction>), PipelineError>> {
        let collab = self.collab.clone();
        let config = self.config.clone();
        let cancel = cancel.clone();
        // The branch works on its own snapshot: the input text plus any
        // pre-seeded branch outputs. It never sees concept-path fields.
        let mut branch = PipelineState::new(state.input_text.clone());
        branch.summary_text = state.summary_text.clone();
        branch.ipc_codes = state.ipc_codes.clone();

        tokio::spawn(async move {
            let ctx = StageCtx {
                collab: &collab,
                config: &config,
                cancel: &cancel,
            };
            let update = stage::summary::run(&branch, &ctx)
                .await
                .map_err(|err| stage_failure("summarize", err))?;
            branch.merge(update)?;
            let update = stage::classify::run(&branch, &ctx)
                .await
                .map_err(|err| stage_failure("classify", err))?;
            branch.merge(update)?;
            Ok((branch.summary_text, branch.ipc_codes))
        })
    }

    async fn with_stage_retry<F, Fut>(
        &self,
        stage: &'static str,
        mut call: F,
    ) -> Result<StageUpdate, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<StageUpdate, StageError>>,
    {
        let attempts = self.config.stage_retry_attempts.max(1);
        let mut last_reason = String::new();
        for attempt in 1..=attempts {
            match call().await {
                Ok(update) => return Ok(update),
                Err(StageError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(StageError::MissingField(field)) => {
                    return Err(PipelineError::InvariantViolation(format!(
                        "stage '{}' ran without required field '{}'",
                        stage, field
                    )))
                }
                Err(err) => {
                    warn!(stage, attempt, error = %err, "stage attempt failed");
                    last_reason = err.to_string();
                }
            }
        }
        Err(PipelineError::StageFailed {
            stage,
            reason: last_reason,
        })
    }

    fn ensure_live(&self, cancel: &CancellationToken) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}
