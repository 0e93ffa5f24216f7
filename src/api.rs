//! Orchestrator facade — the single entry point for callers
//!
//! Transports (CLI, HTTP, embedding callers) go through [`Orchestrator`];
//! they never reach into the executor, the run store, or the stages
//! directly. A run started without a decision handler suspends at the
//! checkpoint and is driven onward through [`Orchestrator::resume`]; with
//! a handler wired, `start` drives straight to a terminal status.

use crate::cancel::CancellationToken;
use crate::collab::Collaborators;
use crate::config::PipelineConfig;
use crate::exec::{DriveOutcome, Executor, PipelineError, StageNode};
use crate::gate::{self, DecisionHandler, GateError};
use crate::state::{PipelineState, ValidationDecision};
use crate::store::{RunId, RunRecord, RunState, RunStore};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Errors from the caller-facing surface.
///
/// Structural pipeline failures do not appear here — they land in the
/// run's terminal [`RunState`] instead.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown run handle: {0}")]
    UnknownRun(RunId),

    #[error("run {0} is not awaiting a decision")]
    NotAwaitingDecision(RunId),

    #[error(transparent)]
    Gate(#[from] GateError),
}

/// Read-only snapshot of a run, for polling front ends.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub handle: RunId,
    /// Current state-machine node name.
    pub state_name: &'static str,
    pub status: RunState,
    pub rejections: u32,
    pub state: PipelineState,
}

fn status_of(handle: RunId, record: &RunRecord) -> RunStatus {
    RunStatus {
        handle,
        state_name: record.node.name(),
        status: record.status.clone(),
        rejections: record.rejections,
        state: record.state.clone(),
    }
}

/// Owns the executor, the run store, and the per-run cancellation
/// tokens. Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct Orchestrator {
    executor: Arc<Executor>,
    store: Arc<RunStore>,
    tokens: Arc<DashMap<RunId, CancellationToken>>,
    handler: Option<Arc<dyn DecisionHandler>>,
}

impl Orchestrator {
    pub fn new(collab: Collaborators, config: PipelineConfig) -> Self {
        Self {
            executor: Arc::new(Executor::new(collab, config)),
            store: Arc::new(RunStore::new()),
            tokens: Arc::new(DashMap::new()),
            handler: None,
        }
    }

    /// Wire a checkpoint decision handler. With one present, `start`
    /// drives through the gate in-process to a terminal status.
    pub fn with_decision_handler(mut self, handler: Arc<dyn DecisionHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    /// Begin a run. Returns once the run reaches the checkpoint or a
    /// terminal status; structural failures are reported in the status,
    /// never thrown.
    pub async fn start(&self, input_text: &str) -> RunStatus {
        self.start_seeded(PipelineState::new(input_text)).await
    }

    /// Begin a run from a pre-populated state. Stages whose owned fields
    /// are already present skip their collaborator calls.
    pub async fn start_seeded(&self, state: PipelineState) -> RunStatus {
        let cancel = CancellationToken::new();
        let id = self.store.create(RunRecord::new(state.clone()));
        self.tokens.insert(id, cancel.clone());
        info!(run = %id, "starting extraction run");

        let outcome = match &self.handler {
            Some(handler) => {
                self.executor
                    .run_with_handler(state, handler.as_ref(), &cancel)
                    .await
            }
            None => self
                .executor
                .drive_to_gate(state, &cancel)
                .await
                .map(|state| DriveOutcome::AwaitingDecision {
                    state,
                    rejections: 0,
                }),
        };
        self.commit(id, outcome)
    }

    /// Supply the checkpoint decision for a suspended run and drive it to
    /// completion, a retried checkpoint, or a terminal status.
    ///
    /// A malformed decision is rejected here and the run stays suspended.
    pub async fn resume(
        &self,
        handle: RunId,
        decision: ValidationDecision,
    ) -> Result<RunStatus, ApiError> {
        let record = self
            .store
            .get(&handle)
            .ok_or(ApiError::UnknownRun(handle))?;
        if record.status != RunState::AwaitingDecision {
            return Err(ApiError::NotAwaitingDecision(handle));
        }
        gate::validate_decision(&decision)?;

        let cancel = self.token(handle);
        let mut running = record.clone();
        running.status = RunState::Running;
        self.store.update(&handle, running);
        info!(run = %handle, action = decision.action.as_str(), "resuming run");

        let outcome = self
            .executor
            .resume(record.state, decision, record.rejections, &cancel)
            .await;
        Ok(self.commit(handle, outcome))
    }

    /// Read-only introspection for polling front ends.
    pub fn status(&self, handle: RunId) -> Result<RunStatus, ApiError> {
        let record = self
            .store
            .get(&handle)
            .ok_or(ApiError::UnknownRun(handle))?;
        Ok(status_of(handle, &record))
    }

    /// Request cooperative cancellation. An executing run stops at its
    /// next state boundary; a run suspended at the checkpoint is marked
    /// cancelled immediately.
    pub fn cancel(&self, handle: RunId) -> Result<(), ApiError> {
        let record = self
            .store
            .get(&handle)
            .ok_or(ApiError::UnknownRun(handle))?;
        if let Some(token) = self.tokens.get(&handle) {
            token.cancel();
        }
        if record.status == RunState::AwaitingDecision {
            let mut record = record;
            record.status = RunState::Cancelled;
            self.store.update(&handle, record);
        }
        info!(run = %handle, "cancellation requested");
        Ok(())
    }

    /// Delete a run from the store.
    pub fn remove(&self, handle: RunId) -> Result<(), ApiError> {
        self.tokens.remove(&handle);
        self.store
            .remove(&handle)
            .map(|_| ())
            .ok_or(ApiError::UnknownRun(handle))
    }

    fn token(&self, handle: RunId) -> CancellationToken {
        self.tokens
            .entry(handle)
            .or_insert_with(CancellationToken::new)
            .value()
            .clone()
    }

    /// Fold a drive outcome into the stored record and report it.
    fn commit(&self, id: RunId, outcome: Result<DriveOutcome, PipelineError>) -> RunStatus {
        let mut record = self
            .store
            .get(&id)
            .unwrap_or_else(|| RunRecord::new(PipelineState::default()));
        match outcome {
            Ok(DriveOutcome::AwaitingDecision { state, rejections }) => {
                record.state = state;
                record.node = StageNode::AwaitDecision;
                record.rejections = rejections;
                record.status = RunState::AwaitingDecision;
            }
            Ok(DriveOutcome::Done(state)) => {
                record.state = state;
                record.node = StageNode::Done;
                record.status = RunState::Done;
            }
            Ok(DriveOutcome::RetryLimitExceeded { state, rejections }) => {
                record.state = state;
                record.node = StageNode::AwaitDecision;
                record.rejections = rejections;
                record.status = RunState::RetryLimitExceeded;
            }
            // The state keeps its last boundary snapshot: cancellation
            // never commits a partially-merged batch.
            Err(PipelineError::Cancelled) => {
                record.status = RunState::Cancelled;
            }
            Err(err) => {
                error!(run = %id, error = %err, "run failed");
                record.status = RunState::Failed {
                    diagnostic: err.to_string(),
                };
            }
        }
        self.store.update(&id, record.clone());
        status_of(id, &record)
    }
}
