//! Run store — explicit registry of in-flight and finished runs
//!
//! Maps an opaque run handle to the run's full serializable record:
//! pipeline state, state-machine position, consumed rejections, and
//! timestamps. Owned by the orchestrator with explicit create / read /
//! update / delete operations; there is no process-wide singleton. The
//! record is the persisted layout for a resumable executor: one JSON
//! document per handle.

use crate::exec::StageNode;
use crate::state::PipelineState;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque handle identifying one extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a run currently stands, as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RunState {
    /// A drive is in progress; the stored state is the last boundary
    /// snapshot.
    Running,
    /// Suspended at the checkpoint, waiting for a decision.
    AwaitingDecision,
    Done,
    /// Could not reach approval within the configured reject limit.
    RetryLimitExceeded,
    Cancelled,
    /// A structural failure; the diagnostic names the defect.
    Failed { diagnostic: String },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running | RunState::AwaitingDecision)
    }
}

/// The serializable record for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub state: PipelineState,
    /// Current state-machine position.
    pub node: StageNode,
    /// Reject decisions consumed so far.
    pub rejections: u32,
    pub status: RunState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(state: PipelineState) -> Self {
        let now = Utc::now();
        Self {
            state,
            node: StageNode::Normalize,
            rejections: 0,
            status: RunState::Running,
            created_at: now,
            updated_at: now,
        }
    }
}

/// In-memory run registry keyed by [`RunId`].
#[derive(Debug, Default)]
pub struct RunStore {
    runs: DashMap<RunId, RunRecord>,
}

impl RunStore {
    pub fn new() -> Self {
        Self {
            runs: DashMap::new(),
        }
    }

    /// Register a new run, returning its handle.
    pub fn create(&self, record: RunRecord) -> RunId {
        let id = RunId::new();
        self.runs.insert(id, record);
        id
    }

    pub fn get(&self, id: &RunId) -> Option<RunRecord> {
        self.runs.get(id).map(|entry| entry.clone())
    }

    /// Replace a run's record, stamping `updated_at`. Returns false for
    /// an unknown handle.
    pub fn update(&self, id: &RunId, mut record: RunRecord) -> bool {
        if !self.runs.contains_key(id) {
            return false;
        }
        record.updated_at = Utc::now();
        self.runs.insert(*id, record);
        true
    }

    pub fn remove(&self, id: &RunId) -> Option<RunRecord> {
        self.runs.remove(id).map(|(_, record)| record)
    }

    pub fn list(&self) -> Vec<RunId> {
        self.runs.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_get_remove_round_trip() {
        let store = RunStore::new();
        let id = store.create(RunRecord::new(PipelineState::new("input")));

        let record = store.get(&id).unwrap();
        assert_eq!(record.node, StageNode::Normalize);
        assert_eq!(record.status, RunState::Running);

        assert!(store.remove(&id).is_some());
        assert!(store.get(&id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn update_refreshes_timestamp_and_rejects_unknown_handles() {
        let store = RunStore::new();
        let id = store.create(RunRecord::new(PipelineState::new("input")));

        let mut record = store.get(&id).unwrap();
        record.status = RunState::AwaitingDecision;
        record.node = StageNode::AwaitDecision;
        assert!(store.update(&id, record));

        let stored = store.get(&id).unwrap();
        assert_eq!(stored.status, RunState::AwaitingDecision);
        assert!(stored.updated_at >= stored.created_at);

        assert!(!store.update(&RunId::new(), RunRecord::new(PipelineState::new("x"))));
    }

    #[test]
    fn suspension_record_serializes_as_one_document() {
        let mut record = RunRecord::new(PipelineState::new("Smart irrigation"));
        record.node = StageNode::AwaitDecision;
        record.status = RunState::AwaitingDecision;
        record.rejections = 1;

        let json = serde_json::to_string(&record).unwrap();
        let back: RunRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(back.node, StageNode::AwaitDecision);
        assert_eq!(back.status, RunState::AwaitingDecision);
        assert_eq!(back.rejections, 1);
        assert_eq!(back.state.input_text, "Smart irrigation");
    }

    #[test]
    fn terminal_states_are_classified() {
        assert!(!RunState::Running.is_terminal());
        assert!(!RunState::AwaitingDecision.is_terminal());
        assert!(RunState::Done.is_terminal());
        assert!(RunState::RetryLimitExceeded.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
        assert!(RunState::Failed {
            diagnostic: "x".to_string()
        }
        .is_terminal());
    }
}
