//! Recording and counting collaborator stubs for integration tests
//!
//! Wrappers around the crate's deterministic stubs that capture what the
//! pipeline actually sent to its collaborators, so tests can assert on
//! prompt content and call counts rather than just outputs.

use async_trait::async_trait;
use quarry::collab::stub::StubGeneration;
use quarry::{
    CollabResult, DecisionContext, DecisionHandler, GateError, GenerationBackend,
    ValidationDecision,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Generation backend that records every prompt before delegating to the
/// deterministic stub.
pub struct RecordingGeneration {
    inner: StubGeneration,
    prompts: Mutex<Vec<String>>,
}

impl Default for RecordingGeneration {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingGeneration {
    pub fn new() -> Self {
        Self {
            inner: StubGeneration::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// How many recorded prompts contain `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|prompt| prompt.contains(needle))
            .count()
    }
}

#[async_trait]
impl GenerationBackend for RecordingGeneration {
    async fn generate(&self, prompt: &str) -> CollabResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.inner.generate(prompt).await
    }
}

/// Decision handler that rejects every solicitation and counts them.
#[derive(Default)]
pub struct CountingRejects {
    calls: AtomicU32,
}

impl CountingRejects {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DecisionHandler for CountingRejects {
    async fn decide(&self, _ctx: DecisionContext) -> Result<ValidationDecision, GateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ValidationDecision::reject(Some(
            "keywords are still too generic".to_string(),
        )))
    }
}
