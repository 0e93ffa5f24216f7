//! Collaborator capabilities — the narrow interfaces the pipeline calls
//!
//! The orchestrator consumes four external services: a text-generation
//! backend, a web-search backend, a patent document fetcher, and an IPC
//! classifier. Each is modeled as a capability trait with one method per
//! contract; concrete or stub implementations are injected at
//! construction time. Deterministic in-memory implementations live in
//! [`stub`] — the CLI and the test suite wire those.
//!
//! Collaborator failures (including timeouts) are recoverable by policy:
//! fan-out stages degrade the failing item, single-shot stages fall back
//! to a sentinel. A collaborator error never aborts a run by itself.

pub mod stub;

use crate::state::IpcPrediction;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from collaborator calls.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("collaborator call timed out after {0}s")]
    Timeout(u64),

    #[error("malformed collaborator response: {0}")]
    Malformed(String),
}

pub type CollabResult<T> = Result<T, CollaboratorError>;

/// One web-search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    pub url: String,
}

/// The three text sections fetched for a patent document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatentDocument {
    pub abstract_text: String,
    pub description: String,
    pub claims: String,
}

/// Text-generation model backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Send a prompt, return the raw model response.
    async fn generate(&self, prompt: &str) -> CollabResult<String>;
}

/// Web-search backend.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> CollabResult<Vec<SearchHit>>;
}

/// Per-URL patent document fetcher. May fail per URL.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> CollabResult<PatentDocument>;
}

/// IPC classification service.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> CollabResult<Vec<IpcPrediction>>;
}

/// The bundle of collaborator handles threaded to every stage.
#[derive(Clone)]
pub struct Collaborators {
    pub generation: Arc<dyn GenerationBackend>,
    pub search: Arc<dyn SearchBackend>,
    pub fetcher: Arc<dyn DocumentFetcher>,
    pub classifier: Arc<dyn Classifier>,
}

impl Collaborators {
    pub fn new(
        generation: Arc<dyn GenerationBackend>,
        search: Arc<dyn SearchBackend>,
        fetcher: Arc<dyn DocumentFetcher>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            generation,
            search,
            fetcher,
            classifier,
        }
    }

    /// Fully stubbed collaborator set (deterministic, in-memory).
    pub fn stubbed() -> Self {
        Self {
            generation: Arc::new(stub::StubGeneration::new()),
            search: Arc::new(stub::StubSearch::new()),
            fetcher: Arc::new(stub::StubFetcher::new()),
            classifier: Arc::new(stub::StubClassifier::new()),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Apply the per-call timeout to a collaborator future.
///
/// A timed-out call is indistinguishable from a failed one downstream.
pub async fn with_timeout<T>(
    secs: u64,
    fut: impl std::future::Future<Output = CollabResult<T>>,
) -> CollabResult<T> {
    match tokio::time::timeout(Duration::from_secs(secs), fut).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout(secs)),
    }
}
