//! Quarry: Prior-Art Search Pipeline
//!
//! Extracts structured search concepts and seed keywords from a free-text
//! invention description, checkpoints them for human validation, then
//! expands keywords into boolean search queries and scores candidate
//! prior-art documents for relevance.
//!
//! # Core Concepts
//!
//! - **Stages**: pure transformations from pipeline state to a partial
//!   update, one per workflow step
//! - **Checkpoint gate**: the single suspension point requiring an
//!   approve / reject / edit decision before the run continues
//! - **Executor**: drives the stage graph — concurrent branches, the
//!   bounded reject back-edge, and fan-out/fan-in sub-stages
//! - **Collaborators**: generation, search, fetch, and classification
//!   backends injected as capability traits
//!
//! # Example
//!
//! ```
//! use quarry::{Collaborators, Orchestrator, PipelineConfig};
//!
//! let orchestrator = Orchestrator::new(Collaborators::stubbed(), PipelineConfig::default());
//! // Orchestrator is ready for use
//! ```

pub mod api;
pub mod cancel;
pub mod collab;
pub mod config;
pub mod exec;
pub mod fanout;
pub mod gate;
pub mod stage;
pub mod state;
pub mod store;

pub use api::{ApiError, Orchestrator, RunStatus};
pub use cancel::CancellationToken;
pub use collab::{
    Classifier, CollabResult, CollaboratorError, Collaborators, DocumentFetcher,
    GenerationBackend, PatentDocument, SearchBackend, SearchHit,
};
pub use config::{ConfigError, PipelineConfig};
pub use exec::{route, DriveOutcome, Executor, PipelineError, StageNode};
pub use gate::{DecisionContext, DecisionHandler, GateError, ScriptedDecisions};
pub use state::{
    ConceptMatrix, DecisionAction, IpcPrediction, PipelineState, ScoredDocument, SeedKeywords,
    StageUpdate, StateError, ValidationDecision,
};
pub use store::{RunId, RunRecord, RunState, RunStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
