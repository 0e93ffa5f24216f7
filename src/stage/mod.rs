//! Pipeline stage functions
//!
//! One file per stage. Each stage receives a read-only view of the
//! current [`PipelineState`](crate::state::PipelineState) plus the
//! collaborator set and returns a partial update covering only the
//! fields it owns. Stages are idempotent with respect to fields they do
//! not own and assume nothing beyond what their position in the graph
//! guarantees.
//!
//! Error policy: single-shot stages with a degrade path (`normalize`,
//! `summary`, `classify`, `queries`) fall back to a sentinel or empty
//! value and never fail; generation-required stages without one
//! (`concepts`, `keywords`) surface the collaborator error so the
//! executor can retry; fan-out stages degrade per item.

pub mod classify;
pub mod concepts;
pub mod discover;
pub mod expand;
pub mod keywords;
pub mod normalize;
pub(crate) mod prompts;
pub mod queries;
pub mod score;
pub mod summary;

use crate::cancel::CancellationToken;
use crate::collab::{CollabResult, CollaboratorError, Collaborators};
use crate::config::PipelineConfig;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors a stage can surface to the executor.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("run cancelled")]
    Cancelled,

    /// A field the stage's graph position guarantees was absent — a
    /// programming defect in the executor, not a collaborator problem.
    #[error("stage ran without required field '{0}'")]
    MissingField(&'static str),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// Everything a stage needs besides the state itself.
pub struct StageCtx<'a> {
    pub collab: &'a Collaborators,
    pub config: &'a PipelineConfig,
    pub cancel: &'a CancellationToken,
}

/// Slice out the first JSON object or array in a model response,
/// tolerating code fences and prose around it.
pub(crate) fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }
    if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }
    trimmed
}

/// Parse a typed payload out of a model response.
pub(crate) fn parse_struct<T: DeserializeOwned>(response: &str) -> CollabResult<T> {
    serde_json::from_str(extract_json(response))
        .map_err(|err| CollaboratorError::Malformed(format!("{}: {}", err, response.trim())))
}

/// Parse a relevance score: either `{"score": 0.8}` or a bare number.
pub(crate) fn parse_score(response: &str) -> Option<f64> {
    #[derive(serde::Deserialize)]
    struct ScorePayload {
        score: f64,
    }
    if let Ok(payload) = serde_json::from_str::<ScorePayload>(extract_json(response)) {
        return Some(payload.score);
    }
    response.trim().parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_strips_fences_and_prose() {
        let response = "Here you go:\n```json\n{\"problem\": \"x\"}\n```\nHope that helps.";
        assert_eq!(extract_json(response), "{\"problem\": \"x\"}");
    }

    #[test]
    fn extract_json_passes_bare_payload_through() {
        assert_eq!(extract_json("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn parse_score_accepts_object_and_bare_number() {
        assert_eq!(parse_score("{\"score\": 0.82}"), Some(0.82));
        assert_eq!(parse_score("0.5"), Some(0.5));
        assert_eq!(parse_score("not a score"), None);
    }
}
