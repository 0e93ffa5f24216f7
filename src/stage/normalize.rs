//! Input normalization stage
//!
//! Rewrites the raw disclosure into `{problem, technical}`. Collaborator
//! failure falls back to a fixed sentinel rather than aborting the run.

use super::{parse_struct, prompts, StageCtx, StageError};
use crate::collab::with_timeout;
use crate::state::{PipelineState, StageUpdate};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Sentinel recorded when the backend cannot produce a normalization.
pub const FALLBACK_TEXT: &str = "Not mentioned.";

#[derive(Debug, Deserialize)]
struct NormalizedInput {
    problem: String,
    technical: String,
}

pub async fn run(state: &PipelineState, ctx: &StageCtx<'_>) -> Result<StageUpdate, StageError> {
    if state.problem.is_some() && state.technical.is_some() {
        debug!("problem and technical already present, skipping normalization");
        return Ok(StageUpdate::none());
    }

    info!("normalizing input");
    let prompt = prompts::normalize(&state.input_text);
    let parsed = with_timeout(
        ctx.config.collaborator_timeout_secs,
        ctx.collab.generation.generate(&prompt),
    )
    .await
    .and_then(|response| parse_struct::<NormalizedInput>(&response));

    let update = match parsed {
        Ok(normalized) => StageUpdate {
            problem: Some(normalized.problem),
            technical: Some(normalized.technical),
            ..Default::default()
        },
        Err(err) => {
            warn!(error = %err, "normalization degraded to sentinel");
            StageUpdate {
                problem: Some(FALLBACK_TEXT.to_string()),
                technical: Some(FALLBACK_TEXT.to_string()),
                ..Default::default()
            }
        }
    };
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::collab::stub::StubGeneration;
    use crate::collab::Collaborators;
    use crate::config::PipelineConfig;
    use std::sync::Arc;

    fn ctx_with<'a>(
        collab: &'a Collaborators,
        config: &'a PipelineConfig,
        cancel: &'a CancellationToken,
    ) -> StageCtx<'a> {
        StageCtx {
            collab,
            config,
            cancel,
        }
    }

    #[tokio::test]
    async fn normalization_populates_both_fields() {
        let collab = Collaborators::stubbed();
        let config = PipelineConfig::default();
        let cancel = CancellationToken::new();
        let state = PipelineState::new("Smart irrigation system using soil sensors");

        let update = run(&state, &ctx_with(&collab, &config, &cancel))
            .await
            .unwrap();
        assert!(update.problem.is_some());
        assert!(update.technical.is_some());
    }

    #[tokio::test]
    async fn backend_failure_degrades_to_sentinel() {
        let mut collab = Collaborators::stubbed();
        collab.generation =
            Arc::new(StubGeneration::new().with_failure("Normalize the following"));
        let config = PipelineConfig::default();
        let cancel = CancellationToken::new();
        let state = PipelineState::new("anything");

        let update = run(&state, &ctx_with(&collab, &config, &cancel))
            .await
            .unwrap();
        assert_eq!(update.problem.as_deref(), Some(FALLBACK_TEXT));
        assert_eq!(update.technical.as_deref(), Some(FALLBACK_TEXT));
    }

    #[tokio::test]
    async fn seeded_state_skips_normalization() {
        let collab = Collaborators::stubbed();
        let config = PipelineConfig::default();
        let cancel = CancellationToken::new();
        let mut state = PipelineState::new("anything");
        state.problem = Some("already set".to_string());
        state.technical = Some("already set".to_string());

        let update = run(&state, &ctx_with(&collab, &config, &cancel))
            .await
            .unwrap();
        assert!(update.problem.is_none());
        assert!(update.technical.is_none());
    }
}
