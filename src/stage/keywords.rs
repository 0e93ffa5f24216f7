//! Seed keyword generation stage
//!
//! Produces exactly three keyword lists keyed identically to the concept
//! matrix.

use super::{parse_struct, prompts, StageCtx, StageError};
use crate::collab::with_timeout;
use crate::state::{PipelineState, SeedKeywords, StageUpdate};
use tracing::{debug, info};

pub async fn run(state: &PipelineState, ctx: &StageCtx<'_>) -> Result<StageUpdate, StageError> {
    if state.seed_keywords.is_some() {
        debug!("seed keywords already present, skipping generation");
        return Ok(StageUpdate::none());
    }
    let matrix = state
        .concept_matrix
        .as_ref()
        .ok_or(StageError::MissingField("concept_matrix"))?;

    info!("generating seed keywords");
    let prompt = prompts::generate_keywords(matrix);
    let response = with_timeout(
        ctx.config.collaborator_timeout_secs,
        ctx.collab.generation.generate(&prompt),
    )
    .await?;
    let keywords = parse_struct::<SeedKeywords>(&response)?;

    Ok(StageUpdate {
        seed_keywords: Some(keywords),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::collab::Collaborators;
    use crate::config::PipelineConfig;
    use crate::state::ConceptMatrix;

    fn state_with_matrix() -> PipelineState {
        let mut state = PipelineState::new("irrigation");
        state.concept_matrix = Some(ConceptMatrix {
            problem_purpose: "water optimization".to_string(),
            object_system: "IoT irrigation system".to_string(),
            environment_field: "agriculture".to_string(),
        });
        state
    }

    #[tokio::test]
    async fn generation_produces_three_lists() {
        let collab = Collaborators::stubbed();
        let config = PipelineConfig::default();
        let cancel = CancellationToken::new();
        let state = state_with_matrix();
        let ctx = StageCtx {
            collab: &collab,
            config: &config,
            cancel: &cancel,
        };

        let update = run(&state, &ctx).await.unwrap();
        let keywords = update.seed_keywords.unwrap();
        assert!(!keywords.problem_purpose.is_empty());
        assert!(!keywords.object_system.is_empty());
        assert!(!keywords.environment_field.is_empty());
    }

    #[tokio::test]
    async fn missing_matrix_is_a_structural_error() {
        let collab = Collaborators::stubbed();
        let config = PipelineConfig::default();
        let cancel = CancellationToken::new();
        let state = PipelineState::new("irrigation");
        let ctx = StageCtx {
            collab: &collab,
            config: &config,
            cancel: &cancel,
        };

        let err = run(&state, &ctx).await.unwrap_err();
        assert!(matches!(err, StageError::MissingField("concept_matrix")));
    }
}
