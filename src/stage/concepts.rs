//! Concept extraction stage
//!
//! Produces the three-field concept matrix. When a prior checkpoint
//! rejection carried feedback, that feedback is folded into the prompt so
//! the retried extraction differs from the rejected one — without it the
//! reject path would loop on identical output.

use super::{parse_struct, prompts, StageCtx, StageError};
use crate::collab::{with_timeout, CollaboratorError};
use crate::state::{ConceptMatrix, DecisionAction, PipelineState, StageUpdate};
use tracing::{debug, info, warn};

pub async fn run(state: &PipelineState, ctx: &StageCtx<'_>) -> Result<StageUpdate, StageError> {
    if state.concept_matrix.is_some() {
        debug!("concept matrix already present, skipping extraction");
        return Ok(StageUpdate::none());
    }

    let feedback = state
        .validation_decision
        .as_ref()
        .filter(|decision| decision.action == DecisionAction::Reject)
        .and_then(|decision| decision.feedback.as_deref());
    if feedback.is_some() {
        info!("re-extracting concepts with reviewer feedback");
    } else {
        info!("extracting concepts");
    }

    let prompt = prompts::extract_concepts(
        &state.input_text,
        state.problem.as_deref(),
        state.technical.as_deref(),
        feedback,
    );
    let response = with_timeout(
        ctx.config.collaborator_timeout_secs,
        ctx.collab.generation.generate(&prompt),
    )
    .await?;

    let matrix = match parse_struct::<ConceptMatrix>(&response) {
        Ok(matrix) => matrix,
        Err(parse_err) => {
            warn!(error = %parse_err, "structured parse failed, trying line-oriented fallback");
            parse_concept_lines(&response).ok_or(parse_err)?
        }
    };
    if let Some(field) = matrix.first_empty_field() {
        return Err(StageError::Collaborator(CollaboratorError::Malformed(
            format!("concept field '{}' is empty", field),
        )));
    }

    Ok(StageUpdate {
        concept_matrix: Some(matrix),
        ..Default::default()
    })
}

/// Line-oriented fallback for responses that are not valid JSON.
///
/// Maps `key: value` lines onto matrix fields by keyword. The first
/// match per field wins.
fn parse_concept_lines(response: &str) -> Option<ConceptMatrix> {
    let mut problem_purpose: Option<String> = None;
    let mut object_system: Option<String> = None;
    let mut environment_field: Option<String> = None;

    for line in response.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if key.contains("problem") || key.contains("purpose") {
            problem_purpose.get_or_insert_with(|| value.to_string());
        } else if key.contains("object") || key.contains("system") {
            object_system.get_or_insert_with(|| value.to_string());
        } else if key.contains("environment") || key.contains("field") {
            environment_field.get_or_insert_with(|| value.to_string());
        }
    }

    Some(ConceptMatrix {
        problem_purpose: problem_purpose?,
        object_system: object_system?,
        environment_field: environment_field?,
    })
}
