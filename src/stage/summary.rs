//! Summary stage — independent of the concept/keyword path
//!
//! Collaborator failure falls back to a sentinel so the classification
//! branch still has something to work with.

use super::{prompts, StageCtx, StageError};
use crate::collab::with_timeout;
use crate::state::{PipelineState, StageUpdate};
use tracing::{debug, info, warn};

pub const FALLBACK_SUMMARY: &str = "Summary unavailable.";

pub async fn run(state: &PipelineState, ctx: &StageCtx<'_>) -> Result<StageUpdate, StageError> {
    if state.summary_text.is_some() {
        debug!("summary already present, skipping");
        return Ok(StageUpdate::none());
    }

    info!("summarizing disclosure");
    let prompt = prompts::summarize(&state.input_text);
    let summary = match with_timeout(
        ctx.config.collaborator_timeout_secs,
        ctx.collab.generation.generate(&prompt),
    )
    .await
    {
        Ok(response) => {
            let text = response.trim().to_string();
            if text.is_empty() {
                warn!("empty summary response, using sentinel");
                FALLBACK_SUMMARY.to_string()
            } else {
                text
            }
        }
        Err(err) => {
            warn!(error = %err, "summary degraded to sentinel");
            FALLBACK_SUMMARY.to_string()
        }
    };

    Ok(StageUpdate {
        summary_text: Some(summary),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::collab::stub::StubGeneration;
    use crate::collab::Collaborators;
    use crate::config::PipelineConfig;
    use std::sync::Arc;

    #[tokio::test]
    async fn summary_comes_from_backend() {
        let collab = Collaborators::stubbed();
        let config = PipelineConfig::default();
        let cancel = CancellationToken::new();
        let state = PipelineState::new("Smart irrigation system using soil sensors");
        let ctx = StageCtx {
            collab: &collab,
            config: &config,
            cancel: &cancel,
        };

        let update = run(&state, &ctx).await.unwrap();
        assert!(update.summary_text.unwrap().contains("irrigation"));
    }

    #[tokio::test]
    async fn failure_degrades_to_sentinel() {
        let mut collab = Collaborators::stubbed();
        collab.generation =
            Arc::new(StubGeneration::new().with_failure("Summarize the following"));
        let config = PipelineConfig::default();
        let cancel = CancellationToken::new();
        let state = PipelineState::new("anything");
        let ctx = StageCtx {
            collab: &collab,
            config: &config,
            cancel: &cancel,
        };

        let update = run(&state, &ctx).await.unwrap();
        assert_eq!(update.summary_text.as_deref(), Some(FALLBACK_SUMMARY));
    }
}
