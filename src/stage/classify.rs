//! IPC classification stage
//!
//! Sends the summary to the classifier. Failure degrades to an empty
//! code list — downstream query generation simply omits IPC context.

use super::{StageCtx, StageError};
use crate::collab::with_timeout;
use crate::state::{PipelineState, StageUpdate};
use tracing::{info, warn};

pub async fn run(state: &PipelineState, ctx: &StageCtx<'_>) -> Result<StageUpdate, StageError> {
    let summary = state
        .summary_text
        .as_deref()
        .ok_or(StageError::MissingField("summary_text"))?;

    info!("classifying summary");
    let codes = match with_timeout(
        ctx.config.collaborator_timeout_secs,
        ctx.collab.classifier.classify(summary),
    )
    .await
    {
        Ok(codes) => {
            info!(count = codes.len(), "classification complete");
            codes
        }
        Err(err) => {
            warn!(error = %err, "classification degraded to empty code list");
            Vec::new()
        }
    };

    Ok(StageUpdate {
        ipc_codes: Some(codes),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::collab::stub::StubClassifier;
    use crate::collab::Collaborators;
    use crate::config::PipelineConfig;
    use std::sync::Arc;

    fn state_with_summary() -> PipelineState {
        let mut state = PipelineState::new("irrigation");
        state.summary_text = Some("A smart irrigation summary".to_string());
        state
    }

    #[tokio::test]
    async fn classification_attaches_ranked_codes() {
        let collab = Collaborators::stubbed();
        let config = PipelineConfig::default();
        let cancel = CancellationToken::new();
        let state = state_with_summary();
        let ctx = StageCtx {
            collab: &collab,
            config: &config,
            cancel: &cancel,
        };

        let update = run(&state, &ctx).await.unwrap();
        assert_eq!(update.ipc_codes.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn classifier_failure_degrades_to_empty() {
        let mut collab = Collaborators::stubbed();
        collab.classifier = Arc::new(StubClassifier::failing());
        let config = PipelineConfig::default();
        let cancel = CancellationToken::new();
        let state = state_with_summary();
        let ctx = StageCtx {
            collab: &collab,
            config: &config,
            cancel: &cancel,
        };

        let update = run(&state, &ctx).await.unwrap();
        assert!(update.ipc_codes.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_summary_is_a_structural_error() {
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
        assert!(matches!(err, StageError::MissingField("summary_text")));
    }
}
