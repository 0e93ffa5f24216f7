//! Document scoring stage — per-candidate fan-out
//!
//! For each candidate URL: fetch the patent text, then run two
//! independent relevance judgments (scenario fit and problem fit)
//! through the generation backend. A failure anywhere in one document's
//! chain records zero scores for that document and never disturbs the
//! others.

use super::{parse_score, prompts, StageCtx, StageError};
use crate::collab::{with_timeout, DocumentFetcher, GenerationBackend};
use crate::config::PipelineConfig;
use crate::fanout::run_batch;
use crate::state::{PipelineState, ScoredDocument, StageUpdate};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(state: &PipelineState, ctx: &StageCtx<'_>) -> Result<StageUpdate, StageError> {
    if state.candidate_documents.is_empty() {
        info!("no candidate documents to score");
        return Ok(StageUpdate::none());
    }

    let urls: Vec<String> = state
        .candidate_documents
        .iter()
        .map(|doc| doc.url.clone())
        .collect();
    info!(documents = urls.len(), "scoring candidate documents");

    let scenario = state.input_text.clone();
    let problem = state.problem.clone().unwrap_or_default();
    let fetcher = ctx.collab.fetcher.clone();
    let generation = ctx.collab.generation.clone();
    let config = ctx.config.clone();

    let results = run_batch(urls, ctx.config.fanout_concurrency, ctx.cancel, move |url| {
        score_one(
            url,
            scenario.clone(),
            problem.clone(),
            fetcher.clone(),
            generation.clone(),
            config.clone(),
        )
    })
    .await
    .ok_or(StageError::Cancelled)?;

    let documents = results
        .into_iter()
        .map(|(url, (scenario_score, problem_score))| ScoredDocument {
            url,
            scenario_score,
            problem_score,
        })
        .collect();

    Ok(StageUpdate {
        candidate_documents: Some(documents),
        ..Default::default()
    })
}

async fn score_one(
    url: String,
    scenario: String,
    problem: String,
    fetcher: Arc<dyn DocumentFetcher>,
    generation: Arc<dyn GenerationBackend>,
    config: PipelineConfig,
) -> (f64, f64) {
    let document = match with_timeout(config.collaborator_timeout_secs, fetcher.fetch(&url)).await
    {
        Ok(document) => document,
        Err(err) => {
            warn!(url = %url, error = %err, "fetch failed, recording zero scores");
            return (0.0, 0.0);
        }
    };

    let scenario_score = judge(
        &prompts::score_scenario(&scenario, &document),
        &generation,
        &config,
    )
    .await;
    let problem_score = judge(
        &prompts::score_problem(&problem, &document),
        &generation,
        &config,
    )
    .await;
    (scenario_score, problem_score)
}

async fn judge(
    prompt: &str,
    generation: &Arc<dyn GenerationBackend>,
    config: &PipelineConfig,
) -> f64 {
    match with_timeout(config.collaborator_timeout_secs, generation.generate(prompt)).await {
        Ok(response) => match parse_score(&response) {
            Some(score) => score.clamp(0.0, 1.0),
            None => {
                warn!("unparseable relevance judgment, recording zero");
                0.0
            }
        },
        Err(err) => {
            warn!(error = %err, "relevance judgment failed, recording zero");
            0.0
        }
    }
}
