//! Candidate document discovery stage — per-query fan-out
//!
//! One search call per boolean query; URLs are collected and
//! deduplicated across all queries in first-seen order. A query that
//! yields zero results is not an error, and a failed query degrades to
//! zero results.

use super::{StageCtx, StageError};
use crate::collab::{with_timeout, SearchBackend};
use crate::config::PipelineConfig;
use crate::fanout::{dedup_preserving_order, run_batch};
use crate::state::{PipelineState, ScoredDocument, StageUpdate};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(state: &PipelineState, ctx: &StageCtx<'_>) -> Result<StageUpdate, StageError> {
    if state.queries.is_empty() {
        info!("no queries to run, candidate list is empty");
        return Ok(StageUpdate {
            candidate_documents: Some(Vec::new()),
            ..Default::default()
        });
    }

    info!(queries = state.queries.len(), "discovering candidate documents");
    let search = ctx.collab.search.clone();
    let config = ctx.config.clone();

    let results = run_batch(
        state.queries.clone(),
        ctx.config.fanout_concurrency,
        ctx.cancel,
        move |query| discover_one(query, search.clone(), config.clone()),
    )
    .await
    .ok_or(StageError::Cancelled)?;

    let urls = dedup_preserving_order(
        results
            .into_iter()
            .flat_map(|(_, urls)| urls)
            .collect::<Vec<_>>(),
    );
    info!(documents = urls.len(), "candidate documents discovered");

    Ok(StageUpdate {
        candidate_documents: Some(urls.into_iter().map(ScoredDocument::unscored).collect()),
        ..Default::default()
    })
}

async fn discover_one(
    query: String,
    search: Arc<dyn SearchBackend>,
    config: PipelineConfig,
) -> Vec<String> {
    match with_timeout(
        config.collaborator_timeout_secs,
        search.search(&query, config.max_search_results),
    )
    .await
    {
        Ok(hits) => hits.into_iter().map(|hit| hit.url).collect(),
        Err(err) => {
            warn!(query = %query, error = %err, "search degraded to zero results");
            Vec::new()
        }
    }
}
