//! Boolean query generation stage
//!
//! Combines the expanded keyword groups, IPC categories, and the
//! normalized problem into a bounded list of boolean search expressions.
//! Parse failure degrades to an empty list — discovery then finds
//! nothing, which is a valid (if empty) outcome.

use super::{parse_struct, prompts, StageCtx, StageError};
use crate::collab::with_timeout;
use crate::fanout::dedup_preserving_order;
use crate::state::{PipelineState, StageUpdate};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct QueriesResponse {
    queries: Vec<String>,
}

pub async fn run(state: &PipelineState, ctx: &StageCtx<'_>) -> Result<StageUpdate, StageError> {
    let seeds = state
        .seed_keywords
        .as_ref()
        .ok_or(StageError::MissingField("seed_keywords"))?;
    let problem = state.problem.clone().unwrap_or_default();

    let problem_purpose_terms = category_terms(&seeds.problem_purpose, &state.expanded_keywords);
    let object_system_terms = category_terms(&seeds.object_system, &state.expanded_keywords);
    let environment_field_terms =
        category_terms(&seeds.environment_field, &state.expanded_keywords);
    let ipc_categories: Vec<&str> = state
        .ipc_codes
        .iter()
        .map(|prediction| prediction.category.as_str())
        .collect();

    info!("generating boolean queries");
    let prompt = prompts::build_queries(
        &problem,
        &problem_purpose_terms,
        &object_system_terms,
        &environment_field_terms,
        &ipc_categories,
        ctx.config.max_queries,
    );
    let parsed = with_timeout(
        ctx.config.collaborator_timeout_secs,
        ctx.collab.generation.generate(&prompt),
    )
    .await
    .and_then(|response| parse_struct::<QueriesResponse>(&response));

    let mut queries = match parsed {
        Ok(response) => response.queries,
        Err(err) => {
            warn!(error = %err, "query generation degraded to empty list");
            Vec::new()
        }
    };
    queries.retain(|query| !query.trim().is_empty());
    let mut queries = dedup_preserving_order(queries);
    queries.truncate(ctx.config.max_queries);
    info!(count = queries.len(), "boolean queries ready");

    Ok(StageUpdate {
        queries: Some(queries),
        ..Default::default()
    })
}

/// A category's seed keywords followed by their expansions, deduplicated.
fn category_terms(
    keywords: &[String],
    expanded: &BTreeMap<String, Vec<String>>,
) -> Vec<String> {
    let mut terms = Vec::new();
    for keyword in keywords {
        terms.push(keyword.clone());
        if let Some(synonyms) = expanded.get(keyword) {
            terms.extend(synonyms.iter().cloned());
        }
    }
    dedup_preserving_order(terms)
}
