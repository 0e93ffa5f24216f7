//! Keyword expansion stage — per-keyword fan-out
//!
//! For every distinct keyword across the three seed categories, gathers
//! context snippets from the search backend and asks the generation
//! backend for synonyms and related terms. Keywords are deduplicated
//! before dispatch, so a keyword appearing in two categories is expanded
//! exactly once. A keyword whose snippet search or synonym generation
//! fails degrades to an empty list — the key is still present.

use super::{extract_json, prompts, StageCtx, StageError};
use crate::collab::{with_timeout, CollabResult, CollaboratorError, GenerationBackend, SearchBackend};
use crate::config::PipelineConfig;
use crate::fanout::run_batch;
use crate::state::{PipelineState, StageUpdate};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(state: &PipelineState, ctx: &StageCtx<'_>) -> Result<StageUpdate, StageError> {
    let seeds = state
        .seed_keywords
        .as_ref()
        .ok_or(StageError::MissingField("seed_keywords"))?;
    let matrix = state
        .concept_matrix
        .as_ref()
        .ok_or(StageError::MissingField("concept_matrix"))?;

    // Keyword -> concept category text, first category wins for duplicates.
    let mut contexts: HashMap<String, String> = HashMap::new();
    for (keywords, concept) in [
        (&seeds.problem_purpose, &matrix.problem_purpose),
        (&seeds.object_system, &matrix.object_system),
        (&seeds.environment_field, &matrix.environment_field),
    ] {
        for keyword in keywords {
            contexts
                .entry(keyword.clone())
                .or_insert_with(|| concept.clone());
        }
    }

    let items = seeds.distinct_keywords();
    info!(keywords = items.len(), "expanding keywords");

    let generation = ctx.collab.generation.clone();
    let search = ctx.collab.search.clone();
    let config = ctx.config.clone();
    let contexts = Arc::new(contexts);

    let results = run_batch(items, ctx.config.fanout_concurrency, ctx.cancel, move |keyword| {
        let concept = contexts.get(&keyword).cloned().unwrap_or_default();
        expand_one(
            keyword,
            concept,
            generation.clone(),
            search.clone(),
            config.clone(),
        )
    })
    .await
    .ok_or(StageError::Cancelled)?;

    let expanded: BTreeMap<String, Vec<String>> = results.into_iter().collect();
    Ok(StageUpdate {
        expanded_keywords: Some(expanded),
        ..Default::default()
    })
}

async fn expand_one(
    keyword: String,
    concept: String,
    generation: Arc<dyn GenerationBackend>,
    search: Arc<dyn SearchBackend>,
    config: PipelineConfig,
) -> Vec<String> {
    let snippets = match with_timeout(
        config.collaborator_timeout_secs,
        search.search(&keyword, config.snippet_limit),
    )
    .await
    {
        Ok(hits) => hits.into_iter().map(|hit| hit.content).collect::<Vec<_>>(),
        Err(err) => {
            warn!(keyword = %keyword, error = %err, "snippet search failed");
            Vec::new()
        }
    };
    if snippets.is_empty() {
        warn!(keyword = %keyword, "no context snippets, recording empty expansion");
        return Vec::new();
    }

    let prompt = prompts::expand_keyword(&keyword, &concept, &snippets);
    match with_timeout(config.collaborator_timeout_secs, generation.generate(&prompt))
        .await
        .and_then(|response| parse_synonyms(&response))
    {
        Ok(synonyms) => synonyms,
        Err(err) => {
            warn!(keyword = %keyword, error = %err, "synonym generation degraded to empty");
            Vec::new()
        }
    }
}

/// Accept either the flat `{"synonyms": [...]}` shape or the richer
/// `{"core_synonyms": [{"term": ...}], "related_terms": [{"term": ...}]}`
/// shape some backends produce.
fn parse_synonyms(response: &str) -> CollabResult<Vec<String>> {
    #[derive(Deserialize)]
    struct Flat {
        synonyms: Vec<String>,
    }
    #[derive(Deserialize)]
    struct Term {
        term: String,
    }
    #[derive(Deserialize)]
    struct Structured {
        #[serde(default)]
        core_synonyms: Vec<Term>,
        #[serde(default)]
        related_terms: Vec<Term>,
    }

    let body = extract_json(response);
    if let Ok(flat) = serde_json::from_str::<Flat>(body) {
        return Ok(flat.synonyms);
    }
    match serde_json::from_str::<Structured>(body) {
        Ok(parsed) if !(parsed.core_synonyms.is_empty() && parsed.related_terms.is_empty()) => {
            Ok(parsed
                .core_synonyms
                .into_iter()
                .chain(parsed.related_terms)
                .map(|entry| entry.term)
                .collect())
        }
        _ => Err(CollaboratorError::Malformed(format!(
            "unrecognized synonym payload: {}",
            response.trim()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::collab::stub::StubSearch;
    use crate::collab::Collaborators;
    use crate::state::{ConceptMatrix, SeedKeywords};

    fn prepared_state() -> PipelineState {
        let mut state = PipelineState::new("irrigation");
        state.concept_matrix = Some(ConceptMatrix {
            problem_purpose: "water optimization".to_string(),
            object_system: "IoT irrigation system".to_string(),
            environment_field: "agriculture".to_string(),
        });
        state.seed_keywords = Some(SeedKeywords {
            problem_purpose: vec!["water optimization".to_string()],
            object_system: vec!["IoT sensors".to_string()],
            environment_field: vec!["agriculture".to_string()],
        });
        state
    }

    #[tokio::test]
    async fn every_distinct_keyword_gets_an_entry() {
        let collab = Collaborators::stubbed();
        let config = PipelineConfig::default();
        let cancel = CancellationToken::new();
        let state = prepared_state();
        let ctx = StageCtx {
            collab: &collab,
            config: &config,
            cancel: &cancel,
        };

        let update = run(&state, &ctx).await.unwrap();
        let expanded = update.expanded_keywords.unwrap();
        assert_eq!(expanded.len(), 3);
        assert!(expanded.contains_key("water optimization"));
        assert!(!expanded["water optimization"].is_empty());
    }

    #[tokio::test]
    async fn no_snippets_degrades_to_empty_entry() {
        let mut collab = Collaborators::stubbed();
        collab.search = Arc::new(StubSearch::failing());
        let config = PipelineConfig::default();
        let cancel = CancellationToken::new();
        let state = prepared_state();
        let ctx = StageCtx {
            collab: &collab,
            config: &config,
            cancel: &cancel,
        };

        let update = run(&state, &ctx).await.unwrap();
        let expanded = update.expanded_keywords.unwrap();
        // Entries exist for every keyword even though expansion degraded.
        assert_eq!(expanded.len(), 3);
        assert!(expanded.values().all(|list| list.is_empty()));
    }

    #[tokio::test]
    async fn cancellation_abandons_the_batch() {
        let collab = Collaborators::stubbed();
        let config = PipelineConfig::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let state = prepared_state();
        let ctx = StageCtx {
            collab: &collab,
            config: &config,
            cancel: &cancel,
        };

        let err = run(&state, &ctx).await.unwrap_err();
        assert!(matches!(err, StageError::Cancelled));
    }

    #[test]
    fn parse_synonyms_accepts_both_shapes() {
        let flat = parse_synonyms(r#"{"synonyms": ["a", "b"]}"#).unwrap();
        assert_eq!(flat, vec!["a", "b"]);

        let structured = parse_synonyms(
            r#"{"core_synonyms": [{"term": "watering system"}], "related_terms": [{"term": "drip irrigation"}]}"#,
        )
        .unwrap();
        assert_eq!(structured, vec!["watering system", "drip irrigation"]);

        assert!(parse_synonyms("no json here").is_err());
    }
}
