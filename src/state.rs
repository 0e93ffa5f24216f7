//! Pipeline state threaded through all stages
//!
//! One `PipelineState` exists per extraction run. Stages never mutate it
//! directly — each returns a [`StageUpdate`] holding only the fields it
//! owns, and the executor merges updates at a single-writer boundary.
//! Scalar fields merge with set-if-absent semantics (a stage re-entered
//! with its output already present is a no-op); collection fields produced
//! by fan-out aggregators merge with full-replace semantics.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Invariant violations detected at a merge point.
///
/// These indicate a programming defect in a stage, not a collaborator
/// failure — the executor aborts the run with the diagnostic.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("concept matrix has an empty field: {0}")]
    EmptyConceptField(&'static str),

    #[error("expanded keyword '{0}' is not among the current seed keywords")]
    OrphanExpansion(String),

    #[error("expanded keywords merged before seed keywords exist")]
    ExpansionBeforeSeeds,

    #[error("duplicate candidate document url: {0}")]
    DuplicateDocument(String),

    #[error("candidate documents produced without an accepting decision")]
    DocumentsWithoutApproval,
}

/// The three-field concept summary extracted from the invention text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptMatrix {
    /// The technical problem the invention solves, or its primary objective.
    pub problem_purpose: String,
    /// The main object, device, system, material, or process.
    pub object_system: String,
    /// The application domain, industry sector, or operational context.
    pub environment_field: String,
}

impl ConceptMatrix {
    /// Return the name of the first empty field, if any.
    pub fn first_empty_field(&self) -> Option<&'static str> {
        if self.problem_purpose.trim().is_empty() {
            Some("problem_purpose")
        } else if self.object_system.trim().is_empty() {
            Some("object_system")
        } else if self.environment_field.trim().is_empty() {
            Some("environment_field")
        } else {
            None
        }
    }
}

/// Seed keywords, one list per concept category.
///
/// Keys match [`ConceptMatrix`] field-for-field. Lists may be empty but
/// are never null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedKeywords {
    pub problem_purpose: Vec<String>,
    pub object_system: Vec<String>,
    pub environment_field: Vec<String>,
}

impl SeedKeywords {
    /// Distinct keywords across all three categories, first-occurrence order.
    ///
    /// A keyword appearing in two categories is returned once.
    pub fn distinct_keywords(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.problem_purpose
            .iter()
            .chain(self.object_system.iter())
            .chain(self.environment_field.iter())
            .filter(|kw| seen.insert(kw.as_str().to_string()))
            .cloned()
            .collect()
    }

    /// True when all three lists are empty.
    pub fn is_empty(&self) -> bool {
        self.problem_purpose.is_empty()
            && self.object_system.is_empty()
            && self.environment_field.is_empty()
    }
}

/// The three outcomes a checkpoint decision can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Approve,
    Reject,
    Edit,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Approve => "approve",
            DecisionAction::Reject => "reject",
            DecisionAction::Edit => "edit",
        }
    }
}

/// Outcome of the checkpoint gate.
///
/// `feedback` is meaningful only for `Reject`; `edited_keywords` only for
/// `Edit`. The gate normalizes extraneous payloads away before the
/// decision enters the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationDecision {
    pub action: DecisionAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_keywords: Option<SeedKeywords>,
}

impl ValidationDecision {
    pub fn approve() -> Self {
        Self {
            action: DecisionAction::Approve,
            feedback: None,
            edited_keywords: None,
        }
    }

    /// Reject with optional free-text feedback. Absent feedback is valid
    /// but degrades the effectiveness of the retried extraction.
    pub fn reject(feedback: Option<String>) -> Self {
        Self {
            action: DecisionAction::Reject,
            feedback,
            edited_keywords: None,
        }
    }

    pub fn edit(edited_keywords: SeedKeywords) -> Self {
        Self {
            action: DecisionAction::Edit,
            feedback: None,
            edited_keywords: Some(edited_keywords),
        }
    }
}

/// A ranked IPC classification prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpcPrediction {
    pub category: String,
    pub score: f64,
}

/// A candidate prior-art document with its two relevance judgments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub url: String,
    /// How well the document matches the use scenario, 0.0–1.0.
    pub scenario_score: f64,
    /// How well the document addresses the stated problem, 0.0–1.0.
    pub problem_score: f64,
}

impl ScoredDocument {
    /// A discovered document that has not been scored yet.
    pub fn unscored(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            scenario_score: 0.0,
            problem_score: 0.0,
        }
    }
}

/// The single mutable record threaded through all pipeline stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineState {
    /// Immutable once set.
    pub input_text: String,
    /// Normalized restatement of the input; set once by `normalize`.
    pub problem: Option<String>,
    pub technical: Option<String>,
    pub concept_matrix: Option<ConceptMatrix>,
    pub seed_keywords: Option<SeedKeywords>,
    /// Produced by the checkpoint gate; replaced on each gate pass.
    pub validation_decision: Option<ValidationDecision>,
    /// Keyed by keyword string across all three seed categories. Once
    /// expansion has run, every distinct seed keyword has an entry —
    /// possibly empty, never absent.
    #[serde(default)]
    pub expanded_keywords: BTreeMap<String, Vec<String>>,
    /// Independent of the concept/keyword path.
    pub summary_text: Option<String>,
    #[serde(default)]
    pub ipc_codes: Vec<IpcPrediction>,
    /// Boolean search expressions, bounded count.
    #[serde(default)]
    pub queries: Vec<String>,
    /// Unique by url in the final list.
    #[serde(default)]
    pub candidate_documents: Vec<ScoredDocument>,
}

impl PipelineState {
    pub fn new(input_text: impl Into<String>) -> Self {
        Self {
            input_text: input_text.into(),
            ..Default::default()
        }
    }

    /// Clear the fields owned by a rejected keyword path so the retried
    /// extraction starts clean. Stale expansion keys from the discarded
    /// keyword set are cleared, never merged.
    pub fn clear_rejected(&mut self) {
        self.concept_matrix = None;
        self.seed_keywords = None;
        self.expanded_keywords.clear();
    }

    /// Substitute user-supplied keyword lists (the `edit` path).
    ///
    /// Full-replace semantics; any expansions of the replaced set are
    /// cleared so expansion keys always refer to current seeds.
    pub fn apply_edited_keywords(&mut self, edited: SeedKeywords) {
        self.seed_keywords = Some(edited);
        self.expanded_keywords.clear();
    }

    /// True once the gate resolved to an accepting path (approve or edit).
    pub fn accepted(&self) -> bool {
        matches!(
            self.validation_decision.as_ref().map(|d| d.action),
            Some(DecisionAction::Approve) | Some(DecisionAction::Edit)
        )
    }

    /// Merge a stage's partial update, enforcing the state invariants.
    ///
    /// Scalar fields set-if-absent; a stage re-delivering a field that is
    /// already present is ignored. Collection fields full-replace, with
    /// invariant checks before the replacement lands.
    pub fn merge(&mut self, update: StageUpdate) -> Result<(), StateError> {
        if let Some(problem) = update.problem {
            if self.problem.is_none() {
                self.problem = Some(problem);
            }
        }
        if let Some(technical) = update.technical {
            if self.technical.is_none() {
                self.technical = Some(technical);
            }
        }
        if let Some(matrix) = update.concept_matrix {
            if let Some(field) = matrix.first_empty_field() {
                return Err(StateError::EmptyConceptField(field));
            }
            if self.concept_matrix.is_none() {
                self.concept_matrix = Some(matrix);
            }
        }
        if let Some(keywords) = update.seed_keywords {
            if self.seed_keywords.is_none() {
                self.seed_keywords = Some(keywords);
            }
        }
        if let Some(summary) = update.summary_text {
            if self.summary_text.is_none() {
                self.summary_text = Some(summary);
            }
        }
        if let Some(expanded) = update.expanded_keywords {
            let seeds = self
                .seed_keywords
                .as_ref()
                .ok_or(StateError::ExpansionBeforeSeeds)?;
            let known: BTreeSet<&str> = seeds
                .problem_purpose
                .iter()
                .chain(seeds.object_system.iter())
                .chain(seeds.environment_field.iter())
                .map(|kw| kw.as_str())
                .collect();
            for key in expanded.keys() {
                if !known.contains(key.as_str()) {
                    return Err(StateError::OrphanExpansion(key.clone()));
                }
            }
            self.expanded_keywords = expanded;
        }
        if let Some(ipc_codes) = update.ipc_codes {
            self.ipc_codes = ipc_codes;
        }
        if let Some(queries) = update.queries {
            self.queries = queries;
        }
        if let Some(documents) = update.candidate_documents {
            if !self.accepted() {
                return Err(StateError::DocumentsWithoutApproval);
            }
            let mut seen = BTreeSet::new();
            for doc in &documents {
                if !seen.insert(doc.url.as_str()) {
                    return Err(StateError::DuplicateDocument(doc.url.clone()));
                }
            }
            self.candidate_documents = documents;
        }
        Ok(())
    }
}

/// Partial update returned by a stage — only the fields the stage owns.
#[derive(Debug, Clone, Default)]
pub struct StageUpdate {
    pub problem: Option<String>,
    pub technical: Option<String>,
    pub concept_matrix: Option<ConceptMatrix>,
    pub seed_keywords: Option<SeedKeywords>,
    pub summary_text: Option<String>,
    pub expanded_keywords: Option<BTreeMap<String, Vec<String>>>,
    pub ipc_codes: Option<Vec<IpcPrediction>>,
    pub queries: Option<Vec<String>>,
    pub candidate_documents: Option<Vec<ScoredDocument>>,
}

impl StageUpdate {
    /// An update that changes nothing (stage skipped — output already present).
    pub fn none() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> ConceptMatrix {
        ConceptMatrix {
            problem_purpose: "water optimization".to_string(),
            object_system: "IoT irrigation system".to_string(),
            environment_field: "agriculture".to_string(),
        }
    }

    fn seeds() -> SeedKeywords {
        SeedKeywords {
            problem_purpose: vec!["water optimization".to_string()],
            object_system: vec!["IoT sensors".to_string()],
            environment_field: vec!["agriculture".to_string()],
        }
    }

    #[test]
    fn scalar_merge_is_set_if_absent() {
        let mut state = PipelineState::new("input");
        state
            .merge(StageUpdate {
                problem: Some("first".to_string()),
                ..Default::default()
            })
            .unwrap();
        state
            .merge(StageUpdate {
                problem: Some("second".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(state.problem.as_deref(), Some("first"));
    }

    #[test]
    fn empty_concept_field_is_fatal() {
        let mut state = PipelineState::new("input");
        let mut bad = matrix();
        bad.object_system = "  ".to_string();
        let err = state
            .merge(StageUpdate {
                concept_matrix: Some(bad),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, StateError::EmptyConceptField("object_system")));
    }

    #[test]
    fn expansion_keys_must_be_current_seeds() {
        let mut state = PipelineState::new("input");
        state
            .merge(StageUpdate {
                seed_keywords: Some(seeds()),
                ..Default::default()
            })
            .unwrap();

        let mut expanded = BTreeMap::new();
        expanded.insert("stale keyword".to_string(), vec![]);
        let err = state
            .merge(StageUpdate {
                expanded_keywords: Some(expanded),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, StateError::OrphanExpansion(_)));
    }

    #[test]
    fn expansion_before_seeds_is_fatal() {
        let mut state = PipelineState::new("input");
        let err = state
            .merge(StageUpdate {
                expanded_keywords: Some(BTreeMap::new()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, StateError::ExpansionBeforeSeeds));
    }

    #[test]
    fn duplicate_document_urls_rejected() {
        let mut state = PipelineState::new("input");
        state.validation_decision = Some(ValidationDecision::approve());
        let err = state
            .merge(StageUpdate {
                candidate_documents: Some(vec![
                    ScoredDocument::unscored("https://example.com/1"),
                    ScoredDocument::unscored("https://example.com/1"),
                ]),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, StateError::DuplicateDocument(_)));
    }

    #[test]
    fn documents_require_accepting_decision() {
        let mut state = PipelineState::new("input");
        state.validation_decision = Some(ValidationDecision::reject(None));
        let err = state
            .merge(StageUpdate {
                candidate_documents: Some(vec![ScoredDocument::unscored("https://example.com/1")]),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, StateError::DocumentsWithoutApproval));
    }

    #[test]
    fn clear_rejected_wipes_keyword_path() {
        let mut state = PipelineState::new("input");
        state.concept_matrix = Some(matrix());
        state.seed_keywords = Some(seeds());
        state
            .expanded_keywords
            .insert("water optimization".to_string(), vec!["irrigation efficiency".to_string()]);

        state.clear_rejected();

        assert!(state.concept_matrix.is_none());
        assert!(state.seed_keywords.is_none());
        assert!(state.expanded_keywords.is_empty());
    }

    #[test]
    fn distinct_keywords_dedup_across_categories() {
        let kw = SeedKeywords {
            problem_purpose: vec!["sensors".to_string(), "irrigation".to_string()],
            object_system: vec!["sensors".to_string()],
            environment_field: vec!["agriculture".to_string()],
        };
        assert_eq!(
            kw.distinct_keywords(),
            vec!["sensors", "irrigation", "agriculture"]
        );
    }

    #[test]
    fn edited_keywords_replace_and_clear_expansions() {
        let mut state = PipelineState::new("input");
        state.seed_keywords = Some(seeds());
        state
            .expanded_keywords
            .insert("IoT sensors".to_string(), vec!["smart sensors".to_string()]);

        let edited = SeedKeywords {
            problem_purpose: vec!["drip control".to_string()],
            object_system: vec!["valve actuator".to_string()],
            environment_field: vec!["greenhouses".to_string()],
        };
        state.apply_edited_keywords(edited.clone());

        assert_eq!(state.seed_keywords, Some(edited));
        assert!(state.expanded_keywords.is_empty());
    }

    #[test]
    fn state_serde_round_trip() {
        let mut state = PipelineState::new("Smart irrigation system using soil sensors");
        state.problem = Some("water waste".to_string());
        state.concept_matrix = Some(matrix());
        state.seed_keywords = Some(seeds());
        state.validation_decision = Some(ValidationDecision::reject(Some(
            "too generic".to_string(),
        )));

        let json = serde_json::to_string(&state).unwrap();
        let back: PipelineState = serde_json::from_str(&json).unwrap();

        assert_eq!(back.input_text, state.input_text);
        assert_eq!(back.concept_matrix, state.concept_matrix);
        assert_eq!(
            back.validation_decision.unwrap().feedback.as_deref(),
            Some("too generic")
        );
    }
}
