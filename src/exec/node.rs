//! Workflow graph positions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every position in the extraction workflow.
///
/// Serialized by name inside the run record, so a suspended run can be
/// persisted and resumed at exactly this position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageNode {
    Normalize,
    ExtractConcepts,
    GenerateKeywords,
    Summarize,
    Classify,
    AwaitDecision,
    ApplyEdit,
    ExpandKeywords,
    BuildQueries,
    DiscoverDocuments,
    ScoreDocuments,
    Done,
}

impl StageNode {
    pub fn name(&self) -> &'static str {
        match self {
            StageNode::Normalize => "normalize",
            StageNode::ExtractConcepts => "extract_concepts",
            StageNode::GenerateKeywords => "generate_keywords",
            StageNode::Summarize => "summarize",
            StageNode::Classify => "classify",
            StageNode::AwaitDecision => "await_decision",
            StageNode::ApplyEdit => "apply_edit",
            StageNode::ExpandKeywords => "expand_keywords",
            StageNode::BuildQueries => "build_queries",
            StageNode::DiscoverDocuments => "discover_documents",
            StageNode::ScoreDocuments => "score_documents",
            StageNode::Done => "done",
        }
    }
}

impl fmt::Display for StageNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_serializes_by_snake_case_name() {
        let json = serde_json::to_string(&StageNode::AwaitDecision).unwrap();
        assert_eq!(json, "\"await_decision\"");
        let back: StageNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StageNode::AwaitDecision);
    }

    #[test]
    fn display_matches_name() {
        assert_eq!(StageNode::ExpandKeywords.to_string(), "expand_keywords");
    }
}
