//! Decision routing
//!
//! Pure mapping from the checkpoint decision to the next graph node.
//! The reject edge is the graph's only back-edge; the executor bounds it
//! with the configured retry limit.

use super::node::StageNode;
use crate::state::DecisionAction;

/// Map a validated checkpoint decision to its successor node.
pub fn route(action: DecisionAction) -> StageNode {
    match action {
        DecisionAction::Approve => StageNode::ExpandKeywords,
        DecisionAction::Reject => StageNode::ExtractConcepts,
        DecisionAction::Edit => StageNode::ApplyEdit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approve_routes_to_expansion() {
        assert_eq!(route(DecisionAction::Approve), StageNode::ExpandKeywords);
    }

    #[test]
    fn reject_always_routes_back_to_extraction() {
        for _ in 0..3 {
            assert_eq!(route(DecisionAction::Reject), StageNode::ExtractConcepts);
        }
    }

    #[test]
    fn edit_routes_through_apply_edit() {
        assert_eq!(route(DecisionAction::Edit), StageNode::ApplyEdit);
    }
}
