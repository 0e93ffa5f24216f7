//! Pipeline state machine — nodes, router, executor
//!
//! [`StageNode`] names every position in the workflow graph, [`route`]
//! maps a checkpoint decision to its successor node, and [`Executor`]
//! drives the graph: concurrent branches, the checkpoint suspension, the
//! bounded reject back-edge, and the fan-in stages after approval.

mod executor;
mod node;
mod router;

pub use executor::{DriveOutcome, Executor, PipelineError};
pub use node::StageNode;
pub use router::route;
