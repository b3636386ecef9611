//! Staged analysis pipeline: state, progress events, and the orchestrator
//! that drives a run from raw dataset bytes to a saved report.

pub mod events;
pub mod orchestrator;
pub mod state;

pub use events::{ProgressEmitter, ProgressEvent, ProgressKind};
pub use orchestrator::Orchestrator;
pub use state::{Stage, WorkflowState};
