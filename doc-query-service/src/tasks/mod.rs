// Decision pipeline stage tasks
pub mod decide;
pub mod evaluate;
pub mod parse;
pub mod search;

// Shared modules
pub mod types;

// Re-export task implementations
pub use decide::DecisionGenerationTask;
pub use evaluate::RuleEvaluationTask;
pub use parse::QueryParsingTask;
pub use search::DocumentSearchTask;

// Re-export session keys
pub use types::session_keys;
