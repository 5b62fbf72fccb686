// Context keys shared by the stage tasks of one pipeline cycle
pub mod session_keys {
    pub const QUERY: &str = "query";
    pub const GENERATION: &str = "generation";
    pub const DOCUMENTS: &str = "documents";
    pub const STARTED_AT: &str = "started_at";
    pub const PARSED_QUERY: &str = "parsed_query";
    pub const CLAUSES: &str = "relevant_clauses";
    pub const EVALUATION: &str = "evaluation";
    pub const DECISION: &str = "decision";
}
