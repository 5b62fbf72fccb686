use crate::state::Rejection;

/// Example queries offered next to the input; picking one fills the draft only.
pub const SAMPLE_QUERIES: [&str; 4] = [
    "46-year-old male, knee surgery in Pune, 3-month-old insurance policy",
    "Female employee, maternity leave, California, active policy",
    "Dental procedure, child under 10, family plan, pre-authorization required",
    "Car accident claim, Mumbai, comprehensive coverage, 2-year policy",
];

/// Trim a query, rejecting one that is empty afterwards.
pub fn normalize_query(text: &str) -> Result<String, Rejection> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Rejection::EmptyQuery);
    }
    Ok(trimmed.to_string())
}

/// Query text being edited before submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDraft {
    text: String,
}

impl QueryDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Replace the draft with a sample query. Returns false for an unknown index.
    pub fn use_sample(&mut self, index: usize) -> bool {
        match SAMPLE_QUERIES.get(index) {
            Some(sample) => {
                self.text = (*sample).to_string();
                true
            }
            None => false,
        }
    }

    pub fn can_submit(&self, is_processing: bool) -> bool {
        !is_processing && !self.text.trim().is_empty()
    }

    /// The normalized query to hand to the orchestrator.
    pub fn submission(&self) -> Result<String, Rejection> {
        normalize_query(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_rejects_blank() {
        assert_eq!(normalize_query("  dental  \n").unwrap(), "dental");
        assert_eq!(normalize_query(" \t "), Err(Rejection::EmptyQuery));
        assert_eq!(normalize_query(""), Err(Rejection::EmptyQuery));
    }

    #[test]
    fn test_sample_populates_without_submitting() {
        let mut draft = QueryDraft::default();
        assert!(!draft.can_submit(false));

        assert!(draft.use_sample(2));
        assert_eq!(draft.text(), SAMPLE_QUERIES[2]);
        assert!(draft.can_submit(false));
        assert!(!draft.can_submit(true));

        assert!(!draft.use_sample(9));
        assert_eq!(draft.text(), SAMPLE_QUERIES[2]);
    }

    #[test]
    fn test_submission_is_normalized() {
        let mut draft = QueryDraft::new("   ");
        assert!(draft.submission().is_err());
        draft.set_text("  knee surgery ");
        assert_eq!(draft.submission().unwrap(), "knee surgery");
    }
}
