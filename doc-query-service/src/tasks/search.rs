use async_trait::async_trait;
use stage_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::info;

use crate::engine::{DecisionEngine, ParsedQuery};
use crate::models::DocumentRef;

use super::session_keys;

/// Looks up policy clauses relevant to the parsed query in the cycle's documents
pub struct DocumentSearchTask {
    engine: Arc<dyn DecisionEngine>,
}

impl DocumentSearchTask {
    pub fn new(engine: Arc<dyn DecisionEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Task for DocumentSearchTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let generation: u64 = context.get(session_keys::GENERATION).await.unwrap_or_default();
        let parsed: ParsedQuery = context.require(session_keys::PARSED_QUERY).await?;
        let documents: Vec<DocumentRef> = context
            .get(session_keys::DOCUMENTS)
            .await
            .unwrap_or_default();

        info!(
            generation,
            task_id = %self.id(),
            documents = documents.len(),
            "searching documents"
        );

        let clauses = self
            .engine
            .search(&parsed, &documents)
            .await
            .map_err(|e| GraphError::TaskExecutionFailed(e.to_string()))?;

        let status_message = format!(
            "Found {} relevant clauses across {} documents",
            clauses.len(),
            documents.len()
        );
        context.set(session_keys::CLAUSES, clauses).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some(status_message),
        ))
    }
}
