use async_trait::async_trait;
use stage_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::info;

use crate::engine::DecisionEngine;

use super::session_keys;

/// Extracts entities and intent from the submitted query
pub struct QueryParsingTask {
    engine: Arc<dyn DecisionEngine>,
}

impl QueryParsingTask {
    pub fn new(engine: Arc<dyn DecisionEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Task for QueryParsingTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let generation: u64 = context.get(session_keys::GENERATION).await.unwrap_or_default();
        let query: String = context.require(session_keys::QUERY).await?;

        info!(generation, task_id = %self.id(), engine = self.engine.name(), "parsing query");

        let parsed = self
            .engine
            .parse(&query)
            .await
            .map_err(|e| GraphError::TaskExecutionFailed(e.to_string()))?;

        let status_message = format!("Parsed query with intent `{}`", parsed.intent);
        context.set(session_keys::PARSED_QUERY, parsed).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some(status_message),
        ))
    }
}
