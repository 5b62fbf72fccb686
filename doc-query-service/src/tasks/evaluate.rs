use async_trait::async_trait;
use stage_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::info;

use crate::engine::{DecisionEngine, ParsedQuery};
use crate::models::RelevantClause;

use super::session_keys;

/// Applies policy rules to the parsed query and retrieved clauses
pub struct RuleEvaluationTask {
    engine: Arc<dyn DecisionEngine>,
}

impl RuleEvaluationTask {
    pub fn new(engine: Arc<dyn DecisionEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Task for RuleEvaluationTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let generation: u64 = context.get(session_keys::GENERATION).await.unwrap_or_default();
        let parsed: ParsedQuery = context.require(session_keys::PARSED_QUERY).await?;
        let clauses: Vec<RelevantClause> = context.require(session_keys::CLAUSES).await?;

        let evaluation = self
            .engine
            .evaluate(&parsed, &clauses)
            .await
            .map_err(|e| GraphError::TaskExecutionFailed(e.to_string()))?;

        info!(
            generation,
            task_id = %self.id(),
            decision = evaluation.decision.as_str(),
            confidence = evaluation.confidence,
            "rules evaluated"
        );

        let status_message = format!(
            "Evaluated as {} ({}% confidence)",
            evaluation.decision.as_str(),
            evaluation.confidence
        );
        context.set(session_keys::EVALUATION, evaluation).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::Continue,
            Some(status_message),
        ))
    }
}
