use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stage_flow::{Context, GraphError, NextAction, Result, Task, TaskResult};
use std::sync::Arc;
use tracing::info;

use crate::engine::{DecisionEngine, DecisionInput, Evaluation, ParsedQuery};
use crate::models::{DocumentRef, Provenance, RelevantClause};

use super::session_keys;

/// Assembles the final decision and binds it to the cycle's query and documents
pub struct DecisionGenerationTask {
    engine: Arc<dyn DecisionEngine>,
}

impl DecisionGenerationTask {
    pub fn new(engine: Arc<dyn DecisionEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Task for DecisionGenerationTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let generation: u64 = context.get(session_keys::GENERATION).await.unwrap_or_default();
        let query: String = context.require(session_keys::QUERY).await?;
        let documents: Vec<DocumentRef> = context
            .get(session_keys::DOCUMENTS)
            .await
            .unwrap_or_default();
        let parsed: ParsedQuery = context.require(session_keys::PARSED_QUERY).await?;
        let clauses: Vec<RelevantClause> = context.require(session_keys::CLAUSES).await?;
        let evaluation: Evaluation = context.require(session_keys::EVALUATION).await?;

        let started_at: DateTime<Utc> = context
            .get(session_keys::STARTED_AT)
            .await
            .unwrap_or_else(Utc::now);
        let elapsed = (Utc::now() - started_at).to_std().unwrap_or_default();

        let mut decision = self
            .engine
            .decide(DecisionInput {
                parsed,
                clauses,
                evaluation,
                elapsed,
            })
            .await
            .map_err(|e| GraphError::TaskExecutionFailed(e.to_string()))?;

        decision.provenance = Provenance {
            generation,
            query,
            documents,
        };

        info!(
            generation,
            task_id = %self.id(),
            decision = decision.decision.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            "decision generated"
        );

        let status_message = format!("Decision: {}", decision.decision.as_str());
        context.set(session_keys::DECISION, decision).await?;

        Ok(TaskResult::new_with_status(
            None,
            NextAction::End,
            Some(status_message),
        ))
    }
}
