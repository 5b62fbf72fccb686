use chrono::Utc;
use stage_flow::{FlowRunner, Graph, GraphBuilder, InMemorySessionStorage, Result, Task};
use std::sync::Arc;

use crate::engine::DecisionEngine;
use crate::models::DocumentRef;
use crate::tasks::*;

pub const PIPELINE_GRAPH_ID: &str = "decision_pipeline";

/// Parse → search → evaluate → decide, one task per stage in stage order.
pub fn build_decision_pipeline(engine: Arc<dyn DecisionEngine>) -> Graph {
    let tasks: Vec<Arc<dyn Task>> = vec![
        Arc::new(QueryParsingTask::new(engine.clone())),
        Arc::new(DocumentSearchTask::new(engine.clone())),
        Arc::new(RuleEvaluationTask::new(engine.clone())),
        Arc::new(DecisionGenerationTask::new(engine)),
    ];

    GraphBuilder::new(PIPELINE_GRAPH_ID).chain(tasks).build()
}

pub fn create_flow_runner(engine: Arc<dyn DecisionEngine>) -> FlowRunner {
    let graph = Arc::new(build_decision_pipeline(engine));
    FlowRunner::new(graph, Arc::new(InMemorySessionStorage::new()))
}

pub fn cycle_session_id(generation: u64) -> String {
    format!("cycle-{generation}")
}

/// Store a fresh session for one query cycle, seeded with its inputs.
pub async fn create_cycle_session(
    runner: &FlowRunner,
    generation: u64,
    query: &str,
    documents: &[DocumentRef],
) -> Result<String> {
    let session = runner.start_session(cycle_session_id(generation)).await?;
    session.context.set(session_keys::GENERATION, generation).await?;
    session.context.set(session_keys::QUERY, query).await?;
    session.context.set(session_keys::DOCUMENTS, documents).await?;
    session.context.set(session_keys::STARTED_AT, Utc::now()).await?;
    Ok(session.id)
}
