//! FlowRunner – loads a session, executes exactly **one** task, and persists
//! the updated session back to storage.
//!
//! A staged pipeline calls [`FlowRunner::run`] once per stage so the caller
//! can publish progress, pace the stages, or stop between any two of them.
//! Use [`Graph::execute_session`] directly when the session is already in
//! hand and persistence is handled elsewhere.

use std::sync::Arc;

use crate::{
    error::{GraphError, Result},
    graph::{ExecutionResult, Graph},
    storage::{Session, SessionStorage},
};

/// High-level helper that orchestrates the common _load → execute → save_ pattern.
#[derive(Clone)]
pub struct FlowRunner {
    graph: Arc<Graph>,
    storage: Arc<dyn SessionStorage>,
}

impl FlowRunner {
    pub fn new(graph: Arc<Graph>, storage: Arc<dyn SessionStorage>) -> Self {
        Self { graph, storage }
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// Create and store a session positioned on the graph's start task
    pub async fn start_session(&self, session_id: impl Into<String>) -> Result<Session> {
        let start = self
            .graph
            .start_task_id()
            .ok_or_else(|| GraphError::TaskNotFound("<start>".to_string()))?;
        let mut session = Session::new_from_task(session_id.into(), &start);
        session.graph_id = self.graph.id.clone();
        self.storage.save(session.clone()).await?;
        Ok(session)
    }

    /// Execute **exactly one** task for the given `session_id` and persist the updated session.
    pub async fn run(&self, session_id: &str) -> Result<ExecutionResult> {
        let mut session = self
            .storage
            .get(session_id)
            .await?
            .ok_or_else(|| GraphError::SessionNotFound(session_id.to_string()))?;

        let result = self.graph.execute_session(&mut session).await?;

        self.storage.save(session).await?;

        Ok(result)
    }

    pub async fn load(&self, session_id: &str) -> Result<Option<Session>> {
        self.storage.get(session_id).await
    }

    pub async fn discard(&self, session_id: &str) -> Result<()> {
        self.storage.delete(session_id).await
    }
}
