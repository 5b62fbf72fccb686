use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::{
    context::Context,
    error::{GraphError, Result},
    storage::Session,
    task::{NextAction, Task, TaskResult},
};

/// Edge between tasks in the graph
#[derive(Clone, Debug)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// A graph of tasks that is executed one task per call
pub struct Graph {
    pub id: String,
    tasks: DashMap<String, Arc<dyn Task>>,
    order: Vec<String>,
    edges: Vec<Edge>,
    start_task_id: Option<String>,
}

impl Graph {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: DashMap::new(),
            order: Vec::new(),
            edges: Vec::new(),
            start_task_id: None,
        }
    }

    /// Execute the session's current task and move the session along.
    ///
    /// Exactly one task runs per call. On `Continue` the session points at
    /// the next task afterwards; on `End` it stays on the last task.
    pub async fn execute_session(&self, session: &mut Session) -> Result<ExecutionResult> {
        let result = self
            .execute_single_task(&session.current_task_id, session.context.clone())
            .await?;

        session.status_message = result.status_message.clone();

        match result.next_action {
            NextAction::Continue => match self.find_next_task(&result.task_id) {
                Some(next_task_id) => {
                    debug!(from = %result.task_id, to = %next_task_id, "advancing session");
                    session.current_task_id = next_task_id;
                    Ok(ExecutionResult {
                        response: result.response,
                        status: ExecutionStatus::Advanced,
                    })
                }
                None => {
                    // last task asked to continue with nowhere to go
                    session.current_task_id = result.task_id;
                    Ok(ExecutionResult {
                        response: result.response,
                        status: ExecutionStatus::Completed,
                    })
                }
            },
            NextAction::End => {
                session.current_task_id = result.task_id;
                Ok(ExecutionResult {
                    response: result.response,
                    status: ExecutionStatus::Completed,
                })
            }
        }
    }

    async fn execute_single_task(&self, task_id: &str, context: Context) -> Result<TaskResult> {
        let task = self
            .get_task(task_id)
            .ok_or_else(|| GraphError::TaskNotFound(task_id.to_string()))?;

        let mut result = task.run(context).await?;
        result.task_id = task_id.to_string();

        Ok(result)
    }

    /// Find the task the default edge out of `current_task_id` leads to
    pub fn find_next_task(&self, current_task_id: &str) -> Option<String> {
        self.edges
            .iter()
            .find(|edge| edge.from == current_task_id)
            .map(|edge| edge.to.clone())
    }

    pub fn start_task_id(&self) -> Option<String> {
        self.start_task_id.clone()
    }

    pub fn get_task(&self, task_id: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(task_id).map(|entry| entry.clone())
    }

    /// Task ids in insertion order
    pub fn task_ids(&self) -> &[String] {
        &self.order
    }

    /// Zero-based position of a task in insertion order
    pub fn position(&self, task_id: &str) -> Option<usize> {
        self.order.iter().position(|id| id == task_id)
    }
}

/// Builder for creating graphs
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            graph: Graph::new(id),
        }
    }

    /// Add a task; the first task added becomes the start task
    pub fn add_task(mut self, task: Arc<dyn Task>) -> Self {
        let task_id = task.id().to_string();
        if self.graph.start_task_id.is_none() {
            self.graph.start_task_id = Some(task_id.clone());
        }
        if self.graph.tasks.insert(task_id.clone(), task).is_none() {
            self.graph.order.push(task_id);
        }
        self
    }

    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.graph.edges.push(Edge {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Add all tasks in order and chain them with edges
    pub fn chain(mut self, tasks: Vec<Arc<dyn Task>>) -> Self {
        let mut previous: Option<String> = self.graph.order.last().cloned();
        for task in tasks {
            let task_id = task.id().to_string();
            self = self.add_task(task);
            if let Some(from) = previous.take() {
                self = self.add_edge(from, task_id.clone());
            }
            previous = Some(task_id);
        }
        self
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

/// Status of a single execution step
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub response: Option<String>,
    pub status: ExecutionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// The session moved to the next task
    Advanced,
    /// The graph finished
    Completed,
}
