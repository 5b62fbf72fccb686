pub mod clipboard;
pub mod config;
pub mod engine;
pub mod models;
pub mod orchestrator;
pub mod presenter;
pub mod query;
pub mod service;
pub mod state;
pub mod steps;
pub mod tasks;
pub mod telemetry;
pub mod upload;
pub mod workflow;

pub use config::{PipelineTiming, ServiceConfig};
pub use engine::{DecisionEngine, KeywordDecisionEngine, RemoteDecisionEngine};
pub use orchestrator::Orchestrator;
pub use service::{AppState, build_router, create_app};
pub use state::{Action, Phase, Rejection, WorkspaceState};
pub use models::*;
