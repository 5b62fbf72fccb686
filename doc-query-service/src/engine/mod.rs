//! Decision engines: what the four pipeline stages actually compute.
//!
//! The pipeline tasks only know this trait. [`KeywordDecisionEngine`] is the
//! deterministic in-process engine; [`RemoteDecisionEngine`] forwards each
//! stage to an external reasoning service.

mod keyword;
mod remote;

pub use keyword::KeywordDecisionEngine;
pub use remote::RemoteDecisionEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::{Decision, DecisionStatus, DocumentRef, ExtractedEntities, RelevantClause};
use crate::steps::PipelineStage;

/// Output of the parse stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub query: String,
    pub entities: ExtractedEntities,
    pub intent: String,
}

/// Output of the evaluate stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub decision: DecisionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    pub confidence: u8,
    pub justification: String,
}

/// Everything the decide stage assembles a [`Decision`] from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionInput {
    pub parsed: ParsedQuery,
    pub clauses: Vec<RelevantClause>,
    pub evaluation: Evaluation,
    #[serde(rename = "elapsed_ms", with = "duration_ms")]
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{stage} request failed: {source}")]
    Transport {
        stage: PipelineStage,
        #[source]
        source: reqwest::Error,
    },

    #[error("{stage} returned HTTP {status}: {body}")]
    UnexpectedStatus {
        stage: PipelineStage,
        status: u16,
        body: String,
    },

    #[error("{stage} returned an invalid response: {message}")]
    InvalidResponse {
        stage: PipelineStage,
        message: String,
    },

    #[error("{stage} failed: {message}")]
    Stage {
        stage: PipelineStage,
        message: String,
    },
}

impl EngineError {
    pub fn stage(&self) -> PipelineStage {
        match self {
            EngineError::Transport { stage, .. }
            | EngineError::UnexpectedStatus { stage, .. }
            | EngineError::InvalidResponse { stage, .. }
            | EngineError::Stage { stage, .. } => *stage,
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// The reasoning capability behind the pipeline, one method per stage.
///
/// Each stage may fail independently; the pipeline turns a failure into a
/// failed cycle for the stage that raised it.
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn parse(&self, query: &str) -> EngineResult<ParsedQuery>;

    async fn search(
        &self,
        parsed: &ParsedQuery,
        documents: &[DocumentRef],
    ) -> EngineResult<Vec<RelevantClause>>;

    async fn evaluate(
        &self,
        parsed: &ParsedQuery,
        clauses: &[RelevantClause],
    ) -> EngineResult<Evaluation>;

    async fn decide(&self, input: DecisionInput) -> EngineResult<Decision>;
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
