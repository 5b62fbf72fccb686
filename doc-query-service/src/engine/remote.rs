use async_trait::async_trait;
use reqwest::Client;
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{debug, warn};

use super::{DecisionEngine, DecisionInput, EngineError, EngineResult, Evaluation, ParsedQuery};
use crate::models::{Decision, DocumentRef, RelevantClause};
use crate::steps::PipelineStage;

#[derive(Serialize)]
struct ParseRequest<'a> {
    query: &'a str,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    parsed: &'a ParsedQuery,
    documents: &'a [DocumentRef],
}

#[derive(Serialize)]
struct EvaluateRequest<'a> {
    parsed: &'a ParsedQuery,
    clauses: &'a [RelevantClause],
}

/// Engine backed by an external retrieval/reasoning service.
///
/// Each stage is a `POST {base_url}/{stage}` with a JSON body; any non-2xx
/// status or undecodable body fails that stage.
#[derive(Debug, Clone)]
pub struct RemoteDecisionEngine {
    client: Client,
    base_url: String,
}

impl RemoteDecisionEngine {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| EngineError::Transport {
                stage: PipelineStage::Parse,
                source,
            })?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<B, T>(&self, stage: PipelineStage, body: &B) -> EngineResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, stage);
        debug!(%url, %stage, "calling decision service");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| EngineError::Transport { stage, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%stage, status = status.as_u16(), "decision service rejected request");
            return Err(EngineError::UnexpectedStatus {
                stage,
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| EngineError::Transport { stage, source })?;
        serde_json::from_slice(&bytes).map_err(|e| EngineError::InvalidResponse {
            stage,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl DecisionEngine for RemoteDecisionEngine {
    fn name(&self) -> &str {
        "remote"
    }

    async fn parse(&self, query: &str) -> EngineResult<ParsedQuery> {
        self.call(PipelineStage::Parse, &ParseRequest { query })
            .await
    }

    async fn search(
        &self,
        parsed: &ParsedQuery,
        documents: &[DocumentRef],
    ) -> EngineResult<Vec<RelevantClause>> {
        self.call(PipelineStage::Search, &SearchRequest { parsed, documents })
            .await
    }

    async fn evaluate(
        &self,
        parsed: &ParsedQuery,
        clauses: &[RelevantClause],
    ) -> EngineResult<Evaluation> {
        self.call(PipelineStage::Evaluate, &EvaluateRequest { parsed, clauses })
            .await
    }

    async fn decide(&self, input: DecisionInput) -> EngineResult<Decision> {
        self.call(PipelineStage::Decide, &input).await
    }
}
