use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::debug;

use super::{DecisionEngine, DecisionInput, EngineResult, Evaluation, ParsedQuery};
use crate::models::{
    Decision, DecisionStatus, DocumentRef, ExtractedEntities, Provenance, RelevantClause,
};

pub const MODEL_VERSION: &str = "llm-doc-processor-v2.1";
pub const INTENT: &str = "claim_eligibility_check";
pub const CURRENCY: &str = "USD";
pub const APPROVED_AMOUNT: f64 = 15000.0;

const APPROVED_JUSTIFICATION: &str = "Knee surgery is covered under the policy for members over 18 years. The procedure is medically necessary and falls within the coverage period. Pre-authorization requirements have been met.";
const REJECTED_JUSTIFICATION: &str = "Dental procedures are not covered under the basic health insurance policy. Additional dental coverage would be required for this procedure.";
const PENDING_JUSTIFICATION: &str = "Additional information is required to process this claim. Please provide more details about the procedure and policy terms.";

static FEMALE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bfemale\b").unwrap());
static MALE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bmale\b").unwrap());

/// Deterministic engine that decides by keyword matching on the query text.
///
/// Uploaded documents are not consulted; the clauses it cites are a fixed
/// illustrative set.
#[derive(Debug, Clone, Default)]
pub struct KeywordDecisionEngine;

impl KeywordDecisionEngine {
    pub fn new() -> Self {
        Self
    }
}

/// Approval state from the lower-cased query text alone.
pub fn classify(query: &str) -> DecisionStatus {
    let text = query.to_lowercase();
    if text.contains("knee surgery") {
        DecisionStatus::Approved
    } else if text.contains("dental") {
        DecisionStatus::Rejected
    } else {
        DecisionStatus::Pending
    }
}

pub fn evaluation_for(status: DecisionStatus) -> Evaluation {
    match status {
        DecisionStatus::Approved => Evaluation {
            decision: status,
            amount: Some(APPROVED_AMOUNT),
            confidence: 92,
            justification: APPROVED_JUSTIFICATION.to_string(),
        },
        DecisionStatus::Rejected => Evaluation {
            decision: status,
            amount: None,
            confidence: 88,
            justification: REJECTED_JUSTIFICATION.to_string(),
        },
        DecisionStatus::Pending => Evaluation {
            decision: status,
            amount: None,
            confidence: 65,
            justification: PENDING_JUSTIFICATION.to_string(),
        },
    }
}

/// Entity extraction; every field is matched independently.
pub fn extract_entities(query: &str) -> ExtractedEntities {
    let text = query.to_lowercase();

    let age = if text.contains("46") {
        Some(46)
    } else if text.contains("child") {
        Some(8)
    } else {
        None
    };

    let gender = if FEMALE.is_match(&text) {
        Some("Female")
    } else if MALE.is_match(&text) {
        Some("Male")
    } else {
        None
    };

    let procedure = if text.contains("knee") {
        "Knee Surgery"
    } else if text.contains("dental") {
        "Dental Procedure"
    } else if text.contains("maternity") {
        "Maternity Care"
    } else {
        "Medical Procedure"
    };

    let location = if text.contains("pune") {
        Some("Pune, India")
    } else if text.contains("mumbai") {
        Some("Mumbai, India")
    } else if text.contains("california") {
        Some("California, USA")
    } else {
        None
    };

    let policy_duration = if text.contains("3-month") {
        "3 months"
    } else if text.contains("2-year") {
        "2 years"
    } else {
        "Active Policy"
    };

    ExtractedEntities {
        age,
        gender: gender.map(str::to_string),
        procedure: Some(procedure.to_string()),
        location: location.map(str::to_string),
        policy_duration: Some(policy_duration.to_string()),
        additional: Default::default(),
    }
}

pub fn standard_clauses() -> Vec<RelevantClause> {
    vec![
        RelevantClause {
            id: "clause-1".to_string(),
            text: "Surgical procedures including orthopedic surgeries are covered under Section 4.2 of the health insurance policy, subject to pre-authorization and medical necessity requirements.".to_string(),
            source: "Health Insurance Policy Document".to_string(),
            relevance_score: 95,
        },
        RelevantClause {
            id: "clause-2".to_string(),
            text: "Coverage is valid for procedures performed within the policy period and at approved healthcare facilities within the network.".to_string(),
            source: "Policy Terms & Conditions".to_string(),
            relevance_score: 87,
        },
        RelevantClause {
            id: "clause-3".to_string(),
            text: "Members above 18 years of age are eligible for all medical procedures as outlined in the coverage schedule.".to_string(),
            source: "Eligibility Guidelines".to_string(),
            relevance_score: 82,
        },
    ]
}

#[derive(Serialize)]
struct RawEntities {
    age: Option<u32>,
    gender: Option<String>,
    procedure: Option<String>,
    location: Option<String>,
    policy_duration: Option<String>,
}

#[derive(Serialize)]
struct RawQueryParsed {
    entities: RawEntities,
    intent: String,
}

#[derive(Serialize)]
struct RawDecision {
    status: DecisionStatus,
    amount: Option<f64>,
    currency: &'static str,
}

/// Response envelope in the shape an external inference service returns.
#[derive(Serialize)]
struct RawResponse {
    query_parsed: RawQueryParsed,
    decision: RawDecision,
    confidence_score: f64,
    processing_time_ms: u64,
    model_version: &'static str,
}

fn raw_response(input: &DecisionInput) -> serde_json::Value {
    let entities = &input.parsed.entities;
    let raw = RawResponse {
        query_parsed: RawQueryParsed {
            entities: RawEntities {
                age: entities.age,
                gender: entities.gender.as_deref().map(str::to_lowercase),
                procedure: entities.procedure.as_deref().map(str::to_lowercase),
                location: entities
                    .location
                    .as_deref()
                    .map(|l| l.split(',').next().unwrap_or(l).trim().to_string()),
                policy_duration: entities.policy_duration.clone(),
            },
            intent: input.parsed.intent.clone(),
        },
        decision: RawDecision {
            status: input.evaluation.decision,
            amount: input.evaluation.amount,
            currency: CURRENCY,
        },
        confidence_score: f64::from(input.evaluation.confidence) / 100.0,
        processing_time_ms: u64::try_from(input.elapsed.as_millis()).unwrap_or(u64::MAX),
        model_version: MODEL_VERSION,
    };
    serde_json::to_value(raw).unwrap_or(serde_json::Value::Null)
}

#[async_trait]
impl DecisionEngine for KeywordDecisionEngine {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn parse(&self, query: &str) -> EngineResult<ParsedQuery> {
        let entities = extract_entities(query);
        debug!(?entities, "extracted entities");
        Ok(ParsedQuery {
            query: query.to_string(),
            entities,
            intent: INTENT.to_string(),
        })
    }

    async fn search(
        &self,
        _parsed: &ParsedQuery,
        documents: &[DocumentRef],
    ) -> EngineResult<Vec<RelevantClause>> {
        debug!(documents = documents.len(), "returning standard clauses");
        Ok(standard_clauses())
    }

    async fn evaluate(
        &self,
        parsed: &ParsedQuery,
        _clauses: &[RelevantClause],
    ) -> EngineResult<Evaluation> {
        Ok(evaluation_for(classify(&parsed.query)))
    }

    async fn decide(&self, input: DecisionInput) -> EngineResult<Decision> {
        let raw_response = raw_response(&input);
        let DecisionInput {
            parsed,
            clauses,
            evaluation,
            ..
        } = input;

        Ok(Decision {
            decision: evaluation.decision,
            amount: evaluation.amount,
            justification: evaluation.justification,
            confidence: evaluation.confidence,
            extracted_entities: parsed.entities,
            relevant_clauses: clauses,
            raw_response,
            provenance: Provenance {
                query: parsed.query,
                ..Default::default()
            },
        })
    }
}
