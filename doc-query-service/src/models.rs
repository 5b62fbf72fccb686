use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Lifecycle of an accepted upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Uploading,
    Completed,
    Error,
}

/// A file as handed over by the acquisition boundary, before acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFile {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mime_type: String,
}

impl RawFile {
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub status: FileStatus,
}

/// The part of an uploaded file a pipeline cycle binds to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    pub name: String,
}

impl From<&UploadedFile> for DocumentRef {
    fn from(file: &UploadedFile) -> Self {
        Self {
            id: file.id.clone(),
            name: file.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    Approved,
    Rejected,
    Pending,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Approved => "approved",
            DecisionStatus::Rejected => "rejected",
            DecisionStatus::Pending => "pending",
        }
    }
}

/// Named fields pulled out of a query, plus open-ended extras.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedEntities {
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub procedure: Option<String>,
    pub location: Option<String>,
    pub policy_duration: Option<String>,
    #[serde(flatten)]
    pub additional: BTreeMap<String, Value>,
}

impl ExtractedEntities {
    /// Every entity as `(camelCase key, display value)`, named fields first.
    pub fn entries(&self) -> Vec<(String, Option<String>)> {
        let mut entries = vec![
            ("age".to_string(), self.age.map(|age| age.to_string())),
            ("gender".to_string(), self.gender.clone()),
            ("procedure".to_string(), self.procedure.clone()),
            ("location".to_string(), self.location.clone()),
            ("policyDuration".to_string(), self.policy_duration.clone()),
        ];
        entries.extend(self.additional.iter().map(|(key, value)| {
            let display = match value {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            };
            (key.clone(), display)
        }));
        entries
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevantClause {
    pub id: String,
    pub text: String,
    pub source: String,
    pub relevance_score: u8,
}

/// Binds a decision to the query and document set of the cycle that made it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub generation: u64,
    pub query: String,
    pub documents: Vec<DocumentRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub decision: DecisionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    pub justification: String,
    pub confidence: u8,
    pub extracted_entities: ExtractedEntities,
    pub relevant_clauses: Vec<RelevantClause>,
    pub raw_response: Value,
    #[serde(default)]
    pub provenance: Provenance,
}
