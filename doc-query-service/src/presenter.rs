//! Display-ready views of a decision, plus the copy and export helpers.

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{info, warn};

use crate::clipboard::Clipboard;
use crate::models::{Decision, DecisionStatus, RelevantClause};

const MISSING_VALUE: &str = "N/A";

static CAPITAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([A-Z])").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeVariant {
    Default,
    Secondary,
    Destructive,
    Success,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub label: String,
    pub variant: BadgeVariant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRow {
    pub key: String,
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClauseRow {
    pub id: String,
    pub text: String,
    pub source: String,
    pub relevance: Badge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionView {
    pub decision: Badge,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    pub justification: String,
    pub confidence: Badge,
    pub entities: Vec<EntityRow>,
    pub clauses: Vec<ClauseRow>,
    pub raw_json: String,
}

impl From<&Decision> for DecisionView {
    fn from(decision: &Decision) -> Self {
        let entities = decision
            .extracted_entities
            .entries()
            .into_iter()
            .map(|(key, value)| EntityRow {
                label: humanize_key(&key),
                value: value
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| MISSING_VALUE.to_string()),
                key,
            })
            .collect();

        Self {
            decision: decision_badge(decision.decision),
            amount: decision
                .amount
                .filter(|amount| *amount != 0.0)
                .map(format_amount),
            justification: decision.justification.clone(),
            confidence: confidence_badge(decision.confidence),
            entities,
            clauses: decision.relevant_clauses.iter().map(clause_row).collect(),
            raw_json: raw_json(decision),
        }
    }
}

pub fn decision_badge(status: DecisionStatus) -> Badge {
    let variant = match status {
        DecisionStatus::Approved => BadgeVariant::Success,
        DecisionStatus::Rejected => BadgeVariant::Destructive,
        DecisionStatus::Pending => BadgeVariant::Warning,
    };
    Badge {
        label: capitalize(status.as_str()),
        variant,
    }
}

pub fn confidence_badge(confidence: u8) -> Badge {
    let variant = if confidence > 80 {
        BadgeVariant::Default
    } else if confidence > 60 {
        BadgeVariant::Secondary
    } else {
        BadgeVariant::Destructive
    };
    Badge {
        label: format!("{confidence}%"),
        variant,
    }
}

fn clause_row(clause: &RelevantClause) -> ClauseRow {
    let variant = if clause.relevance_score > 80 {
        BadgeVariant::Default
    } else {
        BadgeVariant::Secondary
    };
    ClauseRow {
        id: clause.id.clone(),
        text: clause.text.clone(),
        source: clause.source.clone(),
        relevance: Badge {
            label: format!("{}% relevant", clause.relevance_score),
            variant,
        },
    }
}

/// `policyDuration` → `policy Duration`
pub fn humanize_key(key: &str) -> String {
    CAPITAL.replace_all(key, " $1").trim().to_string()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Dollar amount with thousands separators and at most three fraction
/// digits, trailing zeros dropped: `$15,000`, `$1,234,567.5`.
pub fn format_amount(amount: f64) -> String {
    let millis = (amount.abs() * 1000.0).round() as u64;
    let whole = millis / 1000;
    let fraction = millis % 1000;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 && millis > 0 { "-" } else { "" };
    if fraction == 0 {
        format!("{sign}${grouped}")
    } else {
        let fraction = format!("{fraction:03}");
        format!("{sign}${grouped}.{}", fraction.trim_end_matches('0'))
    }
}

/// Two-space indented raw response, the text placed on the clipboard.
pub fn raw_json(decision: &Decision) -> String {
    serde_json::to_string_pretty(&decision.raw_response)
        .unwrap_or_else(|_| decision.raw_response.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationVariant {
    Default,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: NotificationVariant,
}

/// Place the raw response on the clipboard; failure is reported, never raised.
pub fn copy_raw_response(decision: &Decision, clipboard: &dyn Clipboard) -> Notification {
    match clipboard.write_text(&raw_json(decision)) {
        Ok(()) => {
            info!("Raw response copied to clipboard");
            Notification {
                title: "Copied to clipboard".to_string(),
                description: "The result has been copied to your clipboard.".to_string(),
                variant: NotificationVariant::Default,
            }
        }
        Err(e) => {
            warn!(error = %e, "Copy to clipboard failed");
            Notification {
                title: "Failed to copy".to_string(),
                description: "Could not copy to clipboard.".to_string(),
                variant: NotificationVariant::Destructive,
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The downloadable record of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportArtifact {
    pub query: String,
    #[serde(with = "rfc3339")]
    pub timestamp: DateTime<Utc>,
    pub result: Value,
}

impl ExportArtifact {
    pub fn new(query: impl Into<String>, decision: &Decision) -> Self {
        Self::at(query, decision, Utc::now())
    }

    pub fn at(query: impl Into<String>, decision: &Decision, timestamp: DateTime<Utc>) -> Self {
        Self {
            query: query.into(),
            timestamp,
            result: decision.raw_response.clone(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("llm-analysis-{}.json", self.timestamp.timestamp_millis())
    }

    pub fn to_pretty_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the artifact under `dir` and return the full path.
    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let path = dir.join(self.file_name());
        let body = self.to_pretty_json()?;
        std::fs::write(&path, body).map_err(|source| ExportError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "Analysis exported");
        Ok(path)
    }
}

mod rfc3339 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
