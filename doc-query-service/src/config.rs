use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::engine::{DecisionEngine, KeywordDecisionEngine, RemoteDecisionEngine};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a non-negative integer, got `{value}`")]
    InvalidNumber { name: &'static str, value: String },

    #[error("unknown decision engine `{0}` (expected `keyword` or `remote`)")]
    UnknownEngine(String),

    #[error("DECISION_ENGINE_URL must be set when DECISION_ENGINE=remote")]
    MissingEngineUrl,

    #[error("failed to build remote engine client: {0}")]
    EngineClient(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineKind {
    Keyword,
    Remote { url: String },
}

/// Delays and bounds of one query cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineTiming {
    /// Minimum time each stage is shown as processing
    pub step_delay: Duration,
    /// Time before an accepted file turns from uploading to completed
    pub upload_delay: Duration,
    /// Upper bound on a single stage; exceeding it fails the cycle
    pub stage_timeout: Duration,
}

impl Default for PipelineTiming {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(1500),
            upload_delay: Duration::from_millis(1500),
            stage_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineTiming {
    /// No artificial pacing; used by the CLI's `--fast` and in tests.
    pub fn immediate() -> Self {
        Self {
            step_delay: Duration::ZERO,
            upload_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub port: u16,
    pub timing: PipelineTiming,
    pub engine: EngineKind,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            timing: PipelineTiming::default(),
            engine: EngineKind::Keyword,
        }
    }
}

impl ServiceConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("PORT") {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidNumber {
                    name: "PORT",
                    value,
                })?,
            None => defaults.port,
        };

        let millis = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(name) {
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| ConfigError::InvalidNumber { name, value }),
                None => Ok(default),
            }
        };

        let timing = PipelineTiming {
            step_delay: millis("STEP_DELAY_MS", defaults.timing.step_delay)?,
            upload_delay: millis("UPLOAD_DELAY_MS", defaults.timing.upload_delay)?,
            stage_timeout: millis("STAGE_TIMEOUT_MS", defaults.timing.stage_timeout)?,
        };

        let engine = parse_engine(
            lookup("DECISION_ENGINE").as_deref(),
            lookup("DECISION_ENGINE_URL"),
        )?;

        Ok(Self {
            port,
            timing,
            engine,
        })
    }
}

pub fn parse_engine(kind: Option<&str>, url: Option<String>) -> Result<EngineKind, ConfigError> {
    match kind.map(|k| k.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("keyword") => Ok(EngineKind::Keyword),
        Some("remote") => url
            .filter(|u| !u.trim().is_empty())
            .map(|url| EngineKind::Remote { url })
            .ok_or(ConfigError::MissingEngineUrl),
        Some(other) => Err(ConfigError::UnknownEngine(other.to_string())),
    }
}

/// Instantiate the configured engine.
pub fn build_engine(
    kind: &EngineKind,
    timing: &PipelineTiming,
) -> Result<Arc<dyn DecisionEngine>, ConfigError> {
    match kind {
        EngineKind::Keyword => Ok(Arc::new(KeywordDecisionEngine::new())),
        EngineKind::Remote { url } => {
            let engine = RemoteDecisionEngine::with_timeout(url.clone(), timing.stage_timeout)
                .map_err(|e| ConfigError::EngineClient(e.to_string()))?;
            Ok(Arc::new(engine))
        }
    }
}
