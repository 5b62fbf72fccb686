//! View derivation for the four-stage processing sequence.
//!
//! Stage status is never stored; it follows from the step index alone.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Parse,
    Search,
    Evaluate,
    Decide,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 4] = [
        PipelineStage::Parse,
        PipelineStage::Search,
        PipelineStage::Evaluate,
        PipelineStage::Decide,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn title(self) -> &'static str {
        match self {
            PipelineStage::Parse => "Query Parsing",
            PipelineStage::Search => "Document Search",
            PipelineStage::Evaluate => "Rule Evaluation",
            PipelineStage::Decide => "Decision Generation",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            PipelineStage::Parse => "Extracting key entities and intent from your query",
            PipelineStage::Search => {
                "Searching through uploaded documents using semantic understanding"
            }
            PipelineStage::Evaluate => {
                "Applying business logic and policy rules to retrieved information"
            }
            PipelineStage::Decide => "Generating structured response with justification",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStage::Parse => "parse",
            PipelineStage::Search => "search",
            PipelineStage::Evaluate => "evaluate",
            PipelineStage::Decide => "decide",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

pub fn stage_status(stage: PipelineStage, step_index: usize) -> StageStatus {
    let k = stage.index();
    if k < step_index {
        StageStatus::Completed
    } else if k == step_index {
        StageStatus::Processing
    } else {
        StageStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageView {
    pub stage: PipelineStage,
    pub title: &'static str,
    pub description: &'static str,
    pub status: StageStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    pub stages: Vec<StageView>,
    pub progress_percent: u8,
}

impl StepView {
    pub fn processing(&self) -> Option<PipelineStage> {
        self.stages
            .iter()
            .find(|s| s.status == StageStatus::Processing)
            .map(|s| s.stage)
    }
}

fn progress_for(completed_or_active: usize) -> u8 {
    let clamped = completed_or_active.min(PipelineStage::COUNT);
    (clamped * 100 / PipelineStage::COUNT) as u8
}

fn build(status_of: impl Fn(PipelineStage) -> StageStatus) -> Vec<StageView> {
    PipelineStage::ALL
        .iter()
        .map(|&stage| StageView {
            stage,
            title: stage.title(),
            description: stage.description(),
            status: status_of(stage),
        })
        .collect()
}

/// Render the sequence for a step index.
///
/// Nothing is rendered before the first cycle starts (`!is_active` at index
/// 0). Progress is `(index + 1) / 4` while a stage is running and 100 once
/// the index reaches 4.
pub fn render(is_active: bool, step_index: usize) -> Option<StepView> {
    if !is_active && step_index == 0 {
        return None;
    }

    Some(StepView {
        stages: build(|stage| stage_status(stage, step_index)),
        progress_percent: progress_for(step_index + 1),
    })
}

/// Render a cycle that stopped at `step_index`; that stage reports `failed`.
pub fn render_failed(step_index: usize) -> StepView {
    let failed_at = step_index.min(PipelineStage::COUNT - 1);
    StepView {
        stages: build(|stage| match stage_status(stage, failed_at) {
            StageStatus::Processing => StageStatus::Failed,
            other => other,
        }),
        progress_percent: progress_for(failed_at),
    }
}
