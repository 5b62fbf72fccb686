//! Workspace state and the reducer that owns every transition.
//!
//! `reduce` is pure: it mutates the state it is given and returns the side
//! effects the async shell must carry out. A rejected action leaves the state
//! untouched.

use serde::Serialize;
use thiserror::Error;

use crate::models::{Decision, DocumentRef, FileStatus, UploadedFile};
use crate::query::normalize_query;
use crate::steps::{self, PipelineStage, StepView};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Processing,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineFailure {
    pub stage: PipelineStage,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkspaceState {
    pub files: Vec<UploadedFile>,
    pub phase: Phase,
    pub step: usize,
    pub query: Option<String>,
    pub result: Option<Decision>,
    pub failure: Option<PipelineFailure>,
    /// Bumped on every submission and reset; in-flight work tagged with an
    /// older value is stale.
    pub generation: u64,
}

impl WorkspaceState {
    pub fn is_processing(&self) -> bool {
        self.phase == Phase::Processing
    }

    pub fn file(&self, file_id: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.id == file_id)
    }

    /// Files a new cycle would be bound to: finished uploads only.
    pub fn ready_documents(&self) -> Vec<DocumentRef> {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Completed)
            .map(DocumentRef::from)
            .collect()
    }

    pub fn has_pending_uploads(&self) -> bool {
        self.files.iter().any(|f| f.status == FileStatus::Uploading)
    }

    /// The step sequence as it should be shown for the current phase.
    pub fn step_view(&self) -> Option<StepView> {
        match self.phase {
            Phase::Failed => Some(steps::render_failed(self.step)),
            phase => steps::render(phase == Phase::Processing, self.step),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    FilesAccepted(Vec<UploadedFile>),
    UploadFinished { file_id: String },
    UploadFailed { file_id: String, reason: String },
    FileRemoved { file_id: String },
    QuerySubmitted { query: String },
    Retry,
    StepAdvanced { generation: u64, step: usize },
    PipelineCompleted { generation: u64, decision: Box<Decision> },
    PipelineFailed { generation: u64, failure: PipelineFailure },
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ScheduleUpload { file_id: String },
    CancelUpload { file_id: String },
    StartPipeline {
        generation: u64,
        query: String,
        documents: Vec<DocumentRef>,
    },
    CancelPipeline,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("a query is already being processed")]
    Busy,
    #[error("query is empty")]
    EmptyQuery,
    #[error("no file with id `{0}`")]
    UnknownFile(String),
    #[error("file `{0}` is not uploading")]
    NotUploading(String),
    #[error("stale completion for generation {0}")]
    Stale(u64),
    #[error("step {got} does not follow step {current}")]
    OutOfOrderStep { current: usize, got: usize },
    #[error("there is no failed query to retry")]
    NothingToRetry,
}

pub type Transition = Result<Vec<Effect>, Rejection>;

pub fn reduce(state: &mut WorkspaceState, action: Action) -> Transition {
    match action {
        Action::FilesAccepted(files) => Ok(accept(state, files)),
        Action::UploadFinished { file_id } => {
            set_upload_status(state, &file_id, FileStatus::Completed)
        }
        Action::UploadFailed { file_id, reason: _ } => {
            set_upload_status(state, &file_id, FileStatus::Error)
        }
        Action::FileRemoved { file_id } => remove(state, &file_id),
        Action::QuerySubmitted { query } => submit(state, &query),
        Action::Retry => match (state.phase, state.query.clone()) {
            (Phase::Failed, Some(query)) => submit(state, &query),
            (Phase::Processing, _) => Err(Rejection::Busy),
            _ => Err(Rejection::NothingToRetry),
        },
        Action::StepAdvanced { generation, step } => {
            ensure_current(state, generation)?;
            if step != state.step + 1 || step >= PipelineStage::COUNT {
                return Err(Rejection::OutOfOrderStep {
                    current: state.step,
                    got: step,
                });
            }
            state.step = step;
            Ok(Vec::new())
        }
        Action::PipelineCompleted {
            generation,
            decision,
        } => {
            ensure_current(state, generation)?;
            state.result = Some(*decision);
            state.phase = Phase::Complete;
            state.step = PipelineStage::COUNT;
            Ok(Vec::new())
        }
        Action::PipelineFailed {
            generation,
            failure,
        } => {
            ensure_current(state, generation)?;
            state.step = failure.stage.index();
            state.failure = Some(failure);
            state.phase = Phase::Failed;
            Ok(Vec::new())
        }
        Action::Reset => Ok(reset(state)),
    }
}

fn accept(state: &mut WorkspaceState, files: Vec<UploadedFile>) -> Vec<Effect> {
    let mut effects = Vec::with_capacity(files.len());
    for file in files {
        if state.file(&file.id).is_some() {
            continue;
        }
        if file.status == FileStatus::Uploading {
            effects.push(Effect::ScheduleUpload {
                file_id: file.id.clone(),
            });
        }
        state.files.push(file);
    }
    effects
}

fn set_upload_status(state: &mut WorkspaceState, file_id: &str, status: FileStatus) -> Transition {
    let file = state
        .files
        .iter_mut()
        .find(|f| f.id == file_id)
        .ok_or_else(|| Rejection::UnknownFile(file_id.to_string()))?;
    if file.status != FileStatus::Uploading {
        return Err(Rejection::NotUploading(file_id.to_string()));
    }
    file.status = status;
    Ok(Vec::new())
}

fn remove(state: &mut WorkspaceState, file_id: &str) -> Transition {
    let index = state
        .files
        .iter()
        .position(|f| f.id == file_id)
        .ok_or_else(|| Rejection::UnknownFile(file_id.to_string()))?;
    let removed = state.files.remove(index);

    if removed.status == FileStatus::Uploading {
        Ok(vec![Effect::CancelUpload {
            file_id: removed.id,
        }])
    } else {
        Ok(Vec::new())
    }
}

fn submit(state: &mut WorkspaceState, query: &str) -> Transition {
    if state.is_processing() {
        return Err(Rejection::Busy);
    }
    let query = normalize_query(query)?;

    state.generation += 1;
    state.phase = Phase::Processing;
    state.step = 0;
    state.result = None;
    state.failure = None;
    state.query = Some(query.clone());

    Ok(vec![Effect::StartPipeline {
        generation: state.generation,
        query,
        documents: state.ready_documents(),
    }])
}

fn ensure_current(state: &WorkspaceState, generation: u64) -> Result<(), Rejection> {
    if generation != state.generation || !state.is_processing() {
        return Err(Rejection::Stale(generation));
    }
    Ok(())
}

fn reset(state: &mut WorkspaceState) -> Vec<Effect> {
    let mut effects = vec![Effect::CancelPipeline];
    effects.extend(
        state
            .files
            .iter()
            .filter(|f| f.status == FileStatus::Uploading)
            .map(|f| Effect::CancelUpload {
                file_id: f.id.clone(),
            }),
    );

    *state = WorkspaceState {
        generation: state.generation + 1,
        ..Default::default()
    };
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecisionStatus, ExtractedEntities};

    fn file(id: &str, status: FileStatus) -> UploadedFile {
        UploadedFile {
            id: id.to_string(),
            name: format!("{id}.pdf"),
            size: 10,
            mime_type: "application/pdf".to_string(),
            status,
        }
    }

    fn decision() -> Box<Decision> {
        Box::new(Decision {
            decision: DecisionStatus::Pending,
            amount: None,
            justification: "more info".to_string(),
            confidence: 65,
            extracted_entities: ExtractedEntities::default(),
            relevant_clauses: Vec::new(),
            raw_response: serde_json::Value::Null,
            provenance: Default::default(),
        })
    }

    fn processing_state() -> WorkspaceState {
        let mut state = WorkspaceState::default();
        reduce(
            &mut state,
            Action::QuerySubmitted {
                query: "knee surgery".to_string(),
            },
        )
        .unwrap();
        state
    }

    #[test]
    fn test_accepted_files_append_and_schedule() {
        let mut state = WorkspaceState::default();
        reduce(&mut state, Action::FilesAccepted(vec![file("a", FileStatus::Uploading)]))
            .unwrap();
        let effects = reduce(
            &mut state,
            Action::FilesAccepted(vec![
                file("b", FileStatus::Uploading),
                file("a", FileStatus::Uploading),
            ]),
        )
        .unwrap();

        let ids: Vec<_> = state.files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(
            effects,
            vec![Effect::ScheduleUpload {
                file_id: "b".to_string()
            }]
        );
    }

    #[test]
    fn test_upload_finished_completes_file() {
        let mut state = WorkspaceState::default();
        reduce(&mut state, Action::FilesAccepted(vec![file("a", FileStatus::Uploading)]))
            .unwrap();
        reduce(
            &mut state,
            Action::UploadFinished {
                file_id: "a".to_string(),
            },
        )
        .unwrap();
        assert_eq!(state.files[0].status, FileStatus::Completed);
        assert_eq!(
            reduce(
                &mut state,
                Action::UploadFinished {
                    file_id: "a".to_string()
                }
            ),
            Err(Rejection::NotUploading("a".to_string()))
        );
    }

    #[test]
    fn test_remove_keeps_order_and_cancels_pending_upload() {
        let mut state = WorkspaceState {
            files: vec![
                file("a", FileStatus::Completed),
                file("b", FileStatus::Uploading),
                file("c", FileStatus::Completed),
            ],
            ..Default::default()
        };

        let effects = reduce(
            &mut state,
            Action::FileRemoved {
                file_id: "b".to_string(),
            },
        )
        .unwrap();
        let ids: Vec<_> = state.files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert_eq!(
            effects,
            vec![Effect::CancelUpload {
                file_id: "b".to_string()
            }]
        );

        // a late completion for the removed file changes nothing
        let before = state.clone();
        assert!(
            reduce(
                &mut state,
                Action::UploadFinished {
                    file_id: "b".to_string()
                }
            )
            .is_err()
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_submit_starts_cycle_bound_to_finished_uploads() {
        let mut state = WorkspaceState {
            files: vec![file("a", FileStatus::Completed), file("b", FileStatus::Uploading)],
            ..Default::default()
        };
        let effects = reduce(
            &mut state,
            Action::QuerySubmitted {
                query: "  dental  ".to_string(),
            },
        )
        .unwrap();

        assert_eq!(state.phase, Phase::Processing);
        assert_eq!(state.step, 0);
        assert_eq!(state.generation, 1);
        assert_eq!(state.query.as_deref(), Some("dental"));
        assert_eq!(
            effects,
            vec![Effect::StartPipeline {
                generation: 1,
                query: "dental".to_string(),
                documents: vec![DocumentRef {
                    id: "a".to_string(),
                    name: "a.pdf".to_string()
                }],
            }]
        );
    }

    #[test]
    fn test_submit_while_processing_is_rejected_without_change() {
        let mut state = processing_state();
        let before = state.clone();
        for query in ["another query", "knee surgery", "   "] {
            assert_eq!(
                reduce(
                    &mut state,
                    Action::QuerySubmitted {
                        query: query.to_string()
                    }
                ),
                Err(Rejection::Busy)
            );
        }
        assert_eq!(state, before);
    }

    #[test]
    fn test_empty_query_is_rejected() {
        let mut state = WorkspaceState::default();
        assert_eq!(
            reduce(
                &mut state,
                Action::QuerySubmitted {
                    query: " \n ".to_string()
                }
            ),
            Err(Rejection::EmptyQuery)
        );
        assert_eq!(state, WorkspaceState::default());
    }

    #[test]
    fn test_steps_advance_in_order_then_complete() {
        let mut state = processing_state();
        for step in 1..4 {
            reduce(&mut state, Action::StepAdvanced { generation: 1, step }).unwrap();
            assert_eq!(state.step, step);
        }
        assert_eq!(
            reduce(&mut state, Action::StepAdvanced { generation: 1, step: 4 }),
            Err(Rejection::OutOfOrderStep { current: 3, got: 4 })
        );

        reduce(
            &mut state,
            Action::PipelineCompleted {
                generation: 1,
                decision: decision(),
            },
        )
        .unwrap();
        assert_eq!(state.phase, Phase::Complete);
        assert_eq!(state.step, 4);
        assert!(state.result.is_some());
    }

    #[test]
    fn test_stale_generation_never_mutates() {
        let mut state = processing_state();
        reduce(&mut state, Action::Reset).unwrap();
        reduce(
            &mut state,
            Action::QuerySubmitted {
                query: "dental".to_string(),
            },
        )
        .unwrap();
        assert_eq!(state.generation, 3);

        let before = state.clone();
        assert_eq!(
            reduce(
                &mut state,
                Action::PipelineCompleted {
                    generation: 1,
                    decision: decision()
                }
            ),
            Err(Rejection::Stale(1))
        );
        assert_eq!(
            reduce(&mut state, Action::StepAdvanced { generation: 1, step: 1 }),
            Err(Rejection::Stale(1))
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_failure_preserves_query_and_retry_restarts() {
        let mut state = processing_state();
        reduce(&mut state, Action::StepAdvanced { generation: 1, step: 1 }).unwrap();
        reduce(
            &mut state,
            Action::PipelineFailed {
                generation: 1,
                failure: PipelineFailure {
                    stage: PipelineStage::Search,
                    message: "index offline".to_string(),
                },
            },
        )
        .unwrap();

        assert_eq!(state.phase, Phase::Failed);
        assert_eq!(state.step, 1);
        assert_eq!(state.query.as_deref(), Some("knee surgery"));

        let effects = reduce(&mut state, Action::Retry).unwrap();
        assert_eq!(state.phase, Phase::Processing);
        assert_eq!(state.generation, 2);
        assert!(state.failure.is_none());
        assert!(matches!(
            &effects[..],
            [Effect::StartPipeline { generation: 2, query, .. }] if query == "knee surgery"
        ));
    }

    #[test]
    fn test_retry_needs_a_failed_cycle() {
        let mut state = WorkspaceState::default();
        assert_eq!(reduce(&mut state, Action::Retry), Err(Rejection::NothingToRetry));
        let mut state = processing_state();
        assert_eq!(reduce(&mut state, Action::Retry), Err(Rejection::Busy));
    }

    #[test]
    fn test_reset_cancels_everything_and_bumps_generation() {
        let mut state = processing_state();
        reduce(
            &mut state,
            Action::FilesAccepted(vec![
                file("a", FileStatus::Uploading),
                file("b", FileStatus::Completed),
            ]),
        )
        .unwrap();

        let effects = reduce(&mut state, Action::Reset).unwrap();
        assert_eq!(
            effects,
            vec![
                Effect::CancelPipeline,
                Effect::CancelUpload {
                    file_id: "a".to_string()
                }
            ]
        );
        assert_eq!(state.phase, Phase::Idle);
        assert!(state.files.is_empty());
        assert_eq!(state.generation, 2);
    }

    #[test]
    fn test_step_view_follows_phase() {
        let mut state = WorkspaceState::default();
        assert_eq!(state.step_view(), None);

        state.phase = Phase::Processing;
        state.step = 1;
        let view = state.step_view().unwrap();
        assert_eq!(view.processing(), Some(PipelineStage::Search));
        assert_eq!(view.progress_percent, 50);

        state.phase = Phase::Failed;
        state.step = 2;
        let view = state.step_view().unwrap();
        assert_eq!(view.stages[2].status, crate::steps::StageStatus::Failed);
        assert_eq!(view.progress_percent, 50);

        state.phase = Phase::Complete;
        state.step = PipelineStage::COUNT;
        assert_eq!(state.step_view().unwrap().progress_percent, 100);
    }
}
