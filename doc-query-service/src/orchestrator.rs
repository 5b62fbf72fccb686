//! Async driver around the workspace reducer.
//!
//! The workspace lives in a `watch` channel and [`reduce`] is applied inside
//! the channel's modify closure, so every transition is atomic and observers
//! see each committed state. Effects returned by the reducer are carried out
//! here: upload timers and the pipeline cycle are spawned tasks whose handles
//! are kept so removal, reset and supersession can abort them.

use dashmap::DashMap;
use stage_flow::FlowRunner;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PipelineTiming;
use crate::engine::DecisionEngine;
use crate::models::{Decision, DocumentRef, RawFile};
use crate::state::{Action, Effect, PipelineFailure, Rejection, WorkspaceState, reduce};
use crate::steps::PipelineStage;
use crate::tasks::session_keys;
use crate::upload::{Acceptance, accept_files, accept_read_files};
use crate::workflow::{create_cycle_session, create_flow_runner};

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Shared>,
}

struct Shared {
    state: watch::Sender<WorkspaceState>,
    engine_name: String,
    runner: FlowRunner,
    timing: PipelineTiming,
    pipeline: Mutex<Option<(u64, JoinHandle<()>)>>,
    uploads: DashMap<String, JoinHandle<()>>,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn DecisionEngine>, timing: PipelineTiming) -> Self {
        let (state, _) = watch::channel(WorkspaceState::default());
        Self {
            inner: Arc::new(Shared {
                state,
                engine_name: engine.name().to_string(),
                runner: create_flow_runner(engine),
                timing,
                pipeline: Mutex::new(None),
                uploads: DashMap::new(),
            }),
        }
    }

    pub fn engine_name(&self) -> &str {
        &self.inner.engine_name
    }

    pub fn timing(&self) -> PipelineTiming {
        self.inner.timing
    }

    pub fn snapshot(&self) -> WorkspaceState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkspaceState> {
        self.inner.state.subscribe()
    }

    /// Apply one action and carry out the effects it produced.
    pub fn dispatch(&self, action: Action) -> Result<(), Rejection> {
        self.transition(action).map(drop)
    }

    /// Like [`dispatch`](Self::dispatch), returning the generation of the
    /// cycle the action started, if it started one.
    fn transition(&self, action: Action) -> Result<Option<u64>, Rejection> {
        let mut outcome = Ok(Vec::new());
        self.inner.state.send_if_modified(|state| {
            outcome = reduce(state, action);
            outcome.is_ok()
        });

        let effects = outcome?;
        let started = started_generation(&effects);
        for effect in effects {
            self.apply(effect);
        }
        Ok(started)
    }

    /// Filter incoming files and start the upload timer for each accepted one.
    pub fn upload(&self, files: Vec<RawFile>) -> Acceptance {
        self.record(accept_files(files))
    }

    /// Upload files whose contents were read by the caller. A file paired
    /// with a read error is still accepted, but lands as `error` and never
    /// gets an upload timer.
    pub fn upload_read(&self, files: Vec<(RawFile, Option<String>)>) -> Acceptance {
        for (file, reason) in &files {
            if let Some(reason) = reason {
                warn!(file = %file.name, %reason, "File could not be read");
            }
        }
        self.record(accept_read_files(files))
    }

    fn record(&self, acceptance: Acceptance) -> Acceptance {
        for rejected in &acceptance.rejected {
            info!(file = %rejected.name, reason = %rejected.reason, "File rejected");
        }
        if !acceptance.accepted.is_empty() {
            info!(count = acceptance.accepted.len(), "Files accepted");
            if let Err(rejection) = self.dispatch(Action::FilesAccepted(acceptance.accepted.clone())) {
                warn!(%rejection, "Accepted files were not recorded");
            }
        }
        acceptance
    }

    pub fn remove_file(&self, file_id: &str) -> Result<(), Rejection> {
        self.dispatch(Action::FileRemoved {
            file_id: file_id.to_string(),
        })
    }

    pub fn mark_upload_failed(&self, file_id: &str, reason: impl Into<String>) -> Result<(), Rejection> {
        if let Some((_, handle)) = self.inner.uploads.remove(file_id) {
            handle.abort();
        }
        let reason = reason.into();
        warn!(file_id, %reason, "Upload failed");
        self.dispatch(Action::UploadFailed {
            file_id: file_id.to_string(),
            reason,
        })
    }

    /// Start a cycle for `text`; returns the generation it runs under.
    pub fn submit_query(&self, text: &str) -> Result<u64, Rejection> {
        self.transition(Action::QuerySubmitted {
            query: text.to_string(),
        })?
        .ok_or(Rejection::Busy)
    }

    pub fn retry(&self) -> Result<u64, Rejection> {
        self.transition(Action::Retry)?.ok_or(Rejection::NothingToRetry)
    }

    pub fn reset(&self) {
        if let Err(rejection) = self.dispatch(Action::Reset) {
            warn!(%rejection, "Reset rejected");
        }
    }

    /// Wait until the workspace satisfies `predicate` and return that state.
    pub async fn wait_for(&self, mut predicate: impl FnMut(&WorkspaceState) -> bool) -> WorkspaceState {
        let mut rx = self.subscribe();
        match rx.wait_for(|state| predicate(state)).await {
            Ok(state) => state.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// Wait for the current cycle, if any, to end in `Complete` or `Failed`.
    pub async fn settled(&self) -> WorkspaceState {
        self.wait_for(|state| !state.is_processing()).await
    }

    fn apply(&self, effect: Effect) {
        match effect {
            Effect::ScheduleUpload { file_id } => self.schedule_upload(file_id),
            Effect::CancelUpload { file_id } => {
                if let Some((_, handle)) = self.inner.uploads.remove(&file_id) {
                    debug!(file_id = %file_id, "Upload timer cancelled");
                    handle.abort();
                }
            }
            Effect::StartPipeline {
                generation,
                query,
                documents,
            } => self.start_pipeline(generation, query, documents),
            Effect::CancelPipeline => {
                let mut slot = self.inner.pipeline.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some((generation, handle)) = slot.take() {
                    debug!(generation, "Pipeline cycle cancelled");
                    handle.abort();
                }
            }
        }
    }

    fn schedule_upload(&self, file_id: String) {
        let this = self.clone();
        let delay = self.inner.timing.upload_delay;
        let id = file_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match this.dispatch(Action::UploadFinished { file_id: id.clone() }) {
                Ok(()) => debug!(file_id = %id, "Upload finished"),
                Err(rejection) => debug!(file_id = %id, %rejection, "Upload completion ignored"),
            }
        });

        self.inner.uploads.retain(|_, h| !h.is_finished());
        if let Some(previous) = self.inner.uploads.insert(file_id, handle) {
            previous.abort();
        }
    }

    fn start_pipeline(&self, generation: u64, query: String, documents: Vec<DocumentRef>) {
        let handle = tokio::spawn(self.clone().run_cycle(generation, query, documents));

        let mut slot = self.inner.pipeline.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.take() {
            Some((current, running)) if current > generation => {
                handle.abort();
                *slot = Some((current, running));
            }
            Some((_, superseded)) => {
                superseded.abort();
                *slot = Some((generation, handle));
            }
            None => *slot = Some((generation, handle)),
        }
    }

    async fn run_cycle(self, generation: u64, query: String, documents: Vec<DocumentRef>) {
        let runner = &self.inner.runner;
        let PipelineTiming {
            step_delay,
            stage_timeout,
            ..
        } = self.inner.timing;

        info!(generation, documents = documents.len(), "Pipeline cycle started");

        let session_id = match create_cycle_session(runner, generation, &query, &documents).await {
            Ok(id) => id,
            Err(e) => {
                self.fail(generation, PipelineStage::Parse, e.to_string());
                return;
            }
        };

        for stage in PipelineStage::ALL {
            if stage.index() > 0 {
                let advanced = self.dispatch(Action::StepAdvanced {
                    generation,
                    step: stage.index(),
                });
                if let Err(rejection) = advanced {
                    debug!(generation, %rejection, "Cycle superseded");
                    self.discard(&session_id).await;
                    return;
                }
            }

            let (outcome, ()) = tokio::join!(
                tokio::time::timeout(stage_timeout, runner.run(&session_id)),
                tokio::time::sleep(step_delay),
            );

            let message = match outcome {
                Ok(Ok(_)) => {
                    debug!(generation, stage = %stage, "Stage completed");
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("{stage} stage timed out after {}", format_timeout(stage_timeout)),
            };
            self.fail(generation, stage, message);
            self.discard(&session_id).await;
            return;
        }

        let decision = match runner.load(&session_id).await {
            Ok(Some(session)) => session.context.get::<Decision>(session_keys::DECISION).await,
            _ => None,
        };
        self.discard(&session_id).await;

        let Some(decision) = decision else {
            self.fail(
                generation,
                PipelineStage::Decide,
                "pipeline finished without a decision".to_string(),
            );
            return;
        };

        let status = decision.decision;
        match self.dispatch(Action::PipelineCompleted {
            generation,
            decision: Box::new(decision),
        }) {
            Ok(()) => info!(generation, decision = status.as_str(), "Pipeline cycle complete"),
            Err(rejection) => debug!(generation, %rejection, "Completion dropped"),
        }
    }

    fn fail(&self, generation: u64, stage: PipelineStage, message: String) {
        warn!(generation, stage = %stage, error = %message, "Pipeline stage failed");
        let failed = self.dispatch(Action::PipelineFailed {
            generation,
            failure: PipelineFailure { stage, message },
        });
        if let Err(rejection) = failed {
            debug!(generation, %rejection, "Failure dropped");
        }
    }

    async fn discard(&self, session_id: &str) {
        if let Err(e) = self.inner.runner.discard(session_id).await {
            warn!(session_id, error = %e, "Failed to discard cycle session");
        }
    }
}

fn started_generation(effects: &[Effect]) -> Option<u64> {
    effects.iter().find_map(|effect| match effect {
        Effect::StartPipeline { generation, .. } => Some(*generation),
        _ => None,
    })
}

fn format_timeout(timeout: Duration) -> String {
    if timeout.subsec_millis() == 0 {
        format!("{}s", timeout.as_secs())
    } else {
        format!("{}ms", timeout.as_millis())
    }
}
