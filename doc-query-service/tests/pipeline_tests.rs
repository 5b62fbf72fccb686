use async_trait::async_trait;
use doc_query_service::engine::{
    DecisionEngine, DecisionInput, EngineError, EngineResult, Evaluation, ParsedQuery,
};
use doc_query_service::steps::PipelineStage;
use doc_query_service::{
    Decision, DecisionStatus, DocumentRef, FileStatus, KeywordDecisionEngine, Orchestrator,
    Phase, PipelineTiming, RawFile, Rejection, RelevantClause,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{Instant, sleep};

const KNEE_QUERY: &str = "46-year-old male, knee surgery in Pune, 3-month-old insurance policy";

fn timing() -> PipelineTiming {
    PipelineTiming {
        step_delay: Duration::from_millis(1500),
        upload_delay: Duration::from_millis(1500),
        stage_timeout: Duration::from_secs(5),
    }
}

fn keyword_orchestrator() -> Orchestrator {
    Orchestrator::new(Arc::new(KeywordDecisionEngine::new()), timing())
}

fn pdf(name: &str) -> RawFile {
    RawFile::new(name, 2048, "application/pdf")
}

/// Keyword engine whose search stage fails a set number of times.
struct FlakySearchEngine {
    inner: KeywordDecisionEngine,
    failures_left: AtomicUsize,
}

impl FlakySearchEngine {
    fn failing(times: usize) -> Self {
        Self {
            inner: KeywordDecisionEngine::new(),
            failures_left: AtomicUsize::new(times),
        }
    }
}

#[async_trait]
impl DecisionEngine for FlakySearchEngine {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn parse(&self, query: &str) -> EngineResult<ParsedQuery> {
        self.inner.parse(query).await
    }

    async fn search(
        &self,
        parsed: &ParsedQuery,
        documents: &[DocumentRef],
    ) -> EngineResult<Vec<RelevantClause>> {
        let fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(EngineError::Stage {
                stage: PipelineStage::Search,
                message: "clause index unavailable".to_string(),
            });
        }
        self.inner.search(parsed, documents).await
    }

    async fn evaluate(
        &self,
        parsed: &ParsedQuery,
        clauses: &[RelevantClause],
    ) -> EngineResult<Evaluation> {
        self.inner.evaluate(parsed, clauses).await
    }

    async fn decide(&self, input: DecisionInput) -> EngineResult<Decision> {
        self.inner.decide(input).await
    }
}

/// Keyword engine whose evaluate stage never returns.
struct HangingEvaluateEngine(KeywordDecisionEngine);

#[async_trait]
impl DecisionEngine for HangingEvaluateEngine {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn parse(&self, query: &str) -> EngineResult<ParsedQuery> {
        self.0.parse(query).await
    }

    async fn search(
        &self,
        parsed: &ParsedQuery,
        documents: &[DocumentRef],
    ) -> EngineResult<Vec<RelevantClause>> {
        self.0.search(parsed, documents).await
    }

    async fn evaluate(
        &self,
        _parsed: &ParsedQuery,
        _clauses: &[RelevantClause],
    ) -> EngineResult<Evaluation> {
        std::future::pending().await
    }

    async fn decide(&self, input: DecisionInput) -> EngineResult<Decision> {
        self.0.decide(input).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_cycle_walks_every_stage_and_binds_documents() {
    let orchestrator = keyword_orchestrator();

    let acceptance = orchestrator.upload(vec![pdf("policy.pdf"), RawFile::new("photo.png", 10, "image/png")]);
    assert_eq!(acceptance.accepted.len(), 1);
    assert_eq!(acceptance.rejected.len(), 1);
    let file_id = acceptance.accepted[0].id.clone();

    let state = orchestrator.wait_for(|s| !s.has_pending_uploads()).await;
    assert_eq!(state.files[0].status, FileStatus::Completed);

    let mut rx = orchestrator.subscribe();
    let observer = tokio::spawn(async move {
        let mut steps = Vec::new();
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            steps.push(state.step);
            if !state.is_processing() {
                break;
            }
        }
        steps
    });

    let started = Instant::now();
    let generation = orchestrator.submit_query(KNEE_QUERY).unwrap();
    let state = orchestrator.settled().await;

    assert!(started.elapsed() >= Duration::from_millis(4 * 1500));
    assert_eq!(state.phase, Phase::Complete);
    assert_eq!(state.step, 4);
    assert_eq!(state.generation, generation);

    let decision = state.result.unwrap();
    assert_eq!(decision.decision, DecisionStatus::Approved);
    assert_eq!(decision.amount, Some(15000.0));
    assert_eq!(decision.extracted_entities.age, Some(46));
    assert_eq!(decision.provenance.generation, generation);
    assert_eq!(decision.provenance.query, KNEE_QUERY);
    assert_eq!(decision.provenance.documents.len(), 1);
    assert_eq!(decision.provenance.documents[0].id, file_id);

    let mut steps = observer.await.unwrap();
    steps.dedup();
    assert_eq!(steps, vec![0, 1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_second_submission_while_processing_is_busy() {
    let orchestrator = keyword_orchestrator();
    let generation = orchestrator.submit_query("dental cleaning").unwrap();

    assert_eq!(orchestrator.submit_query(KNEE_QUERY), Err(Rejection::Busy));
    assert_eq!(orchestrator.snapshot().generation, generation);
    assert_eq!(orchestrator.snapshot().query.as_deref(), Some("dental cleaning"));

    let state = orchestrator.settled().await;
    assert_eq!(state.result.unwrap().decision, DecisionStatus::Rejected);
}

#[tokio::test(start_paused = true)]
async fn test_blank_query_is_rejected_and_nothing_starts() {
    let orchestrator = keyword_orchestrator();
    assert_eq!(orchestrator.submit_query("   \n"), Err(Rejection::EmptyQuery));

    let state = orchestrator.snapshot();
    assert_eq!(state.phase, Phase::Idle);
    assert_eq!(state.generation, 0);
    assert_eq!(state.step_view(), None);
}

#[tokio::test(start_paused = true)]
async fn test_removing_an_uploading_file_cancels_its_completion() {
    let orchestrator = keyword_orchestrator();
    let acceptance = orchestrator.upload(vec![pdf("a.pdf"), pdf("b.pdf")]);
    let removed = acceptance.accepted[0].id.clone();
    let kept = acceptance.accepted[1].id.clone();

    orchestrator.remove_file(&removed).unwrap();
    sleep(Duration::from_secs(3)).await;

    let state = orchestrator.snapshot();
    assert!(state.file(&removed).is_none());
    assert_eq!(state.files.len(), 1);
    assert_eq!(state.file(&kept).unwrap().status, FileStatus::Completed);

    assert_eq!(
        orchestrator.remove_file(&removed),
        Err(Rejection::UnknownFile(removed.clone()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_only_completed_uploads_are_bound_to_a_cycle() {
    let orchestrator = keyword_orchestrator();
    let acceptance = orchestrator.upload(vec![pdf("ready.pdf")]);
    orchestrator.wait_for(|s| !s.has_pending_uploads()).await;

    let late = orchestrator.upload(vec![pdf("late.pdf")]);
    let failed = orchestrator.upload(vec![pdf("broken.pdf")]);
    orchestrator
        .mark_upload_failed(&failed.accepted[0].id, "checksum mismatch")
        .unwrap();

    orchestrator.submit_query(KNEE_QUERY).unwrap();
    let state = orchestrator.settled().await;

    let bound: Vec<_> = state
        .result
        .as_ref()
        .unwrap()
        .provenance
        .documents
        .iter()
        .map(|d| d.id.clone())
        .collect();
    assert_eq!(bound, vec![acceptance.accepted[0].id.clone()]);

    // the late upload finished during the cycle but was not part of it
    assert_eq!(
        state.file(&late.accepted[0].id).unwrap().status,
        FileStatus::Completed
    );
    assert_eq!(
        state.file(&failed.accepted[0].id).unwrap().status,
        FileStatus::Error
    );
}

#[tokio::test(start_paused = true)]
async fn test_reset_mid_cycle_discards_the_running_cycle() {
    let orchestrator = keyword_orchestrator();
    orchestrator.upload(vec![pdf("pending.pdf")]);
    let generation = orchestrator.submit_query(KNEE_QUERY).unwrap();

    sleep(Duration::from_millis(2000)).await;
    assert_eq!(orchestrator.snapshot().step, 1);

    orchestrator.reset();
    let state = orchestrator.snapshot();
    assert_eq!(state.phase, Phase::Idle);
    assert_eq!(state.generation, generation + 1);
    assert!(state.files.is_empty());

    sleep(Duration::from_secs(20)).await;
    let state = orchestrator.snapshot();
    assert_eq!(state.phase, Phase::Idle);
    assert_eq!(state.step, 0);
    assert!(state.result.is_none());
    assert!(state.files.is_empty());

    // a fresh cycle after reset runs normally
    orchestrator.submit_query("maternity care in Mumbai").unwrap();
    let state = orchestrator.settled().await;
    assert_eq!(state.phase, Phase::Complete);
    assert_eq!(state.result.unwrap().decision, DecisionStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn test_failed_stage_preserves_query_and_retry_completes() {
    let orchestrator = Orchestrator::new(Arc::new(FlakySearchEngine::failing(1)), timing());

    let first = orchestrator.submit_query(KNEE_QUERY).unwrap();
    let state = orchestrator.settled().await;

    assert_eq!(state.phase, Phase::Failed);
    assert_eq!(state.step, PipelineStage::Search.index());
    assert_eq!(state.query.as_deref(), Some(KNEE_QUERY));
    assert!(state.result.is_none());
    let failure = state.failure.clone().unwrap();
    assert_eq!(failure.stage, PipelineStage::Search);
    assert!(failure.message.contains("clause index unavailable"));

    let view = state.step_view().unwrap();
    assert_eq!(view.progress_percent, 25);

    let second = orchestrator.retry().unwrap();
    assert_eq!(second, first + 1);
    let state = orchestrator.settled().await;
    assert_eq!(state.phase, Phase::Complete);
    assert!(state.failure.is_none());
    assert_eq!(state.result.unwrap().provenance.generation, second);

    assert_eq!(orchestrator.retry(), Err(Rejection::NothingToRetry));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_stage_times_out_into_failed() {
    let orchestrator = Orchestrator::new(
        Arc::new(HangingEvaluateEngine(KeywordDecisionEngine::new())),
        timing(),
    );

    let started = Instant::now();
    orchestrator.submit_query(KNEE_QUERY).unwrap();
    let state = orchestrator.settled().await;

    assert!(started.elapsed() < Duration::from_secs(4 * 5));
    assert_eq!(state.phase, Phase::Failed);
    assert_eq!(state.step, PipelineStage::Evaluate.index());
    let failure = state.failure.unwrap();
    assert_eq!(failure.stage, PipelineStage::Evaluate);
    assert!(failure.message.contains("timed out"));
}
