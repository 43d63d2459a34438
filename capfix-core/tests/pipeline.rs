//! End-to-end suggestion runs against scripted service doubles.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use capfix_core::suggest::{
    ChatRequest, GenerativeService, Orchestrator, Phase, RunStatus, SuggestionRequest,
};
use capfix_core::{ServiceError, Segment, Severity, SuggestConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Diagnose,
    Rank,
    Rewrite,
}

impl Kind {
    fn of(request: &ChatRequest) -> Self {
        let system = &request.messages[0].content;
        if system.contains("quality reviewer") {
            Kind::Diagnose
        } else if system.contains("fixed budget") {
            Kind::Rank
        } else {
            Kind::Rewrite
        }
    }
}

type Responder = dyn Fn(Kind, &ChatRequest) -> Result<Value, ServiceError> + Send + Sync;

struct Scripted {
    respond: Box<Responder>,
    calls: Mutex<Vec<Kind>>,
}

impl Scripted {
    fn new(respond: impl Fn(Kind, &ChatRequest) -> Result<Value, ServiceError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { respond: Box::new(respond), calls: Mutex::new(Vec::new()) })
    }

    fn calls(&self) -> Vec<Kind> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeService for Scripted {
    async fn complete_json(&self, request: ChatRequest) -> Result<Value, ServiceError> {
        let kind = Kind::of(&request);
        self.calls.lock().unwrap().push(kind);
        (self.respond)(kind, &request)
    }
}

/// Never answers.
struct Hanging;

#[async_trait]
impl GenerativeService for Hanging {
    async fn complete_json(&self, _request: ChatRequest) -> Result<Value, ServiceError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(ServiceError::Cancelled)
    }
}

fn lines(count: u32) -> Vec<Segment> {
    (1..=count)
        .map(|n| {
            let start = u64::from(n) * 1000;
            Segment::new(n, start, start + 900, format!("this is line {n} of the talk"))
        })
        .collect()
}

fn polished(n: u32) -> String {
    format!("This is line {n} of the talk.")
}

fn request(segments: &[Segment]) -> SuggestionRequest<'_> {
    SuggestionRequest { segments, project_title: "Demo", language: "en" }
}

fn unavailable() -> ServiceError {
    ServiceError::Status { status: 503, body: "unavailable".into() }
}

#[tokio::test]
async fn unreachable_service_yields_empty_result() {
    let service = Scripted::new(|_, _| Err(unavailable()));
    let orchestrator = Orchestrator::new(service.clone(), SuggestConfig::default());
    let segments = lines(12);

    let outcome = orchestrator.run(request(&segments), &CancellationToken::new()).await;

    assert!(outcome.candidates.is_empty());
    assert_eq!(outcome.status, RunStatus::FailedSoft);
    assert!(outcome.degraded.contains(&Phase::Diagnose));
    assert!(outcome.degraded.contains(&Phase::Rewrite));
    // Padding still attempts a rewrite on a 12-line transcript.
    assert_eq!(service.calls().last(), Some(&Kind::Rewrite));
}

#[tokio::test]
async fn hanging_service_is_bounded_by_request_timeouts() {
    let config = SuggestConfig { request_timeout_ms: 50, ..SuggestConfig::default() };
    let orchestrator = Orchestrator::new(Arc::new(Hanging), config);
    let mut segments = lines(12);
    segments[3].original_text = "the the end".into();

    let started = Instant::now();
    let outcome = orchestrator.run(request(&segments), &CancellationToken::new()).await;

    assert!(outcome.candidates.is_empty());
    assert_eq!(outcome.status, RunStatus::FailedSoft);
    // One diagnosis batch, one ranking, one rewrite.
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
}

#[tokio::test]
async fn cancelled_run_returns_immediately() {
    let orchestrator = Orchestrator::new(Arc::new(Hanging), SuggestConfig::default());
    let segments = lines(3);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let started = Instant::now();
    let outcome = orchestrator.run(request(&segments), &cancel).await;

    assert_eq!(outcome.status, RunStatus::FailedSoft);
    assert!(outcome.candidates.is_empty());
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn cancelling_mid_call_stops_the_run() {
    let orchestrator = Arc::new(Orchestrator::new(Arc::new(Hanging), SuggestConfig::default()));
    let segments = lines(3);
    let cancel = CancellationToken::new();

    let started = Instant::now();
    let run = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        async move { orchestrator.run(request(&segments), &cancel).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("run should stop once cancelled")
        .unwrap();
    assert_eq!(outcome.status, RunStatus::FailedSoft);
    assert!(outcome.candidates.is_empty());
    assert!(outcome.degraded.contains(&Phase::Diagnose));
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
}

#[tokio::test]
async fn cancelling_during_ranking_skips_the_rewrite() {
    let cancel = CancellationToken::new();
    let service = Scripted::new({
        let cancel = cancel.clone();
        move |kind, _| match kind {
            Kind::Diagnose => Ok(json!({"segments": [
                {"index": 2, "severity": "major", "reason": "garbled", "confidence": 0.9}
            ]})),
            Kind::Rank => {
                cancel.cancel();
                Err(ServiceError::Cancelled)
            }
            Kind::Rewrite => Ok(json!({"segments": [
                {"index": 2, "rewrite": polished(2), "confidence": 0.9}
            ]})),
        }
    });
    let orchestrator = Orchestrator::new(service.clone(), SuggestConfig::default());
    let segments = lines(3);

    let outcome = orchestrator.run(request(&segments), &cancel).await;

    assert_eq!(outcome.status, RunStatus::FailedSoft);
    assert!(outcome.candidates.is_empty());
    assert_eq!(outcome.degraded, vec![Phase::Prioritize]);
    assert_eq!(service.calls(), vec![Kind::Diagnose, Kind::Rank]);
}

#[tokio::test]
async fn whitespace_only_rewrites_never_surface() {
    let mut segments = lines(3);
    segments[0].original_text = "Hello  world".into();
    segments[1].original_text = "It was beautifull night.".into();

    let service = Scripted::new(|kind, _| match kind {
        Kind::Diagnose => Ok(json!({"segments": [
            {"index": 1, "severity": "minor", "reason": "spacing", "confidence": 0.6},
            {"index": 2, "severity": "major", "reason": "typo", "confidence": 0.9},
            {"index": 3, "severity": "minor", "reason": "capitalization", "confidence": 0.5}
        ]})),
        Kind::Rank => Ok(json!({"indices": [2, 1, 3]})),
        Kind::Rewrite => Ok(json!({"segments": [
            {"index": 1, "rewrite": "Hello world", "confidence": 0.9, "notes": "spacing"},
            {"index": 2, "rewrite": "It was a beautiful night.", "confidence": 0.95, "notes": "  "},
            {"index": 3, "rewrite": "   ", "confidence": 0.5},
            {"index": 77, "rewrite": "Stray", "confidence": 1.0}
        ]})),
    });
    let orchestrator = Orchestrator::new(service.clone(), SuggestConfig::default());

    let outcome = orchestrator.run(request(&segments), &CancellationToken::new()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert!(outcome.degraded.is_empty());
    assert_eq!(outcome.candidates.keys().copied().collect::<Vec<_>>(), vec![2]);
    let fix = &outcome.candidates[&2];
    assert_eq!(fix.rewrite, "It was a beautiful night.");
    assert_eq!(fix.severity, Severity::Major);
    assert_eq!(fix.confidence, Some(0.95));
    assert_eq!(fix.notes, None);
    assert_eq!(service.calls(), vec![Kind::Diagnose, Kind::Rank, Kind::Rewrite]);
}

#[tokio::test]
async fn small_transcripts_are_not_padded() {
    let service = Scripted::new(|kind, _| match kind {
        Kind::Diagnose => Ok(json!({"segments": []})),
        _ => Err(unavailable()),
    });
    let orchestrator = Orchestrator::new(service.clone(), SuggestConfig::default());
    let segments = lines(4);

    let outcome = orchestrator.run(request(&segments), &CancellationToken::new()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert!(outcome.candidates.is_empty());
    assert_eq!(service.calls(), vec![Kind::Diagnose]);
}

#[tokio::test]
async fn clean_large_transcript_is_padded_by_stride() {
    let service = Scripted::new(|kind, _| match kind {
        Kind::Diagnose => Ok(json!({"segments": (1..=12)
            .map(|n| json!({"index": n, "severity": "none", "reason": "fine", "confidence": 0.9}))
            .collect::<Vec<_>>()})),
        Kind::Rank => Err(unavailable()),
        Kind::Rewrite => Ok(json!({"segments": (1..=12)
            .map(|n| json!({"index": n, "rewrite": polished(n), "confidence": 0.7}))
            .collect::<Vec<_>>()})),
    });
    let orchestrator = Orchestrator::new(service.clone(), SuggestConfig::default());
    let segments = lines(12);

    let outcome = orchestrator.run(request(&segments), &CancellationToken::new()).await;

    // min_selected = 6 spread over 12 clean lines.
    assert_eq!(outcome.candidates.keys().copied().collect::<Vec<_>>(), vec![1, 3, 5, 7, 9, 11]);
    assert!(outcome.candidates.values().all(|c| c.severity == Severity::Minor));
    // Nothing was flagged, so no ranking call was made.
    assert_eq!(service.calls(), vec![Kind::Diagnose, Kind::Rewrite]);
}

#[tokio::test]
async fn results_are_ranked_and_capped() {
    let service = Scripted::new(|kind, _| match kind {
        Kind::Diagnose => Ok(json!({"segments": [
            {"index": 1, "severity": "minor", "reason": "case", "confidence": 0.9},
            {"index": 2, "severity": "major", "reason": "garbled", "confidence": 0.4},
            {"index": 3, "severity": "minor", "reason": "case", "confidence": 0.3}
        ]})),
        Kind::Rank => Err(unavailable()),
        Kind::Rewrite => Ok(json!({"segments": (1..=3)
            .map(|n| json!({"index": n, "rewrite": polished(n), "confidence": 0.8}))
            .collect::<Vec<_>>()})),
    });
    let config = SuggestConfig { max_selected: 2, min_selected: 1, ..SuggestConfig::default() };
    let orchestrator = Orchestrator::new(service.clone(), config);
    let segments = lines(3);

    let outcome = orchestrator.run(request(&segments), &CancellationToken::new()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.degraded, vec![Phase::Prioritize]);
    // Major first, then the more confident minor; the third is cut.
    assert_eq!(outcome.candidates.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(outcome.candidates[&2].severity, Severity::Major);
}

#[tokio::test]
async fn heuristics_flag_segments_when_diagnosis_fails() {
    let mut segments = lines(3);
    segments[1].original_text = "we went to the the store".into();

    let service = Scripted::new(|kind, _| match kind {
        Kind::Diagnose | Kind::Rank => Err(unavailable()),
        Kind::Rewrite => Ok(json!({"segments": [
            {"index": 2, "rewrite": "We went to the store.", "confidence": 0.9}
        ]})),
    });
    let orchestrator = Orchestrator::new(service.clone(), SuggestConfig::default());

    let outcome = orchestrator.run(request(&segments), &CancellationToken::new()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.candidates.len(), 1);
    assert_eq!(outcome.candidates[&2].severity, Severity::Minor);
    assert_eq!(service.calls(), vec![Kind::Diagnose, Kind::Rank, Kind::Rewrite]);
}

#[tokio::test]
async fn one_failed_batch_does_not_abort_the_run() {
    let service = Scripted::new(|kind, request| match kind {
        Kind::Diagnose if request.messages[1].content.contains("line 1 ") => Err(unavailable()),
        Kind::Diagnose => Ok(json!({"segments": [
            {"index": 3, "severity": "major", "reason": "bad", "confidence": 0.8}
        ]})),
        Kind::Rank => Ok(json!({"indices": [3]})),
        Kind::Rewrite => Ok(json!({"segments": [
            {"index": 3, "rewrite": polished(3), "confidence": 0.8}
        ]})),
    });
    let config = SuggestConfig { diagnosis_batch_size: 2, ..SuggestConfig::default() };
    let orchestrator = Orchestrator::new(service.clone(), config);
    let segments = lines(4);

    let outcome = orchestrator.run(request(&segments), &CancellationToken::new()).await;

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.degraded, vec![Phase::Diagnose]);
    assert_eq!(outcome.candidates.keys().copied().collect::<Vec<_>>(), vec![3]);
    let diagnose_calls = service.calls().iter().filter(|k| **k == Kind::Diagnose).count();
    assert_eq!(diagnose_calls, 2);
}
