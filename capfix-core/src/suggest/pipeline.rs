//! The multi-phase suggestion run: diagnose, prioritize, rewrite, validate,
//! rank and cap.
//!
//! A run never returns an error. Every service call is bounded by the
//! configured deadline and the caller's cancellation token, and a failed
//! call only removes that phase's contribution. The worst case is an empty
//! candidate map with status [`RunStatus::FailedSoft`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::SuggestConfig;
use crate::error::ServiceError;
use crate::types::{RewriteCandidate, Segment, Severity, SeverityAssessment};
use crate::validate::evaluate;

use super::heuristics;
use super::prompts;
use super::service::{
    decode_ranking, decode_segments, ChatMessage, ChatRequest, DiagnosisItem, GenerativeService,
    RewriteItem,
};

/// Confidence given to segments flagged by heuristics alone.
const HEURISTIC_CONFIDENCE: f64 = 0.4;
/// Confidence given to padded generic targets.
const PADDING_CONFIDENCE: f64 = 0.2;
/// Used when the service omits a confidence.
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Input for one run.
#[derive(Debug, Clone, Copy)]
pub struct SuggestionRequest<'a> {
    pub segments: &'a [Segment],
    pub project_title: &'a str,
    pub language: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    FailedSoft,
}

/// Phases that can lose their service contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Diagnose,
    Prioritize,
    Rewrite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionOutcome {
    pub status: RunStatus,
    /// Validated rewrites keyed by segment index.
    pub candidates: BTreeMap<u32, RewriteCandidate>,
    /// Phases whose service call failed at least once.
    pub degraded: Vec<Phase>,
}

impl SuggestionOutcome {
    fn completed(candidates: BTreeMap<u32, RewriteCandidate>, degraded: Vec<Phase>) -> Self {
        Self { status: RunStatus::Completed, candidates, degraded }
    }

    fn failed_soft(degraded: Vec<Phase>) -> Self {
        Self { status: RunStatus::FailedSoft, candidates: BTreeMap::new(), degraded }
    }
}

/// Drives suggestion runs against one injected service.
///
/// Holds no per-run state, so a single orchestrator can serve concurrent
/// runs for different transcripts.
pub struct Orchestrator {
    service: Arc<dyn GenerativeService>,
    config: SuggestConfig,
}

/// A rewrite that passed validation, with what phase 5 sorts on.
struct Accepted {
    target: SeverityAssessment,
    item: RewriteItem,
    rewrite: String,
    changed_chars: usize,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn GenerativeService>, config: SuggestConfig) -> Self {
        Self { service, config: config.sanitized() }
    }

    /// Runs every phase and returns the validated rewrites.
    pub async fn run(&self, request: SuggestionRequest<'_>, cancel: &CancellationToken) -> SuggestionOutcome {
        let working: Vec<&Segment> = request
            .segments
            .iter()
            .take(self.config.max_segments)
            .filter(|s| !s.original_text.trim().is_empty())
            .collect();
        if working.is_empty() {
            return SuggestionOutcome::completed(BTreeMap::new(), Vec::new());
        }
        if request.segments.len() > self.config.max_segments {
            tracing::info!(
                requested = request.segments.len(),
                processed = self.config.max_segments,
                "limiting segments for suggestions"
            );
        }

        let mut degraded = Vec::new();

        tracing::info!(segments = working.len(), "diagnosing segments");
        let assessments = self.diagnose(request, &working, cancel, &mut degraded).await;
        if cancel.is_cancelled() {
            tracing::warn!("suggestion run cancelled after diagnosis");
            return SuggestionOutcome::failed_soft(degraded);
        }

        let targets = self.prioritize(request, &working, &assessments, cancel, &mut degraded).await;
        if cancel.is_cancelled() {
            tracing::warn!("suggestion run cancelled after prioritization");
            return SuggestionOutcome::failed_soft(degraded);
        }
        if targets.is_empty() {
            tracing::info!("no segments selected for rewriting");
            return SuggestionOutcome::completed(BTreeMap::new(), degraded);
        }

        tracing::info!(targets = targets.len(), "requesting rewrites");
        let messages = prompts::rewrite(request.project_title, request.language, &working, &targets);
        let items = match self.call(messages, cancel).await.and_then(decode_segments::<RewriteItem>) {
            Ok(items) => items,
            Err(err) => {
                tracing::warn!(error = %err, "rewrite request failed; no suggestions this run");
                degraded.push(Phase::Rewrite);
                return SuggestionOutcome::failed_soft(degraded);
            }
        };

        let accepted = self.validate(&working, &targets, items);
        let candidates = self.rank_and_cap(accepted);
        tracing::info!(candidates = candidates.len(), "suggestion run complete");
        SuggestionOutcome::completed(candidates, degraded)
    }

    /// One service round trip bounded by the request deadline and `cancel`.
    async fn call(&self, messages: Vec<ChatMessage>, cancel: &CancellationToken) -> Result<Value, ServiceError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            messages,
        };
        let deadline = Duration::from_millis(self.config.request_timeout_ms);
        tokio::select! {
            _ = cancel.cancelled() => Err(ServiceError::Cancelled),
            result = tokio::time::timeout(deadline, self.service.complete_json(request)) => match result {
                Ok(reply) => reply,
                Err(_) => Err(ServiceError::Timeout(self.config.request_timeout_ms)),
            },
        }
    }

    /// Phase 1. Every working segment gets an assessment, heuristic-only
    /// when its batch failed.
    async fn diagnose(
        &self,
        request: SuggestionRequest<'_>,
        working: &[&Segment],
        cancel: &CancellationToken,
        degraded: &mut Vec<Phase>,
    ) -> BTreeMap<u32, SeverityAssessment> {
        let hints: HashMap<u32, Vec<heuristics::Hint>> = working
            .iter()
            .map(|s| (s.index, heuristics::inspect(&s.original_text)))
            .collect();

        let mut assessments: BTreeMap<u32, SeverityAssessment> = working
            .iter()
            .map(|s| {
                let found = hints.get(&s.index).map(Vec::as_slice).unwrap_or_default();
                let assessment = if found.is_empty() {
                    SeverityAssessment {
                        index: s.index,
                        severity: Severity::None,
                        reason: String::new(),
                        confidence: 0.0,
                    }
                } else {
                    SeverityAssessment {
                        index: s.index,
                        severity: Severity::Minor,
                        reason: heuristics::describe(found),
                        confidence: HEURISTIC_CONFIDENCE,
                    }
                };
                (s.index, assessment)
            })
            .collect();

        let batches: Vec<&[&Segment]> = working.chunks(self.config.diagnosis_batch_size).collect();
        let total = batches.len();
        let replies: Vec<(usize, &[&Segment], Result<Vec<DiagnosisItem>, ServiceError>)> =
            stream::iter(
                batches
                    .into_iter()
                    .enumerate()
                    .map(|(n, batch)| async move {
                        let messages = prompts::diagnose(request.project_title, request.language, batch);
                        let reply = self.call(messages, cancel).await.and_then(decode_segments::<DiagnosisItem>);
                        (n, batch, reply)
                    })
                    .collect::<Vec<_>>(),
            )
                .buffer_unordered(self.config.diagnosis_concurrency)
                .collect()
                .await;

        let mut failed = 0;
        for (n, batch, reply) in replies {
            let items = match reply {
                Ok(items) => items,
                Err(err) => {
                    failed += 1;
                    tracing::warn!(batch = n, error = %err, "diagnosis batch failed; using heuristics only");
                    continue;
                }
            };
            tracing::debug!(batch = n, received = items.len(), "diagnosis batch done");

            let in_batch: HashSet<u32> = batch.iter().map(|s| s.index).collect();
            for item in items.into_iter().filter(|item| in_batch.contains(&item.index)) {
                let found = hints.get(&item.index).map(Vec::as_slice).unwrap_or_default();
                let mut severity = item.severity;
                let mut reason = item.reason.map(|r| r.trim().to_owned()).unwrap_or_default();
                if !found.is_empty() {
                    if severity == Severity::None {
                        severity = Severity::Minor;
                    }
                    let described = heuristics::describe(found);
                    reason = if reason.is_empty() { described } else { format!("{reason}; {described}") };
                }
                assessments.insert(
                    item.index,
                    SeverityAssessment {
                        index: item.index,
                        severity,
                        reason,
                        confidence: clamp_unit(item.confidence.unwrap_or(DEFAULT_CONFIDENCE)),
                    },
                );
            }
        }

        if failed > 0 {
            degraded.push(Phase::Diagnose);
        }
        tracing::info!(batches = total, failed, "diagnosis finished");
        assessments
    }

    /// Phase 2. Picks at most `max_selected` targets, padding with generic
    /// targets on larger transcripts.
    async fn prioritize(
        &self,
        request: SuggestionRequest<'_>,
        working: &[&Segment],
        assessments: &BTreeMap<u32, SeverityAssessment>,
        cancel: &CancellationToken,
        degraded: &mut Vec<Phase>,
    ) -> Vec<SeverityAssessment> {
        let cap = self.config.max_selected;
        let floor = self.config.min_selected.min(cap);

        let mut flagged: Vec<&SeverityAssessment> =
            assessments.values().filter(|a| a.severity != Severity::None).collect();
        flagged.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(b.confidence.total_cmp(&a.confidence))
                .then(a.index.cmp(&b.index))
        });

        let mut order: Vec<u32> = Vec::new();
        if !flagged.is_empty() {
            let by_index: HashMap<u32, &Segment> = working.iter().map(|s| (s.index, *s)).collect();
            let listed: Vec<(&SeverityAssessment, &Segment)> = flagged
                .iter()
                .filter_map(|a| by_index.get(&a.index).map(|s| (*a, *s)))
                .collect();
            let messages = prompts::rank(request.project_title, request.language, &listed, cap);
            match self.call(messages, cancel).await.and_then(decode_ranking) {
                Ok(reply) => {
                    let known: HashSet<u32> = flagged.iter().map(|a| a.index).collect();
                    let mut seen = HashSet::new();
                    order = reply
                        .indices
                        .into_iter()
                        .filter(|i| known.contains(i) && seen.insert(*i))
                        .take(cap)
                        .collect();
                    tracing::debug!(ranked = order.len(), "service ranking received");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "prioritization failed; using local ranking");
                    degraded.push(Phase::Prioritize);
                }
            }
        }

        if order.len() < floor.max(1) {
            let chosen: HashSet<u32> = order.iter().copied().collect();
            order.extend(flagged.iter().map(|a| a.index).filter(|i| !chosen.contains(i)));
            order.truncate(cap);
        }

        let mut targets: Vec<SeverityAssessment> =
            order.iter().filter_map(|i| assessments.get(i).cloned()).collect();

        if working.len() >= self.config.padding_threshold && targets.len() < floor {
            let chosen: HashSet<u32> = order.iter().copied().collect();
            let pool: Vec<u32> = assessments
                .values()
                .filter(|a| a.severity == Severity::None && !chosen.contains(&a.index))
                .map(|a| a.index)
                .collect();
            let padded = spread(&pool, floor - targets.len());
            tracing::debug!(padded = padded.len(), "padding rewrite targets");
            targets.extend(padded.into_iter().map(|index| SeverityAssessment {
                index,
                severity: Severity::Minor,
                reason: "general polish".to_owned(),
                confidence: PADDING_CONFIDENCE,
            }));
        }

        targets
    }

    /// Phase 4. Drops unknown indices, blank rewrites, duplicates and
    /// anything the validator rejects.
    fn validate(
        &self,
        working: &[&Segment],
        targets: &[SeverityAssessment],
        items: Vec<RewriteItem>,
    ) -> Vec<Accepted> {
        let limits = self.config.acceptance_limits();
        let originals: HashMap<u32, &str> =
            working.iter().map(|s| (s.index, s.original_text.as_str())).collect();
        let by_index: HashMap<u32, &SeverityAssessment> = targets.iter().map(|t| (t.index, t)).collect();

        let mut seen = HashSet::new();
        let mut accepted = Vec::new();
        for item in items {
            let Some(target) = by_index.get(&item.index) else {
                tracing::debug!(index = item.index, "rewrite for unrequested segment dropped");
                continue;
            };
            let Some(original) = originals.get(&item.index) else { continue };
            let rewrite = item.rewrite.as_deref().map(str::trim).unwrap_or_default().to_owned();
            if rewrite.is_empty() || !seen.insert(item.index) {
                continue;
            }
            match evaluate(original, &rewrite, &limits) {
                Ok(changed_chars) => accepted.push(Accepted {
                    target: (*target).clone(),
                    item,
                    rewrite,
                    changed_chars,
                }),
                Err(rejection) => {
                    tracing::debug!(index = item.index, ?rejection, "rewrite rejected");
                }
            }
        }
        accepted
    }

    /// Phase 5.
    fn rank_and_cap(&self, mut accepted: Vec<Accepted>) -> BTreeMap<u32, RewriteCandidate> {
        accepted.sort_by(|a, b| {
            b.target
                .severity
                .cmp(&a.target.severity)
                .then(b.target.confidence.total_cmp(&a.target.confidence))
                .then(b.changed_chars.cmp(&a.changed_chars))
                .then(a.target.index.cmp(&b.target.index))
        });
        accepted.truncate(self.config.max_selected);

        accepted
            .into_iter()
            .map(|a| {
                let notes = a.item.notes.map(|n| n.trim().to_owned()).filter(|n| !n.is_empty());
                let candidate = RewriteCandidate {
                    index: a.target.index,
                    rewrite: a.rewrite,
                    confidence: a.item.confidence.map(clamp_unit),
                    notes,
                    severity: a.target.severity,
                };
                (candidate.index, candidate)
            })
            .collect()
    }
}

/// Picks `need` entries from `pool` at an even stride, in pool order.
fn spread(pool: &[u32], need: usize) -> Vec<u32> {
    if need == 0 || pool.is_empty() {
        return Vec::new();
    }
    if need >= pool.len() {
        return pool.to_vec();
    }
    (0..need).map(|i| pool[i * pool.len() / need]).collect()
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
