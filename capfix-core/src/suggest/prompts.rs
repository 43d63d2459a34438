//! Message builders for the three service round trips.

use serde_json::{json, Value};

use crate::types::{Segment, SeverityAssessment};

use super::service::ChatMessage;

const DIAGNOSE_SYSTEM: &str = "You are a subtitle quality reviewer. For every supplied caption line decide how badly it needs rewriting.
- severity \"none\": the line reads naturally and is correct.
- severity \"minor\": small grammar, punctuation, spelling or capitalization problems.
- severity \"major\": garbled, repetitive, nonsensical or clearly mistranscribed text.
- Give a short reason and a confidence between 0 and 1.
- Return only JSON matching: {\"segments\": [{\"index\": number, \"severity\": \"none\"|\"minor\"|\"major\", \"reason\": string, \"confidence\": number}]}
- Include every supplied index exactly once. Do not rewrite anything.";

const RANK_SYSTEM: &str = "You are planning subtitle corrections under a fixed budget.
- Order the supplied caption lines from most to least urgent to fix.
- Garbled or misleading lines come before cosmetic issues.
- Return only JSON matching: {\"indices\": [number]}
- Use only supplied indices and return at most the requested number.";

const REWRITE_SYSTEM: &str = "You are a senior subtitle editor finishing captions before a video goes live.
- Rewrite only the target lines so they sound natural, fluent and correct for spoken dialogue.
- Use the full transcript for context: names, topic and tone.
- When a line is garbled or repetitive, infer the most likely intent and produce a clean sentence.
- Fix grammar, punctuation, capitalization and obvious misspellings. Remove duplicated words.
- Preserve speaker intent and proper nouns. Keep each line concise.
- Return only JSON matching: {\"segments\": [{\"index\": number, \"rewrite\": string, \"confidence\": number, \"notes\": string|null}]}
- Skip a target only when no improvement is genuinely needed.
- Do not add timestamps, numbering or commentary.";

/// Shared context lines: title and language hint.
fn header(project_title: &str, language: &str) -> String {
    let title = if project_title.trim().is_empty() { "Untitled project" } else { project_title.trim() };
    let language = if language.trim().is_empty() { "unknown" } else { language.trim() };
    format!("Project title: {title}\nLanguage: {language}")
}

fn lines(segments: &[&Segment]) -> Value {
    Value::Array(
        segments
            .iter()
            .map(|s| json!({ "index": s.index, "text": s.original_text }))
            .collect(),
    )
}

pub fn diagnose(project_title: &str, language: &str, batch: &[&Segment]) -> Vec<ChatMessage> {
    let user = format!(
        "{}\nSegments to classify:\n{:#}\nRespond with JSON only.",
        header(project_title, language),
        lines(batch),
    );
    vec![ChatMessage::system(DIAGNOSE_SYSTEM), ChatMessage::user(user)]
}

pub fn rank(
    project_title: &str,
    language: &str,
    flagged: &[(&SeverityAssessment, &Segment)],
    limit: usize,
) -> Vec<ChatMessage> {
    let payload: Vec<Value> = flagged
        .iter()
        .map(|(assessment, segment)| {
            json!({
                "index": segment.index,
                "severity": assessment.severity,
                "reason": assessment.reason,
                "text": segment.original_text,
            })
        })
        .collect();
    let user = format!(
        "{}\nReturn at most {limit} indices.\nCandidate lines:\n{:#}\nRespond with JSON only.",
        header(project_title, language),
        Value::Array(payload),
    );
    vec![ChatMessage::system(RANK_SYSTEM), ChatMessage::user(user)]
}

pub fn rewrite(
    project_title: &str,
    language: &str,
    transcript: &[&Segment],
    targets: &[SeverityAssessment],
) -> Vec<ChatMessage> {
    let targets: Vec<Value> = targets
        .iter()
        .map(|t| json!({ "index": t.index, "severity": t.severity, "reason": t.reason }))
        .collect();
    let user = format!(
        "{}\nFull transcript:\n{:#}\nTarget lines to rewrite:\n{:#}\nRespond with JSON only.",
        header(project_title, language),
        lines(transcript),
        Value::Array(targets),
    );
    vec![ChatMessage::system(REWRITE_SYSTEM), ChatMessage::user(user)]
}
