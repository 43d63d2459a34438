//! Turning reviewed segments back into a downloadable transcript.

use std::collections::BTreeMap;

use crate::error::TranscriptError;
use crate::transcript::{serialize, TimedText};
use crate::types::{RewriteCandidate, Segment, SegmentUpdate};

/// Serializes `segments` in index order, each with its export text.
///
/// # Errors
///
/// `EmptySegments` when there is nothing to export.
pub fn export_transcript(segments: &[Segment]) -> Result<String, TranscriptError> {
    let mut ordered: Vec<&Segment> = segments.iter().collect();
    ordered.sort_by_key(|s| s.index);
    let cues: Vec<TimedText<'_>> = ordered
        .iter()
        .map(|s| TimedText::new(s.start_ms, s.end_ms, s.export_text()))
        .collect();
    serialize(&cues)
}

/// `<stem>.srt` from the uploaded file name, else from the title, else `export.srt`.
pub fn export_file_name(source_file_name: Option<&str>, title: &str) -> String {
    let stem = source_file_name
        .map(|name| {
            let name = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
            match name.rsplit_once('.') {
                Some((stem, ext)) if !ext.is_empty() => stem,
                _ => name,
            }
        })
        .filter(|stem| !stem.is_empty())
        .or_else(|| Some(title.trim()).filter(|t| !t.is_empty()))
        .unwrap_or("export");
    format!("{stem}.srt")
}

/// Writes each candidate into its segment's proposal and marks it accepted.
///
/// Returns how many segments changed. Candidates for unknown indices are
/// ignored.
pub fn apply_candidates(segments: &mut [Segment], candidates: &BTreeMap<u32, RewriteCandidate>) -> usize {
    let mut applied = 0;
    for segment in segments.iter_mut() {
        if let Some(candidate) = candidates.get(&segment.index) {
            SegmentUpdate {
                index: segment.index,
                accepted: Some(true),
                proposed_text: Some(candidate.rewrite.clone()),
                edited_text: None,
            }
            .apply_to(segment);
            applied += 1;
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::parse;
    use crate::types::Severity;

    #[test]
    fn export_uses_accepted_text_in_index_order() {
        let mut second = Segment::new(2, 3000, 4000, "orignal two");
        second.proposed_text = "original two".into();
        second.accepted = true;
        let mut first = Segment::new(1, 1000, 2000, "one");
        first.proposed_text = "ONE".into();

        let out = export_transcript(&[second, first]).unwrap();
        assert_eq!(
            out,
            "1\n00:00:01,000 --> 00:00:02,000\none\n\n2\n00:00:03,000 --> 00:00:04,000\noriginal two\n"
        );
    }

    #[test]
    fn edited_text_wins_when_accepted() {
        let mut seg = Segment::new(7, 0, 500, "hi");
        seg.proposed_text = "Hi.".into();
        seg.edited_text = Some("Hello.".into());
        seg.accepted = true;
        let out = export_transcript(&[seg]).unwrap();
        assert!(out.ends_with("Hello.\n"));
    }

    #[test]
    fn export_of_nothing_fails() {
        assert_eq!(export_transcript(&[]), Err(TranscriptError::EmptySegments));
    }

    #[test]
    fn file_names() {
        assert_eq!(export_file_name(Some("talk.en.vtt"), "Talk"), "talk.en.srt");
        assert_eq!(export_file_name(Some("/tmp/clips/intro.srt"), "x"), "intro.srt");
        assert_eq!(export_file_name(Some("noext"), "x"), "noext.srt");
        assert_eq!(export_file_name(Some(".srt"), "My talk"), "My talk.srt");
        assert_eq!(export_file_name(None, "  "), "export.srt");
    }

    #[test]
    fn applied_candidates_survive_export() {
        let mut segments = parse("1\n00:00:01,000 --> 00:00:02,000\nthe the end\n\n2\n00:00:03,000 --> 00:00:04,000\nfine").unwrap();
        let mut candidates = BTreeMap::new();
        candidates.insert(
            1,
            RewriteCandidate {
                index: 1,
                rewrite: "The end.".into(),
                confidence: Some(0.8),
                notes: None,
                severity: Severity::Minor,
            },
        );
        candidates.insert(
            9,
            RewriteCandidate {
                index: 9,
                rewrite: "ghost".into(),
                confidence: None,
                notes: None,
                severity: Severity::Major,
            },
        );

        assert_eq!(apply_candidates(&mut segments, &candidates), 1);
        assert!(segments[0].accepted);
        assert!(!segments[1].accepted);

        let out = export_transcript(&segments).unwrap();
        assert!(out.contains("The end.\n"));
        assert!(out.contains("fine\n"));
    }
}
