use serde::{Deserialize, Serialize};

/// One timed caption unit parsed from a transcript.
///
/// `original_text` never changes after parsing. `proposed_text` starts as a
/// copy of it and is replaced when the suggestion pipeline produces an
/// accepted rewrite; `edited_text` holds a reviewer's manual override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub index: u32,
    pub start_ms: u64,
    pub end_ms: u64,
    pub original_text: String,
    pub proposed_text: String,
    pub accepted: bool,
    pub edited_text: Option<String>,
}

impl Segment {
    /// Creates a freshly parsed segment with no rewrite and no review state.
    pub fn new(index: u32, start_ms: u64, end_ms: u64, original_text: impl Into<String>) -> Self {
        let original_text = original_text.into();
        Self {
            index,
            start_ms,
            end_ms,
            proposed_text: original_text.clone(),
            original_text,
            accepted: false,
            edited_text: None,
        }
    }

    /// The text a reviewer currently sees for this segment.
    pub fn display_text(&self) -> &str {
        resolve_display_text(
            self.edited_text.as_deref(),
            Some(&self.proposed_text),
            &self.original_text,
        )
    }

    /// The text written out at export time: the display text when the
    /// segment is accepted, the untouched original otherwise.
    pub fn export_text(&self) -> &str {
        if self.accepted {
            self.display_text()
        } else {
            &self.original_text
        }
    }
}

/// Resolves the current display text with precedence edited → proposed →
/// original. Blank candidates count as absent.
pub fn resolve_display_text<'a>(
    edited: Option<&'a str>,
    proposed: Option<&'a str>,
    original: &'a str,
) -> &'a str {
    [edited, proposed]
        .into_iter()
        .flatten()
        .find(|text| !text.trim().is_empty())
        .unwrap_or(original)
}

/// How badly a segment needs rewriting, as judged by the diagnosis phase.
///
/// Ordered so that `Major > Minor > None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Minor,
    Major,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Minor => "minor",
            Severity::Major => "major",
        }
    }
}

/// Diagnosis-phase verdict for one segment. Lives only for a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct SeverityAssessment {
    pub index: u32,
    pub severity: Severity,
    pub reason: String,
    /// Clamped to `[0, 1]`.
    pub confidence: f64,
}

/// A validated rewrite returned by the suggestion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteCandidate {
    pub index: u32,
    pub rewrite: String,
    pub confidence: Option<f64>,
    pub notes: Option<String>,
    pub severity: Severity,
}

/// Lifecycle of a stored project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Processing,
    #[default]
    Review,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Processing => "processing",
            ProjectStatus::Review => "review",
        }
    }

    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "processing" => ProjectStatus::Processing,
            _ => ProjectStatus::Review,
        }
    }
}

/// A transcript under review, owned by a single user.
///
/// Projects are keyed by UUID v4 text. Segments are kept sorted by `index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,           // UUID v4 text
    pub owner: String,
    pub title: String,
    pub status: ProjectStatus,
    pub source_file_name: Option<String>,
    pub language: Option<String>,
    pub created_at: i64,      // Unix timestamp seconds
    pub segments: Vec<Segment>,
}

impl Project {
    /// Builds a new project with a fresh id, sorting `segments` by index.
    pub fn new(owner: impl Into<String>, title: impl Into<String>, mut segments: Vec<Segment>) -> Self {
        segments.sort_by_key(|s| s.index);
        let title = title.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.into(),
            title: if title.trim().is_empty() { "Untitled project".to_owned() } else { title },
            status: ProjectStatus::Review,
            source_file_name: None,
            language: None,
            created_at: crate::now_secs(),
            segments,
        }
    }

    pub fn accepted_count(&self) -> usize {
        self.segments.iter().filter(|s| s.accepted).count()
    }
}

/// A reviewer action against one segment, addressed by its index.
///
/// Fields left as `None` are untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentUpdate {
    pub index: u32,
    pub accepted: Option<bool>,
    pub edited_text: Option<String>,
    pub proposed_text: Option<String>,
}

impl SegmentUpdate {
    pub fn accept(index: u32, accepted: bool) -> Self {
        Self { index, accepted: Some(accepted), ..Default::default() }
    }

    pub fn edit(index: u32, text: impl Into<String>) -> Self {
        Self { index, edited_text: Some(text.into()), ..Default::default() }
    }

    /// One acceptance update per segment, for accept-all / reject-all.
    pub fn accept_all(segments: &[Segment], accepted: bool) -> Vec<Self> {
        segments.iter().map(|s| Self::accept(s.index, accepted)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_none() && self.edited_text.is_none() && self.proposed_text.is_none()
    }

    /// Applies this update to `segment`.
    ///
    /// A new proposal without an explicit edit also replaces an edited text
    /// that merely mirrored the original.
    pub fn apply_to(&self, segment: &mut Segment) {
        if let Some(accepted) = self.accepted {
            segment.accepted = accepted;
        }
        if let Some(edited) = &self.edited_text {
            segment.edited_text = Some(edited.clone());
        }
        if let Some(proposed) = &self.proposed_text {
            segment.proposed_text = proposed.clone();
            if self.edited_text.is_none()
                && segment.edited_text.as_deref() == Some(segment.original_text.as_str())
            {
                segment.edited_text = Some(proposed.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_text_precedence() {
        let mut seg = Segment::new(1, 0, 1000, "orig");
        assert_eq!(seg.display_text(), "orig");

        seg.proposed_text = "proposed".into();
        assert_eq!(seg.display_text(), "proposed");

        seg.edited_text = Some("edited".into());
        assert_eq!(seg.display_text(), "edited");

        seg.edited_text = Some("   ".into());
        assert_eq!(seg.display_text(), "proposed");

        seg.proposed_text = String::new();
        assert_eq!(seg.display_text(), "orig");
    }

    #[test]
    fn export_text_honours_acceptance() {
        let mut seg = Segment::new(1, 0, 1000, "orig");
        seg.proposed_text = "better".into();
        assert_eq!(seg.export_text(), "orig");
        seg.accepted = true;
        assert_eq!(seg.export_text(), "better");
    }

    #[test]
    fn proposal_update_refreshes_mirrored_edit() {
        let mut seg = Segment::new(4, 0, 1000, "orig");
        seg.edited_text = Some("orig".into());
        SegmentUpdate { index: 4, proposed_text: Some("new".into()), ..Default::default() }
            .apply_to(&mut seg);
        assert_eq!(seg.proposed_text, "new");
        assert_eq!(seg.edited_text.as_deref(), Some("new"));

        seg.edited_text = Some("hand written".into());
        SegmentUpdate { index: 4, proposed_text: Some("newer".into()), ..Default::default() }
            .apply_to(&mut seg);
        assert_eq!(seg.edited_text.as_deref(), Some("hand written"));
    }

    #[test]
    fn severity_orders_major_first() {
        let mut all = vec![Severity::Minor, Severity::Major, Severity::None];
        all.sort_by(|a, b| b.cmp(a));
        assert_eq!(all, vec![Severity::Major, Severity::Minor, Severity::None]);
    }
}
