//! Terminal output for projects, segments and word diffs.
//!
//! Colour comes from crossterm and is turned off when stdout is not a
//! terminal or `NO_COLOR` is set; plain output marks changes as
//! `[-deleted-]{+inserted+}`.

use std::io::IsTerminal;

use capfix_core::store::ProjectSummary;
use capfix_core::timestamp::format_timestamp;
use capfix_core::{diff_words, DiffKind, DiffToken, Project, Rejection, Segment};
use crossterm::style::{Color, Stylize};

/// Colours used for each kind of output.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub enabled: bool,
    pub inserted: Color,
    pub deleted: Color,
    pub accepted: Color,
    pub muted: Color,
}

impl Palette {
    pub fn detect() -> Self {
        let enabled = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
        Self { enabled, ..Self::plain() }
    }

    pub fn plain() -> Self {
        Self {
            enabled: false,
            inserted: Color::Green,
            deleted: Color::Red,
            accepted: Color::Cyan,
            muted: Color::DarkGrey,
        }
    }
}

/// Renders a diff inline.
pub fn diff(tokens: &[DiffToken], palette: &Palette) -> String {
    let mut out = String::new();
    for token in tokens {
        let value = token.value.as_str();
        match (token.kind, palette.enabled) {
            (DiffKind::Equal, _) => out.push_str(value),
            (DiffKind::Delete, true) => out.push_str(&value.with(palette.deleted).crossed_out().to_string()),
            (DiffKind::Insert, true) => out.push_str(&value.with(palette.inserted).bold().to_string()),
            (DiffKind::Delete, false) => out.push_str(&format!("[-{value}-]")),
            (DiffKind::Insert, false) => out.push_str(&format!("{{+{value}+}}")),
        }
    }
    out
}

fn muted(text: &str, palette: &Palette) -> String {
    if palette.enabled {
        text.with(palette.muted).to_string()
    } else {
        text.to_owned()
    }
}

/// One line per project, newest first.
pub fn project_list(projects: &[ProjectSummary], palette: &Palette) -> String {
    if projects.is_empty() {
        return "no projects\n".to_owned();
    }
    let mut out = String::new();
    for p in projects {
        let id = p.id.get(..8).unwrap_or(&p.id);
        out.push_str(&format!(
            "{}  {:<10} {:>4} segments {:>4} accepted  {}\n",
            muted(id, palette),
            p.status.as_str(),
            p.segment_count,
            p.accepted_count,
            p.title,
        ));
    }
    out
}

fn segment_header(segment: &Segment, palette: &Palette) -> String {
    let mut header = format!(
        "#{} {} --> {}",
        segment.index,
        format_timestamp(segment.start_ms),
        format_timestamp(segment.end_ms)
    );
    if segment.start_ms > segment.end_ms {
        header.push_str(" (inverted)");
    }
    let header = muted(&header, palette);
    if !segment.accepted {
        return header;
    }
    let badge = if palette.enabled { "accepted".with(palette.accepted).to_string() } else { "accepted".to_owned() };
    format!("{header} [{badge}]")
}

/// A segment with its original text diffed against the current display text.
pub fn segment(segment: &Segment, palette: &Palette) -> String {
    let current = segment.display_text();
    let body = if current == segment.original_text {
        segment.original_text.clone()
    } else {
        diff(&diff_words(&segment.original_text, current), palette)
    };
    format!("{}\n{}\n", segment_header(segment, palette), body)
}

/// Project header followed by its segments. Unchanged segments are
/// skipped unless `all` is set.
pub fn project(project: &Project, all: bool, palette: &Palette) -> String {
    let changed = project
        .segments
        .iter()
        .filter(|s| s.display_text() != s.original_text)
        .count();
    let mut out = format!(
        "{} ({})\n{}\n\n",
        project.title,
        project.status.as_str(),
        muted(
            &format!(
                "{} segments, {} with changes, {} accepted  id {}",
                project.segments.len(),
                changed,
                project.accepted_count(),
                project.id
            ),
            palette
        ),
    );
    for s in project.segments.iter().filter(|s| all || s.display_text() != s.original_text) {
        out.push_str(&segment(s, palette));
        out.push('\n');
    }
    out
}

pub fn rejection(rejection: &Rejection) -> String {
    match rejection {
        Rejection::NoOp => "no change".to_owned(),
        Rejection::WhitespaceOnly => "only whitespace or punctuation changed".to_owned(),
        Rejection::LengthRatio(ratio) => format!("length ratio {ratio:.2} out of bounds"),
        Rejection::Incompatible { changed_chars } => {
            format!("{changed_chars} changed characters and wording too far from the original")
        }
        Rejection::Degenerate => "change too small to matter".to_owned(),
    }
}
