//! SubRip / WebVTT transcript parsing and SubRip serialization.
//!
//! Parsing is lenient about container details (byte-order mark, `WEBVTT`
//! header, `NOTE`/`STYLE`/`REGION` blocks, cue identifiers, cue settings) but
//! strict about timing: every retained block must carry a `-->` timing line.
//! Serialization always renumbers cues sequentially.

use std::collections::HashSet;

use crate::error::TranscriptError;
use crate::timestamp::{format_timestamp, parse_timestamp};
use crate::types::Segment;

/// Separator between the start and end timestamps of a cue.
pub const TIMING_SEPARATOR: &str = "-->";

const CONTAINER_HEADER: &str = "WEBVTT";
const METADATA_KEYWORDS: [&str; 3] = ["NOTE", "STYLE", "REGION"];
const BYTE_ORDER_MARK: char = '\u{feff}';

/// Parses raw transcript text into segments, in file order.
///
/// Indices come from the numeric line preceding a timing line when it is
/// positive; otherwise a segment takes `position + 1`, where `position`
/// counts the retained (non-metadata) blocks from zero. Segments are not
/// re-sorted, and inverted ranges (`start > end`) are passed through.
///
/// # Errors
///
/// - `EmptyTranscript` when nothing but a header and whitespace remains.
/// - `MalformedBlock` when a block has no usable timing line.
/// - `MalformedTimestamp` when either side of a timing line fails to decode.
/// - `DuplicateIndex` when two blocks end up with the same index.
/// - `NoSegmentsFound` when every block was metadata.
pub fn parse(raw: &str) -> Result<Vec<Segment>, TranscriptError> {
    let body = strip_container_header(raw).ok_or(TranscriptError::EmptyTranscript)?;
    let body = body.replace('\r', "");
    let body = body.trim();
    if body.is_empty() {
        return Err(TranscriptError::EmptyTranscript);
    }

    let mut segments: Vec<Segment> = Vec::new();
    let mut seen = HashSet::new();
    for lines in split_blocks(body) {
        if is_metadata_block(&lines) {
            continue;
        }
        let position = segments.len();
        let segment = parse_block(&lines, position)?;
        if !seen.insert(segment.index) {
            return Err(TranscriptError::DuplicateIndex {
                block: position + 1,
                index: segment.index,
            });
        }
        segments.push(segment);
    }

    if segments.is_empty() {
        return Err(TranscriptError::NoSegmentsFound);
    }
    Ok(segments)
}

/// One cue handed to [`serialize`]: timings plus the text to write out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedText<'a> {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: &'a str,
}

impl<'a> TimedText<'a> {
    pub fn new(start_ms: u64, end_ms: u64, text: &'a str) -> Self {
        Self { start_ms, end_ms, text }
    }

    /// Uses the segment's original text.
    pub fn original(segment: &'a Segment) -> Self {
        Self::new(segment.start_ms, segment.end_ms, &segment.original_text)
    }
}

/// Renders cues as SubRip text, numbering them `1..=n` in the given order.
///
/// # Errors
///
/// Returns `TranscriptError::EmptySegments` when `cues` is empty.
pub fn serialize(cues: &[TimedText<'_>]) -> Result<String, TranscriptError> {
    if cues.is_empty() {
        return Err(TranscriptError::EmptySegments);
    }

    let blocks: Vec<String> = cues
        .iter()
        .enumerate()
        .map(|(i, cue)| {
            format!(
                "{}\n{} {TIMING_SEPARATOR} {}\n{}\n",
                i + 1,
                format_timestamp(cue.start_ms),
                format_timestamp(cue.end_ms),
                cue.text
            )
        })
        .collect();
    Ok(blocks.join("\n"))
}

/// Removes a leading byte-order mark and `WEBVTT` header.
///
/// Returns `None` when a header is present but never terminated by a blank
/// line: such a document has no cues.
fn strip_container_header(raw: &str) -> Option<&str> {
    let content = raw.strip_prefix(BYTE_ORDER_MARK).unwrap_or(raw);
    if !content.starts_with(CONTAINER_HEADER) {
        return Some(content);
    }

    let bytes = content.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let run = newline_run(&bytes[i..]);
        if run.newlines >= 2 {
            return Some(&content[i + run.len..]);
        }
        i += run.len.max(1);
    }
    None
}

struct NewlineRun {
    len: usize,
    newlines: usize,
}

/// Measures a run of consecutive `\n` / `\r\n` line breaks at the start of `bytes`.
fn newline_run(bytes: &[u8]) -> NewlineRun {
    let mut len = 0;
    let mut newlines = 0;
    loop {
        match &bytes[len..] {
            [b'\r', b'\n', ..] => len += 2,
            [b'\n', ..] => len += 1,
            _ => break,
        }
        newlines += 1;
    }
    NewlineRun { len, newlines }
}

/// Splits text into blocks separated by blank (or whitespace-only) lines.
/// Empty lines never appear inside a returned block.
fn split_blocks(body: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in body.split('\n') {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn is_metadata_block(lines: &[&str]) -> bool {
    let first = lines.first().map(|l| l.trim().to_uppercase()).unwrap_or_default();
    METADATA_KEYWORDS.iter().any(|kw| first.starts_with(kw))
}

fn parse_block(lines: &[&str], position: usize) -> Result<Segment, TranscriptError> {
    let block = position + 1;
    let (first, rest) = lines.split_first().ok_or(TranscriptError::MalformedBlock {
        block,
        reason: "block is empty",
    })?;

    let explicit_index = parse_index(first);
    let (timing, text_lines) = if explicit_index.is_some() || !first.contains(TIMING_SEPARATOR) {
        // Numeric index or cue identifier: the timing line must follow it.
        match rest.split_first() {
            Some((timing, text)) if timing.contains(TIMING_SEPARATOR) => (*timing, text),
            Some(_) => {
                return Err(TranscriptError::MalformedBlock {
                    block,
                    reason: "timing line is missing the --> separator",
                })
            }
            None => {
                return Err(TranscriptError::MalformedBlock {
                    block,
                    reason: "missing timing line",
                })
            }
        }
    } else {
        (*first, rest)
    };

    let (start_raw, end_raw) = split_timing(timing);
    let start_ms = parse_timestamp(start_raw).map_err(|e| e.in_block(block))?;
    let end_ms = parse_timestamp(end_raw).map_err(|e| e.in_block(block))?;

    let text = text_lines.join("\n").trim().to_owned();
    let index = explicit_index
        .filter(|&i| i > 0)
        .unwrap_or_else(|| u32::try_from(block).unwrap_or(u32::MAX));

    Ok(Segment::new(index, start_ms, end_ms, text))
}

/// Reads a purely numeric first line as a cue index.
fn parse_index(line: &str) -> Option<u32> {
    let trimmed = line.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Over-long digit runs still count as an index line, just not a usable one.
    Some(trimmed.parse().unwrap_or(0))
}

/// Splits a timing line into start and end timestamp text, dropping any
/// WebVTT cue settings that follow the end timestamp.
fn split_timing(line: &str) -> (&str, &str) {
    let mut parts = line.split(TIMING_SEPARATOR);
    let start = parts.next().unwrap_or_default().trim();
    let end = parts
        .next()
        .unwrap_or_default()
        .split_whitespace()
        .next()
        .unwrap_or_default();
    (start, end)
}
