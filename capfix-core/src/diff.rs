//! Word-level diff between two caption lines.
//!
//! Both strings are tokenized into maximal runs of non-whitespace ("words")
//! and whitespace, aligned with a longest-common-subsequence table, and the
//! resulting operations are merged into runs. Used for the review display
//! and by the acceptance validator.

use serde::{Deserialize, Serialize};

/// Alignment class of a diff run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Equal,
    Insert,
    Delete,
}

/// A run of contiguous tokens sharing one alignment class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffToken {
    #[serde(rename = "type")]
    pub kind: DiffKind,
    pub value: String,
}

impl DiffToken {
    fn new(kind: DiffKind, value: &str) -> Self {
        Self { kind, value: value.to_owned() }
    }

    /// True for runs that exist only on the left-hand side or on both sides.
    pub fn in_original(&self) -> bool {
        matches!(self.kind, DiffKind::Equal | DiffKind::Delete)
    }

    /// True for runs that exist only on the right-hand side or on both sides.
    pub fn in_edited(&self) -> bool {
        matches!(self.kind, DiffKind::Equal | DiffKind::Insert)
    }
}

/// Splits text into alternating maximal runs of whitespace and non-whitespace.
pub fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut current_ws: Option<bool> = None;

    for (offset, ch) in text.char_indices() {
        let is_ws = ch.is_whitespace();
        match current_ws {
            Some(prev) if prev != is_ws => {
                tokens.push(&text[start..offset]);
                start = offset;
            }
            _ => {}
        }
        current_ws = Some(is_ws);
    }
    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}

/// Computes the merged word diff from `original` to `edited`.
///
/// On a mismatch the walk prefers deleting from `original` whenever that
/// keeps at least as long a common subsequence as inserting from `edited`.
/// Whitespace-only equal runs sandwiched between changes are folded into the
/// change, and every change region comes out as one delete run followed by
/// one insert run.
pub fn diff_words(original: &str, edited: &str) -> Vec<DiffToken> {
    let a = tokenize(original);
    let b = tokenize(edited);
    let table = lcs_table(&a, &b);
    let width = b.len() + 1;

    let mut ops: Vec<(DiffKind, &str)> = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            ops.push((DiffKind::Equal, a[i]));
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            ops.push((DiffKind::Delete, a[i]));
            i += 1;
        } else {
            ops.push((DiffKind::Insert, b[j]));
            j += 1;
        }
    }
    ops.extend(a[i..].iter().map(|t| (DiffKind::Delete, *t)));
    ops.extend(b[j..].iter().map(|t| (DiffKind::Insert, *t)));

    fold_whitespace_gaps(merge_runs(ops))
}

/// Suffix LCS lengths: `table[i * (n + 1) + j]` is the LCS of `a[i..]` and `b[j..]`.
fn lcs_table(a: &[&str], b: &[&str]) -> Vec<u32> {
    let (m, n) = (a.len(), b.len());
    let width = n + 1;
    let mut table = vec![0u32; (m + 1) * width];
    for i in (0..m).rev() {
        for j in (0..n).rev() {
            table[i * width + j] = if a[i] == b[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }
    table
}

fn merge_runs(ops: Vec<(DiffKind, &str)>) -> Vec<DiffToken> {
    let mut merged: Vec<DiffToken> = Vec::new();
    for (kind, value) in ops {
        match merged.last_mut() {
            Some(last) if last.kind == kind => last.value.push_str(value),
            _ => merged.push(DiffToken::new(kind, value)),
        }
    }
    merged
}

/// Folds whitespace-only equal runs that sit between two changes into the
/// surrounding change region, emitting each region as delete then insert.
fn fold_whitespace_gaps(runs: Vec<DiffToken>) -> Vec<DiffToken> {
    let mut out: Vec<DiffToken> = Vec::with_capacity(runs.len());
    let mut deleted = String::new();
    let mut inserted = String::new();

    let flush = |out: &mut Vec<DiffToken>, deleted: &mut String, inserted: &mut String| {
        if !deleted.is_empty() {
            out.push(DiffToken { kind: DiffKind::Delete, value: std::mem::take(deleted) });
        }
        if !inserted.is_empty() {
            out.push(DiffToken { kind: DiffKind::Insert, value: std::mem::take(inserted) });
        }
    };

    let mut iter = runs.into_iter().peekable();
    while let Some(run) = iter.next() {
        match run.kind {
            DiffKind::Delete => deleted.push_str(&run.value),
            DiffKind::Insert => inserted.push_str(&run.value),
            DiffKind::Equal => {
                let in_region = !deleted.is_empty() || !inserted.is_empty();
                let change_follows = iter.peek().is_some_and(|next| next.kind != DiffKind::Equal);
                if in_region && change_follows && run.value.chars().all(char::is_whitespace) {
                    deleted.push_str(&run.value);
                    inserted.push_str(&run.value);
                } else {
                    flush(&mut out, &mut deleted, &mut inserted);
                    out.push(run);
                }
            }
        }
    }
    flush(&mut out, &mut deleted, &mut inserted);
    out
}

/// Rebuilds the left-hand string from a diff.
pub fn reconstruct_original(tokens: &[DiffToken]) -> String {
    tokens.iter().filter(|t| t.in_original()).map(|t| t.value.as_str()).collect()
}

/// Rebuilds the right-hand string from a diff.
pub fn reconstruct_edited(tokens: &[DiffToken]) -> String {
    tokens.iter().filter(|t| t.in_edited()).map(|t| t.value.as_str()).collect()
}

/// Number of non-whitespace characters inside inserted or deleted runs.
pub fn changed_char_count(tokens: &[DiffToken]) -> usize {
    tokens
        .iter()
        .filter(|t| t.kind != DiffKind::Equal)
        .map(|t| t.value.chars().filter(|c| !c.is_whitespace()).count())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[DiffToken]) -> Vec<DiffKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_words_and_whitespace_runs() {
        assert_eq!(tokenize("  a bc\t\nd "), vec!["  ", "a", " ", "bc", "\t\n", "d", " "]);
        assert!(tokenize("").is_empty());
        assert_eq!(tokenize("héllo wörld"), vec!["héllo", " ", "wörld"]);
    }

    #[test]
    fn empty_inputs_give_no_tokens() {
        assert!(diff_words("", "").is_empty());
    }

    #[test]
    fn identical_strings_give_one_equal_run() {
        let s = "It was a beautiful night.";
        assert_eq!(diff_words(s, s), vec![DiffToken::new(DiffKind::Equal, s)]);
    }

    #[test]
    fn one_sided_inputs() {
        assert_eq!(diff_words("", "new text"), vec![DiffToken::new(DiffKind::Insert, "new text")]);
        assert_eq!(diff_words("old text", ""), vec![DiffToken::new(DiffKind::Delete, "old text")]);
    }

    #[test]
    fn typo_fix_and_insertion() {
        let diff = diff_words("It was beautifull night.", "It was a beautiful night.");

        assert!(diff
            .iter()
            .any(|t| t.kind == DiffKind::Insert && t.value.contains("a ")));
        let deleted = diff.iter().position(|t| t.kind == DiffKind::Delete && t.value.contains("beautifull"));
        let inserted = diff.iter().position(|t| t.kind == DiffKind::Insert && t.value.contains("beautiful"));
        assert!(deleted.is_some() && inserted.is_some(), "{diff:?}");

        assert_eq!(reconstruct_original(&diff), "It was beautifull night.");
        assert_eq!(reconstruct_edited(&diff), "It was a beautiful night.");
    }

    #[test]
    fn deletes_come_before_inserts() {
        let diff = diff_words("one two", "one three");
        assert_eq!(kinds(&diff), vec![DiffKind::Equal, DiffKind::Delete, DiffKind::Insert]);
        assert_eq!(diff[0].value, "one ");
        assert_eq!(diff[1].value, "two");
        assert_eq!(diff[2].value, "three");
    }

    #[test]
    fn whitespace_between_changes_joins_one_region() {
        let diff = diff_words("a b c", "x y z");
        assert_eq!(
            diff,
            vec![DiffToken::new(DiffKind::Delete, "a b c"), DiffToken::new(DiffKind::Insert, "x y z")]
        );
    }

    #[test]
    fn whitespace_next_to_equal_words_stays_equal() {
        let diff = diff_words("keep this word", "keep that word");
        assert_eq!(kinds(&diff), vec![DiffKind::Equal, DiffKind::Delete, DiffKind::Insert, DiffKind::Equal]);
        assert_eq!(diff[0].value, "keep ");
        assert_eq!(diff[3].value, " word");
        for pair in diff.windows(2) {
            assert_ne!(pair[0].kind, pair[1].kind);
        }
    }

    #[test]
    fn reconstruction_holds_on_assorted_pairs() {
        let pairs = [
            ("", "x"),
            ("hello world", "hello  world"),
            ("  leading", "leading  "),
            ("the the cat sat", "the cat sat down"),
            ("Ünïcödé wörds here", "Unicode words here"),
            ("a\nb\nc", "a b\nc\n"),
            ("same", "same"),
        ];
        for (a, b) in pairs {
            let diff = diff_words(a, b);
            assert_eq!(reconstruct_original(&diff), a, "original for {a:?} -> {b:?}");
            assert_eq!(reconstruct_edited(&diff), b, "edited for {a:?} -> {b:?}");
        }
    }

    #[test]
    fn counts_changed_characters_without_whitespace() {
        let diff = diff_words("one two", "one three");
        assert_eq!(changed_char_count(&diff), 3 + 5);
        assert_eq!(changed_char_count(&diff_words("a  b", "a b")), 0);
    }
}
