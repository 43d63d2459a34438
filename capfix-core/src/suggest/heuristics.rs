//! Local pattern checks run alongside diagnosis.
//!
//! These never call out to the service. Their findings are appended to the
//! diagnosis reason and are enough on their own to flag a segment as
//! `minor` when the service is unavailable or calls it clean.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Letters glued around digits ("he11o", "w0rd").
static DIGIT_IN_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{L}\d+\p{L}").expect("Invalid regex"));

/// Same letter four or more times in a row is treated as noise.
const MAX_LETTER_RUN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintKind {
    MixedScript,
    SuspiciousToken,
    RepeatedWord,
}

/// One finding, carrying the offending word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hint {
    pub kind: HintKind,
    pub token: String,
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            HintKind::MixedScript => write!(f, "mixed scripts in {:?}", self.token),
            HintKind::SuspiciousToken => write!(f, "suspicious token {:?}", self.token),
            HintKind::RepeatedWord => write!(f, "repeated word {:?}", self.token),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Latin,
    Cyrillic,
    Greek,
    Cjk,
}

fn script_of(ch: char) -> Option<Script> {
    match ch as u32 {
        0x41..=0x5A | 0x61..=0x7A | 0xC0..=0x24F => Some(Script::Latin),
        0x370..=0x3FF => Some(Script::Greek),
        0x400..=0x52F => Some(Script::Cyrillic),
        0x3040..=0x30FF | 0x4E00..=0x9FFF | 0xAC00..=0xD7AF => Some(Script::Cjk),
        _ => None,
    }
}

/// Runs every check over `text` and returns the findings in text order,
/// one per offending word and kind.
pub fn inspect(text: &str) -> Vec<Hint> {
    let mut hints = Vec::new();
    let mut previous: Option<String> = None;

    for word in text.split_whitespace() {
        if has_mixed_scripts(word) {
            hints.push(Hint { kind: HintKind::MixedScript, token: word.to_owned() });
        }
        if is_suspicious(word) {
            hints.push(Hint { kind: HintKind::SuspiciousToken, token: word.to_owned() });
        }

        let normalized = normalize(word);
        if !normalized.is_empty() && previous.as_deref() == Some(normalized.as_str()) {
            hints.push(Hint { kind: HintKind::RepeatedWord, token: word.to_owned() });
        }
        previous = Some(normalized);
    }
    hints
}

/// Joins hints into one `; `-separated phrase.
pub fn describe(hints: &[Hint]) -> String {
    hints.iter().map(Hint::to_string).collect::<Vec<_>>().join("; ")
}

fn has_mixed_scripts(word: &str) -> bool {
    let mut first: Option<Script> = None;
    for script in word.chars().filter_map(script_of) {
        match first {
            None => first = Some(script),
            Some(seen) if seen != script => return true,
            Some(_) => {}
        }
    }
    false
}

fn is_suspicious(word: &str) -> bool {
    if word.contains('\u{FFFD}') || DIGIT_IN_WORD.is_match(word) {
        return true;
    }

    let mut run = 0;
    let mut last: Option<char> = None;
    for ch in word.chars().flat_map(char::to_lowercase) {
        if ch.is_alphabetic() && Some(ch) == last {
            run += 1;
            if run >= MAX_LETTER_RUN {
                return true;
            }
        } else {
            run = 1;
        }
        last = Some(ch);
    }
    false
}

fn normalize(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<HintKind> {
        inspect(text).into_iter().map(|h| h.kind).collect()
    }

    #[test]
    fn clean_text_has_no_hints() {
        assert!(inspect("It was a beautiful night.").is_empty());
        assert!(inspect("Meet me at 10:30, room 4B.").is_empty());
        assert!(inspect("").is_empty());
    }

    #[test]
    fn flags_homoglyph_words() {
        // Cyrillic 'о' inside a Latin word.
        assert_eq!(kinds("hello w\u{043E}rld"), vec![HintKind::MixedScript]);
        assert_eq!(kinds("東京tower"), vec![HintKind::MixedScript]);
        assert!(inspect("Привет мир").is_empty());
    }

    #[test]
    fn flags_suspicious_tokens() {
        assert_eq!(kinds("he11o there"), vec![HintKind::SuspiciousToken]);
        assert_eq!(kinds("caf\u{FFFD} au lait"), vec![HintKind::SuspiciousToken]);
        assert_eq!(kinds("nooooo way"), vec![HintKind::SuspiciousToken]);
        assert!(inspect("good book").is_empty());
    }

    #[test]
    fn flags_immediate_repeats() {
        let hints = inspect("I went to the the store. The end, end.");
        assert_eq!(hints.len(), 2);
        assert!(hints.iter().all(|h| h.kind == HintKind::RepeatedWord));
        assert_eq!(hints[0].token, "the");
        assert!(inspect("that that's fine").is_empty());
    }

    #[test]
    fn describes_hints() {
        let text = describe(&inspect("the the he11o"));
        assert_eq!(text, "repeated word \"the\"; suspicious token \"he11o\"");
    }
}
