//! Output normalization
//!
//! Backends may emit reasoning markup around the answer and more sentences
//! than were asked for. Normalization removes the markup, trims the text and
//! keeps only the requested number of sentences.

use once_cell::sync::Lazy;
use regex::Regex;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Complete reasoning blocks, across newlines, non-greedy
static REASONING_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<think>.*?</think>").expect("reasoning block pattern is valid")
});

/// Remove reasoning markup.
///
/// Complete `<think>…</think>` blocks are dropped with their content. If a
/// closing tag is left without its opener (the backend started the answer
/// mid-reasoning), everything up to the last closing tag is dropped. Stray
/// opening tags are removed.
pub fn strip_reasoning(text: &str) -> String {
    let without_blocks = REASONING_BLOCK.replace_all(text, "");

    let after_dangling = match without_blocks.rfind(THINK_CLOSE) {
        Some(idx) => &without_blocks[idx + THINK_CLOSE.len()..],
        None => &without_blocks[..],
    };

    after_dangling.replace(THINK_OPEN, "")
}

/// Split into sentences.
///
/// A boundary is a `.`, `!` or `?` followed by whitespace; the terminator
/// stays with its sentence and the whitespace run is dropped. Text without a
/// boundary is a single segment.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }

        let Some(&(boundary, next)) = chars.peek() else {
            break;
        };
        if !next.is_whitespace() {
            continue;
        }

        segments.push(&text[start..boundary]);

        let mut resume = boundary;
        while let Some(&(idx, c)) = chars.peek() {
            if !c.is_whitespace() {
                break;
            }
            resume = idx + c.len_utf8();
            chars.next();
        }
        start = resume;
    }

    if start < text.len() {
        segments.push(&text[start..]);
    }

    segments
}

/// Keep the first `n` sentences, joined by single spaces.
///
/// Fewer sentences than requested are returned as they are.
pub fn limit_sentences(text: &str, n: usize) -> String {
    split_sentences(text)
        .into_iter()
        .take(n)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Full normalization applied to every backend answer
pub fn normalize_output(raw: &str, sentence_count: u32) -> String {
    let stripped = strip_reasoning(raw);
    limit_sentences(stripped.trim(), sentence_count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_and_truncates() {
        assert_eq!(
            normalize_output("<think>reasoning</think>A. B! C? D.", 2),
            "A. B!"
        );
    }

    #[test]
    fn test_strip_multiline_block() {
        let raw = "<think>\nstep one\nstep two\n</think>\n\nThe answer.";
        assert_eq!(strip_reasoning(raw).trim(), "The answer.");
    }

    #[test]
    fn test_strip_dangling_close() {
        assert_eq!(
            strip_reasoning("still thinking</think> Final answer.").trim(),
            "Final answer."
        );
    }

    #[test]
    fn test_strip_stray_open() {
        assert_eq!(strip_reasoning("<think>Answer."), "Answer.");
    }

    #[test]
    fn test_strip_without_markup_is_identity() {
        assert_eq!(strip_reasoning("Plain text. Two."), "Plain text. Two.");
    }

    #[test]
    fn test_split_boundaries() {
        assert_eq!(
            split_sentences("One. Two!  Three?\nFour"),
            vec!["One.", "Two!", "Three?", "Four"]
        );
    }

    #[test]
    fn test_split_requires_whitespace_after_terminator() {
        assert_eq!(
            split_sentences("Version 1.2 is out. Really"),
            vec!["Version 1.2 is out.", "Really"]
        );
        assert_eq!(split_sentences("Wait... what"), vec!["Wait...", "what"]);
    }

    #[test]
    fn test_split_empty() {
        assert!(split_sentences("").is_empty());
    }

    #[test]
    fn test_fewer_sentences_than_requested() {
        assert_eq!(limit_sentences("Only one.", 5), "Only one.");
        assert_eq!(normalize_output("  A. B.  ", 3), "A. B.");
    }

    #[test]
    fn test_unicode_text() {
        assert_eq!(
            normalize_output("Ça va? Très bien! Merci.", 2),
            "Ça va? Très bien!"
        );
    }

    #[test]
    fn test_only_reasoning_yields_empty() {
        assert_eq!(normalize_output("<think>nothing useful</think>", 3), "");
    }
}
