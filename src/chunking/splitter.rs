//! Recursive fixed-size text splitter
//!
//! Splits on the coarsest separator present (paragraph, line, word, then
//! character), recursing into pieces that are still too long, and greedily
//! merges the small pieces back into windows of at most `chunk_size`
//! characters that share up to `chunk_overlap` characters with their
//! predecessor. Sizes are measured in `char`s, never bytes.

use std::collections::VecDeque;

const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Greedy recursive splitter
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    /// Split text into trimmed, non-empty windows
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // Coarsest separator that actually occurs; "" always matches
        let position = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let finer = separators.get(position + 1..).unwrap_or(&[]);

        let mut out = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                out.extend(self.merge(&pending));
                pending.clear();
            }

            if finer.is_empty() {
                let piece = piece.trim();
                if !piece.is_empty() {
                    out.push(piece.to_string());
                }
            } else {
                out.extend(self.split_with(&piece, finer));
            }
        }

        if !pending.is_empty() {
            out.extend(self.merge(&pending));
        }

        out
    }

    /// Pack small pieces into windows, carrying an overlapping tail forward
    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut windows = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !current.is_empty() {
                push_window(&mut windows, &current);

                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    match current.pop_front() {
                        Some(dropped) => total -= char_len(dropped),
                        None => break,
                    }
                }
            }

            current.push_back(piece);
            total += len;
        }

        push_window(&mut windows, &current);
        windows
    }
}

fn push_window(windows: &mut Vec<String>, current: &VecDeque<&str>) {
    let joined: String = current.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        windows.push(trimmed.to_string());
    }
}

/// Split so that every separator stays attached to the start of the piece
/// that follows it
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(text[start..idx].to_string());
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(text[start..].to_string());
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

#[inline]
pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_single_window() {
        let splitter = RecursiveSplitter::new(600, 100);
        let chunks = splitter.split("A short clause.\nWith two lines.");
        assert_eq!(chunks, vec!["A short clause.\nWith two lines.".to_string()]);
    }

    #[test]
    fn test_windows_respect_size() {
        let splitter = RecursiveSplitter::new(50, 10);
        let text = "word ".repeat(100);
        let chunks = splitter.split(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(char_len(chunk) <= 50, "chunk too long: {}", chunk);
        }
    }

    #[test]
    fn test_consecutive_windows_overlap() {
        let splitter = RecursiveSplitter::new(40, 15);
        let text = (0..40)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = splitter.split(&text);
        assert!(chunks.len() > 2);

        for pair in chunks.windows(2) {
            let last_word = pair[0].split_whitespace().last().unwrap();
            assert!(
                pair[1].split_whitespace().any(|w| w == last_word),
                "no overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let splitter = RecursiveSplitter::new(60, 0);
        let para_a = "First paragraph about offer and acceptance.";
        let para_b = "Second paragraph about consideration.";
        let chunks = splitter.split(&format!("{}\n\n{}", para_a, para_b));
        assert_eq!(chunks, vec![para_a.to_string(), para_b.to_string()]);
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let splitter = RecursiveSplitter::new(10, 2);
        let chunks = splitter.split(&"x".repeat(35));
        assert!(chunks.len() >= 4);
        assert!(chunks.iter().all(|c| char_len(c) <= 10));
    }

    #[test]
    fn test_multibyte_text_is_measured_in_chars() {
        let splitter = RecursiveSplitter::new(20, 5);
        let text = "§ über straße ".repeat(10);
        let chunks = splitter.split(&text);
        assert!(chunks.iter().all(|c| char_len(c) <= 20));
    }

    #[test]
    fn test_whitespace_only_yields_nothing() {
        let splitter = RecursiveSplitter::new(600, 100);
        assert!(splitter.split("  \n\n  \n").is_empty());
    }
}
