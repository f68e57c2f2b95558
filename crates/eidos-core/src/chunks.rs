//! Splits extracted document text into chunks for embedding and search.
//! Fixed-size overlapping windows; window ends prefer whitespace boundaries.

use serde::{Deserialize, Serialize};

/// Default maximum characters per chunk.
pub const DEFAULT_CHUNK_CHARS: usize = 500;
/// Default overlap between consecutive chunks. Overlap keeps statements that
/// straddle a window boundary retrievable from at least one chunk.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// A chunk of text from an uploaded document, with source reference.
/// Immutable after creation; ownership moves to the store on insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub filename: String,
    pub file_type: String,
    pub file_path: String,
    /// Index of this chunk within its document (0, 1, 2, …).
    pub chunk_id: usize,
    /// Number of chunks the document was split into.
    pub total_chunks: usize,
}

/// Chunk one document's extracted text and attach source metadata.
pub fn chunk_document(
    filename: &str,
    file_type: &str,
    file_path: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    let pieces = chunk_text(text, chunk_size, overlap);
    let total = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            text,
            filename: filename.to_string(),
            file_type: file_type.to_string(),
            file_path: file_path.to_string(),
            chunk_id: i,
            total_chunks: total,
        })
        .collect()
}

/// Splits text into windows of at most `chunk_size` characters, each window
/// starting `chunk_size - overlap` characters after the previous one.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    if chunk_size == 0 || chars.len() <= chunk_size {
        return vec![text.to_string()];
    }
    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut result = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let hard_end = (start + chunk_size).min(chars.len());
        let end = if hard_end < chars.len() {
            boundary_before(&chars, start, step, hard_end)
        } else {
            hard_end
        };
        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim().to_string();
        if !piece.is_empty() {
            result.push(piece);
        }
        if hard_end == chars.len() {
            break;
        }
        start += step;
    }
    result
}

/// Prefer to end a window at the last whitespace before the size limit.
/// Never end before the next window's start (`start + step`): the windows
/// must cover the text with no gap, or the characters between a short window
/// and the next start would land in no chunk at all. Else hard cut.
fn boundary_before(chars: &[char], start: usize, step: usize, hard_end: usize) -> usize {
    let min_end = (start + (hard_end - start) / 2).max(start + step);
    for i in (min_end..hard_end).rev() {
        if chars[i].is_whitespace() {
            return i;
        }
    }
    hard_end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let c = chunk_text("One short paragraph.", 500, 200);
        assert_eq!(c, vec!["One short paragraph.".to_string()]);
    }

    #[test]
    fn windows_overlap() {
        let words: Vec<String> = (0..200).map(|i| format!("w{i}")).collect();
        let text = words.join(" ");
        let c = chunk_text(&text, 100, 40);
        assert!(c.len() > 1);
        // Consecutive windows share text from the overlap region.
        assert!(c[1].split_whitespace().any(|w| c[0].contains(w)));
        assert!(c.iter().all(|p| p.chars().count() <= 100));
    }

    #[test]
    fn no_characters_lost_between_windows() {
        // A long unbroken token right after a wordy region used to pull the
        // whitespace-preferred window end below the next window's start,
        // dropping the characters in between from every chunk.
        let text = format!("{}{}", "word ".repeat(52), "z".repeat(400));
        let c = chunk_text(&text, 500, 200);
        let covered: usize = c
            .iter()
            .map(|p| p.chars().filter(|&ch| ch == 'z').count())
            .sum();
        assert!(
            covered >= 400,
            "long token characters dropped: only {covered} of 400 retrievable"
        );
    }

    #[test]
    fn windows_always_reach_the_next_start() {
        let words: Vec<String> = (0..300).map(|i| format!("word{i}")).collect();
        let text = words.join(" ");
        let c = chunk_text(&text, 100, 40);
        // Every window must extend at least to the next window's start
        // (step = 60), so concatenated coverage has no holes.
        assert!(c.iter().rev().skip(1).all(|p| p.chars().count() >= 60));
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(chunk_text("   \n ", 500, 200).is_empty());
    }

    #[test]
    fn chunk_document_numbers_chunks() {
        let text = "a ".repeat(600);
        let chunks = chunk_document("policy.txt", "txt", "/tmp/policy.txt", &text, 500, 200);
        let total = chunks.len();
        assert!(total > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_id, i);
            assert_eq!(c.total_chunks, total);
            assert_eq!(c.filename, "policy.txt");
        }
    }
}
