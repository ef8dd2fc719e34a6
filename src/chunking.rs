/*!
 * Chunking engine: token estimation and budget-bounded batching.
 *
 * Paragraphs are grouped into batches whose cumulative estimated token count
 * stays within the per-request budget. Batch boundaries fall on paragraph
 * boundaries; a paragraph exceeding the budget on its own is split on
 * sentence boundaries, then word boundaries, and only as a last resort on
 * character boundaries (a single unsegmented word longer than the budget,
 * e.g. CJK text). Splitting always preserves the original text exactly:
 * concatenating every unit's text in order reproduces the input.
 */

use crate::book::model::Paragraph;

/// Sentence-terminating characters for Latin and CJK scripts.
const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '。', '！', '？', '…', ';', '；'];

/// Estimate the token cost of a text.
///
/// A deterministic, cheap approximation: whitespace-delimited word count plus
/// a character-count term that keeps unsegmented CJK text from looking free.
/// It does not match any real tokenizer, but it is stable and monotonic in
/// text length, which is all the batcher needs.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let words = text.split_whitespace().count();
    let chars = text.chars().count();
    (words + chars / 4).max(1)
}

/// One translatable unit inside a batch: a whole paragraph or one part of a
/// paragraph that had to be split.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchUnit {
    /// Index of the source paragraph in the chapter's paragraph sequence
    pub paragraph_index: usize,
    /// Zero-based part number within the paragraph
    pub part: usize,
    /// Total number of parts the paragraph was split into
    pub parts: usize,
    /// The unit's text
    pub text: String,
}

impl BatchUnit {
    /// Whitespace-delimited word count of this unit.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// An ordered group of units dispatched together to the translation oracle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    /// Units in original document order
    pub units: Vec<BatchUnit>,
}

impl Batch {
    /// Estimated token total across all units.
    pub fn estimated_tokens(&self) -> usize {
        self.units.iter().map(|u| estimate_tokens(&u.text)).sum()
    }

    /// Largest word count of any contained unit, used for concurrency
    /// tier classification.
    pub fn max_word_count(&self) -> usize {
        self.units.iter().map(|u| u.word_count()).max().unwrap_or(0)
    }
}

/// Group a chapter's paragraphs into token-bounded batches.
///
/// Ordering invariant: concatenating every batch unit's text in order
/// reproduces the concatenation of the original paragraph contents exactly.
pub fn batch_paragraphs(paragraphs: &[Paragraph], max_tokens: usize) -> Vec<Batch> {
    let max_tokens = max_tokens.max(1);
    let mut batches = Vec::new();
    let mut current = Batch::default();
    let mut current_tokens = 0usize;

    let mut flush = |current: &mut Batch, current_tokens: &mut usize, batches: &mut Vec<Batch>| {
        if !current.units.is_empty() {
            batches.push(std::mem::take(current));
            *current_tokens = 0;
        }
    };

    for (paragraph_index, paragraph) in paragraphs.iter().enumerate() {
        let estimate = estimate_tokens(&paragraph.content);
        if estimate > max_tokens {
            // Oversized paragraph: close the running batch, then emit the
            // split parts, packing them under the same budget.
            flush(&mut current, &mut current_tokens, &mut batches);
            let parts = split_long_text(&paragraph.content, max_tokens);
            let total = parts.len();
            for (part, text) in parts.into_iter().enumerate() {
                let part_tokens = estimate_tokens(&text);
                if current_tokens + part_tokens > max_tokens {
                    flush(&mut current, &mut current_tokens, &mut batches);
                }
                current_tokens += part_tokens;
                current.units.push(BatchUnit { paragraph_index, part, parts: total, text });
            }
            flush(&mut current, &mut current_tokens, &mut batches);
            continue;
        }

        if current_tokens + estimate > max_tokens {
            flush(&mut current, &mut current_tokens, &mut batches);
        }
        current_tokens += estimate;
        current.units.push(BatchUnit {
            paragraph_index,
            part: 0,
            parts: 1,
            text: paragraph.content.clone(),
        });
    }
    flush(&mut current, &mut current_tokens, &mut batches);
    batches
}

/// Split a single long text into parts each within the token budget.
///
/// Split points prefer sentence boundaries, then word boundaries. A single
/// word exceeding the budget by itself is divided on character boundaries,
/// the only case where a word is ever split. Concatenating the parts
/// reproduces the input exactly.
pub fn split_long_text(text: &str, max_tokens: usize) -> Vec<String> {
    let max_tokens = max_tokens.max(1);
    let mut parts = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        if estimate_tokens(sentence) > max_tokens {
            push_part(&mut parts, &mut current);
            split_words(sentence, max_tokens, &mut parts, &mut current);
            continue;
        }
        if !current.is_empty() && !fits_appended(&current, sentence, max_tokens) {
            push_part(&mut parts, &mut current);
        }
        current.push_str(sentence);
    }
    push_part(&mut parts, &mut current);
    parts
}

fn push_part(parts: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        parts.push(std::mem::take(current));
    }
}

/// Whether appending `next` to `current` stays within the budget. Measured
/// on the concatenation: the estimate of a joined text can exceed the sum
/// of its parts' estimates.
fn fits_appended(current: &str, next: &str, max_tokens: usize) -> bool {
    let mut candidate = String::with_capacity(current.len() + next.len());
    candidate.push_str(current);
    candidate.push_str(next);
    estimate_tokens(&candidate) <= max_tokens
}

/// Split on sentence terminators, keeping every character: each segment ends
/// after a terminator run and its trailing whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut after_terminator = false;

    for (idx, ch) in text.char_indices() {
        if SENTENCE_TERMINATORS.contains(&ch) {
            after_terminator = true;
        } else if ch.is_whitespace() {
            // Trailing whitespace stays with the finished sentence.
        } else {
            if after_terminator {
                segments.push(&text[start..idx]);
                start = idx;
            }
            after_terminator = false;
        }
    }
    if start < text.len() {
        segments.push(&text[start..]);
    }
    segments
}

/// Pack whitespace-delimited words (with their trailing whitespace) into the
/// budget; a single over-budget word falls through to a character split.
fn split_words(sentence: &str, max_tokens: usize, parts: &mut Vec<String>, current: &mut String) {
    for word in split_inclusive_whitespace(sentence) {
        if estimate_tokens(word) > max_tokens {
            push_part(parts, current);
            split_chars(word, max_tokens, parts);
            continue;
        }
        if !current.is_empty() && !fits_appended(current, word, max_tokens) {
            push_part(parts, current);
        }
        current.push_str(word);
    }
}

/// Last resort: cut an unsplittable word on character boundaries.
fn split_chars(word: &str, max_tokens: usize, parts: &mut Vec<String>) {
    let mut current = String::new();
    for ch in word.chars() {
        let mut candidate = current.clone();
        candidate.push(ch);
        if !current.is_empty() && estimate_tokens(&candidate) > max_tokens {
            parts.push(std::mem::take(&mut current));
            current.push(ch);
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
}

/// Split into alternating word/whitespace runs, each word keeping the
/// whitespace that follows it, so concatenation is lossless.
fn split_inclusive_whitespace(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_whitespace = false;
    for (idx, ch) in text.char_indices() {
        if in_whitespace && !ch.is_whitespace() {
            out.push(&text[start..idx]);
            start = idx;
        }
        in_whitespace = ch.is_whitespace();
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}
