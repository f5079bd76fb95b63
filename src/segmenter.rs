//! Splits response text into speakable chunks.
//!
//! The pass order is fixed:
//! 1. normalize whitespace and protect abbreviations
//! 2. split after sentence-terminal punctuation (`.`, `!`, `?`, `;`)
//! 3. buffer leading sentences into one first chunk under the ceiling
//! 4. fold short candidates after the first chunk into a neighbour
//! 5. re-split anything over its bound at word boundaries
//!
//! Buffering sees the raw sentences, so the first chunk is the longest
//! sentence prefix under the ceiling. Joining the output with single spaces
//! reproduces the normalized input.

use crate::defaults;
use serde::{Deserialize, Serialize};

/// Abbreviations whose periods never end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "Mr.", "Mrs.", "Ms.", "Dr.", "Jr.", "Sr.", "Prof.", "St.", "D.C.", "U.S.", "U.K.", "etc.",
    "vs.", "e.g.", "i.e.", "a.m.", "p.m.",
];

/// Stands in for a protected period while sentence boundaries are detected.
/// Stripped from input during [`normalize`].
const PLACEHOLDER: char = '\u{E000}';

/// Sentence-terminal punctuation.
fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | ';')
}

/// Segmentation bounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Soft bound for every chunk after the first.
    pub target_chars: usize,
    /// Hard bound for the buffered first chunk.
    pub buffer_ceiling_chars: usize,
    /// Chunks below this word count are merged into a neighbour when that
    /// keeps the neighbour within `target_chars`.
    pub min_words: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            target_chars: defaults::TARGET_CHUNK_CHARS,
            buffer_ceiling_chars: defaults::BUFFER_CEILING_CHARS,
            min_words: defaults::MIN_CHUNK_WORDS,
        }
    }
}

/// One speakable piece of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// 1-based position in the response.
    pub index: usize,
    pub text: String,
}

impl TextChunk {
    /// Length in characters, not bytes.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn word_count(&self) -> usize {
        word_count(&self.text)
    }
}

/// Text segmenter.
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Split `text` into ordered chunks.
    ///
    /// Returns an empty list only when `text` has no non-whitespace content.
    pub fn segment(&self, text: &str) -> Vec<TextChunk> {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Vec::new();
        }

        let SegmenterConfig {
            target_chars,
            buffer_ceiling_chars,
            min_words,
        } = self.config;

        let candidates = split_sentences(&protect_abbreviations(&normalized));
        let mut candidates =
            buffer_leading(candidates, buffer_ceiling_chars, min_words).into_iter();
        let Some(first) = candidates.next() else {
            return vec![TextChunk {
                index: 1,
                text: normalized,
            }];
        };

        // An over-long first candidate keeps its ceiling-sized head; the
        // overflow is segmented like any later sentence.
        let mut pieces = split_words(&first, buffer_ceiling_chars, min_words);
        let overflow = pieces.split_off(pieces.len().min(1));
        let mut rest = Vec::new();
        if !overflow.is_empty() {
            rest.push(overflow.join(" "));
        }
        rest.extend(candidates);

        for candidate in absorb_short(rest, min_words, target_chars) {
            pieces.extend(split_words(&candidate, target_chars, min_words));
        }

        pieces
            .into_iter()
            .enumerate()
            .map(|(i, text)| TextChunk { index: i + 1, text })
            .collect()
    }
}

/// Collapse whitespace runs to single spaces and trim.
///
/// Also drops U+E000, which the segmenter reserves internally.
pub fn normalize(text: &str) -> String {
    text.replace(PLACEHOLDER, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Replace the periods of known abbreviations with [`PLACEHOLDER`].
///
/// Expects normalized input. An abbreviation only matches at the start of a
/// word, optionally after opening punctuation, so `Dr.` matches in `(Dr.`
/// but not in `Audr.`.
fn protect_abbreviations(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let start = word
                .find(|c: char| c.is_alphanumeric())
                .unwrap_or(word.len());
            let (lead, rest) = word.split_at(start);
            match ABBREVIATIONS.iter().find(|abbr| rest.starts_with(**abbr)) {
                Some(abbr) => {
                    let (hit, tail) = rest.split_at(abbr.len());
                    format!("{}{}{}", lead, hit.replace('.', &PLACEHOLDER.to_string()), tail)
                }
                None => word.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split after runs of terminal punctuation followed by a space or the end of
/// text, restoring protected periods in each candidate.
fn split_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if !is_terminal(c) {
            continue;
        }
        while let Some(&next) = chars.peek()
            && is_terminal(next)
        {
            current.push(next);
            chars.next();
        }
        match chars.peek() {
            None => {}
            Some(&' ') => {
                chars.next();
            }
            Some(_) => continue,
        }
        push_candidate(&mut out, &mut current);
    }
    push_candidate(&mut out, &mut current);
    out
}

fn push_candidate(out: &mut Vec<String>, current: &mut String) {
    let candidate = current.trim().replace(PLACEHOLDER, ".");
    if !candidate.is_empty() {
        out.push(candidate);
    }
    current.clear();
}

fn join(a: &str, b: &str) -> String {
    format!("{} {}", a, b)
}

fn fits(a: &str, b: &str, limit: usize) -> bool {
    char_len(a) + 1 + char_len(b) <= limit
}

/// Fold candidates with fewer than `min_words` words into a neighbour.
///
/// A short candidate is prepended to the next one when the result fits in
/// `limit`, otherwise appended to the previous one. The previous one takes it
/// even past `limit`; word splitting then re-cuts that candidate with a tail
/// of at least `min_words`. With no previous candidate it is prepended to the
/// next one regardless. Only a short candidate with no neighbour at all
/// stays on its own.
fn absorb_short(candidates: Vec<String>, min_words: usize, limit: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(candidates.len());
    let mut pending: Option<String> = None;

    for candidate in candidates {
        let candidate = match pending.take() {
            Some(short) if fits(&short, &candidate, limit) => join(&short, &candidate),
            Some(short) => match out.last_mut() {
                Some(last) => {
                    *last = join(last, &short);
                    candidate
                }
                None => join(&short, &candidate),
            },
            None => candidate,
        };

        if word_count(&candidate) < min_words {
            pending = Some(candidate);
        } else {
            out.push(candidate);
        }
    }

    if let Some(short) = pending {
        match out.last_mut() {
            Some(last) => *last = join(last, &short),
            None => out.push(short),
        }
    }
    out
}

/// Greedily merge leading candidates while the merged chunk stays within
/// `ceiling`. Stops at the first candidate that does not fit.
///
/// A first chunk left with fewer than `min_words` words takes the next
/// candidate anyway; the caller cuts it back to the ceiling at a word
/// boundary.
fn buffer_leading(candidates: Vec<String>, ceiling: usize, min_words: usize) -> Vec<String> {
    let mut iter = candidates.into_iter().peekable();
    let Some(mut first) = iter.next() else {
        return Vec::new();
    };

    while let Some(next) = iter.peek() {
        if !fits(&first, next, ceiling) && word_count(&first) >= min_words {
            break;
        }
        if let Some(next) = iter.next() {
            first = join(&first, &next);
        }
    }

    let mut out = Vec::with_capacity(iter.len() + 1);
    out.push(first);
    out.extend(iter);
    out
}

/// Re-split `text` at word boundaries so each piece is at most `bound`
/// characters.
///
/// A single word longer than `bound` is kept whole. When the last piece ends
/// up below `min_words`, words are moved into it from the piece before as
/// long as both stay within their limits.
fn split_words(text: &str, bound: usize, min_words: usize) -> Vec<String> {
    if char_len(text) <= bound {
        return vec![text.to_string()];
    }

    let mut pieces: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0;

    for word in text.split(' ') {
        let word_len = char_len(word);
        let added = if current.is_empty() {
            word_len
        } else {
            current_len + 1 + word_len
        };
        if !current.is_empty() && added > bound {
            pieces.push(std::mem::take(&mut current));
            current.push(word);
            current_len = word_len;
        } else {
            current.push(word);
            current_len = added;
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }

    rebalance_tail(&mut pieces, bound, min_words);
    pieces.into_iter().map(|words| words.join(" ")).collect()
}

fn rebalance_tail(pieces: &mut [Vec<&str>], bound: usize, min_words: usize) {
    let [.., prev, last] = pieces else {
        return;
    };
    while last.len() < min_words && prev.len() > min_words {
        let Some(word) = prev.last().copied() else {
            break;
        };
        let grown = char_len(word) + 1 + char_len(&last.join(" "));
        if grown > bound {
            break;
        }
        prev.pop();
        last.insert(0, word);
    }
}
