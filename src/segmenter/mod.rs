// Text segmenter module
// Splits paginated document text into token-budgeted, sentence-bounded chunks


use fancy_regex::Regex;
use itertools::Itertools;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::tokenizer::TokenCounter;

/// A page of raw document text with its 1-based page number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub text: String,
    pub page_number: i64,
}

impl PageText {
    pub fn new(text: impl Into<String>, page_number: i64) -> Self {
        Self {
            text: text.into(),
            page_number,
        }
    }
}

/// A chunk of processed document text bounded by the token budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentedChunk {
    pub content: String,
    /// Page numbers whose text contributed to this chunk. Spans more than one
    /// page when the chunk was accumulated across a page boundary.
    pub pages: BTreeSet<i64>,
    pub tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentedDocument {
    pub chunks: Vec<SegmentedChunk>,
    pub total_tokens: usize,
}

impl SegmentedDocument {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

fn copyright_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"©.*?\n").expect("invalid copyright regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("invalid whitespace regex"))
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+|www\.\S+").expect("invalid url regex"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\S*@\S*\s?").expect("invalid email regex"))
}

fn html_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("invalid html tag regex"))
}

fn punctuation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s.?!]").expect("invalid punctuation regex"))
}

/// Normalize raw page text before tokenization: strip copyright lines, URLs,
/// email addresses, and HTML tags, collapse whitespace, decompose accents,
/// and drop punctuation other than sentence terminators.
pub fn preprocess_text(text: &str) -> String {
    let text = copyright_re().replace_all(text, "");
    let text = text.replace('\n', " ");
    let text = whitespace_re().replace_all(&text, " ");
    let text = url_re().replace_all(&text, "");
    let text = email_re().replace_all(&text, "");
    let text = html_tag_re().replace_all(&text, "");

    let text: String = text.nfd().filter(|c| !is_combining_mark(*c)).collect();

    let text = punctuation_re().replace_all(&text, "");

    text.trim().to_lowercase()
}

/// Split normalized text into sentences at `.`/`!`/`?` boundaries, keeping the
/// terminator with its sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    sentences
}

/// Segment paginated text into chunks of at most `max_tokens` tokens.
///
/// Sentences are accumulated until the budget would be exceeded, at which
/// point the current chunk is flushed. A sentence that exceeds the budget on
/// its own is sub-split at word granularity; only a single word longer than
/// the whole budget can produce an over-budget chunk.
///
/// Per-chunk token counts are recomputed over the final chunk text rather
/// than carried over from the accumulation sums, so the stored counts cannot
/// drift from what the tokenizer reports for the stored content.
pub fn segment_pages(
    counter: &TokenCounter,
    pages: &[PageText],
    max_tokens: usize,
) -> SegmentedDocument {
    let mut raw_chunks: Vec<(String, BTreeSet<i64>)> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_tokens = 0usize;
    let mut current_pages: BTreeSet<i64> = BTreeSet::new();

    for page in pages {
        let text = preprocess_text(&page.text);

        for sentence in split_sentences(&text) {
            let sentence_tokens = counter.count(&sentence);

            if sentence_tokens > max_tokens {
                // The sentence cannot fit even alone; flush what we have and
                // fall back to a word-level sub-split.
                if !current.is_empty() {
                    raw_chunks.push((current.join(" "), std::mem::take(&mut current_pages)));
                    current.clear();
                    current_tokens = 0;
                }

                let mut words: Vec<&str> = Vec::new();
                let mut word_chunk_tokens = 0usize;
                for word in sentence.split_whitespace() {
                    let word_tokens = counter.count(word);
                    if words.is_empty() || word_chunk_tokens + word_tokens <= max_tokens {
                        words.push(word);
                        word_chunk_tokens += word_tokens;
                    } else {
                        raw_chunks
                            .push((words.join(" "), BTreeSet::from([page.page_number])));
                        words = vec![word];
                        word_chunk_tokens = word_tokens;
                    }
                }
                if !words.is_empty() {
                    raw_chunks.push((words.join(" "), BTreeSet::from([page.page_number])));
                }
            } else if current_tokens + sentence_tokens <= max_tokens {
                current.push(sentence);
                current_tokens += sentence_tokens;
                current_pages.insert(page.page_number);
            } else {
                raw_chunks.push((current.join(" "), std::mem::take(&mut current_pages)));
                current = vec![sentence];
                current_tokens = sentence_tokens;
                current_pages.insert(page.page_number);
            }
        }
    }

    if !current.is_empty() {
        raw_chunks.push((current.join(" "), current_pages));
    }

    let chunks: Vec<SegmentedChunk> = raw_chunks
        .into_iter()
        .map(|(content, chunk_pages)| {
            let tokens = counter.count(&content);
            SegmentedChunk {
                content,
                pages: chunk_pages,
                tokens,
            }
        })
        .collect();

    let total_tokens = chunks.iter().map(|c| c.tokens).sum();

    debug!(
        "Segmented {} pages into {} chunks ({} tokens total)",
        pages.len(),
        chunks.len(),
        total_tokens
    );

    SegmentedDocument {
        chunks,
        total_tokens,
    }
}

/// Split un-paginated plain text into estimated pages of `words_per_page`
/// words each, numbered from 1.
pub fn paginate_plain_text(text: &str, words_per_page: usize) -> Vec<PageText> {
    let words: Vec<&str> = text.split_whitespace().collect();

    words
        .chunks(words_per_page.max(1))
        .enumerate()
        .map(|(i, page_words)| PageText::new(page_words.join(" "), i as i64 + 1))
        .collect()
}

/// Render a page set as a short human-readable label, e.g. "3", "2-4", or
/// "1, 3, 7" for non-contiguous sets.
pub fn page_label(pages: &BTreeSet<i64>) -> Option<String> {
    let first = *pages.first()?;
    let last = *pages.last()?;

    if first == last {
        return Some(first.to_string());
    }

    let contiguous = (last - first + 1) as usize == pages.len();
    if contiguous {
        Some(format!("{}-{}", first, last))
    } else {
        Some(pages.iter().join(", "))
    }
}
