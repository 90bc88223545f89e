// Tokenizer adapter module
// Wraps the cl100k_base byte-pair encoding for exact token counting

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

/// Exact token counter backed by a shared BPE table.
///
/// Counting is pure and deterministic; the only fallible step is loading the
/// encoding table at construction.
#[derive(Clone)]
pub struct TokenCounter {
    bpe: Arc<CoreBPE>,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter").finish_non_exhaustive()
    }
}

impl TokenCounter {
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().context("Failed to load cl100k_base encoding")?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    /// Number of tokens the encoding produces for `text`
    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Summed token count over several texts
    pub fn count_all<'a, I>(&self, texts: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        texts.into_iter().map(|text| self.count(text)).sum()
    }
}
