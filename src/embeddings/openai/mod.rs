
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::DocragError;
use crate::config::OpenAiConfig;
use crate::embeddings::{Embedder, RetryPolicy};
use crate::tokenizer::TokenCounter;

/// Fixed output dimensionality for the supported embedding models
pub fn embedding_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-ada-002" | "text-embedding-3-small" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Blocking client for the OpenAI embeddings endpoint.
///
/// Transient failures (rate limiting, timeouts, server errors) are retried
/// per the injected `RetryPolicy`; anything else propagates immediately.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    url: Url,
    api_key: String,
    model: String,
    dimension: usize,
    max_tokens_per_batch: usize,
    max_concurrency: usize,
    agent: ureq::Agent,
    retry: RetryPolicy,
    counter: TokenCounter,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig, retry: RetryPolicy, counter: TokenCounter) -> Result<Self> {
        let url = config
            .embeddings_url()
            .context("Failed to build embeddings URL from config")?;

        let api_key = config
            .api_key()
            .context("Missing OpenAI API key in environment")?;

        let dimension = embedding_dimension(&config.embedding_model).with_context(|| {
            format!("Unknown embedding model: {}", config.embedding_model)
        })?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            url,
            api_key,
            model: config.embedding_model.clone(),
            dimension,
            max_tokens_per_batch: config.max_tokens_per_batch,
            max_concurrency: config.max_concurrency.max(1),
            agent,
            retry,
            counter,
        })
    }

    /// Expected vector length for this client's model
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn request_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            input: text,
            model: &self.model,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .retry
            .run(
                || {
                    self.agent
                        .post(self.url.as_str())
                        .header("Content-Type", "application/json")
                        .header("Authorization", &format!("Bearer {}", self.api_key))
                        .send(&request_json)
                        .and_then(|mut resp| resp.body_mut().read_to_string())
                },
                is_retryable_error,
            )
            .map_err(|error| DocragError::Embedding(format!("Request failed: {}", error)))?;

        let response: EmbeddingResponse = serde_json::from_str(&response_text)
            .context("Failed to parse embedding response")?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .context("Embedding response contained no data")?
            .embedding;

        if embedding.len() != self.dimension {
            return Err(DocragError::Validation(format!(
                "Expected embedding dimension to be {}, but got {}",
                self.dimension,
                embedding.len()
            ))
            .into());
        }

        Ok(embedding)
    }

    /// Embed every text of one token-bounded sub-batch through the
    /// single-text path, on a bounded pool of scoped worker threads.
    /// Each worker writes into the slot for its original position, so output
    /// order never depends on completion order.
    fn flush_sub_batch(
        &self,
        texts: &[String],
        indices: &[usize],
        results: &mut [Option<Vec<f32>>],
    ) -> Result<()> {
        debug!("Flushing embedding sub-batch of {} texts", indices.len());

        for group in indices.chunks(self.max_concurrency) {
            let outputs: Result<Vec<(usize, Result<Vec<f32>>)>> = std::thread::scope(|scope| {
                let handles: Vec<_> = group
                    .iter()
                    .map(|&i| {
                        let text = texts[i].as_str();
                        scope.spawn(move || (i, self.request_embedding(text)))
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|handle| {
                        handle
                            .join()
                            .map_err(|_| anyhow::anyhow!("Embedding worker thread panicked"))
                    })
                    .collect()
            });

            for (i, result) in outputs? {
                let vector =
                    result.with_context(|| format!("Failed to embed text at position {}", i))?;
                results[i] = Some(vector);
            }
        }

        Ok(())
    }
}

impl Embedder for OpenAiClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());
        self.request_embedding(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let cleaned: Vec<String> = texts.iter().map(|t| t.replace('\n', " ")).collect();

        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(cleaned.len());
        results.resize_with(cleaned.len(), || None);

        let mut current: Vec<usize> = Vec::new();
        let mut current_tokens = 0usize;

        for (i, text) in cleaned.iter().enumerate() {
            let text_tokens = self.counter.count(text);

            if !current.is_empty() && current_tokens + text_tokens > self.max_tokens_per_batch {
                self.flush_sub_batch(&cleaned, &current, &mut results)?;
                current.clear();
                current_tokens = 0;
            }

            if text_tokens > self.max_tokens_per_batch {
                warn!(
                    "Text of {} tokens exceeds the {}-token batch limit and will be sent alone",
                    text_tokens, self.max_tokens_per_batch
                );
            }

            current.push(i);
            current_tokens += text_tokens;
        }

        if !current.is_empty() {
            self.flush_sub_batch(&cleaned, &current, &mut results)?;
        }

        let vectors = results
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| anyhow::anyhow!("Missing embedding for input {}", i))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Generated {} embeddings total", vectors.len());
        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Whether an HTTP failure is worth retrying: rate limiting, server errors,
/// and transport-level problems are transient; other client errors are not.
fn is_retryable_error(error: &ureq::Error) -> bool {
    match error {
        ureq::Error::StatusCode(status) => *status == 429 || *status >= 500,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => true,
        _ => false,
    }
}
