// Ingestion module
// Turns raw paginated text into a persisted document with chunks and embeddings


use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::DocragError;
use crate::database::Database;
use crate::database::models::{Document, NewDocument, NewDocumentChunk, NewDocumentEmbedding};
use crate::database::queries::{ChunkQueries, DocumentQueries, EmbeddingQueries};
use crate::cache::serialize_embedding;
use crate::embeddings::Embedder;
use crate::segmenter::{PageText, page_label, paginate_plain_text, segment_pages};
use crate::tokenizer::TokenCounter;

/// Ingest a document: segment the pages, embed every chunk, and persist the
/// document, its chunks, and their embeddings in a single transaction.
///
/// Unsegmentable input is rejected before any embedding call. The embedding
/// batch runs before the transaction opens, so storage holds either all of a
/// document's rows or none of them; a failure partway through the batch
/// leaves no partial state behind.
pub async fn ingest_document(
    database: &Database,
    embedder: &dyn Embedder,
    counter: &TokenCounter,
    user_id: &str,
    title: &str,
    author: Option<&str>,
    pages: &[PageText],
    max_chunk_tokens: usize,
) -> Result<Document> {
    let segmented = segment_pages(counter, pages, max_chunk_tokens);

    if segmented.is_empty() {
        return Err(DocragError::UnsupportedInput(
            "Document contains no extractable text".to_string(),
        )
        .into());
    }

    debug!(
        "Embedding {} chunks for document '{}'",
        segmented.chunks.len(),
        title
    );

    let texts: Vec<String> = segmented.chunks.iter().map(|c| c.content.clone()).collect();
    let vectors = embedder
        .embed_batch(&texts)
        .with_context(|| format!("Failed to embed chunks for document '{}'", title))?;

    if vectors.len() != segmented.chunks.len() {
        return Err(DocragError::Validation(format!(
            "The number of embeddings ({}) does not match the number of document chunks ({})",
            vectors.len(),
            segmented.chunks.len()
        ))
        .into());
    }

    let mut tx = database
        .pool()
        .begin()
        .await
        .context("Failed to begin ingest transaction")?;

    let document = DocumentQueries::create(
        &mut *tx,
        NewDocument {
            user_id: user_id.to_string(),
            title: title.to_string(),
            author: author.map(str::to_string),
            total_tokens: segmented.total_tokens as i64,
            pages: Some(format!("{} pages", pages.len())),
        },
    )
    .await?;

    let new_chunks = segmented
        .chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| NewDocumentChunk {
            document_id: document.id.clone(),
            chunk_index: i as i64,
            content: chunk.content.clone(),
            tokens: chunk.tokens as i64,
            pages: page_label(&chunk.pages),
        })
        .collect();
    let chunks = ChunkQueries::create_all(&mut tx, new_chunks).await?;

    let new_embeddings = chunks
        .iter()
        .zip(vectors.iter())
        .map(|(chunk, vector)| NewDocumentEmbedding {
            chunk_id: chunk.id.clone(),
            user_id: user_id.to_string(),
            embedding: serialize_embedding(vector),
            model: embedder.model_name().to_string(),
        })
        .collect();
    EmbeddingQueries::create_all(&mut tx, new_embeddings).await?;

    tx.commit().await.context("Failed to commit ingest transaction")?;

    info!(
        "Ingested document '{}' for user {}: {} chunks, {} tokens",
        document.title,
        user_id,
        chunks.len(),
        document.total_tokens
    );

    Ok(document)
}

/// Read paginated text from a plain-text file, estimating page boundaries by
/// word count. Anything but `.txt`/`.md` is rejected here, before any
/// embedding call; richer formats arrive through their own extractors as
/// pre-paginated text.
pub fn read_pages_from_file(path: &Path, words_per_page: usize) -> Result<Vec<PageText>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "md" => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read file: {}", path.display()))?;
            Ok(paginate_plain_text(&text, words_per_page))
        }
        _ => Err(DocragError::UnsupportedInput(format!(
            "Unsupported file type: .{}",
            extension
        ))
        .into()),
    }
}
