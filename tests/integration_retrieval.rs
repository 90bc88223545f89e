//! End-to-end retrieval tests: ingest documents with a mock embedder, rank
//! and select chunks against a query, compose the augmented prompt, and
//! persist the audit associations.

use anyhow::Result;
use docrag::cache::VectorCache;
use docrag::database::Database;
use docrag::database::models::PreferencesUpdate;
use docrag::database::queries::{
    AssociationQueries, ChunkQueries, DocumentQueries, EmbeddingQueries, PreferenceQueries,
};
use docrag::embeddings::Embedder;
use docrag::ingest::ingest_document;
use docrag::retrieval::append_knowledge_context;
use docrag::segmenter::PageText;
use docrag::tokenizer::TokenCounter;
use tempfile::TempDir;

const DIM: usize = 1536;

/// Deterministic mock: the vector's first component is the text's word
/// count, so longer chunks score higher against a positive query vector.
struct WordCountEmbedder;

impl Embedder for WordCountEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; DIM];
        vector[0] = text.split_whitespace().count() as f32;
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn model_name(&self) -> &str {
        "text-embedding-ada-002"
    }
}

async fn create_test_database() -> (TempDir, Database) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let database = Database::new(temp_dir.path().join("test.db"))
        .await
        .expect("Failed to create database");
    (temp_dir, database)
}

async fn enable_retrieval(database: &Database, user_id: &str) {
    PreferenceQueries::update(
        database.pool(),
        user_id,
        PreferencesUpdate {
            model: Some("gpt-4o".to_string()),
            knowledge_query_mode: Some(true),
            knowledge_context_tokens: Some(30),
        },
    )
    .await
    .expect("Failed to enable retrieval");
}

fn story_pages() -> Vec<PageText> {
    vec![
        PageText::new(
            "The expedition set out at dawn. The mountain pass was still dark. \
             Supplies were counted twice before departure.",
            1,
        ),
        PageText::new(
            "By the third day the weather had turned. The party sheltered in a \
             cave above the treeline and waited out the storm.",
            2,
        ),
    ]
}

#[tokio::test]
async fn full_pipeline_from_ingest_to_augmented_prompt() {
    let (_temp_dir, database) = create_test_database().await;
    let counter = TokenCounter::new().expect("Failed to load encoding");
    let embedder = WordCountEmbedder;

    let document = ingest_document(
        &database,
        &embedder,
        &counter,
        "user-1",
        "Expedition Journal",
        Some("A. Climber"),
        &story_pages(),
        512,
    )
    .await
    .expect("Ingest should succeed");

    DocumentQueries::set_selected(database.pool(), &document.id, true)
        .await
        .expect("Failed to select document");
    enable_retrieval(&database, "user-1").await;

    let cache = VectorCache::new(4);
    let augmented = append_knowledge_context(
        &database,
        &cache,
        &embedder,
        "user-1",
        "what happened on the expedition?",
    )
    .await
    .expect("Augmentation should succeed");

    assert!(augmented.prompt.contains("=== Begin Knowledge Context ==="));
    assert!(augmented.prompt.contains("Title: Expedition Journal"));
    assert!(augmented.prompt.contains("Author: A. Climber"));
    assert!(augmented.prompt.ends_with("what happened on the expedition?"));
    assert!(!augmented.associations.is_empty());

    // Ranks are contiguous from 1 in selection order.
    let ranks: Vec<i64> = augmented.associations.iter().map(|(_, r)| *r).collect();
    let expected: Vec<i64> = (1..=ranks.len() as i64).collect();
    assert_eq!(ranks, expected);

    // Persist the audit associations the way the chat collaborator would.
    let mut conn = database
        .pool()
        .acquire()
        .await
        .expect("Failed to acquire connection");
    AssociationQueries::create_all(&mut conn, "message-1", &augmented.associations)
        .await
        .expect("Failed to persist associations");
    drop(conn);

    let stored = AssociationQueries::list_for_message(database.pool(), "message-1")
        .await
        .expect("Failed to list associations");
    assert_eq!(stored.len(), augmented.associations.len());
}

#[tokio::test]
async fn soft_deleted_documents_drop_out_after_invalidation() {
    let (_temp_dir, database) = create_test_database().await;
    let counter = TokenCounter::new().expect("Failed to load encoding");
    let embedder = WordCountEmbedder;

    let keep = ingest_document(
        &database,
        &embedder,
        &counter,
        "user-1",
        "Kept Document",
        None,
        &story_pages(),
        512,
    )
    .await
    .expect("Ingest should succeed");
    let drop_doc = ingest_document(
        &database,
        &embedder,
        &counter,
        "user-1",
        "Dropped Document",
        None,
        &story_pages(),
        512,
    )
    .await
    .expect("Ingest should succeed");

    for id in [&keep.id, &drop_doc.id] {
        DocumentQueries::set_selected(database.pool(), id, true)
            .await
            .expect("Failed to select document");
    }
    enable_retrieval(&database, "user-1").await;

    let cache = VectorCache::new(4);
    let before = append_knowledge_context(&database, &cache, &embedder, "user-1", "query")
        .await
        .expect("Augmentation should succeed");
    assert!(before.prompt.contains("Dropped Document"));

    DocumentQueries::soft_delete(database.pool(), &drop_doc.id)
        .await
        .expect("Failed to soft-delete");
    cache.invalidate("user-1");

    let after = append_knowledge_context(&database, &cache, &embedder, "user-1", "query")
        .await
        .expect("Augmentation should succeed");

    assert!(after.prompt.contains("Kept Document"));
    assert!(!after.prompt.contains("Dropped Document"));
}

#[tokio::test]
async fn purging_a_document_removes_chunks_and_embeddings() {
    let (_temp_dir, database) = create_test_database().await;
    let counter = TokenCounter::new().expect("Failed to load encoding");
    let embedder = WordCountEmbedder;

    let document = ingest_document(
        &database,
        &embedder,
        &counter,
        "user-1",
        "Ephemeral",
        None,
        &story_pages(),
        512,
    )
    .await
    .expect("Ingest should succeed");

    DocumentQueries::delete(database.pool(), &document.id)
        .await
        .expect("Failed to delete document");

    let chunks = ChunkQueries::list_by_document(database.pool(), &document.id)
        .await
        .expect("Query should succeed");
    assert!(chunks.is_empty());

    let embeddings = EmbeddingQueries::list_for_user(database.pool(), "user-1")
        .await
        .expect("Query should succeed");
    assert!(embeddings.is_empty());
}

#[tokio::test]
async fn retrieval_disabled_returns_query_untouched() {
    let (_temp_dir, database) = create_test_database().await;
    let counter = TokenCounter::new().expect("Failed to load encoding");
    let embedder = WordCountEmbedder;

    let document = ingest_document(
        &database,
        &embedder,
        &counter,
        "user-1",
        "Unused Document",
        None,
        &story_pages(),
        512,
    )
    .await
    .expect("Ingest should succeed");
    DocumentQueries::set_selected(database.pool(), &document.id, true)
        .await
        .expect("Failed to select document");

    // Preferences default to knowledge_query_mode = false.
    let cache = VectorCache::new(4);
    let augmented =
        append_knowledge_context(&database, &cache, &embedder, "user-1", "plain question")
            .await
            .expect("Augmentation should succeed");

    assert_eq!(augmented.prompt, "plain question");
    assert!(augmented.associations.is_empty());
}
