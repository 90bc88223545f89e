use anyhow::{Context, Result};
use std::path::Path;

use tracing::info;

use crate::config::{Config, get_config_dir};
use crate::cache::VectorCache;
use crate::database::Database;
use crate::database::models::{DocumentUpdate, PreferencesUpdate};
use crate::database::queries::{ChunkQueries, DocumentQueries, PreferenceQueries};
use crate::embeddings::{OpenAiClient, RetryPolicy};
use crate::ingest::{ingest_document, read_pages_from_file};
use crate::retrieval::append_knowledge_context;
use crate::tokenizer::TokenCounter;

async fn open_database(config: &Config) -> Result<Database> {
    Database::initialize_from_config_dir(&config.base_dir)
        .await
        .context("Failed to initialize database")
}

fn build_client(config: &Config) -> Result<OpenAiClient> {
    let counter = TokenCounter::new()?;
    OpenAiClient::new(
        &config.openai,
        RetryPolicy::from_config(&config.retry),
        counter,
    )
}

/// Ingest a document from a plain-text file
pub async fn ingest_file(
    config: &Config,
    user_id: &str,
    path: &Path,
    title: Option<String>,
    author: Option<String>,
    select: bool,
) -> Result<()> {
    info!("Ingesting document from {}", path.display());

    let pages = read_pages_from_file(path, config.segmenter.words_per_page)?;

    let title = title.unwrap_or_else(|| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string())
    });

    let database = open_database(config).await?;
    let client = build_client(config)?;
    let counter = TokenCounter::new()?;

    let document = ingest_document(
        &database,
        &client,
        &counter,
        user_id,
        &title,
        author.as_deref(),
        &pages,
        config.segmenter.max_chunk_tokens,
    )
    .await?;

    if select {
        DocumentQueries::set_selected(database.pool(), &document.id, true)
            .await
            .context("Failed to select document")?;
    }

    let chunks = ChunkQueries::list_by_document(database.pool(), &document.id).await?;

    println!("Ingested document: {} (ID: {})", document.title, document.id);
    println!("  Chunks: {}", chunks.len());
    println!("  Total tokens: {}", document.total_tokens);
    if let Some(pages) = &document.pages {
        println!("  Pages: {}", pages);
    }
    if select {
        println!("  Selected for retrieval");
    }

    Ok(())
}

/// List the user's documents
pub async fn list_documents(config: &Config, user_id: &str) -> Result<()> {
    let database = open_database(config).await?;

    let documents = DocumentQueries::list_for_user(database.pool(), user_id)
        .await
        .context("Failed to list documents")?;

    if documents.is_empty() {
        println!("No documents have been ingested yet.");
        println!("Use 'docrag ingest <file>' to add one.");
        return Ok(());
    }

    println!("Documents ({} total):", documents.len());
    println!();

    for document in &documents {
        let marker = if document.selected { "*" } else { " " };
        println!("{} {} (ID: {})", marker, document.title, document.id);
        if let Some(author) = &document.author {
            println!("   Author: {}", author);
        }
        println!("   Tokens: {}", document.total_tokens);
        if let Some(pages) = &document.pages {
            println!("   Pages: {}", pages);
        }
    }

    println!();
    println!("* = selected for retrieval");

    Ok(())
}

/// Toggle whether a document participates in retrieval
pub async fn select_document(config: &Config, document_id: &str, selected: bool) -> Result<()> {
    let database = open_database(config).await?;

    let changed = DocumentQueries::set_selected(database.pool(), document_id, selected).await?;

    if changed {
        let verb = if selected { "Selected" } else { "Deselected" };
        println!("{} document {}", verb, document_id);
    } else {
        println!("No document found with ID {}", document_id);
    }

    Ok(())
}

/// Update a document's title or author
pub async fn update_document(
    config: &Config,
    document_id: &str,
    title: Option<String>,
    author: Option<String>,
) -> Result<()> {
    let database = open_database(config).await?;

    let updated = DocumentQueries::update(
        database.pool(),
        document_id,
        DocumentUpdate {
            title,
            author,
            selected: None,
        },
    )
    .await?;

    match updated {
        Some(document) => {
            println!("Updated document: {} (ID: {})", document.title, document.id);
        }
        None => println!("No document found with ID {}", document_id),
    }

    Ok(())
}

/// Delete a document. Soft-deletes by default; `purge` removes the rows and
/// cascades to chunks and embeddings.
pub async fn delete_document(config: &Config, document_id: &str, purge: bool) -> Result<()> {
    let database = open_database(config).await?;

    let deleted = if purge {
        DocumentQueries::delete(database.pool(), document_id).await?
    } else {
        DocumentQueries::soft_delete(database.pool(), document_id).await?
    };

    if deleted {
        let how = if purge { "Purged" } else { "Deleted" };
        println!("{} document {}", how, document_id);
    } else {
        println!("No document found with ID {}", document_id);
    }

    Ok(())
}

/// Show or update the user's retrieval preferences
pub async fn update_preferences(
    config: &Config,
    user_id: &str,
    model: Option<String>,
    knowledge_query_mode: Option<bool>,
    knowledge_context_tokens: Option<i64>,
) -> Result<()> {
    let database = open_database(config).await?;

    let preferences = if model.is_none()
        && knowledge_query_mode.is_none()
        && knowledge_context_tokens.is_none()
    {
        PreferenceQueries::get_or_create(database.pool(), user_id).await?
    } else {
        PreferenceQueries::update(
            database.pool(),
            user_id,
            PreferencesUpdate {
                model,
                knowledge_query_mode,
                knowledge_context_tokens,
            },
        )
        .await?
    };

    println!("Preferences for user {}:", user_id);
    println!("  Model: {}", preferences.model);
    println!(
        "  Knowledge-query mode: {}",
        if preferences.knowledge_query_mode {
            "on"
        } else {
            "off"
        }
    );
    println!(
        "  Knowledge context: {}% of the model's context window",
        preferences.knowledge_context_tokens
    );

    Ok(())
}

/// Run a query through retrieval and print the augmented prompt
pub async fn query_knowledge(config: &Config, user_id: &str, query: &str) -> Result<()> {
    let database = open_database(config).await?;
    let client = build_client(config)?;
    let cache = VectorCache::new(4);

    let augmented = append_knowledge_context(&database, &cache, &client, user_id, query).await?;

    if augmented.associations.is_empty() {
        println!("No knowledge context applied.");
    } else {
        println!(
            "Knowledge context applied ({} chunks):",
            augmented.associations.len()
        );
        for (chunk_id, rank) in &augmented.associations {
            println!("  rank {}: chunk {}", rank, chunk_id);
        }
    }

    println!();
    println!("{}", augmented.prompt);

    Ok(())
}

/// Print the active configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("Configuration directory: {}", get_config_dir()?.display());
    println!();
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
