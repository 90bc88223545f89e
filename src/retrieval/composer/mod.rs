
use anyhow::{Context, Result};
use tracing::debug;

use crate::cache::VectorCache;
use crate::database::Database;
use crate::database::queries::PreferenceQueries;
use crate::embeddings::Embedder;
use crate::retrieval::selector::{RelevantChunk, find_relevant_sections};

const KNOWLEDGE_PREFACE: &str = "The following text excerpts are provided for context. \
    Use this information to critically analyze and fully answer the user query that follows. \
    Cite the excerpts as needed.\n=== Begin Knowledge Context ===\n";

const KNOWLEDGE_ENDING: &str = "=== End Knowledge Context ===\n\
    Provide your authoritative and nuanced answer using the text excerpts above. \
    Ensure comprehensive attention to detail and incorporate the specific text excerpts in your response. \
    Omit disclaimers, apologies, and AI self-references. \
    Provide unbiased, holistic guidance and analysis. \
    Now, answer the user question below based on the context provided:\n";

/// The prompt to send to the language model, plus the `(chunk_id, rank)`
/// pairs to persist as message-chunk associations once the reply is saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AugmentedQuery {
    pub prompt: String,
    pub associations: Vec<(String, i64)>,
}

impl AugmentedQuery {
    fn passthrough(user_query: &str) -> Self {
        Self {
            prompt: user_query.to_string(),
            associations: Vec::new(),
        }
    }
}

/// Format the selected chunks into a knowledge-context block wrapped around
/// the user's query. Title, author, and page lines appear only when present;
/// the association list mirrors the selector's output unchanged.
pub fn compose_knowledge_context(
    sections: &[RelevantChunk],
    user_query: &str,
) -> AugmentedQuery {
    let mut context = String::from(KNOWLEDGE_PREFACE);
    let mut associations = Vec::with_capacity(sections.len());

    for section in sections {
        let mut parts: Vec<String> = Vec::new();
        if !section.title.is_empty() {
            parts.push(format!("Title: {}", section.title));
        }
        if let Some(author) = &section.author {
            parts.push(format!("Author: {}", author));
        }
        if let Some(pages) = &section.pages {
            parts.push(format!("Page: {}", pages));
        }
        parts.push(format!("Content: {}", section.content));

        context.push_str(&parts.join("\n"));
        context.push_str("\n\n");

        associations.push((section.chunk_id.clone(), section.similarity_rank));
    }

    context.push_str(KNOWLEDGE_ENDING);
    context.push_str(user_query);

    AugmentedQuery {
        prompt: context,
        associations,
    }
}

/// Augment `user_query` with retrieved knowledge context for the user.
///
/// When the user's preferences disable knowledge-query mode the original
/// query is returned untouched — checked before any embedding call so a
/// disabled user never costs an external request.
pub async fn append_knowledge_context(
    database: &Database,
    cache: &VectorCache,
    embedder: &dyn Embedder,
    user_id: &str,
    user_query: &str,
) -> Result<AugmentedQuery> {
    let preferences = PreferenceQueries::get_or_create(database.pool(), user_id).await?;

    if !preferences.knowledge_query_mode {
        debug!("Knowledge-query mode disabled for user {}", user_id);
        return Ok(AugmentedQuery::passthrough(user_query));
    }

    let query_vector = embedder
        .embed(user_query)
        .context("Failed to embed user query")?;

    let sections =
        find_relevant_sections(database, cache, user_id, &query_vector, &preferences).await?;

    debug!(
        "Composing knowledge context from {} sections for user {}",
        sections.len(),
        user_id
    );

    Ok(compose_knowledge_context(&sections, user_query))
}
