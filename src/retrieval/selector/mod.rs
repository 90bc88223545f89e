
use anyhow::Result;
use std::collections::HashMap;
use tracing::debug;

use crate::DocragError;
use crate::cache::VectorCache;
use crate::database::Database;
use crate::database::models::{ChatPreferences, ChunkWithDocument};
use crate::database::queries::{ChunkQueries, ContextWindowQueries};

/// A chunk chosen for the knowledge context, with its similarity rank and
/// the metadata needed to present it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevantChunk {
    pub chunk_id: String,
    pub similarity_rank: i64,
    pub title: String,
    pub author: Option<String>,
    pub pages: Option<String>,
    pub content: String,
    pub tokens: i64,
}

impl RelevantChunk {
    fn from_candidate(candidate: &ChunkWithDocument, similarity_rank: i64) -> Self {
        Self {
            chunk_id: candidate.id.clone(),
            similarity_rank,
            title: candidate.title.clone(),
            author: candidate.author.clone(),
            pages: candidate.pages.clone(),
            content: candidate.content.clone(),
            tokens: candidate.tokens,
        }
    }
}

/// Select the chunks most similar to the query embedding that fit inside the
/// user's knowledge-context budget.
///
/// The budget is `knowledge_context_tokens` percent of the selected model's
/// context window. Candidates are the chunks of the user's selected,
/// non-deleted documents; they are ranked by `mips_naive` and accumulated in
/// rank order. Selection stops at the first chunk that would overflow the
/// budget — a greedy prefix of the ranking, not a best-fit search — so a
/// smaller chunk further down the ranking is never pulled forward.
pub async fn find_relevant_sections(
    database: &Database,
    cache: &VectorCache,
    user_id: &str,
    query_vector: &[f32],
    preferences: &ChatPreferences,
) -> Result<Vec<RelevantChunk>> {
    let context_window_size = ContextWindowQueries::get_size(database.pool(), &preferences.model)
        .await?
        .ok_or_else(|| {
            DocragError::Validation(format!(
                "No context window size configured for model {}",
                preferences.model
            ))
        })?;

    let max_knowledge_tokens =
        (preferences.knowledge_context_tokens as f64 / 100.0) * context_window_size as f64;

    let candidates = ChunkQueries::list_selected_for_user(database.pool(), user_id).await?;
    let candidates_by_id: HashMap<&str, &ChunkWithDocument> =
        candidates.iter().map(|c| (c.id.as_str(), c)).collect();
    let subset_ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();

    let snapshot = cache.get_or_load(database, user_id).await?;
    let ranked = snapshot.mips_naive(query_vector, &subset_ids);

    debug!(
        "Ranked {} of {} candidate chunks for user {} (budget {} tokens)",
        ranked.len(),
        candidates.len(),
        user_id,
        max_knowledge_tokens as i64
    );

    let mut selected = Vec::new();
    let mut current_tokens = 0i64;

    for (chunk_id, similarity_rank) in ranked {
        let candidate = candidates_by_id.get(chunk_id.as_str());
        match candidate {
            Some(chunk) if (current_tokens + chunk.tokens) as f64 <= max_knowledge_tokens => {
                selected.push(RelevantChunk::from_candidate(chunk, similarity_rank));
                current_tokens += chunk.tokens;
            }
            _ => break,
        }
    }

    debug!(
        "Selected {} chunks totalling {} tokens",
        selected.len(),
        current_tokens
    );

    Ok(selected)
}
