
use super::models::*;
use anyhow::{Context, Result};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

pub struct DocumentQueries;

impl DocumentQueries {
    pub async fn create<'e, E>(executor: E, new_document: NewDocument) -> Result<Document>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let document = new_document.into_document();

        sqlx::query(
            "INSERT INTO documents (id, user_id, title, author, total_tokens, pages, selected, deleted, created_date)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&document.id)
        .bind(&document.user_id)
        .bind(&document.title)
        .bind(&document.author)
        .bind(document.total_tokens)
        .bind(&document.pages)
        .bind(document.selected)
        .bind(document.deleted)
        .bind(document.created_date)
        .execute(executor)
        .await
        .context("Failed to create document")?;

        Ok(document)
    }

    pub async fn get_by_id<'e, E>(executor: E, id: &str) -> Result<Option<Document>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await
            .context("Failed to get document by id")
    }

    pub async fn list_for_user<'e, E>(executor: E, user_id: &str) -> Result<Vec<Document>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE user_id = ? AND deleted = 0 ORDER BY created_date DESC, id",
        )
        .bind(user_id)
        .fetch_all(executor)
        .await
        .context("Failed to list documents for user")
    }

    pub async fn update(
        pool: &SqlitePool,
        id: &str,
        update: DocumentUpdate,
    ) -> Result<Option<Document>> {
        let Some(mut document) = Self::get_by_id(pool, id).await? else {
            return Ok(None);
        };

        if let Some(title) = update.title {
            document.title = title;
        }
        if let Some(author) = update.author {
            document.author = Some(author);
        }
        if let Some(selected) = update.selected {
            document.selected = selected;
        }

        sqlx::query("UPDATE documents SET title = ?, author = ?, selected = ? WHERE id = ?")
            .bind(&document.title)
            .bind(&document.author)
            .bind(document.selected)
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to update document")?;

        Ok(Some(document))
    }

    pub async fn set_selected<'e, E>(executor: E, id: &str, selected: bool) -> Result<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("UPDATE documents SET selected = ? WHERE id = ? AND deleted = 0")
            .bind(selected)
            .bind(id)
            .execute(executor)
            .await
            .context("Failed to set document selection")?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a document deleted without removing its rows. Soft-deleted
    /// documents are excluded from listings, retrieval, and cache loads.
    pub async fn soft_delete<'e, E>(executor: E, id: &str) -> Result<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("UPDATE documents SET deleted = 1, selected = 0 WHERE id = ?")
            .bind(id)
            .execute(executor)
            .await
            .context("Failed to soft-delete document")?;

        Ok(result.rows_affected() > 0)
    }

    /// Hard delete. Chunks and their embeddings go with the document via
    /// cascading foreign keys.
    pub async fn delete<'e, E>(executor: E, id: &str) -> Result<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(executor)
            .await
            .context("Failed to delete document")?;

        debug!("Deleted document {} ({} rows)", id, result.rows_affected());
        Ok(result.rows_affected() > 0)
    }
}

pub struct ChunkQueries;

impl ChunkQueries {
    pub async fn create_all(
        conn: &mut SqliteConnection,
        new_chunks: Vec<NewDocumentChunk>,
    ) -> Result<Vec<DocumentChunk>> {
        let mut chunks = Vec::with_capacity(new_chunks.len());

        for new_chunk in new_chunks {
            let chunk = new_chunk.into_chunk();

            sqlx::query(
                "INSERT INTO document_chunks (id, document_id, chunk_index, content, tokens, pages, created_date)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.tokens)
            .bind(&chunk.pages)
            .bind(chunk.created_date)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to create chunk {}", chunk.chunk_index))?;

            chunks.push(chunk);
        }

        Ok(chunks)
    }

    pub async fn get_by_id<'e, E>(executor: E, id: &str) -> Result<Option<DocumentChunk>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, DocumentChunk>("SELECT * FROM document_chunks WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await
            .context("Failed to get chunk by id")
    }

    pub async fn list_by_document<'e, E>(
        executor: E,
        document_id: &str,
    ) -> Result<Vec<DocumentChunk>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, DocumentChunk>(
            "SELECT * FROM document_chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(executor)
        .await
        .context("Failed to list chunks for document")
    }

    /// Retrieval candidates: every chunk of the user's selected, non-deleted
    /// documents, joined with document title and author.
    pub async fn list_selected_for_user<'e, E>(
        executor: E,
        user_id: &str,
    ) -> Result<Vec<ChunkWithDocument>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, ChunkWithDocument>(
            "SELECT c.id, c.document_id, c.chunk_index, c.content, c.tokens, c.pages,
                    d.title, d.author
             FROM document_chunks c
             JOIN documents d ON d.id = c.document_id
             WHERE d.user_id = ? AND d.selected = 1 AND d.deleted = 0
             ORDER BY d.created_date, c.chunk_index",
        )
        .bind(user_id)
        .fetch_all(executor)
        .await
        .context("Failed to list selected chunks for user")
    }
}

pub struct EmbeddingQueries;

impl EmbeddingQueries {
    pub async fn create_all(
        conn: &mut SqliteConnection,
        new_embeddings: Vec<NewDocumentEmbedding>,
    ) -> Result<Vec<DocumentEmbedding>> {
        let mut embeddings = Vec::with_capacity(new_embeddings.len());

        for new_embedding in new_embeddings {
            let embedding = new_embedding.into_embedding();

            sqlx::query(
                "INSERT INTO document_embeddings (id, chunk_id, user_id, embedding, model, created_date)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&embedding.id)
            .bind(&embedding.chunk_id)
            .bind(&embedding.user_id)
            .bind(&embedding.embedding)
            .bind(&embedding.model)
            .bind(embedding.created_date)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to store embedding for chunk {}", embedding.chunk_id))?;

            embeddings.push(embedding);
        }

        Ok(embeddings)
    }

    /// All embeddings belonging to the user's non-deleted documents. This is
    /// the vector-cache load path; selection is applied later, per query.
    pub async fn list_for_user<'e, E>(executor: E, user_id: &str) -> Result<Vec<DocumentEmbedding>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, DocumentEmbedding>(
            "SELECT e.id, e.chunk_id, e.user_id, e.embedding, e.model, e.created_date
             FROM document_embeddings e
             JOIN document_chunks c ON c.id = e.chunk_id
             JOIN documents d ON d.id = c.document_id
             WHERE e.user_id = ? AND d.deleted = 0",
        )
        .bind(user_id)
        .fetch_all(executor)
        .await
        .context("Failed to list embeddings for user")
    }
}

pub struct ContextWindowQueries;

impl ContextWindowQueries {
    pub async fn get_size<'e, E>(executor: E, model_name: &str) -> Result<Option<i64>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>(
            "SELECT context_window_size FROM model_context_windows WHERE model_name = ?",
        )
        .bind(model_name)
        .fetch_optional(executor)
        .await
        .context("Failed to look up context window size")
    }

    pub async fn upsert<'e, E>(executor: E, model_name: &str, context_window_size: i64) -> Result<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT INTO model_context_windows (model_name, context_window_size) VALUES (?, ?)
             ON CONFLICT (model_name) DO UPDATE SET context_window_size = excluded.context_window_size",
        )
        .bind(model_name)
        .bind(context_window_size)
        .execute(executor)
        .await
        .context("Failed to upsert context window size")?;

        Ok(())
    }
}

pub struct PreferenceQueries;

impl PreferenceQueries {
    pub async fn get<'e, E>(executor: E, user_id: &str) -> Result<Option<ChatPreferences>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, ChatPreferences>("SELECT * FROM chat_preferences WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(executor)
            .await
            .context("Failed to get chat preferences")
    }

    pub async fn get_or_create(pool: &SqlitePool, user_id: &str) -> Result<ChatPreferences> {
        if let Some(preferences) = Self::get(pool, user_id).await? {
            return Ok(preferences);
        }

        let preferences = ChatPreferences::default_for(user_id);

        sqlx::query(
            "INSERT OR IGNORE INTO chat_preferences (user_id, model, knowledge_query_mode, knowledge_context_tokens)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&preferences.user_id)
        .bind(&preferences.model)
        .bind(preferences.knowledge_query_mode)
        .bind(preferences.knowledge_context_tokens)
        .execute(pool)
        .await
        .context("Failed to create default chat preferences")?;

        Self::get(pool, user_id)
            .await?
            .context("Preferences missing after creation")
    }

    pub async fn update(
        pool: &SqlitePool,
        user_id: &str,
        update: PreferencesUpdate,
    ) -> Result<ChatPreferences> {
        let mut preferences = Self::get_or_create(pool, user_id).await?;

        if let Some(model) = update.model {
            preferences.model = model;
        }
        if let Some(mode) = update.knowledge_query_mode {
            preferences.knowledge_query_mode = mode;
        }
        if let Some(percent) = update.knowledge_context_tokens {
            preferences.knowledge_context_tokens = percent.clamp(0, 100);
        }

        sqlx::query(
            "UPDATE chat_preferences SET model = ?, knowledge_query_mode = ?, knowledge_context_tokens = ?
             WHERE user_id = ?",
        )
        .bind(&preferences.model)
        .bind(preferences.knowledge_query_mode)
        .bind(preferences.knowledge_context_tokens)
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to update chat preferences")?;

        Ok(preferences)
    }
}

pub struct AssociationQueries;

impl AssociationQueries {
    /// Persist which chunks a message used, with their similarity ranks
    pub async fn create_all(
        conn: &mut SqliteConnection,
        message_id: &str,
        associations: &[(String, i64)],
    ) -> Result<()> {
        for (chunk_id, similarity_rank) in associations {
            sqlx::query(
                "INSERT INTO message_chunk_associations (message_id, chunk_id, similarity_rank)
                 VALUES (?, ?, ?)",
            )
            .bind(message_id)
            .bind(chunk_id)
            .bind(similarity_rank)
            .execute(&mut *conn)
            .await
            .context("Failed to create message-chunk association")?;
        }

        Ok(())
    }

    pub async fn list_for_message<'e, E>(
        executor: E,
        message_id: &str,
    ) -> Result<Vec<MessageChunkAssociation>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, MessageChunkAssociation>(
            "SELECT * FROM message_chunk_associations WHERE message_id = ? ORDER BY similarity_rank",
        )
        .bind(message_id)
        .fetch_all(executor)
        .await
        .context("Failed to list associations for message")
    }
}
