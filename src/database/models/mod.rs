
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An uploaded source document. Soft-delete and creation time are explicit
/// columns; queries filter `deleted` at each call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub author: Option<String>,
    pub total_tokens: i64,
    /// Page-count label for display, e.g. "12 pages"
    pub pages: Option<String>,
    /// Whether the document participates in retrieval
    pub selected: bool,
    pub deleted: bool,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub user_id: String,
    pub title: String,
    pub author: Option<String>,
    pub total_tokens: i64,
    pub pages: Option<String>,
}

impl NewDocument {
    pub fn into_document(self) -> Document {
        Document {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id,
            title: self.title,
            author: self.author,
            total_tokens: self.total_tokens,
            pages: self.pages,
            selected: false,
            deleted: false,
            created_date: Utc::now().naive_utc(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub selected: Option<bool>,
}

/// A contiguous span of a document's processed text. Chunk indices within a
/// document are contiguous from 0 and define storage order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub tokens: i64,
    /// Page label for the chunk's source pages, e.g. "3" or "2-4"
    pub pages: Option<String>,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocumentChunk {
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub tokens: i64,
    pub pages: Option<String>,
}

impl NewDocumentChunk {
    pub fn into_chunk(self) -> DocumentChunk {
        DocumentChunk {
            id: Uuid::new_v4().to_string(),
            document_id: self.document_id,
            chunk_index: self.chunk_index,
            content: self.content,
            tokens: self.tokens,
            pages: self.pages,
            created_date: Utc::now().naive_utc(),
        }
    }
}

/// One embedding vector per chunk, stored as little-endian f32 bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DocumentEmbedding {
    pub id: String,
    pub chunk_id: String,
    pub user_id: String,
    pub embedding: Vec<u8>,
    pub model: String,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocumentEmbedding {
    pub chunk_id: String,
    pub user_id: String,
    pub embedding: Vec<u8>,
    pub model: String,
}

impl NewDocumentEmbedding {
    pub fn into_embedding(self) -> DocumentEmbedding {
        DocumentEmbedding {
            id: Uuid::new_v4().to_string(),
            chunk_id: self.chunk_id,
            user_id: self.user_id,
            embedding: self.embedding,
            model: self.model,
            created_date: Utc::now().naive_utc(),
        }
    }
}

/// Token capacity lookup for a language model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ModelContextWindow {
    pub model_name: String,
    pub context_window_size: i64,
}

/// Per-user retrieval preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ChatPreferences {
    pub user_id: String,
    pub model: String,
    /// Enables knowledge-context augmentation before chat completion
    pub knowledge_query_mode: bool,
    /// Percentage (0-100) of the model's context window allocated to
    /// retrieved knowledge
    pub knowledge_context_tokens: i64,
}

impl ChatPreferences {
    pub fn default_for(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            model: "gpt-4o".to_string(),
            knowledge_query_mode: false,
            knowledge_context_tokens: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PreferencesUpdate {
    pub model: Option<String>,
    pub knowledge_query_mode: Option<bool>,
    pub knowledge_context_tokens: Option<i64>,
}

/// Audit record tying a produced message to a chunk it used, with the
/// chunk's similarity rank at selection time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MessageChunkAssociation {
    pub message_id: String,
    pub chunk_id: String,
    pub similarity_rank: i64,
}

/// Selector candidate row: a chunk joined with its parent document's
/// title and author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ChunkWithDocument {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub tokens: i64,
    pub pages: Option<String>,
    pub title: String,
    pub author: Option<String>,
}
