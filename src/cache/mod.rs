// Vector cache module
// In-memory, per-user embedding vectors with naive maximum-inner-product ranking


use anyhow::{Context, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::DocragError;
use crate::database::Database;
use crate::database::queries::EmbeddingQueries;
use crate::embeddings::embedding_dimension;

/// Encode an embedding vector as little-endian f32 bytes for BLOB storage
pub fn serialize_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a stored embedding, validating length and dimensionality.
///
/// A blob that is not a whole number of f32s, or whose element count differs
/// from the model's expected dimensionality, is a hard validation error;
/// vectors are never truncated or reinterpreted to fit.
pub fn deserialize_embedding(
    bytes: &[u8],
    expected_dimension: usize,
) -> Result<Vec<f32>, DocragError> {
    if bytes.len() % 4 != 0 {
        return Err(DocragError::Validation(format!(
            "Embedding blob of {} bytes is not a whole number of f32 values",
            bytes.len()
        )));
    }

    let dimension = bytes.len() / 4;
    if dimension != expected_dimension {
        return Err(DocragError::Validation(format!(
            "Unexpected embedding dimension: expected {}, got {}",
            expected_dimension, dimension
        )));
    }

    let vector = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Ok(vector)
}

/// An immutable snapshot of one user's embedding vectors, keyed by chunk id
#[derive(Debug, Clone, PartialEq)]
pub struct UserVectors {
    user_id: String,
    vectors: HashMap<String, Vec<f32>>,
}

impl UserVectors {
    pub(crate) fn new(user_id: impl Into<String>, vectors: HashMap<String, Vec<f32>>) -> Self {
        Self {
            user_id: user_id.into(),
            vectors,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.vectors.contains_key(chunk_id)
    }

    /// Naive maximum-inner-product search over a restricted id subset.
    ///
    /// Scores each requested id present in the snapshot by raw dot product
    /// (not cosine similarity) against `query_vector`, then returns
    /// `(chunk_id, rank)` pairs in descending score order with 1-based ranks.
    /// The scores themselves are discarded; only relative order matters
    /// downstream. Ids not present are silently skipped. Equal scores keep
    /// the order of `subset_ids` (stable sort).
    pub fn mips_naive(&self, query_vector: &[f32], subset_ids: &[String]) -> Vec<(String, i64)> {
        let mut similarities: Vec<(&String, f32)> = Vec::with_capacity(subset_ids.len());

        for id in subset_ids {
            if let Some(vector) = self.vectors.get(id) {
                similarities.push((id, dot(query_vector, vector)));
            }
        }

        similarities.sort_by(|a, b| b.1.total_cmp(&a.1));

        similarities
            .into_iter()
            .enumerate()
            .map(|(rank, (id, _))| (id.clone(), rank as i64 + 1))
            .collect()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

struct CacheInner {
    users: HashMap<String, Arc<UserVectors>>,
    load_order: VecDeque<String>,
}

/// Process-wide cache of per-user embedding vectors.
///
/// Entries are keyed by user id, so concurrent requests for different users
/// each see their own snapshot; loading one user never disturbs another's
/// entry. Loading always fully replaces that user's snapshot rather than
/// merging into it. Beyond `max_users` entries, the least recently loaded
/// user is evicted.
pub struct VectorCache {
    inner: Mutex<CacheInner>,
    max_users: usize,
}

impl VectorCache {
    pub fn new(max_users: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                users: HashMap::new(),
                load_order: VecDeque::new(),
            }),
            max_users: max_users.max(1),
        }
    }

    /// Return the cached snapshot for `user_id`, loading it from storage on
    /// a miss. The internal lock is never held across the database query.
    pub async fn get_or_load(
        &self,
        database: &Database,
        user_id: &str,
    ) -> Result<Arc<UserVectors>> {
        {
            let inner = self.inner.lock().expect("vector cache lock poisoned");
            if let Some(snapshot) = inner.users.get(user_id) {
                debug!("Vector cache hit for user {}", user_id);
                return Ok(Arc::clone(snapshot));
            }
        }

        self.reload(database, user_id).await
    }

    /// Load the user's vectors from storage and replace any cached snapshot.
    /// Covers exactly the user's embeddings whose documents are not deleted.
    pub async fn reload(&self, database: &Database, user_id: &str) -> Result<Arc<UserVectors>> {
        let embeddings = EmbeddingQueries::list_for_user(database.pool(), user_id)
            .await
            .context("Failed to load embeddings for vector cache")?;

        let mut vectors = HashMap::with_capacity(embeddings.len());
        for embedding in &embeddings {
            let dimension = embedding_dimension(&embedding.model).ok_or_else(|| {
                DocragError::Validation(format!(
                    "Stored embedding {} has unknown model: {}",
                    embedding.id, embedding.model
                ))
            })?;
            let vector = deserialize_embedding(&embedding.embedding, dimension)
                .map_err(anyhow::Error::from)
                .with_context(|| format!("Invalid stored embedding {}", embedding.id))?;
            vectors.insert(embedding.chunk_id.clone(), vector);
        }

        let snapshot = Arc::new(UserVectors::new(user_id, vectors));

        let mut inner = self.inner.lock().expect("vector cache lock poisoned");
        if inner.users.insert(user_id.to_string(), Arc::clone(&snapshot)).is_some() {
            inner.load_order.retain(|id| id != user_id);
        }
        inner.load_order.push_back(user_id.to_string());

        while inner.users.len() > self.max_users {
            let Some(evicted) = inner.load_order.pop_front() else {
                break;
            };
            inner.users.remove(&evicted);
            debug!("Evicted vector cache entry for user {}", evicted);
        }
        drop(inner);

        info!(
            "Loaded {} vectors into cache for user {}",
            snapshot.len(),
            user_id
        );
        Ok(snapshot)
    }

    /// Drop the cached snapshot for one user, forcing the next lookup to
    /// reload from storage. Call after ingesting or deleting documents.
    pub fn invalidate(&self, user_id: &str) {
        let mut inner = self.inner.lock().expect("vector cache lock poisoned");
        inner.users.remove(user_id);
        inner.load_order.retain(|id| id != user_id);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("vector cache lock poisoned");
        inner.users.clear();
        inner.load_order.clear();
    }

    pub fn cached_users(&self) -> usize {
        self.inner
            .lock()
            .expect("vector cache lock poisoned")
            .users
            .len()
    }
}
