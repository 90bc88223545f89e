// Retrieval module
// Ranks cached vectors against a query embedding, selects chunks inside the
// context-token budget, and composes the augmented prompt

pub mod composer;
pub mod selector;

pub use composer::{AugmentedQuery, append_knowledge_context, compose_knowledge_context};
pub use selector::{RelevantChunk, find_relevant_sections};
