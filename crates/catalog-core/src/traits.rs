use async_trait::async_trait;

use crate::error::Result;

/// Turns query text into a dense vector comparable with stored product embeddings.
///
/// Implementations must fail with an error rather than return an empty or
/// zero vector when the upstream call fails.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// One reranked document: position in the input slice and its relevance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedIndex {
    pub index: usize,
    pub score: f64,
}

/// Scores documents against a query. Output is sorted by descending score.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RankedIndex>>;
}
