//! Async client for a Voyage-style embeddings + rerank REST API.

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use catalog_core::config::VoyageSettings;
use catalog_core::retry::{with_retry, RetryPolicy};
use catalog_core::traits::{Embedder, RankedIndex, Reranker};
use catalog_core::{Error, Result};

pub struct VoyageClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    rerank_model: String,
    dimensions: usize,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RerankResponse {
    Wrapped { data: Vec<RerankItem> },
    Bare(Vec<RerankItem>),
}

#[derive(Debug, Deserialize)]
struct RerankItem {
    index: usize,
    #[serde(alias = "relevance_score")]
    score: f64,
}

impl VoyageClient {
    /// Build a client. An absent API key is a configuration error here; the
    /// caller decides whether to build one at all.
    pub fn new(settings: &VoyageSettings, retry: RetryPolicy) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::InvalidConfig("voyage.api_key is not set".into()))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
            rerank_model: settings.rerank_model.clone(),
            dimensions: settings.dimensions,
            retry,
        })
    }

    /// One POST, no retry. Non-2xx and undecodable bodies are infrastructure failures.
    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::infrastructure(format!("POST {path} failed"), e))?;
        let resp = resp
            .error_for_status()
            .map_err(|e| Error::infrastructure(format!("POST {path} was rejected"), e))?;
        resp.json::<T>()
            .await
            .map_err(|e| Error::infrastructure(format!("POST {path} returned an unreadable body"), e))
    }
}

#[async_trait]
impl Embedder for VoyageClient {
    fn dim(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = &json!({ "input": text, "model": self.model });
        let vector = with_retry(&self.retry, "voyage:embed", || async move {
            let resp: EmbeddingResponse = self.post("embeddings", body).await?;
            first_embedding(resp)
        })
        .await?;
        debug!(dim = vector.len(), "voyage embedding received");
        Ok(vector)
    }
}

#[async_trait]
impl Reranker for VoyageClient {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RankedIndex>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let body = &json!({ "query": query, "documents": documents, "model": self.rerank_model });
        with_retry(&self.retry, "voyage:rerank", || async move {
            let resp: RerankResponse = self.post("rerank", body).await?;
            ranked(resp, documents.len())
        })
        .await
    }
}

fn first_embedding(resp: EmbeddingResponse) -> Result<Vec<f32>> {
    let vector = resp.data.into_iter().next().map(|d| d.embedding).unwrap_or_default();
    if vector.is_empty() || vector.iter().all(|x| *x == 0.0) {
        return Err(Error::infrastructure("embedding API returned an empty vector", anyhow!("no usable embedding")));
    }
    Ok(vector)
}

/// Validate indices and return results sorted by descending score.
fn ranked(resp: RerankResponse, len: usize) -> Result<Vec<RankedIndex>> {
    let items = match resp {
        RerankResponse::Wrapped { data } => data,
        RerankResponse::Bare(items) => items,
    };
    if let Some(bad) = items.iter().find(|i| i.index >= len || !i.score.is_finite()) {
        return Err(Error::infrastructure(
            "rerank API returned an invalid entry",
            anyhow!("index {} score {} for {len} documents", bad.index, bad.score),
        ));
    }
    let mut out: Vec<RankedIndex> = items.into_iter().map(|i| RankedIndex { index: i.index, score: i.score }).collect();
    out.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(out)
}
