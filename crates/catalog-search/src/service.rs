use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use catalog_core::config::{MappingPolicy, SearchSettings};
use catalog_core::shape::shape_document;
use catalog_core::traits::{Embedder, Reranker};
use catalog_core::types::{FusionWeights, StoreScope, StrategyKind};
use catalog_core::{Error, Product, Result, SearchRequest, SearchResponse, SearchResult, Strategy};
use catalog_plan::{hybrid_plan, keyword_plan, text_plan, vector_plan, Plan, PlanParams};
use catalog_store::{Envelope, Executor};

/// Runs one search end to end: embed if needed, plan, execute, shape, map.
///
/// Holds no per-request state; share it behind an `Arc` across requests.
pub struct SearchService {
    executor: Executor,
    embedder: Option<Arc<dyn Embedder>>,
    reranker: Option<Arc<dyn Reranker>>,
    params: PlanParams,
    settings: SearchSettings,
}

impl SearchService {
    pub fn new(executor: Executor, params: PlanParams, settings: SearchSettings) -> Self {
        Self { executor, embedder: None, reranker: None, params, settings }
    }

    #[must_use]
    pub fn with_embedder(mut self, embedder: Option<Arc<dyn Embedder>>) -> Self {
        self.embedder = embedder;
        self
    }

    #[must_use]
    pub fn with_reranker(mut self, reranker: Option<Arc<dyn Reranker>>) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub async fn search(&self, req: &SearchRequest) -> Result<SearchResult> {
        let started = Instant::now();
        let result = self.run(req).await;
        log_outcome("search", req, &result, started);
        result
    }

    /// [`search`](Self::search) wrapped in the response envelope.
    pub async fn respond(&self, req: &SearchRequest) -> Result<SearchResponse> {
        let result = self.search(req).await?;
        Ok(SearchResponse::from_result(result, req.page, req.page_size))
    }

    /// Vector search whose page is reordered by the reranker.
    ///
    /// Only the returned page is reranked; `total` is the vector total.
    pub async fn search_with_rerank(&self, req: &SearchRequest) -> Result<SearchResult> {
        let started = Instant::now();
        let result = self.run_with_rerank(req).await;
        log_outcome("search_with_rerank", req, &result, started);
        result
    }

    /// Store reachability, with the executor's retry policy.
    pub async fn health(&self) -> Result<()> {
        self.executor.ping().await
    }

    async fn run(&self, req: &SearchRequest) -> Result<SearchResult> {
        let (scope, window) = req.validate(self.settings.max_page_size)?;
        let kind = req.strategy.kind();
        let embedder = self.embedder_for(kind)?;

        let plan: Plan = match req.strategy {
            Strategy::Keyword => keyword_plan(&req.query, &scope, window)?,
            Strategy::FullText => text_plan(&req.query, &scope, window, &self.params.text)?,
            Strategy::Vector => {
                let vector = embed(embedder, &req.query).await?;
                vector_plan(&vector, &scope, window, &self.params.vector)?
            }
            Strategy::Hybrid { vector_weight, text_weight } => {
                let weights = self.resolve_weights(vector_weight, text_weight);
                weights.validate()?;
                let vector = embed(embedder, &req.query).await?;
                hybrid_plan(&req.query, &vector, &scope, window, weights, &self.params.hybrid)?
            }
        };

        let envelope = self.executor.execute(&plan).await?;
        self.to_result(envelope, &scope)
    }

    async fn run_with_rerank(&self, req: &SearchRequest) -> Result<SearchResult> {
        if req.strategy.kind() != StrategyKind::Vector {
            return Err(Error::contract("reranking is only available for vector search (strategy 3)"));
        }
        let reranker = self
            .reranker
            .as_deref()
            .ok_or_else(|| Error::contract("no rerank capability is configured"))?;

        let mut result = self.run(req).await?;
        if result.products.is_empty() {
            return Ok(result);
        }
        let texts: Vec<String> = result.products.iter().map(Product::rerank_text).collect();
        let ranked = reranker.rerank(&req.query, &texts).await?;

        for p in &mut result.products {
            p.score = None;
        }
        for r in ranked {
            if let Some(p) = result.products.get_mut(r.index) {
                p.score = Some(r.score);
            }
        }
        result.products.sort_by(|a, b| by_score_desc(a.score, b.score));
        Ok(result)
    }

    /// Checked before any I/O so a missing capability never reaches the store.
    fn embedder_for(&self, kind: StrategyKind) -> Result<Option<&dyn Embedder>> {
        if !kind.needs_embedding() {
            return Ok(None);
        }
        self.embedder
            .as_deref()
            .map(Some)
            .ok_or_else(|| Error::contract(format!("{kind} search needs an embedding capability, none is configured")))
    }

    /// Missing weights fall back to the configured default of that pipeline.
    fn resolve_weights(&self, vector: Option<f64>, text: Option<f64>) -> FusionWeights {
        let defaults = self.settings.default_weights();
        FusionWeights { vector: vector.unwrap_or(defaults.vector), text: text.unwrap_or(defaults.text) }
    }

    fn to_result(&self, envelope: Envelope, scope: &StoreScope) -> Result<SearchResult> {
        let mut products = Vec::with_capacity(envelope.docs.len());
        for mut doc in envelope.docs {
            shape_document(&mut doc, scope);
            match Product::from_document(&doc) {
                Ok(product) => products.push(product),
                Err(err) if self.settings.mapping_policy == MappingPolicy::SkipInvalid => {
                    warn!(store = %scope, error = %err, "dropping unmappable document");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(SearchResult { products, total: envelope.total })
    }
}

async fn embed(embedder: Option<&dyn Embedder>, text: &str) -> Result<Vec<f32>> {
    let embedder = embedder.ok_or_else(|| Error::contract("no embedding capability is configured"))?;
    let vector = embedder.embed(text).await?;
    if vector.len() != embedder.dim() {
        return Err(Error::InvalidConfig(format!(
            "embedding has {} dimensions, the embedder is configured for {}",
            vector.len(),
            embedder.dim()
        )));
    }
    debug!(dim = vector.len(), "query embedded");
    Ok(vector)
}

/// Descending, with unscored products last.
fn by_score_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn log_outcome(op: &str, req: &SearchRequest, result: &Result<SearchResult>, started: Instant) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let strategy = req.strategy.kind();
    let selector = strategy.selector();
    match result {
        Ok(r) => info!(
            op, strategy = %strategy, selector, store = %req.store, page = req.page, page_size = req.page_size,
            returned = r.products.len(), total = r.total, elapsed_ms, status = "ok",
            "search completed"
        ),
        Err(e) => warn!(
            op, strategy = %strategy, selector, store = %req.store, page = req.page, page_size = req.page_size,
            status = e.status_class(), error = %e, elapsed_ms,
            "search failed"
        ),
    }
}
