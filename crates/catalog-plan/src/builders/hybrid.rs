use catalog_core::types::{FusionWeights, StoreScope, StrategyKind, Window};
use catalog_core::{Error, Result};
use tracing::debug;

use super::page_tail;
use crate::params::{HybridParams, MAX_NUM_CANDIDATES};
use crate::stage::{Filter, MetaScore, Plan, RankFusion, Stage, TextClause, TextSearch, VectorSearch};

/// Weighted reciprocal-rank fusion of an unfiltered k-NN pipeline and an
/// unfiltered full-text pipeline. The store filter runs after fusion.
pub fn hybrid_plan(
    query: &str,
    embedding: &[f32],
    scope: &StoreScope,
    window: Window,
    weights: FusionWeights,
    params: &HybridParams,
) -> Result<Plan> {
    window.validate()?;
    weights.validate()?;
    if embedding.is_empty() {
        return Err(Error::contract("hybrid search needs a non-empty query embedding"));
    }
    let cap = params.candidate_limit.max(1);
    debug!(
        store = %scope, skip = window.skip, limit = window.limit,
        w_vector = weights.vector, w_text = weights.text, candidates = cap,
        "building hybrid plan"
    );

    let vector = vec![Stage::VectorSearch(VectorSearch {
        index: params.vector.index.clone(),
        path: params.vector.path.clone(),
        query_vector: embedding.to_vec(),
        num_candidates: params.vector.num_candidates.max(cap).min(MAX_NUM_CANDIDATES),
        limit: cap,
        filter: None,
    })];
    let text = vec![
        Stage::TextSearch(TextSearch {
            index: params.text.index.clone(),
            query: query.trim().to_string(),
            clauses: TextClause::compound(&params.text.boosts),
        }),
        Stage::Limit(u64::from(cap)),
    ];

    let mut stages = vec![
        Stage::RankFusion(RankFusion { vector, text, weights, score_details: true }),
        Stage::Match(Filter::Store(scope.clone())),
        Stage::SetScore(MetaScore::Fusion),
    ];
    stages.extend(page_tail(window, true));
    Ok(Plan::new(StrategyKind::Hybrid, stages))
}
