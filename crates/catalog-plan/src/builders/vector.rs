use catalog_core::types::{StoreScope, StrategyKind, Window};
use catalog_core::{Error, Result};
use tracing::debug;

use super::page_tail;
use crate::params::{VectorParams, MAX_NUM_CANDIDATES};
use crate::stage::{Filter, MetaScore, Plan, Stage, VectorSearch};

/// Approximate k-NN with the store filter pushed into the search stage.
///
/// The neighbor limit grows with the window so deep pages are still served;
/// the candidate pool never drops below the limit.
pub fn vector_plan(embedding: &[f32], scope: &StoreScope, window: Window, params: &VectorParams) -> Result<Plan> {
    window.validate()?;
    if embedding.is_empty() {
        return Err(Error::contract("vector search needs a non-empty query embedding"));
    }
    let limit = knn_limit(params.candidate_limit, window)?;
    let num_candidates = params.num_candidates.max(limit).min(MAX_NUM_CANDIDATES);
    debug!(store = %scope, skip = window.skip, limit = window.limit, knn_limit = limit, num_candidates, "building vector plan");

    let store = Filter::Store(scope.clone());
    let filter = match params.in_stock {
        Some(flag) => Filter::All(vec![store, Filter::InStock(flag)]),
        None => store,
    };
    let mut stages = vec![
        Stage::VectorSearch(VectorSearch {
            index: params.index.clone(),
            path: params.path.clone(),
            query_vector: embedding.to_vec(),
            num_candidates,
            limit,
            filter: Some(filter),
        }),
        Stage::SetScore(MetaScore::VectorSearch),
    ];
    stages.extend(page_tail(window, true));
    Ok(Plan::new(StrategyKind::Vector, stages))
}

fn knn_limit(candidate_limit: u32, window: Window) -> Result<u32> {
    let end = u32::try_from(window.end()).unwrap_or(u32::MAX);
    if end > MAX_NUM_CANDIDATES {
        return Err(Error::contract(format!(
            "vector search can serve at most {MAX_NUM_CANDIDATES} results, window ends at {end}"
        )));
    }
    Ok(candidate_limit.max(end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::PlanParams;

    fn params() -> VectorParams {
        PlanParams::default().vector
    }

    #[test]
    fn pushes_store_filter_inline_and_over_fetches() {
        let scope = StoreScope::parse("store-1").expect("scope");
        let plan = vector_plan(&[0.1, 0.2], &scope, Window::new(0, 10), &params()).expect("plan");
        match &plan.stages[0] {
            Stage::VectorSearch(v) => {
                assert_eq!(v.filter, Some(Filter::Store(scope.clone())));
                assert!(v.num_candidates >= v.limit);
                assert_eq!(v.limit, 200);
            }
            other => panic!("expected vector search, got {other:?}"),
        }
        assert!(!plan.stages.iter().any(|s| matches!(s, Stage::Match(_))), "no separate filter stage");
        assert_eq!(plan.stages[1], Stage::SetScore(MetaScore::VectorSearch));
    }

    #[test]
    fn deep_window_raises_knn_limit() {
        let scope = StoreScope::parse("store-1").expect("scope");
        let plan = vector_plan(&[1.0], &scope, Window::new(290, 10), &params()).expect("plan");
        assert!(matches!(&plan.stages[0], Stage::VectorSearch(v) if v.limit == 300 && v.num_candidates == 300));
    }

    #[test]
    fn in_stock_joins_the_inline_filter() {
        let scope = StoreScope::parse("store-1").expect("scope");
        let p = VectorParams { in_stock: Some(true), ..params() };
        let plan = vector_plan(&[1.0], &scope, Window::new(0, 10), &p).expect("plan");
        assert!(matches!(&plan.stages[0], Stage::VectorSearch(v)
            if v.filter == Some(Filter::All(vec![Filter::Store(scope.clone()), Filter::InStock(true)]))));
    }

    #[test]
    fn empty_embedding_is_rejected() {
        let scope = StoreScope::parse("store-1").expect("scope");
        assert!(matches!(vector_plan(&[], &scope, Window::new(0, 10), &params()), Err(Error::Contract(_))));
    }
}
