use catalog_core::types::{StoreScope, StrategyKind, Window};
use catalog_core::Result;
use tracing::debug;

use super::page_tail;
use crate::params::TextParams;
use crate::stage::{Filter, MetaScore, Plan, Stage, TextClause, TextSearch};

/// Managed full-text relevance over a boosted fuzzy compound clause.
///
/// The search metascore is copied into `score` before the fan-out; the
/// branches cannot read it.
pub fn text_plan(query: &str, scope: &StoreScope, window: Window, params: &TextParams) -> Result<Plan> {
    window.validate()?;
    debug!(store = %scope, skip = window.skip, limit = window.limit, index = %params.index, "building text plan");

    let mut stages = vec![
        Stage::TextSearch(TextSearch {
            index: params.index.clone(),
            query: query.trim().to_string(),
            clauses: TextClause::compound(&params.boosts),
        }),
        Stage::Match(Filter::Store(scope.clone())),
        Stage::SetScore(MetaScore::Search),
    ];
    stages.extend(page_tail(window, true));
    Ok(Plan::new(StrategyKind::FullText, stages))
}
