use catalog_core::types::{StoreScope, StrategyKind, Window};
use catalog_core::Result;
use tracing::debug;

use super::page_tail;
use crate::stage::{Filter, Plan, Stage};

/// Case-insensitive name prefix within one store. Unranked; natural order.
pub fn keyword_plan(query: &str, scope: &StoreScope, window: Window) -> Result<Plan> {
    window.validate()?;
    debug!(store = %scope, skip = window.skip, limit = window.limit, "building keyword plan");

    let mut stages = vec![Stage::Match(Filter::All(vec![
        Filter::Store(scope.clone()),
        Filter::NamePrefix(query.trim().to_string()),
    ]))];
    stages.extend(page_tail(window, false));
    Ok(Plan::new(StrategyKind::Keyword, stages))
}
