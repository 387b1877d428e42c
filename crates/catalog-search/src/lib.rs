//! Strategy orchestration for store-scoped product search.

mod service;

pub use service::SearchService;

use std::sync::Arc;

use catalog_core::config::Settings;
use catalog_plan::PlanParams;
use catalog_store::{DocumentStore, Executor};

/// Wire a service from settings and an already-connected store.
pub fn build_service(settings: &Settings, store: Arc<dyn DocumentStore>) -> SearchService {
    let executor = Executor::new(store, settings.retry.policy(), settings.search.timeouts);
    SearchService::new(executor, PlanParams::from_settings(settings), settings.search.clone())
}
