//! Embedding and rerank capabilities.
//!
//! `APP_USE_FAKE_EMBEDDINGS=1` swaps the remote client for the deterministic
//! [`FakeEmbedder`] so the whole pipeline can run offline.

use std::sync::Arc;

use tracing::info;

use catalog_core::config::VoyageSettings;
use catalog_core::retry::RetryPolicy;
use catalog_core::traits::{Embedder, Reranker};
use catalog_core::Result;

pub mod fake;
pub mod voyage;

pub use fake::FakeEmbedder;
pub use voyage::VoyageClient;

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

fn has_api_key(settings: &VoyageSettings) -> bool {
    settings.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
}

/// Embedder for strategies 3 and 4, or `None` when neither fake mode nor an
/// API key is configured.
pub fn get_default_embedder(settings: &VoyageSettings, retry: &RetryPolicy) -> Result<Option<Arc<dyn Embedder>>> {
    if use_fake_embeddings() {
        info!(dim = settings.dimensions, "using FakeEmbedder");
        return Ok(Some(Arc::new(FakeEmbedder::new(settings.dimensions))));
    }
    if !has_api_key(settings) {
        info!("no embedding API key configured; vector and hybrid search disabled");
        return Ok(None);
    }
    Ok(Some(Arc::new(VoyageClient::new(settings, retry.clone())?)))
}

/// Remote reranker, only available with an API key.
pub fn get_default_reranker(settings: &VoyageSettings, retry: &RetryPolicy) -> Result<Option<Arc<dyn Reranker>>> {
    if !has_api_key(settings) {
        return Ok(None);
    }
    Ok(Some(Arc::new(VoyageClient::new(settings, retry.clone())?)))
}
